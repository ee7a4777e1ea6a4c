//! 프로세스 전역 지식베이스 핸들
//!
//! 첫 사용 시 저장소를 열고 수집 패스를 한 번만 실행합니다.
//! 동시에 여러 대화가 요청해도 초기화 작업은 하나이며, 나머지는 그 결과를 기다립니다.

use std::path::{Path, PathBuf};

use anyhow::Result;
use tokio::sync::{OnceCell, RwLock};

use crate::extractor::Extractor;

use super::store::{IngestReport, KnowledgeStore};

/// 공유 지식베이스
pub struct SharedKnowledge {
    data_dir: PathBuf,
    extractor: Extractor,
    store: OnceCell<RwLock<KnowledgeStore>>,
}

impl SharedKnowledge {
    pub fn new(data_dir: impl Into<PathBuf>, extractor: Extractor) -> Self {
        Self {
            data_dir: data_dir.into(),
            extractor,
            store: OnceCell::new(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn extractor(&self) -> &Extractor {
        &self.extractor
    }

    /// 초기화 완료 여부
    pub fn is_initialized(&self) -> bool {
        self.store.initialized()
    }

    /// 저장소 획득 (필요하면 초기화)
    ///
    /// 초기화가 실패하면 셀은 비어 있는 채로 남고 다음 호출이 다시 시도합니다.
    pub async fn store(&self) -> Result<&RwLock<KnowledgeStore>> {
        self.store
            .get_or_try_init(|| async move {
                tracing::info!("Loading knowledge base from {:?}", self.data_dir);
                let mut store = KnowledgeStore::open(&self.data_dir)?;
                store.ingest(&self.extractor).await?;
                tracing::info!("Knowledge base ready ({} documents)", store.len());
                Ok::<_, anyhow::Error>(RwLock::new(store))
            })
            .await
    }

    /// 관련 컨텍스트 검색
    pub async fn search(&self, query: &str) -> Result<Option<String>> {
        let store = self.store().await?.read().await;
        Ok(store.search(query))
    }

    /// 수집 패스 재실행 (새 파일 반영)
    pub async fn refresh(&self) -> Result<IngestReport> {
        let mut store = self.store().await?.write().await;
        store.ingest(&self.extractor).await
    }
}

// ============================================================================
// Tests
// ============================================================================
