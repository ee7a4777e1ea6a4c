//! Knowledge Store - JSON 파일 기반 지식 저장소
//!
//! 파일 이름을 식별자로, 추출된 텍스트와 문서 종류를 저장합니다.
//! 저장 위치: `<data_dir>/knowledge_base.json` (들여쓰기된 UTF-8 JSON)

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::collector::{collect_category, ensure_category_dirs, DocumentKind};
use crate::extractor::{ExtractionOutcome, Extractor};

/// 저장 파일 이름
pub const STORE_FILE_NAME: &str = "knowledge_base.json";

// ============================================================================
// Data Directory
// ============================================================================

/// 기본 데이터 디렉토리 경로 (~/.docchat/)
pub fn get_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".docchat")
}

// ============================================================================
// Types
// ============================================================================

/// 저장된 문서
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// 문서 종류
    #[serde(rename = "type", alias = "kind")]
    pub kind: DocumentKind,
    /// 추출된 텍스트
    pub content: String,
}

impl DocumentRecord {
    pub fn new(kind: DocumentKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
        }
    }
}

/// 수집 패스 결과
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// 새로 추가된 문서 수
    pub added: usize,
    /// 이미 있어서 건너뛴 문서 수
    pub skipped: usize,
    /// 텍스트가 없어 추가하지 않은 문서 수
    pub empty: usize,
    /// 읽기/추출 실패 수
    pub failed: usize,
}

/// 저장소 통계
#[derive(Debug, Clone)]
pub struct StoreStats {
    pub document_count: usize,
    pub pdf_count: usize,
    pub image_count: usize,
    pub text_count: usize,
    pub total_content_bytes: usize,
    pub store_path: PathBuf,
}

// ============================================================================
// KnowledgeStore
// ============================================================================

/// Knowledge Store
///
/// 식별자 → 문서 맵을 삽입 순서대로 유지하며, 저장 시 파일 전체를 다시 씁니다.
/// 단일 작성자를 가정합니다 (공유는 [`super::SharedKnowledge`]를 통해).
#[derive(Debug)]
pub struct KnowledgeStore {
    data_dir: PathBuf,
    store_path: PathBuf,
    records: IndexMap<String, DocumentRecord>,
}

impl KnowledgeStore {
    /// 저장소 열기
    ///
    /// 카테고리 디렉토리(pdf, images, text)를 만들고,
    /// 저장 파일이 있으면 읽어옵니다. 없으면 빈 저장소로 시작합니다.
    pub fn open(data_dir: &Path) -> Result<Self> {
        ensure_category_dirs(data_dir)?;

        let store_path = data_dir.join(STORE_FILE_NAME);
        let records = if store_path.exists() {
            let raw = std::fs::read_to_string(&store_path)
                .with_context(|| format!("Failed to read knowledge base: {:?}", store_path))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("Failed to parse knowledge base: {:?}", store_path))?
        } else {
            IndexMap::new()
        };

        tracing::debug!(
            "Knowledge store opened at {:?} ({} documents)",
            store_path,
            records.len()
        );

        Ok(Self {
            data_dir: data_dir.to_path_buf(),
            store_path,
            records,
        })
    }

    /// 저장 파일 경로
    pub fn store_path(&self) -> &Path {
        &self.store_path
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.records.contains_key(identifier)
    }

    pub fn get(&self, identifier: &str) -> Option<&DocumentRecord> {
        self.records.get(identifier)
    }

    /// 삽입 순서대로 순회
    pub fn iter(&self) -> impl Iterator<Item = (&str, &DocumentRecord)> {
        self.records.iter().map(|(id, record)| (id.as_str(), record))
    }

    /// 문서 추가 (같은 식별자가 있으면 덮어씀)
    pub fn insert(&mut self, identifier: impl Into<String>, record: DocumentRecord) -> Option<DocumentRecord> {
        self.records.insert(identifier.into(), record)
    }

    /// 특정 종류의 식별자 목록
    pub fn identifiers_by_kind(&self, kind: DocumentKind) -> Vec<&str> {
        self.iter()
            .filter(|(_, record)| record.kind == kind)
            .map(|(id, _)| id)
            .collect()
    }

    /// 수집 패스
    ///
    /// pdf → images → text 순서로 카테고리 디렉토리를 훑어 아직 없는 파일만 추출합니다.
    /// 개별 파일 실패는 기록만 하고 건너뛰며, 마지막에 변경 여부와 관계없이 저장합니다.
    pub async fn ingest(&mut self, extractor: &Extractor) -> Result<IngestReport> {
        let mut report = IngestReport::default();

        for kind in DocumentKind::ALL {
            for file in collect_category(&self.data_dir, kind)? {
                if self.records.contains_key(&file.identifier) {
                    report.skipped += 1;
                    continue;
                }

                tracing::info!("Processing {} file: {}", kind, file.identifier);

                let outcome = match extractor.extract_file(&file.path, kind).await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        tracing::warn!("Error processing {} file {}: {:#}", kind, file.identifier, e);
                        report.failed += 1;
                        continue;
                    }
                };

                match outcome {
                    ExtractionOutcome::Extracted(text) if !text.is_empty() => {
                        self.records
                            .insert(file.identifier, DocumentRecord::new(kind, text));
                        report.added += 1;
                    }
                    ExtractionOutcome::Extracted(_) => {
                        tracing::debug!("No text extracted from {}", file.identifier);
                        report.empty += 1;
                    }
                    ExtractionOutcome::Failed(reason) => {
                        tracing::warn!("Skipping {}: {}", file.identifier, reason);
                        report.failed += 1;
                    }
                }
            }
        }

        self.save()?;

        tracing::info!(
            "Ingestion pass finished: {} added, {} skipped, {} empty, {} failed ({} total)",
            report.added,
            report.skipped,
            report.empty,
            report.failed,
            self.records.len()
        );

        Ok(report)
    }

    /// 저장 파일에 전체 맵 기록
    ///
    /// 임시 파일에 쓴 뒤 이름을 바꿔 원자적으로 교체합니다.
    pub fn save(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.records)
            .context("Failed to serialize knowledge base")?;

        let tmp_path = self.store_path.with_extension("json.tmp");
        std::fs::write(&tmp_path, json)
            .with_context(|| format!("Failed to write knowledge base: {:?}", tmp_path))?;
        std::fs::rename(&tmp_path, &self.store_path)
            .with_context(|| format!("Failed to replace knowledge base: {:?}", self.store_path))?;

        tracing::debug!("Saved {} documents to {:?}", self.records.len(), self.store_path);
        Ok(())
    }

    /// 저장소 비우기 (되돌릴 수 없음)
    pub fn clear(&mut self) -> Result<()> {
        self.records.clear();
        self.save()?;
        tracing::info!("Knowledge base cleared: {:?}", self.store_path);
        Ok(())
    }

    /// 전체 문서를 하나의 컨텍스트로 결합
    pub fn full_context(&self) -> String {
        self.iter()
            .map(|(id, record)| format!("--- 파일 내용: {} ---\n{}\n", id, record.content))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// 저장소 통계
    pub fn stats(&self) -> StoreStats {
        let count = |kind: DocumentKind| self.records.values().filter(|r| r.kind == kind).count();

        StoreStats {
            document_count: self.records.len(),
            pdf_count: count(DocumentKind::Pdf),
            image_count: count(DocumentKind::Image),
            text_count: count(DocumentKind::Text),
            total_content_bytes: self.records.values().map(|r| r.content.len()).sum(),
            store_path: self.store_path.clone(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
