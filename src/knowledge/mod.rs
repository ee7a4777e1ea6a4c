//! Knowledge 모듈 - 키워드 기반 지식베이스
//!
//! - Store: 식별자 → 문서 맵, JSON 파일로 저장
//! - Search: 질의어 부분 문자열 일치 개수로 순위 결정
//! - Shared: 대화 간 공유되는 단일 초기화 핸들

mod search;
mod shared;
mod store;

// Re-exports
pub use search::{query_terms, score_content, SearchHit, TOP_K};
pub use shared::SharedKnowledge;
pub use store::{
    get_data_dir, DocumentRecord, IngestReport, KnowledgeStore, StoreStats, STORE_FILE_NAME,
};
