//! docchat - 문서 기반 채팅 어시스턴트
//!
//! PDF, 이미지, 텍스트 파일을 키워드 지식베이스로 만들고
//! 텔레그램에서 그 내용을 바탕으로 LLM이 답변합니다.

pub mod bot;
pub mod cli;
pub mod collector;
pub mod completion;
pub mod config;
pub mod extractor;
pub mod knowledge;

// Re-exports
pub use bot::{Assistant, ConversationState, Conversations, Inbound, Outbox, TelegramTransport};
pub use collector::{collect_category, DocumentKind, SourceFile};
pub use completion::{
    build_messages, ChatMessage, CompletionError, CompletionParams, CompletionProvider,
    OpenAiCompatibleClient,
};
pub use config::Config;
pub use extractor::{ExtractionOutcome, Extractor, GeminiVisionOcr, OcrEngine};
pub use knowledge::{
    get_data_dir, DocumentRecord, IngestReport, KnowledgeStore, SearchHit, SharedKnowledge,
    StoreStats,
};
