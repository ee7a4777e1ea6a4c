//! 대화 오케스트레이터
//!
//! 들어온 메시지가 문서 업로드인지, 고정된 문서에 대한 후속 질문인지,
//! 새 질문인지 판단하여 추출기, 지식베이스, LLM을 호출합니다.
//! 사용자에게는 내부 에러를 그대로 보여주지 않고 안내 문구로 응답합니다.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::collector::DocumentKind;
use crate::completion::{build_messages, CompletionError, CompletionParams, CompletionProvider};
use crate::extractor::ExtractionOutcome;
use crate::knowledge::SharedKnowledge;

use super::state::{ConversationState, Conversations};

// ============================================================================
// Replies
// ============================================================================

pub const WELCOME_REPLY: &str =
    "환영합니다! 저는 등록된 자료를 바탕으로 답변하는 봇입니다. 질문을 보내주시거나 문서/사진을 올려주세요.";
pub const HELP_REPLY: &str = "사용법:\n\
    - 질문을 보내면 지식베이스에서 관련 자료를 찾아 답변합니다\n\
    - PDF, 텍스트, 이미지를 보내면 그 내용에 대해 질문할 수 있습니다\n\
    - /teach 다음 메시지를 지식베이스에 메모로 추가합니다\n\
    - /cancel 진행 중인 작업을 취소합니다";
pub const PLEASE_WAIT_REPLY: &str = "잠시만 기다려주세요. 답변을 생성하고 있습니다.";
pub const LOADING_REPLY: &str = "지식베이스를 불러오는 중입니다. 잠시만 기다려주세요...";
pub const KNOWLEDGE_FAILED_REPLY: &str =
    "지식베이스를 불러오지 못했습니다. 잠시 후 다시 시도해주세요.";
pub const DOCUMENT_READY_REPLY: &str =
    "문서를 처리했습니다. 이제 내용에 대해 질문해주세요.";
pub const IMAGE_READY_REPLY: &str = "이미지를 처리했습니다. 이제 내용에 대해 질문해주세요.";
pub const DOCUMENT_FAILED_REPLY: &str =
    "문서를 처리하지 못했습니다. 다른 파일로 시도해주세요.";
pub const IMAGE_FAILED_REPLY: &str = "이미지를 처리하지 못했습니다. 다른 이미지로 시도해주세요.";
pub const UNSUPPORTED_REPLY: &str =
    "지원하지 않는 파일 형식입니다. PDF, TXT, JPG, PNG 파일을 보내주세요.";
pub const TEACH_PROMPT_REPLY: &str = "지식베이스에 추가할 내용을 보내주세요. 취소하려면 /cancel";
pub const TEACH_SAVED_REPLY: &str = "메모를 지식베이스에 추가했습니다.";
pub const TEACH_FAILED_REPLY: &str = "메모를 저장하지 못했습니다. 잠시 후 다시 시도해주세요.";
pub const CANCELLED_REPLY: &str = "취소했습니다.";
pub const FALLBACK_REPLY: &str =
    "죄송합니다. 지금은 답변을 생성할 수 없습니다. 잠시 후 다시 시도해주세요.";

// ============================================================================
// Inbound Messages
// ============================================================================

/// 봇 명령어
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Teach,
    Cancel,
    Unknown(String),
}

impl Command {
    /// `/start`, `/start@my_bot` 형식의 명령어 파싱
    pub fn parse(text: &str) -> Option<Self> {
        let word = text.trim().split_whitespace().next()?;
        let name = word.strip_prefix('/')?;
        let name = name.split('@').next().unwrap_or(name).to_lowercase();

        Some(match name.as_str() {
            "start" => Command::Start,
            "help" => Command::Help,
            "teach" => Command::Teach,
            "cancel" => Command::Cancel,
            _ => Command::Unknown(name),
        })
    }
}

/// 수신 메시지
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Command(Command),
    Text(String),
    /// 문서 업로드 (파일 이름으로 종류 판별)
    Document { file_name: String, bytes: Vec<u8> },
    /// 사진 (JPEG)
    Photo { bytes: Vec<u8> },
}

impl Inbound {
    /// 텍스트를 명령어 또는 일반 텍스트로 분류
    pub fn from_text(text: &str) -> Self {
        match Command::parse(text) {
            Some(command) => Inbound::Command(command),
            None => Inbound::Text(text.to_string()),
        }
    }
}

// ============================================================================
// Outbox Trait
// ============================================================================

/// 응답 전송 트레이트
#[async_trait]
pub trait Outbox: Send + Sync {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<()>;
}

// ============================================================================
// Assistant
// ============================================================================

/// 대화 오케스트레이터
pub struct Assistant {
    knowledge: Arc<SharedKnowledge>,
    provider: Arc<dyn CompletionProvider>,
    params: CompletionParams,
    timeout: Duration,
    conversations: Conversations,
}

impl Assistant {
    pub fn new(
        knowledge: Arc<SharedKnowledge>,
        provider: Arc<dyn CompletionProvider>,
        params: CompletionParams,
        timeout: Duration,
    ) -> Self {
        Self {
            knowledge,
            provider,
            params,
            timeout,
            conversations: Conversations::new(),
        }
    }

    pub fn conversations(&self) -> &Conversations {
        &self.conversations
    }

    pub fn knowledge(&self) -> &SharedKnowledge {
        &self.knowledge
    }

    /// 메시지 하나 처리
    pub async fn handle(&self, outbox: &dyn Outbox, chat_id: i64, inbound: Inbound) {
        let payload = match inbound {
            Inbound::Command(command) => {
                self.handle_command(outbox, chat_id, command).await;
                return;
            }
            other => other,
        };

        let Some(previous) = self.conversations.begin(chat_id).await else {
            reply(outbox, chat_id, PLEASE_WAIT_REPLY).await;
            return;
        };

        let next = match (payload, previous) {
            (Inbound::Document { file_name, bytes }, _) => {
                self.process_upload(outbox, chat_id, &file_name, bytes, DOCUMENT_READY_REPLY, DOCUMENT_FAILED_REPLY)
                    .await
            }
            (Inbound::Photo { bytes }, _) => {
                self.process_upload(outbox, chat_id, "photo.jpg", bytes, IMAGE_READY_REPLY, IMAGE_FAILED_REPLY)
                    .await
            }
            (Inbound::Text(question), ConversationState::AwaitingQuestion { pinned_context }) => {
                let answer = self.ask(&question, Some(&pinned_context)).await;
                reply(outbox, chat_id, &answer).await;
                ConversationState::Idle
            }
            (Inbound::Text(note), ConversationState::AwaitingAdminInfo) => {
                self.save_note(outbox, chat_id, &note).await;
                ConversationState::Idle
            }
            (Inbound::Text(question), _) => {
                self.answer_from_knowledge(outbox, chat_id, &question).await;
                ConversationState::Idle
            }
            (Inbound::Command(_), _) => ConversationState::Idle,
        };

        self.conversations.finish(chat_id, next).await;
    }

    /// 명령어 처리
    ///
    /// 상태를 바꾸는 명령어는 생성 중이면 대기 안내만 보냅니다.
    async fn handle_command(&self, outbox: &dyn Outbox, chat_id: i64, command: Command) {
        let (next, text) = match command {
            Command::Help | Command::Unknown(_) => {
                reply(outbox, chat_id, HELP_REPLY).await;
                return;
            }
            Command::Start => (ConversationState::Idle, WELCOME_REPLY),
            Command::Cancel => (ConversationState::Idle, CANCELLED_REPLY),
            Command::Teach => (ConversationState::AwaitingAdminInfo, TEACH_PROMPT_REPLY),
        };

        if self.conversations.set_unless_generating(chat_id, next).await {
            reply(outbox, chat_id, text).await;
        } else {
            reply(outbox, chat_id, PLEASE_WAIT_REPLY).await;
        }
    }

    /// 업로드된 문서를 추출하여 컨텍스트로 고정
    async fn process_upload(
        &self,
        outbox: &dyn Outbox,
        chat_id: i64,
        file_name: &str,
        bytes: Vec<u8>,
        ready_reply: &str,
        failed_reply: &str,
    ) -> ConversationState {
        let extension = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        if DocumentKind::from_extension(extension).is_none() {
            tracing::info!("Unsupported upload from chat {}: {}", chat_id, file_name);
            reply(outbox, chat_id, UNSUPPORTED_REPLY).await;
            return ConversationState::Idle;
        }

        let outcome = self
            .knowledge
            .extractor()
            .extract_document(bytes, extension)
            .await;

        match outcome.and_then(|o| {
            if let ExtractionOutcome::Failed(reason) = &o {
                tracing::warn!("Upload extraction failed for {}: {}", file_name, reason);
            }
            o.into_usable_text()
        }) {
            Some(text) => {
                tracing::info!(
                    "Pinned {} ({} chars) for chat {}",
                    file_name,
                    text.chars().count(),
                    chat_id
                );
                reply(outbox, chat_id, ready_reply).await;
                ConversationState::AwaitingQuestion {
                    pinned_context: text,
                }
            }
            None => {
                reply(outbox, chat_id, failed_reply).await;
                ConversationState::Idle
            }
        }
    }

    /// 지식베이스 검색 후 답변
    async fn answer_from_knowledge(&self, outbox: &dyn Outbox, chat_id: i64, question: &str) {
        if !self.knowledge.is_initialized() {
            reply(outbox, chat_id, LOADING_REPLY).await;
        }

        let context = match self.knowledge.search(question).await {
            Ok(context) => context,
            Err(e) => {
                tracing::error!("Knowledge base unavailable: {:#}", e);
                reply(outbox, chat_id, KNOWLEDGE_FAILED_REPLY).await;
                return;
            }
        };

        tracing::debug!(
            "Chat {}: {} context",
            chat_id,
            if context.is_some() { "found" } else { "no" }
        );

        let answer = self.ask(question, context.as_deref()).await;
        reply(outbox, chat_id, &answer).await;
    }

    /// 메모를 텍스트 파일로 저장하고 수집 패스 실행
    async fn save_note(&self, outbox: &dyn Outbox, chat_id: i64, note: &str) {
        match self.write_note(note).await {
            Ok(file_name) => {
                tracing::info!("Chat {} added note {}", chat_id, file_name);
                reply(outbox, chat_id, TEACH_SAVED_REPLY).await;
            }
            Err(e) => {
                tracing::error!("Failed to save note: {:#}", e);
                reply(outbox, chat_id, TEACH_FAILED_REPLY).await;
            }
        }
    }

    async fn write_note(&self, note: &str) -> Result<String> {
        let stem = format!("note-{}", chrono::Utc::now().format("%Y%m%d-%H%M%S%3f"));
        let text_dir = self.knowledge.data_dir().join(DocumentKind::Text.dir_name());

        // 초기화 전이면 카테고리 디렉토리가 아직 없을 수 있음
        self.knowledge.store().await?;
        let file_name = create_note_file(&text_dir, &stem, note).await?;

        self.knowledge.refresh().await?;
        Ok(file_name)
    }

    /// LLM에 질문 (타임아웃/실패 시 대체 문구)
    pub async fn ask(&self, question: &str, context: Option<&str>) -> String {
        let messages = build_messages(question, context);
        let call = self.provider.complete(&messages, &self.params);

        let result = match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(CompletionError::Timeout(self.timeout)),
        };

        match result {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                tracing::warn!("Completion failed ({}): {}", self.provider.name(), e);
                FALLBACK_REPLY.to_string()
            }
        }
    }
}

/// 같은 이름의 파일이 있으면 번호를 붙여 새 메모 파일 생성
async fn create_note_file(dir: &Path, stem: &str, note: &str) -> Result<String> {
    const MAX_ATTEMPTS: usize = 100;

    for attempt in 0..MAX_ATTEMPTS {
        let file_name = match attempt {
            0 => format!("{}.txt", stem),
            n => format!("{}-{}.txt", stem, n),
        };
        let path = dir.join(&file_name);

        let mut file = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to create note: {:?}", path));
            }
        };

        file.write_all(note.as_bytes())
            .await
            .with_context(|| format!("Failed to write note: {:?}", path))?;
        file.flush()
            .await
            .with_context(|| format!("Failed to write note: {:?}", path))?;

        return Ok(file_name);
    }

    bail!("No free note file name for {} in {:?}", stem, dir)
}

/// 응답 전송 (전송 실패는 기록만)
async fn reply(outbox: &dyn Outbox, chat_id: i64, text: &str) {
    if let Err(e) = outbox.send_text(chat_id, text).await {
        tracing::error!("Failed to send reply to chat {}: {:#}", chat_id, e);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::{ChatMessage, Role};
    use crate::extractor::{Extractor, OcrEngine};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;
    use tokio::sync::Mutex;

    /// 받은 메시지를 기록하는 프로바이더
    #[derive(Default)]
    struct RecordingProvider {
        calls: Mutex<Vec<Vec<ChatMessage>>>,
    }

    #[async_trait]
    impl CompletionProvider for RecordingProvider {
        async fn complete(
            &self,
            messages: &[ChatMessage],
            _params: &CompletionParams,
        ) -> std::result::Result<String, CompletionError> {
            self.calls.lock().await.push(messages.to_vec());
            Ok("  generated answer \n".to_string())
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl CompletionProvider for FailingProvider {
        async fn complete(
            &self,
            _messages: &[ChatMessage],
            _params: &CompletionParams,
        ) -> std::result::Result<String, CompletionError> {
            Err(CompletionError::EmptyResponse)
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    struct SlowProvider;

    #[async_trait]
    impl CompletionProvider for SlowProvider {
        async fn complete(
            &self,
            _messages: &[ChatMessage],
            _params: &CompletionParams,
        ) -> std::result::Result<String, CompletionError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("too late".to_string())
        }

        fn name(&self) -> &str {
            "slow"
        }
    }

    /// 동시에 진행 중인 호출 수를 기록하는 느린 프로바이더
    #[derive(Default)]
    struct ConcurrencyProvider {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    #[async_trait]
    impl CompletionProvider for ConcurrencyProvider {
        async fn complete(
            &self,
            _messages: &[ChatMessage],
            _params: &CompletionParams,
        ) -> std::result::Result<String, CompletionError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(200)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok("done".to_string())
        }

        fn name(&self) -> &str {
            "concurrency"
        }
    }

    struct SlowOcr;

    #[async_trait]
    impl OcrEngine for SlowOcr {
        async fn recognize(&self, _image: &[u8], _mime_type: &str) -> Result<String> {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok("text".to_string())
        }

        fn name(&self) -> &str {
            "slow"
        }
    }

    #[derive(Default)]
    struct RecordingOutbox {
        sent: Mutex<Vec<(i64, String)>>,
    }

    impl RecordingOutbox {
        async fn texts(&self) -> Vec<String> {
            self.sent.lock().await.iter().map(|(_, t)| t.clone()).collect()
        }
    }

    #[async_trait]
    impl Outbox for RecordingOutbox {
        async fn send_text(&self, chat_id: i64, text: &str) -> Result<()> {
            self.sent.lock().await.push((chat_id, text.to_string()));
            Ok(())
        }
    }

    fn assistant_with(
        dir: &TempDir,
        provider: Arc<dyn CompletionProvider>,
        timeout: Duration,
    ) -> Assistant {
        let knowledge = Arc::new(SharedKnowledge::new(dir.path(), Extractor::default()));
        Assistant::new(knowledge, provider, CompletionParams::default(), timeout)
    }

    fn assistant_with_extractor(
        dir: &TempDir,
        extractor: Extractor,
        provider: Arc<dyn CompletionProvider>,
    ) -> Assistant {
        let knowledge = Arc::new(SharedKnowledge::new(dir.path(), extractor));
        Assistant::new(knowledge, provider, CompletionParams::default(), Duration::from_secs(5))
    }

    /// 생성 상태가 될 때까지 대기
    async fn wait_until_generating(assistant: &Assistant, chat_id: i64) {
        for _ in 0..200 {
            if assistant.conversations().get(chat_id).await == ConversationState::Generating {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("chat {} never started generating", chat_id);
    }

    fn seed_text(dir: &TempDir, name: &str, content: &str) {
        let text_dir = dir.path().join("text");
        std::fs::create_dir_all(&text_dir).unwrap();
        std::fs::write(text_dir.join(name), content).unwrap();
    }

    #[test]
    fn test_command_parse() {
        assert_eq!(Command::parse("/start"), Some(Command::Start));
        assert_eq!(Command::parse("/START@doc_bot now"), Some(Command::Start));
        assert_eq!(Command::parse(" /teach"), Some(Command::Teach));
        assert_eq!(Command::parse("/foo"), Some(Command::Unknown("foo".to_string())));
        assert_eq!(Command::parse("hello /start"), None);
        assert_eq!(Command::parse(""), None);
    }

    #[tokio::test]
    async fn test_start_sends_welcome() {
        let dir = TempDir::new().unwrap();
        let assistant = assistant_with(&dir, Arc::new(RecordingProvider::default()), Duration::from_secs(1));
        let outbox = RecordingOutbox::default();

        assistant.handle(&outbox, 1, Inbound::from_text("/start")).await;
        assert_eq!(outbox.texts().await, vec![WELCOME_REPLY.to_string()]);
    }

    #[tokio::test]
    async fn test_question_uses_knowledge_context() {
        let dir = TempDir::new().unwrap();
        seed_text(&dir, "refund.txt", "Refunds are accepted within 14 days.");
        let provider = Arc::new(RecordingProvider::default());
        let assistant = assistant_with(&dir, provider.clone(), Duration::from_secs(1));
        let outbox = RecordingOutbox::default();

        assistant.handle(&outbox, 1, Inbound::from_text("what about refunds")).await;

        assert_eq!(
            outbox.texts().await,
            vec![LOADING_REPLY.to_string(), "generated answer".to_string()]
        );

        let calls = provider.calls.lock().await;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0][0].role, Role::System);
        assert!(calls[0][1].content.contains("--- 출처: refund.txt ---"));
        assert!(calls[0][1].content.ends_with("질문: what about refunds"));
        drop(calls);

        assert_eq!(assistant.conversations().get(1).await, ConversationState::Idle);

        // 두 번째 질문에서는 로딩 안내가 없음
        assistant.handle(&outbox, 1, Inbound::from_text("refunds again")).await;
        assert_eq!(outbox.texts().await.len(), 3);
    }

    #[tokio::test]
    async fn test_question_without_match_has_no_context() {
        let dir = TempDir::new().unwrap();
        seed_text(&dir, "a.txt", "apples");
        let provider = Arc::new(RecordingProvider::default());
        let assistant = assistant_with(&dir, provider.clone(), Duration::from_secs(1));
        let outbox = RecordingOutbox::default();

        assistant.handle(&outbox, 1, Inbound::from_text("zebra")).await;

        let calls = provider.calls.lock().await;
        assert_eq!(calls[0], vec![ChatMessage::user("zebra")]);
    }

    #[tokio::test]
    async fn test_upload_pins_context_for_next_question() {
        let dir = TempDir::new().unwrap();
        let provider = Arc::new(RecordingProvider::default());
        let assistant = assistant_with(&dir, provider.clone(), Duration::from_secs(1));
        let outbox = RecordingOutbox::default();

        let upload = Inbound::Document {
            file_name: "Contract.TXT".to_string(),
            bytes: "Договор действует до 2030 года".as_bytes().to_vec(),
        };
        assistant.handle(&outbox, 5, upload).await;
        assert_eq!(
            assistant.conversations().get(5).await,
            ConversationState::AwaitingQuestion {
                pinned_context: "Договор действует до 2030 года".to_string()
            }
        );

        assistant.handle(&outbox, 5, Inbound::from_text("until when?")).await;

        let calls = provider.calls.lock().await;
        assert_eq!(
            calls[0][1].content,
            "컨텍스트: Договор действует до 2030 года\n\n질문: until when?"
        );
        drop(calls);

        assert_eq!(
            outbox.texts().await,
            vec![DOCUMENT_READY_REPLY.to_string(), "generated answer".to_string()]
        );
        assert_eq!(assistant.conversations().get(5).await, ConversationState::Idle);
    }

    #[tokio::test]
    async fn test_unsupported_upload() {
        let dir = TempDir::new().unwrap();
        let assistant = assistant_with(&dir, Arc::new(RecordingProvider::default()), Duration::from_secs(1));
        let outbox = RecordingOutbox::default();

        let upload = Inbound::Document {
            file_name: "slides.pptx".to_string(),
            bytes: vec![1, 2, 3],
        };
        assistant.handle(&outbox, 1, upload).await;

        assert_eq!(outbox.texts().await, vec![UNSUPPORTED_REPLY.to_string()]);
        assert_eq!(assistant.conversations().get(1).await, ConversationState::Idle);
    }

    #[tokio::test]
    async fn test_photo_without_ocr_fails_gracefully() {
        let dir = TempDir::new().unwrap();
        let assistant = assistant_with(&dir, Arc::new(RecordingProvider::default()), Duration::from_secs(1));
        let outbox = RecordingOutbox::default();

        assistant.handle(&outbox, 1, Inbound::Photo { bytes: vec![0xff, 0xd8] }).await;

        assert_eq!(outbox.texts().await, vec![IMAGE_FAILED_REPLY.to_string()]);
        assert_eq!(assistant.conversations().get(1).await, ConversationState::Idle);
    }

    #[tokio::test]
    async fn test_busy_conversation_gets_wait_reply() {
        let dir = TempDir::new().unwrap();
        let provider = Arc::new(RecordingProvider::default());
        let assistant = assistant_with(&dir, provider.clone(), Duration::from_secs(1));
        let outbox = RecordingOutbox::default();

        assistant.conversations().begin(1).await;
        assistant.handle(&outbox, 1, Inbound::from_text("hello?")).await;
        assistant.handle(&outbox, 1, Inbound::from_text("/teach")).await;

        assert_eq!(
            outbox.texts().await,
            vec![PLEASE_WAIT_REPLY.to_string(), PLEASE_WAIT_REPLY.to_string()]
        );
        assert!(provider.calls.lock().await.is_empty());
        assert_eq!(assistant.conversations().get(1).await, ConversationState::Generating);
    }

    #[tokio::test]
    async fn test_provider_failure_uses_fallback() {
        let dir = TempDir::new().unwrap();
        let assistant = assistant_with(&dir, Arc::new(FailingProvider), Duration::from_secs(1));
        assert_eq!(assistant.ask("hi", None).await, FALLBACK_REPLY);
    }

    #[tokio::test]
    async fn test_provider_timeout_uses_fallback() {
        let dir = TempDir::new().unwrap();
        let assistant = assistant_with(&dir, Arc::new(SlowProvider), Duration::from_millis(20));
        assert_eq!(assistant.ask("hi", None).await, FALLBACK_REPLY);
    }

    #[tokio::test]
    async fn test_teach_adds_note_to_knowledge() {
        let dir = TempDir::new().unwrap();
        let assistant = assistant_with(&dir, Arc::new(RecordingProvider::default()), Duration::from_secs(1));
        let outbox = RecordingOutbox::default();

        assistant.handle(&outbox, 9, Inbound::from_text("/teach")).await;
        assert_eq!(assistant.conversations().get(9).await, ConversationState::AwaitingAdminInfo);

        assistant
            .handle(&outbox, 9, Inbound::from_text("Office hours are 9 to 18"))
            .await;

        assert_eq!(
            outbox.texts().await,
            vec![TEACH_PROMPT_REPLY.to_string(), TEACH_SAVED_REPLY.to_string()]
        );
        assert_eq!(assistant.conversations().get(9).await, ConversationState::Idle);

        let context = assistant.knowledge().search("office").await.unwrap().unwrap();
        assert!(context.contains("Office hours are 9 to 18"));
        assert!(context.contains("note-"));
    }

    #[tokio::test]
    async fn test_cancel_clears_pinned_context() {
        let dir = TempDir::new().unwrap();
        let assistant = assistant_with(&dir, Arc::new(RecordingProvider::default()), Duration::from_secs(1));
        let outbox = RecordingOutbox::default();

        assistant
            .conversations()
            .set_unless_generating(
                2,
                ConversationState::AwaitingQuestion {
                    pinned_context: "x".to_string(),
                },
            )
            .await;
        assistant.handle(&outbox, 2, Inbound::from_text("/cancel")).await;

        assert_eq!(outbox.texts().await, vec![CANCELLED_REPLY.to_string()]);
        assert_eq!(assistant.conversations().get(2).await, ConversationState::Idle);
    }

    #[tokio::test]
    async fn test_start_during_generation_keeps_single_completion() {
        let dir = TempDir::new().unwrap();
        let provider = Arc::new(ConcurrencyProvider::default());
        let assistant = Arc::new(assistant_with_extractor(&dir, Extractor::default(), provider.clone()));
        let outbox = Arc::new(RecordingOutbox::default());

        let first = {
            let assistant = assistant.clone();
            let outbox = outbox.clone();
            tokio::spawn(async move {
                assistant.handle(outbox.as_ref(), 1, Inbound::from_text("first")).await;
            })
        };
        wait_until_generating(&assistant, 1).await;

        assistant.handle(outbox.as_ref(), 1, Inbound::from_text("/start")).await;
        assistant.handle(outbox.as_ref(), 1, Inbound::from_text("second")).await;
        first.await.unwrap();

        assert_eq!(provider.max_in_flight.load(Ordering::SeqCst), 1);
        let texts = outbox.texts().await;
        assert_eq!(
            texts.iter().filter(|t| t.as_str() == PLEASE_WAIT_REPLY).count(),
            2
        );
        assert!(!texts.iter().any(|t| t == WELCOME_REPLY));
        assert_eq!(assistant.conversations().get(1).await, ConversationState::Idle);
    }

    #[tokio::test]
    async fn test_cancel_during_upload_does_not_lose_result() {
        let dir = TempDir::new().unwrap();
        let extractor = Extractor::new(Some(Arc::new(SlowOcr)));
        let assistant = Arc::new(assistant_with_extractor(
            &dir,
            extractor,
            Arc::new(RecordingProvider::default()),
        ));
        let outbox = Arc::new(RecordingOutbox::default());

        let upload = {
            let assistant = assistant.clone();
            let outbox = outbox.clone();
            tokio::spawn(async move {
                assistant
                    .handle(outbox.as_ref(), 3, Inbound::Photo { bytes: vec![0xff, 0xd8] })
                    .await;
            })
        };
        wait_until_generating(&assistant, 3).await;

        assistant.handle(outbox.as_ref(), 3, Inbound::from_text("/cancel")).await;
        assert_eq!(assistant.conversations().get(3).await, ConversationState::Generating);
        upload.await.unwrap();

        assert_eq!(
            outbox.texts().await,
            vec![PLEASE_WAIT_REPLY.to_string(), IMAGE_READY_REPLY.to_string()]
        );
        assert_eq!(
            assistant.conversations().get(3).await,
            ConversationState::AwaitingQuestion {
                pinned_context: "text".to_string()
            }
        );

        // 생성이 끝난 뒤에는 취소 가능
        assistant.handle(outbox.as_ref(), 3, Inbound::from_text("/cancel")).await;
        assert_eq!(assistant.conversations().get(3).await, ConversationState::Idle);
    }

    #[tokio::test]
    async fn test_note_file_names_never_collide() {
        let dir = TempDir::new().unwrap();

        let first = create_note_file(dir.path(), "note-20260101-000000000", "first note")
            .await
            .unwrap();
        let second = create_note_file(dir.path(), "note-20260101-000000000", "second note")
            .await
            .unwrap();

        assert_eq!(first, "note-20260101-000000000.txt");
        assert_eq!(second, "note-20260101-000000000-1.txt");
        assert_eq!(std::fs::read_to_string(dir.path().join(&first)).unwrap(), "first note");
        assert_eq!(std::fs::read_to_string(dir.path().join(&second)).unwrap(), "second note");
    }
}
