//! 완성 모듈 - OpenAI 호환 Chat Completions API 클라이언트
//!
//! 질문(과 선택적 컨텍스트)을 메시지 목록으로 만들어 LLM에 보내고 답변 텍스트를 받습니다.
//! 기본 엔드포인트는 OpenRouter입니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let client = OpenAiCompatibleClient::new(api_key, DEFAULT_BASE_URL)?;
//! let messages = build_messages("환불 규정은?", Some(&context));
//! let answer = client.complete(&messages, &CompletionParams::default()).await?;
//! ```

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 기본 API 엔드포인트
pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
/// 기본 모델
pub const DEFAULT_MODEL: &str = "meta-llama/llama-3.3-8b-instruct:free";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 2000;

/// 컨텍스트가 있을 때의 시스템 프롬프트
const CONTEXT_SYSTEM_PROMPT: &str =
    "당신은 제공된 컨텍스트를 바탕으로 질문에 답하는 유용한 어시스턴트입니다. 정확하고 유익하게 답변하세요.";

// ============================================================================
// Types
// ============================================================================

/// 메시지 역할
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

/// 대화 메시지
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// 생성 파라미터
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionParams {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for CompletionParams {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

/// 완성 호출 에러
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("completion API key is not configured")]
    MissingApiKey,
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },
    #[error("response contained no message")]
    EmptyResponse,
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

// ============================================================================
// CompletionProvider Trait
// ============================================================================

/// LLM 완성 프로바이더 트레이트
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// 메시지 목록으로 답변 생성
    async fn complete(
        &self,
        messages: &[ChatMessage],
        params: &CompletionParams,
    ) -> Result<String, CompletionError>;

    /// 프로바이더 이름
    fn name(&self) -> &str;
}

/// 질문과 선택적 컨텍스트로 메시지 목록 구성
pub fn build_messages(question: &str, context: Option<&str>) -> Vec<ChatMessage> {
    match context {
        Some(context) => vec![
            ChatMessage::system(CONTEXT_SYSTEM_PROMPT),
            ChatMessage::user(format!("컨텍스트: {}\n\n질문: {}", context, question)),
        ],
        None => vec![ChatMessage::user(question)],
    }
}

// ============================================================================
// OpenAI-compatible Client
// ============================================================================

/// OpenAI 호환 API 클라이언트
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleClient {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAiCompatibleClient {
    /// 새 클라이언트 생성
    ///
    /// # Arguments
    /// * `api_key` - Bearer 토큰
    /// * `base_url` - API 베이스 URL (예: `https://openrouter.ai/api/v1`)
    pub fn new(api_key: String, base_url: &str) -> Result<Self, CompletionError> {
        if api_key.is_empty() {
            return Err(CompletionError::MissingApiKey);
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;

        Ok(Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl CompletionProvider for OpenAiCompatibleClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        params: &CompletionParams,
    ) -> Result<String, CompletionError> {
        let request = ChatRequest {
            model: &params.model,
            messages,
            temperature: params.temperature,
            max_tokens: params.max_tokens,
        };

        let response = self
            .client
            .post(self.chat_url())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(CompletionError::Api {
                status: status.as_u16(),
                body,
            });
        }

        parse_chat_response(&body)
    }

    fn name(&self) -> &str {
        "openai-compatible"
    }
}

/// 응답 본문에서 첫 번째 메시지 추출
fn parse_chat_response(body: &str) -> Result<String, CompletionError> {
    let response: ChatResponse = serde_json::from_str(body).map_err(|e| CompletionError::Api {
        status: 200,
        body: format!("unparseable response ({}): {}", e, body),
    })?;

    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|text| !text.trim().is_empty())
        .ok_or(CompletionError::EmptyResponse)
}

// ============================================================================
// API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

// ============================================================================
// Tests
// ============================================================================
