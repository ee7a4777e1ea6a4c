//! Telegram Bot API 어댑터
//!
//! long polling으로 업데이트를 받고, 문서/사진을 내려받고, MarkdownV2로 응답을 보냅니다.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::assistant::Outbox;

const API_BASE: &str = "https://api.telegram.org";

/// long polling 대기 시간 (초)
pub const LONG_POLL_TIMEOUT_SECS: u64 = 30;

/// 메시지 하나에 담을 최대 글자 수 (이스케이프 전)
///
/// 이스케이프 후에도 Telegram 제한(4096자)을 넘지 않도록 절반 이하로 잡습니다.
pub const MAX_MESSAGE_CHARS: usize = 2000;

/// MarkdownV2 예약 문자
const MARKDOWN_V2_SPECIAL: &[char] = &[
    '\\', '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.',
    '!',
];

// ============================================================================
// Transport
// ============================================================================

/// Telegram 봇 전송 계층
#[derive(Debug, Clone)]
pub struct TelegramTransport {
    token: String,
    client: reqwest::Client,
}

impl TelegramTransport {
    pub fn new(token: String) -> Result<Self> {
        if token.trim().is_empty() {
            bail!("Telegram bot token is empty");
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(LONG_POLL_TIMEOUT_SECS + 30))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { token, client })
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", API_BASE, self.token, method)
    }

    fn file_url(&self, file_path: &str) -> String {
        format!("{}/file/bot{}/{}", API_BASE, self.token, file_path)
    }

    /// API 메서드 호출
    async fn call<T: DeserializeOwned>(&self, method: &str, body: serde_json::Value) -> Result<T> {
        let response = self
            .client
            .post(self.api_url(method))
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Telegram {} request failed", method))?;

        let body: ApiResponse<T> = response
            .json()
            .await
            .with_context(|| format!("Invalid Telegram {} response", method))?;

        if !body.ok {
            bail!(
                "Telegram {} error: {}",
                method,
                body.description.unwrap_or_default()
            );
        }

        body.result
            .with_context(|| format!("Telegram {} returned no result", method))
    }

    /// 봇 정보 조회 (토큰 확인용)
    pub async fn get_me(&self) -> Result<TelegramUser> {
        self.call("getMe", serde_json::json!({})).await
    }

    /// 업데이트 조회 (long polling)
    pub async fn get_updates(&self, offset: i64) -> Result<Vec<TelegramUpdate>> {
        self.call(
            "getUpdates",
            serde_json::json!({
                "offset": offset,
                "timeout": LONG_POLL_TIMEOUT_SECS,
                "allowed_updates": ["message"],
            }),
        )
        .await
    }

    /// 파일 메타데이터 조회
    pub async fn get_file(&self, file_id: &str) -> Result<TelegramFile> {
        self.call("getFile", serde_json::json!({ "file_id": file_id }))
            .await
    }

    /// 파일 내려받기
    pub async fn download(&self, file_id: &str) -> Result<Vec<u8>> {
        let file = self.get_file(file_id).await?;
        let file_path = file
            .file_path
            .with_context(|| format!("File {} has no download path", file_id))?;

        let response = self
            .client
            .get(self.file_url(&file_path))
            .send()
            .await
            .context("Telegram file download failed")?;

        if !response.status().is_success() {
            bail!("Telegram file download error: {}", response.status());
        }

        let bytes = response
            .bytes()
            .await
            .context("Failed to read downloaded file")?;

        tracing::debug!("Downloaded {} ({} bytes)", file_path, bytes.len());
        Ok(bytes.to_vec())
    }

    /// 메시지 전송 (긴 메시지는 나누어 전송)
    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
        for chunk in split_message(text, MAX_MESSAGE_CHARS) {
            let _: serde_json::Value = self
                .call(
                    "sendMessage",
                    serde_json::json!({
                        "chat_id": chat_id,
                        "text": escape_markdown_v2(&chunk),
                        "parse_mode": "MarkdownV2",
                    }),
                )
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Outbox for TelegramTransport {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<()> {
        self.send_message(chat_id, text).await
    }
}

// ============================================================================
// Formatting
// ============================================================================

/// MarkdownV2 예약 문자 이스케이프
pub fn escape_markdown_v2(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() * 2);
    for c in text.chars() {
        if MARKDOWN_V2_SPECIAL.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// 글자 수 기준으로 메시지 분할 (가능하면 줄 단위)
pub fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.split_inclusive('\n') {
        let line_len = line.chars().count();

        if current_len + line_len > max_chars && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }

        if line_len > max_chars {
            let chars: Vec<char> = line.chars().collect();
            for piece in chars.chunks(max_chars) {
                if piece.len() == max_chars {
                    chunks.push(piece.iter().collect());
                } else {
                    current = piece.iter().collect();
                    current_len = piece.len();
                }
            }
            continue;
        }

        current.push_str(line);
        current_len += line_len;
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

// ============================================================================
// Incoming Events
// ============================================================================

/// 처리 대상 수신 이벤트 (다운로드 전)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncomingEvent {
    Text {
        chat_id: i64,
        text: String,
    },
    Document {
        chat_id: i64,
        file_id: String,
        file_name: String,
    },
    Photo {
        chat_id: i64,
        file_id: String,
    },
}

impl IncomingEvent {
    pub fn chat_id(&self) -> i64 {
        match self {
            IncomingEvent::Text { chat_id, .. }
            | IncomingEvent::Document { chat_id, .. }
            | IncomingEvent::Photo { chat_id, .. } => *chat_id,
        }
    }
}

impl TelegramUpdate {
    /// 업데이트를 수신 이벤트로 변환 (봇 메시지, 빈 메시지는 무시)
    pub fn to_event(&self) -> Option<IncomingEvent> {
        let msg = self.message.as_ref()?;
        if msg.from.as_ref().is_some_and(|from| from.is_bot) {
            return None;
        }
        let chat_id = msg.chat.id;

        if let Some(document) = &msg.document {
            return Some(IncomingEvent::Document {
                chat_id,
                file_id: document.file_id.clone(),
                file_name: document
                    .file_name
                    .clone()
                    .unwrap_or_else(|| "document".to_string()),
            });
        }

        // 가장 큰 해상도 사용
        if let Some(photo) = msg.photo.iter().max_by_key(|p| p.width * p.height) {
            return Some(IncomingEvent::Photo {
                chat_id,
                file_id: photo.file_id.clone(),
            });
        }

        let text = msg.text.as_ref().filter(|t| !t.trim().is_empty())?;
        Some(IncomingEvent::Text {
            chat_id,
            text: text.clone(),
        })
    }
}

// ============================================================================
// API Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramUpdate {
    pub update_id: i64,
    pub message: Option<TelegramMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramMessage {
    pub message_id: i64,
    pub from: Option<TelegramUser>,
    pub chat: TelegramChat,
    pub text: Option<String>,
    pub document: Option<TelegramDocument>,
    #[serde(default)]
    pub photo: Vec<TelegramPhotoSize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
    pub is_bot: bool,
    pub first_name: String,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramChat {
    pub id: i64,
    #[serde(rename = "type")]
    pub chat_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramDocument {
    pub file_id: String,
    pub file_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramPhotoSize {
    pub file_id: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramFile {
    pub file_id: String,
    pub file_path: Option<String>,
}

// ============================================================================
// Tests
// ============================================================================
