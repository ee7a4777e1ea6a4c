//! 이미지 OCR 모듈
//!
//! Gemini Vision API를 사용하여 이미지에서 텍스트를 인식합니다.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};

/// Gemini Vision API 엔드포인트
const GEMINI_VISION_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent";

// ============================================================================
// OcrEngine Trait
// ============================================================================

/// OCR 엔진 트레이트
///
/// 이미지 전체에서 텍스트를 인식합니다. 텍스트가 없으면 빈 문자열을 반환합니다.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// 이미지 바이트에서 텍스트 인식
    async fn recognize(&self, image: &[u8], mime_type: &str) -> Result<String>;

    /// 엔진 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Gemini Vision OCR
// ============================================================================

/// Gemini Vision 기반 OCR
#[derive(Debug, Clone)]
pub struct GeminiVisionOcr {
    api_key: String,
    client: reqwest::Client,
}

impl GeminiVisionOcr {
    /// API 키로 생성
    pub fn new(api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { api_key, client })
    }
}

#[async_trait]
impl OcrEngine for GeminiVisionOcr {
    async fn recognize(&self, image: &[u8], mime_type: &str) -> Result<String> {
        let request = VisionRequest {
            contents: vec![VisionContent {
                parts: vec![
                    VisionPart::Text {
                        text: OCR_PROMPT.to_string(),
                    },
                    VisionPart::InlineData {
                        inline_data: InlineData {
                            mime_type: mime_type.to_string(),
                            data: STANDARD.encode(image),
                        },
                    },
                ],
            }],
            generation_config: GenerationConfig {
                temperature: 0.0,
                max_output_tokens: 8192,
            },
        };

        let response = self
            .client
            .post(GEMINI_VISION_URL)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .context("Failed to send Vision API request")?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            anyhow::bail!("Vision API error ({}): {}", status, body);
        }

        let vision_response: VisionResponse =
            serde_json::from_str(&body).context("Failed to parse Vision API response")?;

        let text = vision_response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .unwrap_or_default();

        if text.trim() == NO_TEXT_MARKER {
            return Ok(String::new());
        }

        Ok(text)
    }

    fn name(&self) -> &str {
        "gemini-vision"
    }
}

/// 파일 이름에서 이미지 MIME 타입 결정
///
/// 확장자가 없거나 알 수 없으면 JPEG로 간주합니다 (채팅 사진은 JPEG로 전달됨).
pub fn mime_type_for(file_name: &str) -> &'static str {
    let ext = std::path::Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "png" => "image/png",
        _ => "image/jpeg",
    }
}

const NO_TEXT_MARKER: &str = "[NO_TEXT]";

/// OCR 프롬프트
const OCR_PROMPT: &str = r#"이 이미지에 보이는 모든 텍스트를 그대로 추출해주세요.

지시사항:
1. 보이는 텍스트만 원문 그대로 출력합니다 (번역, 요약, 설명 금지)
2. 줄 구분은 원본을 따릅니다
3. 텍스트가 없으면 [NO_TEXT] 라고만 응답합니다"#;

// ============================================================================
// API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct VisionRequest {
    contents: Vec<VisionContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct VisionContent {
    parts: Vec<VisionPart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum VisionPart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Debug, Serialize)]
struct InlineData {
    #[serde(rename = "mimeType")]
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct VisionResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    parts: Vec<TextPart>,
}

#[derive(Debug, Deserialize)]
struct TextPart {
    text: String,
}

// ============================================================================
// Tests
// ============================================================================
