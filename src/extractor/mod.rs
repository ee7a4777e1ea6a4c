//! 콘텐츠 추출 모듈
//!
//! 문서 바이트를 하나의 텍스트로 변환합니다.
//! - PDF: pdf-extract로 페이지별 추출 후 결합
//! - 이미지: OCR 엔진 (기본: Gemini Vision)
//! - 텍스트: UTF-8 디코딩
//!
//! PDF/이미지 추출은 실패해도 에러를 던지지 않고 [`ExtractionOutcome::Failed`]를 반환합니다.

pub mod image;
pub mod pdf;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::collector::DocumentKind;

pub use image::{GeminiVisionOcr, OcrEngine};

// ============================================================================
// Extraction Outcome
// ============================================================================

/// 추출 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionOutcome {
    /// 추출 성공 (빈 문자열일 수 있음)
    Extracted(String),
    /// 추출 실패 사유
    Failed(String),
}

impl ExtractionOutcome {
    /// 대화 컨텍스트로 쓸 수 있는 텍스트 (성공했고 공백만 있지 않은 경우)
    pub fn into_usable_text(self) -> Option<String> {
        match self {
            ExtractionOutcome::Extracted(text) if !text.trim().is_empty() => Some(text),
            _ => None,
        }
    }
}

// ============================================================================
// Extractor
// ============================================================================

/// 콘텐츠 추출기
#[derive(Clone, Default)]
pub struct Extractor {
    ocr: Option<Arc<dyn OcrEngine>>,
}

impl Extractor {
    /// OCR 엔진을 지정하여 생성 (None이면 이미지 추출은 항상 실패)
    pub fn new(ocr: Option<Arc<dyn OcrEngine>>) -> Self {
        Self { ocr }
    }

    /// Gemini API 키로 생성
    pub fn with_gemini(api_key: Option<String>) -> Result<Self> {
        let ocr = match api_key {
            Some(key) => Some(Arc::new(GeminiVisionOcr::new(key)?) as Arc<dyn OcrEngine>),
            None => {
                tracing::warn!("No OCR API key configured; image extraction is disabled");
                None
            }
        };
        Ok(Self::new(ocr))
    }

    /// OCR 사용 가능 여부
    pub fn has_ocr(&self) -> bool {
        self.ocr.is_some()
    }

    /// 확장자 문자열로 분기하여 추출
    ///
    /// 지원하지 않는 종류면 `None`을 반환합니다.
    pub async fn extract_document(
        &self,
        bytes: Vec<u8>,
        kind: &str,
    ) -> Option<ExtractionOutcome> {
        let doc_kind = DocumentKind::from_extension(kind)?;
        let file_name = format!("upload.{}", kind.to_lowercase());
        Some(self.extract(bytes, doc_kind, &file_name).await)
    }

    /// 파일을 읽어 추출
    ///
    /// 파일 읽기 실패만 에러로 반환하며, 호출자는 기록 후 건너뜁니다.
    pub async fn extract_file(&self, path: &Path, kind: DocumentKind) -> Result<ExtractionOutcome> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read file: {:?}", path))?;

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();

        Ok(self.extract(bytes, kind, file_name).await)
    }

    /// 문서 바이트에서 추출
    pub async fn extract(&self, bytes: Vec<u8>, kind: DocumentKind, file_name: &str) -> ExtractionOutcome {
        match kind {
            DocumentKind::Pdf => self.extract_pdf(bytes).await,
            DocumentKind::Image => self.extract_image(&bytes, file_name).await,
            DocumentKind::Text => extract_text(bytes),
        }
    }

    /// PDF 추출 (파서 패닉도 실패로 변환)
    async fn extract_pdf(&self, bytes: Vec<u8>) -> ExtractionOutcome {
        match tokio::task::spawn_blocking(move || pdf::extract_text_from_pdf(&bytes)).await {
            Ok(Ok(text)) => ExtractionOutcome::Extracted(text),
            Ok(Err(e)) => ExtractionOutcome::Failed(format!("PDF processing error: {:#}", e)),
            Err(e) => ExtractionOutcome::Failed(format!("PDF processing aborted: {}", e)),
        }
    }

    /// 이미지 OCR
    async fn extract_image(&self, bytes: &[u8], file_name: &str) -> ExtractionOutcome {
        let Some(ocr) = &self.ocr else {
            return ExtractionOutcome::Failed("Image processing error: no OCR engine configured".to_string());
        };

        match ocr.recognize(bytes, image::mime_type_for(file_name)).await {
            Ok(text) => ExtractionOutcome::Extracted(text),
            Err(e) => ExtractionOutcome::Failed(format!("Image processing error ({}): {:#}", ocr.name(), e)),
        }
    }
}

/// 텍스트 디코딩 (UTF-8)
fn extract_text(bytes: Vec<u8>) -> ExtractionOutcome {
    match String::from_utf8(bytes) {
        Ok(text) => ExtractionOutcome::Extracted(text),
        Err(e) => ExtractionOutcome::Failed(format!("Text decode error: {}", e)),
    }
}

// ============================================================================
// Tests
// ============================================================================
