//! PDF 텍스트 추출 모듈
//!
//! pdf-extract 크레이트를 사용하여 PDF에서 텍스트를 추출합니다.

use anyhow::{Context, Result};

/// PDF 바이트에서 텍스트 추출
///
/// 페이지별 텍스트를 문서 순서대로 줄바꿈으로 이어 붙여 반환합니다.
/// CPU 바운드 작업이므로 호출자는 `spawn_blocking` 안에서 실행해야 합니다.
pub fn extract_text_from_pdf(bytes: &[u8]) -> Result<String> {
    let text = pdf_extract::extract_text_from_mem(bytes)
        .context("Failed to extract text from PDF")?;

    if text.trim().is_empty() {
        tracing::warn!("No text extracted from PDF. It might be a scanned document.");
        return Ok(String::new());
    }

    let pages = split_pdf_pages(&text);
    tracing::debug!("Extracted {} PDF pages", pages.len());

    Ok(pages.join("\n"))
}

/// PDF 텍스트를 페이지별로 분리
///
/// pdf-extract는 페이지 경계에 폼피드 문자를 남깁니다.
fn split_pdf_pages(text: &str) -> Vec<String> {
    let pages: Vec<String> = text
        .split('\x0c')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    if pages.is_empty() {
        vec![text.trim().to_string()]
    } else {
        pages
    }
}

// ============================================================================
// Tests
// ============================================================================
