//! 소스 파일 수집 모듈
//!
//! 데이터 디렉토리 아래의 고정된 세 카테고리(pdf, images, text)에서
//! 지원하는 확장자의 파일만 수집합니다.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

// ============================================================================
// Document Kind
// ============================================================================

/// 문서 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    /// PDF 문서
    Pdf,
    /// 이미지 (OCR로 처리)
    Image,
    /// 일반 텍스트
    Text,
}

impl DocumentKind {
    /// 모든 종류 (수집 순서)
    pub const ALL: [DocumentKind; 3] = [DocumentKind::Pdf, DocumentKind::Image, DocumentKind::Text];

    /// 확장자로 문서 종류 결정
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.to_lowercase();
        match ext.as_str() {
            "pdf" => Some(DocumentKind::Pdf),
            "jpg" | "jpeg" | "png" => Some(DocumentKind::Image),
            "txt" => Some(DocumentKind::Text),
            _ => None,
        }
    }

    /// 파일 경로에서 종류 결정
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    /// 카테고리 디렉토리 이름
    pub fn dir_name(self) -> &'static str {
        match self {
            DocumentKind::Pdf => "pdf",
            DocumentKind::Image => "images",
            DocumentKind::Text => "text",
        }
    }

    /// 저장 파일에 기록되는 태그
    pub fn as_str(self) -> &'static str {
        match self {
            DocumentKind::Pdf => "pdf",
            DocumentKind::Image => "image",
            DocumentKind::Text => "text",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Source File
// ============================================================================

/// 수집된 소스 파일
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// 파일 경로
    pub path: PathBuf,
    /// 파일 이름 (지식베이스 식별자)
    pub identifier: String,
    /// 문서 종류
    pub kind: DocumentKind,
}

// ============================================================================
// Category Layout
// ============================================================================

/// 카테고리 디렉토리 생성 (이미 있으면 무시)
pub fn ensure_category_dirs(data_dir: &Path) -> Result<()> {
    for kind in DocumentKind::ALL {
        let dir = data_dir.join(kind.dir_name());
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create category directory: {:?}", dir))?;
    }
    Ok(())
}

/// 카테고리 디렉토리의 파일 수집
///
/// 하위 디렉토리는 탐색하지 않으며, 확장자가 카테고리와 맞는 파일만
/// 파일 이름 순으로 반환합니다.
pub fn collect_category(data_dir: &Path, kind: DocumentKind) -> Result<Vec<SourceFile>> {
    let dir = data_dir.join(kind.dir_name());
    if !dir.is_dir() {
        tracing::debug!("Category directory missing: {:?}", dir);
        return Ok(vec![]);
    }

    let mut files = Vec::new();

    for entry in WalkDir::new(&dir).min_depth(1).max_depth(1) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!("Failed to read entry: {}", e);
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        if DocumentKind::from_path(entry.path()) != Some(kind) {
            continue;
        }

        let Some(identifier) = entry.file_name().to_str() else {
            tracing::warn!("Skipping non UTF-8 file name: {:?}", entry.path());
            continue;
        };

        files.push(SourceFile {
            path: entry.path().to_path_buf(),
            identifier: identifier.to_string(),
            kind,
        });
    }

    files.sort_by(|a, b| a.identifier.cmp(&b.identifier));

    tracing::debug!("Collected {} {} files from {:?}", files.len(), kind, dir);
    Ok(files)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_kind_from_extension() {
        assert_eq!(DocumentKind::from_extension("pdf"), Some(DocumentKind::Pdf));
        assert_eq!(DocumentKind::from_extension("PDF"), Some(DocumentKind::Pdf));
        assert_eq!(DocumentKind::from_extension("jpeg"), Some(DocumentKind::Image));
        assert_eq!(DocumentKind::from_extension("png"), Some(DocumentKind::Image));
        assert_eq!(DocumentKind::from_extension("txt"), Some(DocumentKind::Text));
        assert_eq!(DocumentKind::from_extension("md"), None);
        assert_eq!(DocumentKind::from_extension("gif"), None);
    }

    #[test]
    fn test_kind_serializes_lowercase() {
        let json = serde_json::to_string(&DocumentKind::Image).unwrap();
        assert_eq!(json, "\"image\"");
    }

    #[test]
    fn test_collect_category_filters_and_sorts() {
        let dir = TempDir::new().unwrap();
        ensure_category_dirs(dir.path()).unwrap();

        let text_dir = dir.path().join("text");
        std::fs::write(text_dir.join("b.txt"), "b").unwrap();
        std::fs::write(text_dir.join("a.TXT"), "a").unwrap();
        std::fs::write(text_dir.join("notes.md"), "ignored").unwrap();
        std::fs::create_dir(text_dir.join("nested.txt")).unwrap();

        let files = collect_category(dir.path(), DocumentKind::Text).unwrap();
        let names: Vec<_> = files.iter().map(|f| f.identifier.as_str()).collect();
        assert_eq!(names, vec!["a.TXT", "b.txt"]);
        assert!(files.iter().all(|f| f.kind == DocumentKind::Text));
    }

    #[test]
    fn test_collect_missing_category_is_empty() {
        let dir = TempDir::new().unwrap();
        let files = collect_category(dir.path(), DocumentKind::Pdf).unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn test_image_in_pdf_dir_is_ignored() {
        let dir = TempDir::new().unwrap();
        ensure_category_dirs(dir.path()).unwrap();
        std::fs::write(dir.path().join("pdf").join("scan.png"), [0u8; 4]).unwrap();

        let files = collect_category(dir.path(), DocumentKind::Pdf).unwrap();
        assert!(files.is_empty());
    }
}
