//! 설정 모듈
//!
//! 환경변수에서 설정을 읽습니다. CLI 플래그가 있으면 그 값이 우선합니다.
//!
//! | 변수 | 용도 |
//! |------|------|
//! | `DOCCHAT_DATA_DIR` | 데이터 디렉토리 |
//! | `TELEGRAM_BOT_TOKEN` | 텔레그램 봇 토큰 |
//! | `OPENROUTER_API_KEY` > `LLM_API_KEY` | 완성 API 키 |
//! | `LLM_BASE_URL`, `LLM_MODEL`, `LLM_TEMPERATURE`, `LLM_MAX_TOKENS`, `LLM_TIMEOUT_SECS` | 완성 설정 |
//! | `GEMINI_API_KEY` > `GOOGLE_AI_API_KEY` | OCR (Gemini Vision) 키 |

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::completion::{CompletionParams, DEFAULT_BASE_URL};
use crate::knowledge::get_data_dir;

/// 완성 호출 기본 타임아웃
pub const DEFAULT_LLM_TIMEOUT: Duration = Duration::from_secs(60);

const LLM_KEY_VARS: [&str; 2] = ["OPENROUTER_API_KEY", "LLM_API_KEY"];
const OCR_KEY_VARS: [&str; 2] = ["GEMINI_API_KEY", "GOOGLE_AI_API_KEY"];

// ============================================================================
// Config
// ============================================================================

/// LLM 설정
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub params: CompletionParams,
    /// 호출 제한 시간 (초과 시 대체 문구로 응답)
    pub timeout: Duration,
}

/// 전체 설정
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub telegram_token: Option<String>,
    pub llm: LlmConfig,
    pub ocr_api_key: Option<String>,
}

impl Config {
    /// 환경변수에서 로드
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 조회 함수로부터 로드
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let first = |keys: &[&str]| keys.iter().find_map(|&key| get(key));

        let defaults = CompletionParams::default();

        let llm = LlmConfig {
            api_key: first(LLM_KEY_VARS.as_slice()),
            base_url: get("LLM_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            params: CompletionParams {
                model: get("LLM_MODEL").unwrap_or(defaults.model),
                temperature: parse_or(get("LLM_TEMPERATURE"), "LLM_TEMPERATURE", defaults.temperature),
                max_tokens: parse_or(get("LLM_MAX_TOKENS"), "LLM_MAX_TOKENS", defaults.max_tokens),
            },
            timeout: Duration::from_secs(parse_or(
                get("LLM_TIMEOUT_SECS"),
                "LLM_TIMEOUT_SECS",
                DEFAULT_LLM_TIMEOUT.as_secs(),
            )),
        };

        Self {
            data_dir: get("DOCCHAT_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(get_data_dir),
            telegram_token: get("TELEGRAM_BOT_TOKEN"),
            llm,
            ocr_api_key: first(OCR_KEY_VARS.as_slice()),
        }
    }

    /// 데이터 디렉토리 덮어쓰기
    pub fn with_data_dir(mut self, data_dir: Option<PathBuf>) -> Self {
        if let Some(dir) = data_dir {
            self.data_dir = dir;
        }
        self
    }
}

/// 숫자 값 파싱 (잘못된 값은 경고 후 기본값)
fn parse_or<T: FromStr + Copy>(value: Option<String>, key: &str, default: T) -> T {
    match value {
        Some(raw) => match raw.trim().parse() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!("Invalid value for {}: {:?}, using default", key, raw);
                default
            }
        },
        None => default,
    }
}

// ============================================================================
// Tests
// ============================================================================
