//! CLI 모듈
//!
//! docchat CLI 명령어 정의 및 구현

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use crate::bot::{self, Assistant, TelegramTransport};
use crate::collector::DocumentKind;
use crate::completion::OpenAiCompatibleClient;
use crate::config::Config;
use crate::extractor::Extractor;
use crate::knowledge::{KnowledgeStore, SharedKnowledge};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "docchat")]
#[command(version, about = "문서 기반 채팅 어시스턴트", long_about = None)]
pub struct Cli {
    /// 데이터 디렉토리 (기본: DOCCHAT_DATA_DIR 또는 로컬 데이터 디렉토리)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 데이터 디렉토리의 새 파일을 지식베이스에 추가
    Train,

    /// 저장된 문서 목록
    List {
        /// 모든 문서 내용을 하나의 컨텍스트로 출력
        #[arg(long)]
        full: bool,
    },

    /// 지식베이스 비우기
    Clear {
        /// 확인 없이 삭제
        #[arg(short, long)]
        yes: bool,
    },

    /// 지식베이스 검색
    Query {
        /// 검색 쿼리
        query: String,

        /// LLM에 전달되는 컨텍스트 그대로 출력
        #[arg(long)]
        context: bool,
    },

    /// 텔레그램 봇 실행
    Run,

    /// 상태 확인
    Status,
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let config = Config::from_env().with_data_dir(cli.data_dir);

    match cli.command {
        Commands::Train => cmd_train(&config).await,
        Commands::List { full } => cmd_list(&config, full),
        Commands::Clear { yes } => cmd_clear(&config, yes),
        Commands::Query { query, context } => cmd_query(&config, &query, context),
        Commands::Run => cmd_run(config).await,
        Commands::Status => cmd_status(&config),
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 학습 명령어 (train)
///
/// pdf/, images/, text/ 디렉토리에서 아직 저장되지 않은 파일을 추출하여 저장합니다.
async fn cmd_train(config: &Config) -> Result<()> {
    let extractor =
        Extractor::with_gemini(config.ocr_api_key.clone()).context("Extractor 생성 실패")?;
    let mut store = KnowledgeStore::open(&config.data_dir).context("KnowledgeStore 열기 실패")?;

    if !extractor.has_ocr() {
        println!("[!] OCR API 키가 없어 이미지는 건너뜁니다 (GEMINI_API_KEY)");
    }

    println!("[*] 수집 중: {}", config.data_dir.display());
    let report = store.ingest(&extractor).await.context("수집 실패")?;

    println!("\n[OK] 수집 완료:");
    println!("     추가: {} 건", report.added);
    println!("     기존: {} 건", report.skipped);
    if report.empty > 0 {
        println!("     내용 없음: {} 건", report.empty);
    }
    if report.failed > 0 {
        println!("     실패: {} 건 (다음 실행 시 재시도)", report.failed);
    }

    let stats = store.stats();
    println!(
        "\n     PDF {} | 이미지 {} | 텍스트 {} (총 {} 건)",
        stats.pdf_count, stats.image_count, stats.text_count, stats.document_count
    );
    println!("     저장 위치: {}", stats.store_path.display());

    Ok(())
}

/// 목록 명령어 (list)
fn cmd_list(config: &Config, full: bool) -> Result<()> {
    let store = KnowledgeStore::open(&config.data_dir).context("KnowledgeStore 열기 실패")?;

    if store.is_empty() {
        println!("[!] 저장된 문서가 없습니다.");
        return Ok(());
    }

    if full {
        println!("{}", store.full_context());
        return Ok(());
    }

    println!("[OK] 저장된 문서 ({} 건):", store.len());

    for kind in DocumentKind::ALL {
        let identifiers = store.identifiers_by_kind(kind);
        if identifiers.is_empty() {
            continue;
        }

        println!("\n  [{}] {} 건", kind, identifiers.len());
        for identifier in identifiers {
            let chars = store
                .get(identifier)
                .map(|r| r.content.chars().count())
                .unwrap_or_default();
            println!("    - {} ({} chars)", identifier, chars);
        }
    }

    Ok(())
}

/// 비우기 명령어 (clear)
fn cmd_clear(config: &Config, yes: bool) -> Result<()> {
    let mut store = KnowledgeStore::open(&config.data_dir).context("KnowledgeStore 열기 실패")?;

    if store.is_empty() {
        println!("[!] 지식베이스가 이미 비어 있습니다.");
        return Ok(());
    }

    if !yes {
        print!(
            "[?] 문서 {} 건을 모두 삭제합니다. 계속하시겠습니까? (yes/no): ",
            store.len()
        );
        io::stdout().flush().context("stdout flush 실패")?;

        let mut answer = String::new();
        io::stdin()
            .lock()
            .read_line(&mut answer)
            .context("입력 읽기 실패")?;

        if !is_confirmed(&answer) {
            println!("[!] 취소했습니다.");
            return Ok(());
        }
    }

    let count = store.len();
    store.clear().context("지식베이스 삭제 실패")?;
    println!("[OK] 문서 {} 건 삭제됨", count);

    Ok(())
}

/// 검색 명령어 (query)
fn cmd_query(config: &Config, query: &str, raw_context: bool) -> Result<()> {
    let store = KnowledgeStore::open(&config.data_dir).context("KnowledgeStore 열기 실패")?;

    println!("[*] 검색 중: \"{}\"", query);

    if raw_context {
        match store.search(query) {
            Some(context) => println!("\n{}", context),
            None => println!("\n[!] 검색 결과가 없습니다."),
        }
        return Ok(());
    }

    let hits = store.rank(query);
    if hits.is_empty() {
        println!("\n[!] 검색 결과가 없습니다.");
        return Ok(());
    }

    println!("\n[OK] 검색 결과 ({} 건):\n", hits.len());

    for (i, hit) in hits.iter().enumerate() {
        println!(
            "{}. [{}] [점수: {}] {}",
            i + 1,
            hit.record.kind,
            hit.score,
            hit.identifier
        );
        println!("   내용: {}", truncate_text(&hit.record.content, 200));
        println!();
    }

    Ok(())
}

/// 봇 실행 명령어 (run)
///
/// 지식베이스를 먼저 불러온 뒤 텔레그램 long polling을 시작합니다.
async fn cmd_run(config: Config) -> Result<()> {
    let Some(token) = config.telegram_token.clone() else {
        bail!(
            "텔레그램 봇 토큰이 설정되지 않았습니다.\n\n\
             설정 방법:\n  \
             export TELEGRAM_BOT_TOKEN=your-bot-token"
        );
    };

    let Some(api_key) = config.llm.api_key.clone() else {
        bail!(
            "LLM API 키가 설정되지 않았습니다.\n\n\
             설정 방법:\n  \
             export OPENROUTER_API_KEY=your-api-key\n  \
             또는\n  \
             export LLM_API_KEY=your-api-key"
        );
    };

    let provider = OpenAiCompatibleClient::new(api_key, &config.llm.base_url)
        .context("LLM 클라이언트 생성 실패")?;
    let extractor =
        Extractor::with_gemini(config.ocr_api_key.clone()).context("Extractor 생성 실패")?;
    let transport = TelegramTransport::new(token).context("Telegram 클라이언트 생성 실패")?;

    let knowledge = Arc::new(SharedKnowledge::new(config.data_dir.clone(), extractor));

    println!("[*] 지식베이스 불러오는 중: {}", config.data_dir.display());
    let document_count = knowledge
        .store()
        .await
        .context("지식베이스 초기화 실패")?
        .read()
        .await
        .len();
    println!("[OK] 문서 {} 건 준비됨", document_count);

    let assistant = Arc::new(Assistant::new(
        knowledge,
        Arc::new(provider),
        config.llm.params.clone(),
        config.llm.timeout,
    ));

    println!("[*] 봇 실행 중 (모델: {}). 종료: Ctrl+C", config.llm.params.model);
    bot::run(transport, assistant).await?;
    println!("[OK] 봇 종료");

    Ok(())
}

/// 상태 명령어 (status)
fn cmd_status(config: &Config) -> Result<()> {
    println!("docchat v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("[*] 데이터 디렉토리: {}", config.data_dir.display());

    print_key_status("텔레그램 토큰", config.telegram_token.is_some(), "TELEGRAM_BOT_TOKEN");
    print_key_status("LLM API 키", config.llm.api_key.is_some(), "OPENROUTER_API_KEY");
    print_key_status("OCR API 키", config.ocr_api_key.is_some(), "GEMINI_API_KEY");
    println!("[*] 모델: {} ({})", config.llm.params.model, config.llm.base_url);

    match KnowledgeStore::open(&config.data_dir) {
        Ok(store) => {
            let stats = store.stats();
            println!("[OK] 저장된 문서: {} 건", stats.document_count);
            println!(
                "     PDF {} | 이미지 {} | 텍스트 {}",
                stats.pdf_count, stats.image_count, stats.text_count
            );
            println!("     총 콘텐츠: {}", format_bytes(stats.total_content_bytes));
        }
        Err(e) => {
            println!("[!] KnowledgeStore 열기 실패: {:#}", e);
        }
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

fn print_key_status(label: &str, present: bool, env_var: &str) {
    if present {
        println!("[OK] {}: 설정됨", label);
    } else {
        println!("[!] {}: 미설정 (export {}=...)", label, env_var);
    }
}

/// 확인 프롬프트 응답 판정
fn is_confirmed(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "yes" | "y")
}

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

/// 바이트 크기 포맷팅
fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

// ============================================================================
// Tests
// ============================================================================
