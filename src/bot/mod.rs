//! 채팅 봇 모듈
//!
//! - `state`: 대화별 상태 머신
//! - `assistant`: 메시지 처리 오케스트레이터
//! - `telegram`: Telegram Bot API 전송 계층
//!
//! 업데이트마다 별도 태스크에서 처리하며, Ctrl+C로 종료합니다.

pub mod assistant;
pub mod state;
pub mod telegram;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

pub use assistant::{Assistant, Command, Inbound, Outbox};
pub use state::{ConversationState, Conversations};
pub use telegram::{IncomingEvent, TelegramTransport};

/// 폴링 에러 후 재시도 대기
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

/// 봇 실행 (Ctrl+C까지)
pub async fn run(transport: TelegramTransport, assistant: Arc<Assistant>) -> Result<()> {
    let me = transport
        .get_me()
        .await
        .context("Failed to verify Telegram bot token")?;
    tracing::info!(
        "Telegram bot: @{} ({})",
        me.username.as_deref().unwrap_or("unknown"),
        me.first_name
    );

    let transport = Arc::new(transport);

    tokio::select! {
        _ = poll_loop(transport, assistant) => {}
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for shutdown signal")?;
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}

async fn poll_loop(transport: Arc<TelegramTransport>, assistant: Arc<Assistant>) {
    let mut offset = 0i64;
    tracing::info!("Telegram polling loop started");

    loop {
        let updates = match transport.get_updates(offset).await {
            Ok(updates) => updates,
            Err(e) => {
                tracing::error!("Telegram polling error: {:#}", e);
                tokio::time::sleep(POLL_RETRY_DELAY).await;
                continue;
            }
        };

        for update in updates {
            offset = offset.max(update.update_id + 1);

            let Some(event) = update.to_event() else {
                continue;
            };

            let transport = transport.clone();
            let assistant = assistant.clone();
            tokio::spawn(async move {
                dispatch(&transport, &assistant, event).await;
            });
        }
    }
}

/// 이벤트의 첨부 파일을 내려받아 어시스턴트에 전달
async fn dispatch(transport: &TelegramTransport, assistant: &Assistant, event: IncomingEvent) {
    let chat_id = event.chat_id();

    let inbound = match event {
        IncomingEvent::Text { text, .. } => Inbound::from_text(&text),
        IncomingEvent::Document {
            file_id, file_name, ..
        } => match transport.download(&file_id).await {
            Ok(bytes) => Inbound::Document { file_name, bytes },
            Err(e) => {
                tracing::error!("Failed to download {}: {:#}", file_name, e);
                notify(transport, chat_id, assistant::DOCUMENT_FAILED_REPLY).await;
                return;
            }
        },
        IncomingEvent::Photo { file_id, .. } => match transport.download(&file_id).await {
            Ok(bytes) => Inbound::Photo { bytes },
            Err(e) => {
                tracing::error!("Failed to download photo: {:#}", e);
                notify(transport, chat_id, assistant::IMAGE_FAILED_REPLY).await;
                return;
            }
        },
    };

    assistant.handle(transport, chat_id, inbound).await;
}

async fn notify(transport: &TelegramTransport, chat_id: i64, text: &str) {
    if let Err(e) = transport.send_message(chat_id, text).await {
        tracing::error!("Failed to send reply to chat {}: {:#}", chat_id, e);
    }
}
