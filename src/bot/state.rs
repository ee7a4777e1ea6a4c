//! 대화별 상태 머신
//!
//! 채팅 ID마다 하나의 상태를 유지합니다.
//!
//! ```text
//! Idle ──업로드──▶ Generating ──성공──▶ AwaitingQuestion ──질문──▶ Generating ──▶ Idle
//!  │
//!  └──/teach──▶ AwaitingAdminInfo ──텍스트──▶ Generating ──▶ Idle
//! ```

use std::collections::HashMap;

use tokio::sync::Mutex;

/// 대화 상태
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConversationState {
    /// 대기 중 (새 질문은 지식베이스 검색)
    #[default]
    Idle,
    /// 답변 생성 중 (다른 메시지는 대기 안내)
    Generating,
    /// 업로드된 문서를 고정하고 질문을 기다리는 중
    AwaitingQuestion { pinned_context: String },
    /// 지식베이스에 추가할 메모를 기다리는 중
    AwaitingAdminInfo,
}

/// 전체 대화 상태 저장소
#[derive(Debug, Default)]
pub struct Conversations {
    states: Mutex<HashMap<i64, ConversationState>>,
}

impl Conversations {
    pub fn new() -> Self {
        Self::default()
    }

    /// 현재 상태 (없으면 Idle)
    pub async fn get(&self, chat_id: i64) -> ConversationState {
        self.states
            .lock()
            .await
            .get(&chat_id)
            .cloned()
            .unwrap_or_default()
    }

    /// 생성 중이 아닐 때만 상태 설정
    ///
    /// 확인과 설정을 한 번의 잠금 안에서 처리하며, 생성 중이면 아무것도 바꾸지 않고 `false`를 반환합니다.
    pub async fn set_unless_generating(&self, chat_id: i64, state: ConversationState) -> bool {
        let mut states = self.states.lock().await;
        if states.get(&chat_id) == Some(&ConversationState::Generating) {
            return false;
        }
        store_state(&mut states, chat_id, state);
        true
    }

    /// 생성 시작
    ///
    /// 이미 생성 중이면 `None`, 아니면 상태를 `Generating`으로 바꾸고 이전 상태를 반환합니다.
    pub async fn begin(&self, chat_id: i64) -> Option<ConversationState> {
        let mut states = self.states.lock().await;
        let previous = states.insert(chat_id, ConversationState::Generating);

        match previous {
            Some(ConversationState::Generating) => None,
            Some(state) => Some(state),
            None => Some(ConversationState::Idle),
        }
    }

    /// 생성 종료
    ///
    /// 상태가 아직 `Generating`일 때만 다음 상태로 바꿉니다.
    pub async fn finish(&self, chat_id: i64, next: ConversationState) {
        let mut states = self.states.lock().await;
        if states.get(&chat_id) != Some(&ConversationState::Generating) {
            tracing::debug!("Chat {} left generating state early", chat_id);
            return;
        }
        store_state(&mut states, chat_id, next);
    }
}

/// 상태 기록 (Idle이면 항목 제거)
fn store_state(states: &mut HashMap<i64, ConversationState>, chat_id: i64, state: ConversationState) {
    if state == ConversationState::Idle {
        states.remove(&chat_id);
    } else {
        states.insert(chat_id, state);
    }
}

// ============================================================================
// Tests
// ============================================================================
