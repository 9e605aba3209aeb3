//! State - メッセージ単位の三状態リコンシリエーション
//!
//! # 状態遷移
//! - Unknown: running-task record なし（verifier は何もしない）
//! - Running: record あり + Block-Code Lock あり
//! - Completed: record あり + Encoded-State Marker あり（lock の有無は問わない）
//! - Abandoned: record あり + lock なし + marker なし → 再配送対象
//!
//! verifier 自身は状態を遷移させない。Running / Completed への遷移は
//! 再配送されたメッセージを拾った listener が行う。

/// Reconciled state of one `(channel, content)` message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageState {
    Unknown,
    Running,
    Completed,
    Abandoned,
}

impl MessageState {
    pub fn classify(record_present: bool, block_exists: bool, state_exists: bool) -> Self {
        match (record_present, block_exists, state_exists) {
            (false, _, _) => MessageState::Unknown,
            (true, _, true) => MessageState::Completed,
            (true, true, false) => MessageState::Running,
            (true, false, false) => MessageState::Abandoned,
        }
    }

    /// Should the verifier send this message again?
    pub fn needs_republish(self) -> bool {
        matches!(self, MessageState::Abandoned)
    }
}
