//! LedgerKeys - ledger 上のキー命名規約
//!
//! listener（書き込み側）と verifier（読み込み側）は同じ `LedgerKeys` を
//! 共有しなければならない。キーがずれると verifier は全メッセージを
//! abandoned と判定してしまう。
//!
//! # 派生キーの形式
//! `"<prefix>:<ns>:<len(channel)>:<channel>:<compact-json(content)>"`
//!
//! - ns は `block` / `state` / `task` で名前空間を分ける
//! - channel の長さを前置するので、channel に `:` が含まれていても
//!   異なる `(channel, content)` が同じキーになることはない
//! - content は JSON のコンパクト表現（文字列 `"1"` と数値 `1` を区別する）

use serde_json::Value;

const BLOCK_NS: &str = "block";
const STATE_NS: &str = "state";
const TASK_NS: &str = "task";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerKeys {
    prefix: String,
    running_tasks: String,
}

impl LedgerKeys {
    pub fn new(prefix: impl Into<String>, running_tasks: impl Into<String>) -> Self {
        let prefix = prefix.into();
        let running_tasks = format!("{}:{}", prefix, running_tasks.into());
        Self {
            prefix,
            running_tasks,
        }
    }

    /// Hash-map holding every running-task record.
    pub fn running_tasks_key(&self) -> &str {
        &self.running_tasks
    }

    /// Presence-only lock held while a listener works on the message.
    pub fn block_code(&self, channel: &str, content: &Value) -> String {
        self.derive(BLOCK_NS, channel, content)
    }

    /// Written once the message has been processed successfully.
    pub fn encoded_state(&self, channel: &str, content: &Value) -> String {
        self.derive(STATE_NS, channel, content)
    }

    /// Field name of the message inside the running-tasks hash.
    pub fn task_key(&self, channel: &str, content: &Value) -> String {
        self.derive(TASK_NS, channel, content)
    }

    fn derive(&self, ns: &str, channel: &str, content: &Value) -> String {
        format!(
            "{}:{}:{}:{}:{}",
            self.prefix,
            ns,
            channel.len(),
            channel,
            content
        )
    }
}

impl Default for LedgerKeys {
    fn default() -> Self {
        Self::new("relay", "running-tasks")
    }
}
