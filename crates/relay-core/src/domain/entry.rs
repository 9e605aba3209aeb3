//! Running-task record and its tolerant decoding.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::message::Message;

/// Value stored in the running-tasks hash while a message is believed to be
/// in flight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunningTaskRecord {
    pub channel: String,
    pub content: Value,

    /// Delivery attempts started so far. Older writers omit it.
    #[serde(default)]
    pub attempts: u32,
}

impl RunningTaskRecord {
    pub fn new(channel: impl Into<String>, content: Value) -> Self {
        Self {
            channel: channel.into(),
            content,
            attempts: 0,
        }
    }

    pub fn from_message(message: &Message) -> Self {
        Self::new(message.channel(), message.content().clone())
    }

    pub fn to_message(&self) -> Message {
        Message::new(self.channel.clone(), self.content.clone())
    }
}

/// Loose shape used for decoding; every field is checked explicitly so a
/// missing field turns into `Malformed` instead of a panic.
#[derive(Deserialize)]
struct RawRecord {
    channel: Option<String>,
    content: Option<Value>,
    #[serde(default)]
    attempts: Option<u32>,
}

/// Result of decoding one raw hash entry.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedEntry {
    Parsed(RunningTaskRecord),
    Malformed { key: String, error: String },
}

impl ParsedEntry {
    pub fn parse(key: &str, raw: &str) -> Self {
        let malformed = |error: String| ParsedEntry::Malformed {
            key: key.to_string(),
            error,
        };

        let record: RawRecord = match serde_json::from_str(raw) {
            Ok(record) => record,
            Err(e) => return malformed(e.to_string()),
        };
        let Some(channel) = record.channel else {
            return malformed("missing field `channel`".to_string());
        };
        let Some(content) = record.content else {
            return malformed("missing field `content`".to_string());
        };

        ParsedEntry::Parsed(RunningTaskRecord {
            channel,
            content,
            attempts: record.attempts.unwrap_or(0),
        })
    }
}
