//! Channel / Message - pub/sub の宛先とメッセージ本体
//!
//! wire topic は `"<channel.topic>/<operation>"` のフラットな文字列。
//! ヘッダや content-type の交渉は持たない。

use std::fmt;

use serde::{Deserialize, Serialize};

/// A named broadcast topic.
///
/// Several logical sub-streams share one channel and differ only by the
/// operation suffix appended at publish time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Channel {
    topic: String,
}

impl Channel {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// `"<topic>/<operation>"`
    pub fn wire_topic(&self, operation: &str) -> String {
        format!("{}/{}", self.topic, operation)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.topic.fmt(f)
    }
}

/// The envelope handed to the transport.
///
/// `channel` is the full wire topic the message travels on, so a stored
/// `(channel, content)` pair is enough to send it again verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    channel: String,
    content: serde_json::Value,
}

impl Message {
    pub fn new(channel: impl Into<String>, content: serde_json::Value) -> Self {
        Self {
            channel: channel.into(),
            content,
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn content(&self) -> &serde_json::Value {
        &self.content
    }

    /// Operation suffix of the wire topic, if the channel carries one.
    ///
    /// Everything after the first `/` counts, so a dead-lettered
    /// `project-topic/delete/dead-letter` reports `delete/dead-letter`.
    pub fn operation(&self) -> Option<&str> {
        self.channel.split_once('/').map(|(_, op)| op)
    }
}
