//! Transport port - pub/sub の送信プリミティブ
//!
//! publisher の façade も verifier の再配送も、最終的にはここを通る。

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domain::errors::RelayError;
use crate::domain::message::Message;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Hand `message` to every current subscriber of `message.channel()`.
    ///
    /// Returns how many subscribers received it. Zero subscribers is not an
    /// error: the message is dropped, as pub/sub semantics dictate.
    async fn send(&self, message: Message) -> Result<usize, RelayError>;
}

/// Receiving end of one topic subscription.
///
/// Transports feed an unbounded channel so listeners stay independent of the
/// concrete bus client.
#[derive(Debug)]
pub struct Subscription {
    topic: String,
    rx: mpsc::UnboundedReceiver<Message>,
}

impl Subscription {
    pub fn new(topic: impl Into<String>, rx: mpsc::UnboundedReceiver<Message>) -> Self {
        Self {
            topic: topic.into(),
            rx,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Next message, or `None` once the transport side has gone away.
    pub async fn recv(&mut self) -> Option<Message> {
        self.rx.recv().await
    }

    /// Non-blocking variant, mostly for tests.
    pub fn try_recv(&mut self) -> Option<Message> {
        self.rx.try_recv().ok()
    }
}
