//! Publisher - チャンネルへのイベント送信
//!
//! # フロー
//! 1. operation から wire topic `"<topic>/<operation>"` を組み立てる
//! 2. payload を JSON にシリアライズ
//! 3. Transport::send() に渡して終わり（下流の成否は待たない）
//!
//! `ProjectPublisher` / `IndexRoutingPublisher` は operation 名と payload 型を
//! 固定するだけの薄い façade。

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::domain::errors::RelayError;
use crate::domain::ids::{IndexRouteId, ProjectId};
use crate::domain::message::{Channel, Message};
use crate::ports::Transport;

#[derive(Clone)]
pub struct MessagePublisher {
    channel: Channel,
    transport: Arc<dyn Transport>,
}

impl MessagePublisher {
    pub fn new(channel: Channel, transport: Arc<dyn Transport>) -> Self {
        Self { channel, transport }
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    /// Fire-and-forget publish of `payload` under `operation`.
    ///
    /// Having no subscribers is not an error. Only serialization and
    /// transport hand-off failures are reported.
    pub async fn publish<T: Serialize + ?Sized>(
        &self,
        operation: &str,
        payload: &T,
    ) -> Result<(), RelayError> {
        let content = serde_json::to_value(payload)?;
        let message = Message::new(self.channel.wire_topic(operation), content);
        let channel = message.channel().to_string();
        let delivered = self.transport.send(message).await?;
        debug!(channel = %channel, delivered, "published");
        Ok(())
    }
}

/// Project lifecycle events.
#[derive(Clone)]
pub struct ProjectPublisher {
    publisher: MessagePublisher,
}

impl ProjectPublisher {
    pub const DEFAULT_TOPIC: &'static str = "project-topic";
    pub const DELETE: &'static str = "delete";
    pub const CLOSE_AND_DELETE: &'static str = "close-and-delete";

    pub fn new(channel: Channel, transport: Arc<dyn Transport>) -> Self {
        Self {
            publisher: MessagePublisher::new(channel, transport),
        }
    }

    pub fn channel(&self) -> &Channel {
        self.publisher.channel()
    }

    pub async fn delete(&self, project_id: ProjectId) -> Result<(), RelayError> {
        self.publisher.publish(Self::DELETE, &project_id).await
    }

    pub async fn close_and_delete(&self, project_id: ProjectId) -> Result<(), RelayError> {
        self.publisher
            .publish(Self::CLOSE_AND_DELETE, &project_id)
            .await
    }
}

/// Index-route lifecycle events.
#[derive(Clone)]
pub struct IndexRoutingPublisher {
    publisher: MessagePublisher,
}

impl IndexRoutingPublisher {
    pub const DEFAULT_TOPIC: &'static str = "index-routing-topic";
    pub const OPEN: &'static str = "open";
    pub const CLOSE: &'static str = "close";
    pub const DELETE: &'static str = "delete";

    pub fn new(channel: Channel, transport: Arc<dyn Transport>) -> Self {
        Self {
            publisher: MessagePublisher::new(channel, transport),
        }
    }

    pub fn channel(&self) -> &Channel {
        self.publisher.channel()
    }

    pub async fn open(&self, route_id: IndexRouteId) -> Result<(), RelayError> {
        self.publisher.publish(Self::OPEN, &route_id).await
    }

    pub async fn close(&self, route_id: IndexRouteId) -> Result<(), RelayError> {
        self.publisher.publish(Self::CLOSE, &route_id).await
    }

    pub async fn delete(&self, route_id: IndexRouteId) -> Result<(), RelayError> {
        self.publisher.publish(Self::DELETE, &route_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::InMemoryTransport;
    use serde_json::json;

    fn project_publisher() -> (ProjectPublisher, Arc<InMemoryTransport>) {
        let transport = Arc::new(InMemoryTransport::new());
        let publisher = ProjectPublisher::new(
            Channel::new(ProjectPublisher::DEFAULT_TOPIC),
            transport.clone(),
        );
        (publisher, transport)
    }

    #[tokio::test]
    async fn publish_builds_wire_topic_from_operation() {
        let transport = Arc::new(InMemoryTransport::new());
        let mut sub = transport.subscribe("project-topic/delete");
        let publisher = MessagePublisher::new(Channel::new("project-topic"), transport.clone());

        publisher.publish("delete", "p-42").await.unwrap();

        let received = sub.try_recv().unwrap();
        assert_eq!(received.channel(), "project-topic/delete");
        assert_eq!(received.content(), &json!("p-42"));
    }

    #[tokio::test]
    async fn publish_without_subscribers_succeeds() {
        let (publisher, transport) = project_publisher();
        let id = ProjectId::new();

        publisher.delete(id).await.unwrap();

        let sent = transport.sent_to("project-topic/delete");
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].content(), &json!(id.as_ulid().to_string()));
    }

    #[tokio::test]
    async fn close_and_delete_uses_its_own_operation() {
        let (publisher, transport) = project_publisher();

        publisher.close_and_delete(ProjectId::new()).await.unwrap();

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].operation(), Some("close-and-delete"));
    }

    #[tokio::test]
    async fn index_routing_operations() {
        let transport = Arc::new(InMemoryTransport::new());
        let publisher = IndexRoutingPublisher::new(
            Channel::new(IndexRoutingPublisher::DEFAULT_TOPIC),
            transport.clone(),
        );
        let route = IndexRouteId::new();

        publisher.open(route).await.unwrap();
        publisher.close(route).await.unwrap();
        publisher.delete(route).await.unwrap();

        let topics: Vec<String> = transport
            .sent()
            .iter()
            .map(|m| m.channel().to_string())
            .collect();
        assert_eq!(
            topics,
            vec![
                "index-routing-topic/open",
                "index-routing-topic/close",
                "index-routing-topic/delete",
            ]
        );
    }

    #[tokio::test]
    async fn transport_failure_surfaces_to_caller() {
        let (publisher, transport) = project_publisher();
        transport.fail_sends(true);

        let err = publisher.delete(ProjectId::new()).await.unwrap_err();
        assert!(matches!(err, RelayError::Transport(_)));
    }
}
