// ABOUTME: Transport trait over topic-based publish/subscribe
// ABOUTME: InProcessTransport routes messages between components in one process

use crate::topic::matches_filter;
use anyhow::Result;
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// A message delivered to a subscriber.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Callback invoked for each message matching a subscription filter.
pub type MessageHandler = Arc<dyn Fn(InboundMessage) -> BoxFuture<'static, ()> + Send + Sync>;

/// Wrap an async closure as a [`MessageHandler`].
pub fn handler<F, Fut>(f: F) -> MessageHandler
where
    F: Fn(InboundMessage) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |msg| Box::pin(f(msg)))
}

/// The messaging seam. Real deployments back this with a broker; tests and
/// the reference daemon use [`InProcessTransport`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()>;

    /// Register `handler` for every message whose topic matches `filter`
    /// (`+` matches one segment, `#` the rest).
    async fn subscribe(&self, filter: &str, handler: MessageHandler) -> Result<()>;
}

/// Serialize `value` as JSON and publish it.
pub async fn publish_json<T: Serialize + Sync>(
    transport: &dyn Transport,
    topic: &str,
    value: &T,
) -> Result<()> {
    let bytes = serde_json::to_vec(value)?;
    transport.publish(topic, bytes).await
}

/// Loopback transport: publishing fans out to every matching subscriber on
/// a spawned task, so handlers never block the publisher.
#[derive(Default)]
pub struct InProcessTransport {
    subscriptions: RwLock<Vec<(String, MessageHandler)>>,
}

impl InProcessTransport {
    pub fn new() -> Self {
        Self {
            subscriptions: RwLock::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Transport for InProcessTransport {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        let subscriptions = self.subscriptions.read().await;
        let mut delivered = 0;
        for (filter, handler) in subscriptions.iter() {
            if matches_filter(filter, topic) {
                let msg = InboundMessage {
                    topic: topic.to_string(),
                    payload: payload.clone(),
                };
                let handler = Arc::clone(handler);
                tokio::spawn(async move { handler(msg).await });
                delivered += 1;
            }
        }
        debug!(topic, delivered, "published message");
        Ok(())
    }

    async fn subscribe(&self, filter: &str, handler: MessageHandler) -> Result<()> {
        self.subscriptions
            .write()
            .await
            .push((filter.to_string(), handler));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_publish_reaches_matching_subscriber() {
        let transport = InProcessTransport::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        transport
            .subscribe(
                "chat/+/notify",
                handler(move |msg| {
                    let tx = tx.clone();
                    async move {
                        let _ = tx.send(msg);
                    }
                }),
            )
            .await
            .unwrap();

        transport
            .publish("chat/42/notify", b"hello".to_vec())
            .await
            .unwrap();

        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.topic, "chat/42/notify");
        assert_eq!(msg.payload, b"hello");
    }

    #[tokio::test]
    async fn test_non_matching_topic_is_not_delivered() {
        let transport = InProcessTransport::new();
        let (tx, mut rx) = mpsc::unbounded_channel::<InboundMessage>();

        transport
            .subscribe(
                "client/+/heartbeat",
                handler(move |msg| {
                    let tx = tx.clone();
                    async move {
                        let _ = tx.send(msg);
                    }
                }),
            )
            .await
            .unwrap();

        transport
            .publish("chat/42/notify", b"x".to_vec())
            .await
            .unwrap();

        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_publish_fans_out_to_all_matching_subscribers() {
        let transport = InProcessTransport::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        for tag in ["a", "b"] {
            let tx = tx.clone();
            transport
                .subscribe(
                    "cmd/#",
                    handler(move |_msg| {
                        let tx = tx.clone();
                        let tag = tag.to_string();
                        async move {
                            let _ = tx.send(tag);
                        }
                    }),
                )
                .await
                .unwrap();
        }
        drop(tx);

        transport
            .publish("cmd/ping/execute", b"x".to_vec())
            .await
            .unwrap();

        let mut tags = vec![rx.recv().await.unwrap(), rx.recv().await.unwrap()];
        tags.sort();
        assert_eq!(tags, vec!["a", "b"]);
    }
}
