// ABOUTME: Built-in plugins and middleware shipped with the reference daemon
// ABOUTME: Ping round-trips a payload through each named client

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::info;
use wrangle_core::middleware::{compose, ChainContext, Middleware};
use wrangle_core::plugin::{Plugin, PluginMetadata, StaticPluginLoader};
use wrangle_core::reply::Reply;
use wrangle_core::Payload;

/// `/ping node1 [node2 ...]` sends a ping payload to each named client and
/// reports what comes back.
pub struct PingPlugin;

#[async_trait]
impl Plugin for PingPlugin {
    async fn execute(&self, args: &[String]) -> Result<Vec<Payload>> {
        if args.is_empty() {
            bail!("ping needs at least one client key");
        }
        Ok(args
            .iter()
            .map(|node| {
                Payload::new()
                    .for_client(node.clone())
                    .with_data(json!({"probe": "ping"}))
                    .successful()
            })
            .collect())
    }

    async fn response(&self, payload: Payload) -> Result<Reply> {
        let text = if payload.success {
            format!("pong from {}", payload.service_node_key)
        } else {
            format!("{} failed to pong: {}", payload.service_node_key, payload.error)
        };
        // chat id is filled in by the dispatch engine after correlation
        Ok(Reply::plain("", text))
    }

    fn metadata(&self) -> PluginMetadata {
        PluginMetadata::server_client().with_middleware(vec!["audit".to_string()])
    }
}

/// Logs every command that reaches a plugin with an audit chain.
pub struct AuditMiddleware;

#[async_trait]
impl Middleware for AuditMiddleware {
    async fn execute(&self, ctx: &ChainContext) -> wrangle_core::Result<()> {
        info!(
            command = %ctx.command.name,
            chat = %ctx.command.chat_id,
            args = ctx.command.args.len(),
            "command audit"
        );
        Ok(())
    }

    async fn chain(
        &self,
        _ctx: &ChainContext,
        next: Arc<dyn Middleware>,
    ) -> wrangle_core::Result<Arc<dyn Middleware>> {
        Ok(compose(Arc::new(AuditMiddleware), next))
    }
}

/// The loader for everything compiled into this binary.
pub fn builtin_loader() -> StaticPluginLoader {
    StaticPluginLoader::new().register("ping", || Arc::new(PingPlugin))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ping_produces_one_payload_per_node() {
        let payloads = PingPlugin
            .execute(&["node1".to_string(), "node2".to_string()])
            .await
            .unwrap();
        assert_eq!(payloads.len(), 2);
        assert_eq!(payloads[0].service_node_key, "node1");
        assert!(payloads[1].success);
    }

    #[tokio::test]
    async fn test_ping_requires_arguments() {
        assert!(PingPlugin.execute(&[]).await.is_err());
    }

    #[tokio::test]
    async fn test_ping_response_text() {
        let payload = Payload::new().for_client("node1").successful();
        let reply = PingPlugin.response(payload).await.unwrap();
        assert_eq!(reply.content, serde_json::json!("pong from node1"));
    }
}
