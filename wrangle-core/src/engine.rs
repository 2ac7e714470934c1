// ABOUTME: Dispatch engine running the execute and response pipelines
// ABOUTME: Correlates client responses back to chats via a TTL cache

use crate::cache::TtlCache;
use crate::command::Command;
use crate::error::{Error, Result};
use crate::middleware::{ChainContext, MiddlewareRegistry};
use crate::notify::ChatNotifier;
use crate::payload::Payload;
use crate::plugin::PluginType;
use crate::registry::PluginRegistry;
use crate::reply::TranslationRequest;
use crate::repository::{LogRepository, LogUpdate};
use crate::topic::{self, templates};
use crate::transport::{handler, publish_json, InboundMessage, Transport};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Tuning knobs for the dispatch engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Ceiling for one middleware chain, plugin execute or response call.
    pub execution_timeout: Duration,
    /// How long a dispatched payload may wait for its client response.
    pub correlation_ttl: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            execution_timeout: Duration::from_secs(30),
            correlation_ttl: crate::cache::DEFAULT_TTL,
        }
    }
}

/// Runs commands through their plugin and routes client responses back to
/// the chats that issued them.
pub struct DispatchEngine {
    plugins: Arc<PluginRegistry>,
    middleware: Arc<MiddlewareRegistry>,
    correlator: TtlCache<String>,
    logs: Arc<dyn LogRepository>,
    transport: Arc<dyn Transport>,
    notifier: Arc<ChatNotifier>,
    config: EngineConfig,
}

impl DispatchEngine {
    pub fn new(
        plugins: Arc<PluginRegistry>,
        middleware: Arc<MiddlewareRegistry>,
        logs: Arc<dyn LogRepository>,
        transport: Arc<dyn Transport>,
        notifier: Arc<ChatNotifier>,
        config: EngineConfig,
    ) -> Self {
        let correlator = TtlCache::new(config.correlation_ttl);
        Self {
            plugins,
            middleware,
            correlator,
            logs,
            transport,
            notifier,
            config,
        }
    }

    /// Subscribe the engine's pipelines on the transport.
    pub async fn attach(self: Arc<Self>) -> anyhow::Result<()> {
        let engine = Arc::clone(&self);
        self.transport
            .subscribe(
                templates::CMD_EXECUTE,
                handler(move |msg: InboundMessage| {
                    let engine = Arc::clone(&engine);
                    async move {
                        if let Err(err) = engine.handle_execution(&msg.topic, &msg.payload).await {
                            error!(topic = %msg.topic, error = %err, "execution pipeline failed");
                        }
                    }
                }),
            )
            .await?;

        let engine = Arc::clone(&self);
        self.transport
            .subscribe(
                templates::CMD_EXECUTE_RESPONSE,
                handler(move |msg: InboundMessage| {
                    let engine = Arc::clone(&engine);
                    async move {
                        if let Err(err) = engine.handle_response(&msg.topic, &msg.payload).await {
                            error!(topic = %msg.topic, error = %err, "response pipeline failed");
                        }
                    }
                }),
            )
            .await?;
        Ok(())
    }

    /// The execute pipeline: decode the command, run middleware, run the
    /// plugin, log the outcome and dispatch payloads to clients.
    ///
    /// A middleware failure is recorded but does not stop execution; a
    /// plugin failure stops before dispatch and tells the chat.
    pub async fn handle_execution(&self, topic: &str, raw: &[u8]) -> Result<()> {
        let ids = topic::extract_ids(topic, templates::CMD_EXECUTE)?;
        let plugin_name = &ids[0];
        let command: Command = serde_json::from_slice(raw)?;

        if let Err(err) = self
            .logs
            .add_command_log(&command.message_id, &command.name)
            .await
        {
            warn!(message_id = %command.message_id, error = %err, "failed to open command log");
        }

        let plugin = match self.plugins.get(plugin_name) {
            Ok(plugin) => plugin,
            Err(err) => {
                // Record and stop; whether the chat hears about it is the
                // gate layer's call.
                self.record(
                    &command.message_id,
                    LogUpdate::new().error(err.to_string()),
                )
                .await;
                return Err(err);
            }
        };

        let metadata = plugin.metadata();
        let mut update = LogUpdate::new();

        // Middleware failures are soft: logged, never fatal to the command.
        let ctx = ChainContext::new(command.clone());
        match timeout(
            self.config.execution_timeout,
            self.middleware.run_chain(&ctx, &metadata.middleware),
        )
        .await
        {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                warn!(command = %command.name, error = %err, "middleware chain failed");
                update = update.error(format!("middleware: {err}"));
            }
            Err(_) => {
                warn!(command = %command.name, "middleware chain timed out");
                update = update.error("middleware: timed out");
            }
        }

        let executed = match timeout(
            self.config.execution_timeout,
            plugin.execute(&command.args),
        )
        .await
        {
            Ok(Ok(payloads)) => Ok(payloads),
            Ok(Err(err)) => Err(Error::PluginExecutionFailed(err)),
            Err(_) => Err(Error::ExecutionTimeout(self.config.execution_timeout)),
        };

        match executed {
            Ok(payloads) => {
                self.record(&command.message_id, update.payloads(payloads.clone()))
                    .await;
                match metadata.plugin_type {
                    PluginType::ServerClient => {
                        self.dispatch(&command, plugin_name, payloads).await?;
                    }
                    PluginType::ServerOnly => {
                        debug!(command = %command.name, "server-only command complete");
                    }
                }
                Ok(())
            }
            Err(err) => {
                self.record(&command.message_id, update.error(err.to_string()))
                    .await;
                self.tell_chat(
                    &command.chat_id,
                    TranslationRequest::new("PluginExecutionFailed")
                        .with("command", &*command.name)
                        .with("error", err.to_string()),
                )
                .await;
                Err(err)
            }
        }
    }

    /// Send each payload to its target client, remembering which chat to
    /// answer when the response comes back.
    async fn dispatch(
        &self,
        command: &Command,
        plugin_name: &str,
        payloads: Vec<Payload>,
    ) -> Result<()> {
        for mut payload in payloads {
            payload.id = Uuid::new_v4().to_string();
            payload.command = command.name.clone();
            self.correlator.put(&payload.id, command.chat_id.clone());

            let topic = topic::build_topic(
                templates::CLIENT_DISPATCH,
                &[&payload.service_node_key, plugin_name],
            )?;
            info!(
                topic = %topic,
                payload_id = %payload.id,
                "dispatching payload to client"
            );
            publish_json(self.transport.as_ref(), &topic, &payload)
                .await
                .map_err(Error::PluginExecutionFailed)?;
        }
        Ok(())
    }

    /// The response pipeline: decode the payload, let the plugin interpret
    /// it, log it and route the reply to the correlated chat.
    ///
    /// A lost correlation (expired or unknown id) drops the reply silently.
    pub async fn handle_response(&self, topic: &str, raw: &[u8]) -> Result<()> {
        let ids = topic::extract_ids(topic, templates::CMD_EXECUTE_RESPONSE)?;
        let plugin_name = &ids[0];
        let payload: Payload = serde_json::from_slice(raw)?;
        let payload_id = payload.id.clone();

        let plugin = self.plugins.get(plugin_name)?;

        let responded = match timeout(self.config.execution_timeout, plugin.response(payload))
            .await
        {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(err)) => Err(Error::PluginExecutionFailed(err)),
            Err(_) => Err(Error::ExecutionTimeout(self.config.execution_timeout)),
        };

        match responded {
            Ok(reply) => {
                if let Err(err) = self
                    .logs
                    .add_command_response(&payload_id, Vec::new(), Some(reply.clone()))
                    .await
                {
                    warn!(payload_id = %payload_id, error = %err, "failed to log response");
                }

                let Some(chat_id) = self.correlator.get(&payload_id) else {
                    debug!(payload_id = %payload_id, "correlation lost, dropping reply");
                    return Ok(());
                };
                self.correlator.delete(&payload_id);

                let mut reply = reply;
                reply.chat_id = chat_id;
                self.notifier
                    .send(reply)
                    .await
                    .map_err(Error::PluginExecutionFailed)
            }
            Err(err) => {
                if let Err(log_err) = self
                    .logs
                    .add_command_response(&payload_id, vec![err.to_string()], None)
                    .await
                {
                    warn!(payload_id = %payload_id, error = %log_err, "failed to log response");
                }
                Err(err)
            }
        }
    }

    /// The correlation map from payload id to chat id.
    pub fn correlator(&self) -> &TtlCache<String> {
        &self.correlator
    }

    async fn record(&self, message_id: &str, update: LogUpdate) {
        if let Err(err) = self.logs.update_command_log(message_id, update).await {
            warn!(message_id, error = %err, "failed to update command log");
        }
    }

    async fn tell_chat(&self, chat_id: &str, request: TranslationRequest) {
        if let Err(err) = self.notifier.send_translatable(chat_id, request).await {
            warn!(chat = chat_id, error = %err, "failed to notify chat");
        }
    }
}
