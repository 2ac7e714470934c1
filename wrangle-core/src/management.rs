// ABOUTME: Management handlers for auth, language, subscriptions and client lifecycle
// ABOUTME: Gates plugin execution requests on chat authorization

use crate::auth::{AuthOutcome, ChatAuthenticator};
use crate::command::Command;
use crate::error::{Error, Result};
use crate::notify::ChatNotifier;
use crate::payload::Payload;
use crate::reply::TranslationRequest;
use crate::repository::{ChatRepository, ClientRepository, ClientStatus};
use crate::subscription::{SubscriptionStore, WILDCARD};
use crate::topic::{self, templates};
use crate::transport::{handler, InboundMessage, Transport};
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Handles every topic that is not a plugin command: chat authorization,
/// language, subscriptions, client registration and heartbeats, plus the
/// authorization gate in front of plugin execution.
pub struct ManagementService {
    chats: Arc<dyn ChatRepository>,
    clients: Arc<dyn ClientRepository>,
    subscriptions: Arc<SubscriptionStore>,
    auth: ChatAuthenticator,
    transport: Arc<dyn Transport>,
    notifier: Arc<ChatNotifier>,
    client_secret: Option<String>,
}

impl ManagementService {
    pub fn new(
        chats: Arc<dyn ChatRepository>,
        clients: Arc<dyn ClientRepository>,
        subscriptions: Arc<SubscriptionStore>,
        auth: ChatAuthenticator,
        transport: Arc<dyn Transport>,
        notifier: Arc<ChatNotifier>,
        client_secret: Option<String>,
    ) -> Self {
        Self {
            chats,
            clients,
            subscriptions,
            auth,
            transport,
            notifier,
            client_secret,
        }
    }

    /// Subscribe every management handler on the transport.
    pub async fn attach(self: Arc<Self>) -> anyhow::Result<()> {
        macro_rules! route {
            ($filter:expr, $method:ident) => {{
                let service = Arc::clone(&self);
                self.transport
                    .subscribe(
                        $filter,
                        handler(move |msg: InboundMessage| {
                            let service = Arc::clone(&service);
                            async move {
                                if let Err(err) = service.$method(&msg.topic, &msg.payload).await {
                                    error!(topic = %msg.topic, error = %err, "management handler failed");
                                }
                            }
                        }),
                    )
                    .await?;
            }};
        }

        route!(templates::CHAT_AUTH, handle_chat_auth);
        route!(templates::CHAT_DEAUTH, handle_chat_deauth);
        route!(templates::CHAT_SET_LANG, handle_set_language);
        route!(templates::CHAT_SUBSCRIBE, handle_subscribe);
        route!(templates::CHAT_UNSUBSCRIBE, handle_unsubscribe);
        route!(templates::CLIENT_REGISTER, handle_client_register);
        route!(templates::CLIENT_HEARTBEAT, handle_heartbeat);
        route!(templates::PLUGIN_EXECUTE_REQUEST, handle_execute_gate);
        route!(templates::CLIENT_PLUGIN_REPLY, handle_client_plugin_reply);
        Ok(())
    }

    /// Run the auth token dance for a chat and report the outcome back.
    pub async fn handle_chat_auth(&self, topic: &str, raw: &[u8]) -> Result<()> {
        let ids = topic::extract_ids(topic, templates::CHAT_AUTH)?;
        let chat_id = &ids[0];
        let command: Command = serde_json::from_slice(raw)?;

        if let Err(err) = self.chats.add_chat_if_absent(chat_id).await {
            warn!(chat = %chat_id, error = %err, "failed to record chat");
        }

        let request = match self.auth.handle_auth(chat_id, command.first_arg()).await {
            Ok(AuthOutcome::AlreadyAuthorized) => {
                TranslationRequest::new("ChatAlreadyAuthorized")
            }
            Ok(AuthOutcome::TokenIssued(token)) => {
                TranslationRequest::new("GeneratedToken").with("token", token)
            }
            Ok(AuthOutcome::Authorized) => TranslationRequest::new("ChatAuthorized"),
            Ok(AuthOutcome::InvalidToken) => TranslationRequest::new("InvalidToken"),
            Err(err) => TranslationRequest::new("AuthorizationError").with("error", err.to_string()),
        };
        self.reply(chat_id, request).await;
        Ok(())
    }

    pub async fn handle_chat_deauth(&self, topic: &str, _raw: &[u8]) -> Result<()> {
        let ids = topic::extract_ids(topic, templates::CHAT_DEAUTH)?;
        let chat_id = &ids[0];

        let request = match self.auth.revoke(chat_id).await {
            Ok(()) => TranslationRequest::new("ChatDeauthorized"),
            Err(err) => TranslationRequest::new("AuthorizationError").with("error", err.to_string()),
        };
        self.reply(chat_id, request).await;
        Ok(())
    }

    pub async fn handle_set_language(&self, topic: &str, raw: &[u8]) -> Result<()> {
        let ids = topic::extract_ids(topic, templates::CHAT_SET_LANG)?;
        let chat_id = &ids[0];
        let command: Command = serde_json::from_slice(raw)?;

        let Some(language) = command.first_arg() else {
            self.reply(
                chat_id,
                TranslationRequest::new("InvalidArguments").with("command", &*command.name),
            )
            .await;
            return Ok(());
        };

        let request = match self.chats.set_language(chat_id, language).await {
            Ok(()) => TranslationRequest::new("LanguageChanged").with("language", language),
            Err(err) => {
                TranslationRequest::new("LanguageChangeFailed").with("error", err.to_string())
            }
        };
        self.reply(chat_id, request).await;
        Ok(())
    }

    /// Subscribe a chat to client responses.
    ///
    /// No arguments subscribes to everything. Otherwise the first argument
    /// is a comma-separated client list, the second an optional
    /// comma-separated command list defaulting to `"*"`.
    pub async fn handle_subscribe(&self, topic: &str, raw: &[u8]) -> Result<()> {
        let ids = topic::extract_ids(topic, templates::CHAT_SUBSCRIBE)?;
        let chat_id = &ids[0];
        let command: Command = serde_json::from_slice(raw)?;

        if !self.ensure_authorized(chat_id).await? {
            return Ok(());
        }

        if command.args.is_empty() {
            self.subscriptions.subscribe_to_all(chat_id);
            self.reply(
                chat_id,
                TranslationRequest::new("SubscriptionSuccess").plural(1),
            )
            .await;
            return Ok(());
        }

        let (clients, commands) = split_filter_args(&command.args);
        let request = match self
            .subscriptions
            .subscribe_to(chat_id, &clients, &commands)
            .await
        {
            Ok(added) => TranslationRequest::new("SubscriptionSuccess").plural(added as i64),
            Err(err) => TranslationRequest::new("SubscriptionFail").with("error", err.to_string()),
        };
        self.reply(chat_id, request).await;
        Ok(())
    }

    pub async fn handle_unsubscribe(&self, topic: &str, raw: &[u8]) -> Result<()> {
        let ids = topic::extract_ids(topic, templates::CHAT_UNSUBSCRIBE)?;
        let chat_id = &ids[0];
        let command: Command = serde_json::from_slice(raw)?;

        if !self.ensure_authorized(chat_id).await? {
            return Ok(());
        }

        let removed = if command.args.is_empty() {
            self.subscriptions.unsubscribe_from_all(chat_id);
            1
        } else {
            let (clients, commands) = split_filter_args(&command.args);
            self.subscriptions
                .unsubscribe_from(chat_id, &clients, &commands)
        };
        self.reply(
            chat_id,
            TranslationRequest::new("UnsubscribeSuccess").plural(removed as i64),
        )
        .await;
        Ok(())
    }

    /// Register a service node client. When a client secret is configured
    /// the registration payload must carry it; otherwise registration
    /// authorizes immediately.
    pub async fn handle_client_register(&self, topic: &str, raw: &[u8]) -> Result<()> {
        let ids = topic::extract_ids(topic, templates::CLIENT_REGISTER)?;
        let client_id = &ids[0];
        let payload: Payload = serde_json::from_slice(raw)?;

        self.clients
            .create_if_absent(client_id, &payload.service_node_key)
            .await
            .map_err(Error::Repository)?;

        let presented = match &payload.data {
            Some(Value::String(secret)) if !secret.is_empty() => Some(secret.as_str()),
            _ => None,
        };
        let accepted = match &self.client_secret {
            Some(expected) => presented == Some(expected.as_str()),
            None => true,
        };
        if !accepted {
            warn!(client = %client_id, "client registration rejected, bad secret");
            return Ok(());
        }

        self.clients
            .authorize(client_id)
            .await
            .map_err(Error::Repository)?;
        self.clients
            .update_status(client_id, ClientStatus::Online)
            .await
            .map_err(Error::Repository)?;
        info!(client = %client_id, node = %payload.service_node_key, "client registered");
        Ok(())
    }

    pub async fn handle_heartbeat(&self, topic: &str, _raw: &[u8]) -> Result<()> {
        let ids = topic::extract_ids(topic, templates::CLIENT_HEARTBEAT)?;
        let client_id = &ids[0];

        self.clients
            .touch_last_online(client_id, Utc::now())
            .await
            .map_err(Error::Repository)?;
        debug!(client = %client_id, "heartbeat");
        Ok(())
    }

    /// The authorization gate: forward plugin execution requests from
    /// authorized chats, reject the rest with a notification.
    pub async fn handle_execute_gate(&self, topic: &str, raw: &[u8]) -> Result<()> {
        let ids = topic::extract_ids(topic, templates::PLUGIN_EXECUTE_REQUEST)?;
        let plugin_name = &ids[0];
        let command: Command = serde_json::from_slice(raw)?;

        if let Err(err) = self.chats.add_chat_if_absent(&command.chat_id).await {
            warn!(chat = %command.chat_id, error = %err, "failed to record chat");
        }

        if !self.ensure_authorized(&command.chat_id).await? {
            return Ok(());
        }

        let target = topic::build_topic(templates::CMD_EXECUTE, &[plugin_name])?;
        self.transport
            .publish(&target, raw.to_vec())
            .await
            .map_err(Error::PluginExecutionFailed)?;
        Ok(())
    }

    /// Accept a client's plugin reply: forward it into the response
    /// pipeline and notify every subscribed chat.
    ///
    /// Replies from unauthorized or offline clients are dropped.
    pub async fn handle_client_plugin_reply(&self, topic: &str, raw: &[u8]) -> Result<()> {
        let ids = topic::extract_ids(topic, templates::CLIENT_PLUGIN_REPLY)?;
        let client_id = &ids[0];
        let plugin_name = &ids[1];
        let payload: Payload = serde_json::from_slice(raw)?;

        let authorized = self
            .clients
            .is_authorized(client_id)
            .await
            .map_err(Error::Repository)?;
        let online = self
            .clients
            .is_online(client_id)
            .await
            .map_err(Error::Repository)?;
        if !authorized || !online {
            warn!(client = %client_id, authorized, online, "dropping reply from inactive client");
            return Ok(());
        }

        let target = topic::build_topic(templates::CMD_EXECUTE_RESPONSE, &[plugin_name])?;
        self.transport
            .publish(&target, raw.to_vec())
            .await
            .map_err(Error::PluginExecutionFailed)?;

        for chat_id in self
            .subscriptions
            .matches(&payload.service_node_key, &payload.command)
        {
            self.reply(
                &chat_id,
                TranslationRequest::new("ClientResponse")
                    .with("serviceNodeKey", &*payload.service_node_key)
                    .with("command", &*payload.command),
            )
            .await;
        }
        Ok(())
    }

    /// Check chat authorization, telling the chat when it fails.
    async fn ensure_authorized(&self, chat_id: &str) -> Result<bool> {
        let authorized = self
            .chats
            .is_authorized(chat_id)
            .await
            .map_err(Error::Repository)?;
        if !authorized {
            self.reply(chat_id, TranslationRequest::new("ChatUnauthorized"))
                .await;
        }
        Ok(authorized)
    }

    async fn reply(&self, chat_id: &str, request: TranslationRequest) {
        if let Err(err) = self.notifier.send_translatable(chat_id, request).await {
            warn!(chat = chat_id, error = %err, "failed to notify chat");
        }
    }
}

/// Split `/subscribe`-style arguments into client and command lists.
fn split_filter_args(args: &[String]) -> (Vec<String>, Vec<String>) {
    let clients: Vec<String> = args[0].split(',').map(|s| s.trim().to_string()).collect();
    let commands: Vec<String> = match args.get(1) {
        Some(arg) => arg.split(',').map(|s| s.trim().to_string()).collect(),
        None => vec![WILDCARD.to_string()],
    };
    (clients, commands)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_filter_args_defaults_commands_to_wildcard() {
        let (clients, commands) = split_filter_args(&["node1,node2".to_string()]);
        assert_eq!(clients, vec!["node1", "node2"]);
        assert_eq!(commands, vec!["*"]);
    }

    #[test]
    fn test_split_filter_args_with_commands() {
        let (clients, commands) =
            split_filter_args(&["node1".to_string(), "/ping, /status".to_string()]);
        assert_eq!(clients, vec!["node1"]);
        assert_eq!(commands, vec!["/ping", "/status"]);
    }
}
