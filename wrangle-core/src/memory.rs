// ABOUTME: In-memory repository implementations over DashMap
// ABOUTME: Used by the reference daemon and throughout the test suites

use crate::repository::{
    Chat, ChatRepository, Client, ClientRepository, ClientStatus, CommandLog, CommandResponseLog,
    LogRepository, LogUpdate,
};
use crate::reply::Reply;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

pub const DEFAULT_LANGUAGE: &str = "en";

/// Chat store backed by a concurrent map. Unknown chats read as
/// unauthorized with the default language rather than erroring.
pub struct MemoryChatRepository {
    chats: DashMap<String, Chat>,
    default_language: String,
}

impl Default for MemoryChatRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryChatRepository {
    pub fn new() -> Self {
        Self::with_default_language(DEFAULT_LANGUAGE)
    }

    pub fn with_default_language(language: impl Into<String>) -> Self {
        Self {
            chats: DashMap::new(),
            default_language: language.into(),
        }
    }
}

#[async_trait]
impl ChatRepository for MemoryChatRepository {
    async fn add_chat_if_absent(&self, chat_id: &str) -> Result<()> {
        self.chats
            .entry(chat_id.to_string())
            .or_insert_with(|| Chat {
                chat_id: chat_id.to_string(),
                authorized: false,
                language: self.default_language.clone(),
            });
        Ok(())
    }

    async fn is_authorized(&self, chat_id: &str) -> Result<bool> {
        Ok(self
            .chats
            .get(chat_id)
            .map(|chat| chat.authorized)
            .unwrap_or(false))
    }

    async fn authorize(&self, chat_id: &str) -> Result<()> {
        self.chats
            .entry(chat_id.to_string())
            .and_modify(|chat| chat.authorized = true)
            .or_insert_with(|| Chat {
                chat_id: chat_id.to_string(),
                authorized: true,
                language: self.default_language.clone(),
            });
        Ok(())
    }

    async fn revoke_authorization(&self, chat_id: &str) -> Result<()> {
        if let Some(mut chat) = self.chats.get_mut(chat_id) {
            chat.authorized = false;
        }
        Ok(())
    }

    async fn language(&self, chat_id: &str) -> Result<String> {
        Ok(self
            .chats
            .get(chat_id)
            .map(|chat| chat.language.clone())
            .unwrap_or_else(|| self.default_language.clone()))
    }

    async fn set_language(&self, chat_id: &str, language: &str) -> Result<()> {
        self.chats
            .entry(chat_id.to_string())
            .and_modify(|chat| chat.language = language.to_string())
            .or_insert_with(|| Chat {
                chat_id: chat_id.to_string(),
                authorized: false,
                language: language.to_string(),
            });
        Ok(())
    }
}

/// Client store backed by a concurrent map keyed by client id.
#[derive(Default)]
pub struct MemoryClientRepository {
    clients: DashMap<String, Client>,
}

impl MemoryClientRepository {
    pub fn new() -> Self {
        Self {
            clients: DashMap::new(),
        }
    }
}

#[async_trait]
impl ClientRepository for MemoryClientRepository {
    async fn create_if_absent(&self, client_id: &str, service_node_key: &str) -> Result<()> {
        self.clients
            .entry(client_id.to_string())
            .or_insert_with(|| Client {
                client_id: client_id.to_string(),
                service_node_key: service_node_key.to_string(),
                status: ClientStatus::Unauthorized,
                last_online: None,
            });
        Ok(())
    }

    async fn get_by_node_key(&self, service_node_key: &str) -> Result<Option<Client>> {
        Ok(self
            .clients
            .iter()
            .find(|entry| entry.service_node_key == service_node_key)
            .map(|entry| entry.value().clone()))
    }

    async fn authorize(&self, client_id: &str) -> Result<()> {
        if let Some(mut client) = self.clients.get_mut(client_id) {
            if client.status == ClientStatus::Unauthorized {
                client.status = ClientStatus::Offline;
            }
        }
        Ok(())
    }

    async fn is_authorized(&self, client_id: &str) -> Result<bool> {
        Ok(self
            .clients
            .get(client_id)
            .map(|client| client.status != ClientStatus::Unauthorized)
            .unwrap_or(false))
    }

    async fn is_online(&self, client_id: &str) -> Result<bool> {
        Ok(self
            .clients
            .get(client_id)
            .map(|client| client.status == ClientStatus::Online)
            .unwrap_or(false))
    }

    async fn update_status(&self, client_id: &str, status: ClientStatus) -> Result<()> {
        if let Some(mut client) = self.clients.get_mut(client_id) {
            client.status = status;
        }
        Ok(())
    }

    async fn touch_last_online(&self, client_id: &str, at: DateTime<Utc>) -> Result<()> {
        if let Some(mut client) = self.clients.get_mut(client_id) {
            client.last_online = Some(at);
        }
        Ok(())
    }
}

/// Command log store keyed by message id, responses keyed by payload id.
#[derive(Default)]
pub struct MemoryLogRepository {
    logs: DashMap<String, CommandLog>,
    responses: DashMap<String, CommandResponseLog>,
}

impl MemoryLogRepository {
    pub fn new() -> Self {
        Self {
            logs: DashMap::new(),
            responses: DashMap::new(),
        }
    }

    pub fn log(&self, message_id: &str) -> Option<CommandLog> {
        self.logs.get(message_id).map(|entry| entry.value().clone())
    }

    pub fn response(&self, payload_id: &str) -> Option<CommandResponseLog> {
        self.responses
            .get(payload_id)
            .map(|entry| entry.value().clone())
    }
}

#[async_trait]
impl LogRepository for MemoryLogRepository {
    async fn add_command_log(&self, message_id: &str, command: &str) -> Result<String> {
        self.logs.insert(
            message_id.to_string(),
            CommandLog {
                command: command.to_string(),
                errors: Vec::new(),
                payloads: Vec::new(),
            },
        );
        Ok(message_id.to_string())
    }

    async fn update_command_log(&self, message_id: &str, update: LogUpdate) -> Result<()> {
        let mut entry = self.logs.entry(message_id.to_string()).or_default();
        entry.errors.extend(update.errors);
        entry.payloads.extend(update.payloads);
        Ok(())
    }

    async fn add_command_response(
        &self,
        payload_id: &str,
        errors: Vec<String>,
        response: Option<Reply>,
    ) -> Result<()> {
        self.responses.insert(
            payload_id.to_string(),
            CommandResponseLog {
                payload_id: payload_id.to_string(),
                errors,
                response,
            },
        );
        Ok(())
    }
}
