// ABOUTME: Repository traits for chats, clients and command logs
// ABOUTME: Storage backends implement these; the core never touches a database directly

use crate::payload::Payload;
use crate::reply::Reply;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A chat known to the system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    pub chat_id: String,
    pub authorized: bool,
    pub language: String,
}

/// Connection state of a service node client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientStatus {
    Online,
    Offline,
    Unauthorized,
}

/// A service node client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub client_id: String,
    pub service_node_key: String,
    pub status: ClientStatus,
    pub last_online: Option<DateTime<Utc>>,
}

/// Persistence seam for chats and their authorization state.
#[async_trait]
pub trait ChatRepository: Send + Sync {
    /// Record the chat if it is new; an existing chat is left untouched.
    async fn add_chat_if_absent(&self, chat_id: &str) -> Result<()>;

    async fn is_authorized(&self, chat_id: &str) -> Result<bool>;

    async fn authorize(&self, chat_id: &str) -> Result<()>;

    async fn revoke_authorization(&self, chat_id: &str) -> Result<()>;

    /// The chat's preferred language tag, e.g. `"en"` or `"de-CH"`.
    async fn language(&self, chat_id: &str) -> Result<String>;

    async fn set_language(&self, chat_id: &str, language: &str) -> Result<()>;
}

/// Persistence seam for service node clients.
#[async_trait]
pub trait ClientRepository: Send + Sync {
    async fn create_if_absent(&self, client_id: &str, service_node_key: &str) -> Result<()>;

    async fn get_by_node_key(&self, service_node_key: &str) -> Result<Option<Client>>;

    async fn authorize(&self, client_id: &str) -> Result<()>;

    async fn is_authorized(&self, client_id: &str) -> Result<bool>;

    async fn is_online(&self, client_id: &str) -> Result<bool>;

    async fn update_status(&self, client_id: &str, status: ClientStatus) -> Result<()>;

    async fn touch_last_online(&self, client_id: &str, at: DateTime<Utc>) -> Result<()>;
}

/// Audit record of one command execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandLog {
    pub command: String,
    pub errors: Vec<String>,
    pub payloads: Vec<Payload>,
}

/// Audit record of one client response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandResponseLog {
    pub payload_id: String,
    pub errors: Vec<String>,
    pub response: Option<Reply>,
}

/// What to merge into an existing command log entry.
#[derive(Debug, Clone, Default)]
pub struct LogUpdate {
    pub errors: Vec<String>,
    pub payloads: Vec<Payload>,
}

impl LogUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn payloads(mut self, payloads: Vec<Payload>) -> Self {
        self.payloads = payloads;
        self
    }

    pub fn error(mut self, err: impl Into<String>) -> Self {
        self.errors.push(err.into());
        self
    }
}

/// Persistence seam for command audit logs.
///
/// Logging failures are reported to callers but never abort dispatch; the
/// engine logs and continues.
#[async_trait]
pub trait LogRepository: Send + Sync {
    /// Record a fresh command, keyed by its message id. Returns the log id.
    async fn add_command_log(&self, message_id: &str, command: &str) -> Result<String>;

    async fn update_command_log(&self, message_id: &str, update: LogUpdate) -> Result<()>;

    async fn add_command_response(
        &self,
        payload_id: &str,
        errors: Vec<String>,
        response: Option<Reply>,
    ) -> Result<()>;
}
