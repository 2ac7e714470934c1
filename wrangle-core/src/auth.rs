// ABOUTME: Chat authorization over single-use tokens with a 5 minute lifetime
// ABOUTME: Token issuance is idempotent while a token is pending

use crate::cache::TtlCache;
use crate::error::{Error, Result};
use crate::repository::ChatRepository;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// What happened when a chat ran the auth command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    /// The chat was already authorized; nothing changed.
    AlreadyAuthorized,
    /// A token was issued (or re-issued while still pending) for operator
    /// delivery out of band.
    TokenIssued(String),
    /// The presented token matched; the chat is now authorized.
    Authorized,
    /// The presented token did not match or nothing was pending.
    InvalidToken,
}

/// Handles the token dance for chat authorization.
pub struct ChatAuthenticator {
    chats: Arc<dyn ChatRepository>,
    tokens: TtlCache<String>,
}

impl ChatAuthenticator {
    pub fn new(chats: Arc<dyn ChatRepository>) -> Self {
        Self {
            chats,
            tokens: TtlCache::with_default_ttl(),
        }
    }

    pub fn with_token_ttl(chats: Arc<dyn ChatRepository>, ttl: Duration) -> Self {
        Self {
            chats,
            tokens: TtlCache::new(ttl),
        }
    }

    /// Run one step of the auth flow for `chat_id`.
    ///
    /// Without a token: issue one (re-reading the pending token if the chat
    /// asks again before it expires). With a token: authorize on match,
    /// reject otherwise. Repository failures surface as [`Error::Repository`]
    /// so callers can report them to the chat.
    pub async fn handle_auth(&self, chat_id: &str, token: Option<&str>) -> Result<AuthOutcome> {
        if self
            .chats
            .is_authorized(chat_id)
            .await
            .map_err(Error::Repository)?
        {
            return Ok(AuthOutcome::AlreadyAuthorized);
        }

        match token {
            Some(presented) => {
                match self.tokens.get(chat_id) {
                    Some(pending) if pending == presented => {
                        self.chats
                            .authorize(chat_id)
                            .await
                            .map_err(Error::Repository)?;
                        self.tokens.delete(chat_id);
                        info!(chat = chat_id, "chat authorized");
                        Ok(AuthOutcome::Authorized)
                    }
                    _ => {
                        debug!(chat = chat_id, "token rejected");
                        Ok(AuthOutcome::InvalidToken)
                    }
                }
            }
            None => {
                let token = self
                    .tokens
                    .get_or_insert_with(chat_id, generate_token);
                info!(chat = chat_id, "auth token issued");
                Ok(AuthOutcome::TokenIssued(token))
            }
        }
    }

    /// Drop the chat's authorization.
    pub async fn revoke(&self, chat_id: &str) -> Result<()> {
        self.chats
            .revoke_authorization(chat_id)
            .await
            .map_err(Error::Repository)?;
        self.tokens.delete(chat_id);
        info!(chat = chat_id, "chat authorization revoked");
        Ok(())
    }

    /// The token currently pending for a chat, if any.
    pub fn pending_token(&self, chat_id: &str) -> Option<String> {
        self.tokens.get(chat_id)
    }
}

/// 16 random bytes, hex encoded.
fn generate_token() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
