// ABOUTME: Per-chat subscription store mapping (client, command) tuples to chats
// ABOUTME: The "*" sentinel subscribes a chat to every client and command

use crate::repository::ClientRepository;
use anyhow::Result;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Matches every client or every command.
pub const WILDCARD: &str = "*";

/// One (client, command) pair a chat wants response notifications for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub client: String,
    pub command: String,
}

impl Subscription {
    pub fn new(client: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            client: client.into(),
            command: normalize_command(command.into()),
        }
    }

    pub fn all() -> Self {
        Self {
            client: WILDCARD.to_string(),
            command: WILDCARD.to_string(),
        }
    }

    fn is_all(&self) -> bool {
        self.client == WILDCARD && self.command == WILDCARD
    }
}

fn normalize_command(command: String) -> String {
    if command == WILDCARD || command.starts_with('/') {
        command
    } else {
        format!("/{command}")
    }
}

/// Tracks which chats want to hear about which client responses.
///
/// State is per-chat: a chat's list is either the single `("*", "*")`
/// sentinel or a deduplicated set of concrete tuples. Subscription requests
/// validate client keys against the client repository; unknown clients are
/// skipped, never stored.
pub struct SubscriptionStore {
    chats: DashMap<String, Vec<Subscription>>,
    clients: Arc<dyn ClientRepository>,
}

impl SubscriptionStore {
    pub fn new(clients: Arc<dyn ClientRepository>) -> Self {
        Self {
            chats: DashMap::new(),
            clients,
        }
    }

    /// Subscribe `chat_id` to every client and command. Replaces whatever
    /// tuples the chat had.
    pub fn subscribe_to_all(&self, chat_id: &str) {
        self.chats
            .insert(chat_id.to_string(), vec![Subscription::all()]);
        debug!(chat = chat_id, "subscribed to all responses");
    }

    /// Subscribe `chat_id` to the cross product of `clients` and `commands`.
    ///
    /// Client keys that don't name a known client are skipped; the remaining
    /// keys still subscribe. Returns how many tuples were added (duplicates
    /// don't count).
    pub async fn subscribe_to(
        &self,
        chat_id: &str,
        clients: &[String],
        commands: &[String],
    ) -> Result<usize> {
        let mut known: Vec<String> = Vec::with_capacity(clients.len());
        for client in clients {
            if client != WILDCARD && self.clients.get_by_node_key(client).await?.is_none() {
                warn!(chat = chat_id, client = %client, "unknown client, skipping");
                continue;
            }
            known.push(client.clone());
        }

        let mut entry = self.chats.entry(chat_id.to_string()).or_default();
        // Concrete tuples replace the all-sentinel rather than coexist with it
        if entry.len() == 1 && entry[0].is_all() {
            entry.clear();
        }
        let mut added = 0;
        for client in &known {
            for command in commands {
                let sub = Subscription::new(client.clone(), command.clone());
                if sub.is_all() {
                    entry.clear();
                    entry.push(Subscription::all());
                    return Ok(1);
                }
                if !entry.contains(&sub) {
                    entry.push(sub);
                    added += 1;
                }
            }
        }
        debug!(chat = chat_id, added, "subscription tuples added");
        Ok(added)
    }

    /// Drop every subscription the chat holds.
    pub fn unsubscribe_from_all(&self, chat_id: &str) {
        self.chats.remove(chat_id);
        debug!(chat = chat_id, "unsubscribed from all responses");
    }

    /// Remove the tuples matching the given clients and commands. Returns
    /// how many tuples were removed.
    ///
    /// A wildcard client removes every tuple regardless of command; a named
    /// client removes its tuples for the named commands (all of them on a
    /// wildcard command). A chat holding the all-sentinel loses it on any
    /// explicit unsubscribe request.
    pub fn unsubscribe_from(
        &self,
        chat_id: &str,
        clients: &[String],
        commands: &[String],
    ) -> usize {
        let Some(mut entry) = self.chats.get_mut(chat_id) else {
            return 0;
        };

        if entry.len() == 1 && entry[0].is_all() {
            entry.clear();
            debug!(chat = chat_id, "all-sentinel revoked");
            return 1;
        }

        let wildcard_client = clients.iter().any(|c| c == WILDCARD);
        let wildcard_command = commands.iter().any(|c| c == WILDCARD);
        let commands: Vec<String> = commands
            .iter()
            .map(|c| normalize_command(c.clone()))
            .collect();

        let before = entry.len();
        entry.retain(|sub| {
            if wildcard_client {
                return false;
            }
            let client_hit = clients.iter().any(|c| c == &sub.client);
            let command_hit = wildcard_command || commands.iter().any(|c| c == &sub.command);
            !(client_hit && command_hit)
        });
        before - entry.len()
    }

    /// The chats subscribed to responses from `service_node_key` for
    /// `command`.
    pub fn matches(&self, service_node_key: &str, command: &str) -> Vec<String> {
        let command = normalize_command(command.to_string());
        self.chats
            .iter()
            .filter(|entry| {
                entry.value().iter().any(|sub| {
                    (sub.client == WILDCARD || sub.client == service_node_key)
                        && (sub.command == WILDCARD || sub.command == command)
                })
            })
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// The tuples a chat currently holds.
    pub fn subscriptions(&self, chat_id: &str) -> Vec<Subscription> {
        self.chats
            .get(chat_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }
}
