// ABOUTME: Command value object parsed from chat text
// ABOUTME: Maps well-known commands to the management topics that handle them

use crate::topic;
use serde::{Deserialize, Serialize};

pub const AUTH_COMMAND: &str = "/authorize";
pub const AUTH_SHORT_COMMAND: &str = "/auth";
pub const DEAUTH_COMMAND: &str = "/deauth";
pub const SUBSCRIBE_COMMAND: &str = "/subscribe";
pub const SUBSCRIBE_SHORT_COMMAND: &str = "/sub";
pub const UNSUBSCRIBE_COMMAND: &str = "/unsubscribe";
pub const UNSUBSCRIBE_SHORT_COMMAND: &str = "/unsub";
pub const SET_LANG_COMMAND: &str = "/lang";

/// A command issued by a chat.
///
/// Example: `"/get_status node1 node2"` parses to name `"/get_status"` and
/// args `["node1", "node2"]`. The name always carries the `/` prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    pub name: String,
    pub args: Vec<String>,
    pub message_id: String,
    pub chat_id: String,
}

impl Command {
    /// Create a command, normalizing a missing `/` prefix on the name.
    pub fn new(
        name: impl Into<String>,
        chat_id: impl Into<String>,
        message_id: impl Into<String>,
    ) -> Self {
        let mut name = name.into();
        if !name.starts_with('/') {
            name = format!("/{name}");
        }
        Self {
            name,
            args: Vec::new(),
            message_id: message_id.into(),
            chat_id: chat_id.into(),
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// The command name without the `/` prefix, usable as a topic segment.
    pub fn plugin_name(&self) -> &str {
        self.name.strip_prefix('/').unwrap_or(&self.name)
    }

    pub fn first_arg(&self) -> Option<&str> {
        self.args.first().map(|s| s.as_str())
    }

    /// The topic this command should be published on.
    ///
    /// Management commands go to their dedicated chat topics; everything
    /// else is a plugin execution request that passes through the
    /// authorization gate.
    pub fn routing_topic(&self) -> String {
        match self.name.as_str() {
            AUTH_COMMAND | AUTH_SHORT_COMMAND => format!("chat/{}/auth", self.chat_id),
            DEAUTH_COMMAND => format!("chat/{}/deauth", self.chat_id),
            SUBSCRIBE_COMMAND | SUBSCRIBE_SHORT_COMMAND => {
                format!("chat/{}/subscribe", self.chat_id)
            }
            UNSUBSCRIBE_COMMAND | UNSUBSCRIBE_SHORT_COMMAND => {
                format!("chat/{}/unsubscribe", self.chat_id)
            }
            SET_LANG_COMMAND => format!("chat/{}/lang/set", self.chat_id),
            _ => {
                // Gated execution request; infallible since plugin_name is non-empty here
                topic::build_topic(topic::templates::PLUGIN_EXECUTE_REQUEST, &[self.plugin_name()])
                    .unwrap_or_else(|_| format!("plugin/cmd/{}/execute", self.plugin_name()))
            }
        }
    }
}

/// Parse chat text as a command. Text not starting with `/` is not a
/// command and yields `None`.
pub fn parse(text: &str, chat_id: &str, message_id: &str) -> Option<Command> {
    let trimmed = text.trim();
    if !trimmed.starts_with('/') {
        return None;
    }

    let mut parts = trimmed.split_whitespace();
    let name = parts.next()?;
    if name == "/" {
        return None;
    }
    let args: Vec<String> = parts.map(|s| s.to_string()).collect();

    Some(Command::new(name, chat_id, message_id).with_args(args))
}
