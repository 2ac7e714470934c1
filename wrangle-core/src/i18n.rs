// ABOUTME: Message catalog with {key} interpolation and one/other plural forms
// ABOUTME: Ships default English messages; extra languages load from TOML files

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::Path;
use tracing::warn;

/// Resolves a message id plus data to text in a chat's language.
pub trait Localize: Send + Sync {
    fn localize(
        &self,
        language: &str,
        message_id: &str,
        data: &Map<String, Value>,
        plural: Option<i64>,
    ) -> Result<String>;
}

/// A single message template with an optional singular form.
#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub one: Option<String>,
    pub other: String,
}

impl Message {
    fn template(&self, plural: Option<i64>) -> &str {
        match (plural, &self.one) {
            (Some(1), Some(one)) => one,
            _ => &self.other,
        }
    }
}

fn msg(other: &str) -> Message {
    Message {
        one: None,
        other: other.to_string(),
    }
}

fn msg_plural(one: &str, other: &str) -> Message {
    Message {
        one: Some(one.to_string()),
        other: other.to_string(),
    }
}

/// Per-language message tables with `{key}` substitution.
///
/// Lookup order: exact language tag, then its primary subtag (`de-CH` falls
/// back to `de`), then the default language.
pub struct MessageCatalog {
    languages: HashMap<String, HashMap<String, Message>>,
    default_language: String,
}

impl Default for MessageCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageCatalog {
    /// A catalog holding the built-in English message set.
    pub fn new() -> Self {
        let mut english = HashMap::new();
        for (id, message) in [
            ("UnsupportedCommand", msg("Unsupported command: {command}")),
            ("InvalidArguments", msg("Invalid arguments for {command}.")),
            (
                "PluginExecutionFailed",
                msg("Command {command} failed: {error}"),
            ),
            ("InvalidPluginType", msg("Plugin {plugin} has an invalid type.")),
            (
                "ChatUnauthorized",
                msg("This chat is not authorized. Use /auth to request access."),
            ),
            ("ChatAlreadyAuthorized", msg("This chat is already authorized.")),
            ("ChatAuthorized", msg("Chat authorized. Welcome!")),
            ("ChatDeauthorized", msg("Chat authorization revoked.")),
            ("InvalidToken", msg("Invalid or expired token.")),
            ("AuthorizationError", msg("Authorization failed: {error}")),
            (
                "GeneratedToken",
                msg("Your authorization token: {token}. It expires in 5 minutes."),
            ),
            ("ClientDisconnected", msg("Client {serviceNodeKey} disconnected.")),
            (
                "ClientResponse",
                msg("Client {serviceNodeKey} responded to {command}."),
            ),
            ("UnableToSendMessage", msg("Unable to deliver message: {error}")),
            (
                "SubscriptionSuccess",
                msg_plural("Added {count} subscription.", "Added {count} subscriptions."),
            ),
            ("SubscriptionFail", msg("Subscription failed: {error}")),
            (
                "UnsubscribeSuccess",
                msg_plural("Removed {count} subscription.", "Removed {count} subscriptions."),
            ),
            ("UnsubscribeFail", msg("Unsubscribe failed: {error}")),
            ("LanguageChanged", msg("Language set to {language}.")),
            ("LanguageChangeFailed", msg("Could not change language: {error}")),
        ] {
            english.insert(id.to_string(), message);
        }

        let mut languages = HashMap::new();
        languages.insert("en".to_string(), english);
        Self {
            languages,
            default_language: "en".to_string(),
        }
    }

    /// Change the language used when a chat's language has no entry.
    pub fn with_default_language(mut self, language: impl Into<String>) -> Self {
        self.default_language = language.into();
        self
    }

    /// Load extra languages from `dir`. Each `<lang>.toml` file maps message
    /// ids to `{ other = "...", one = "..." }` tables. Unreadable files are
    /// logged and skipped.
    pub fn load_dir(&mut self, dir: &Path) -> Result<()> {
        let entries =
            std::fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))?;
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("toml") {
                continue;
            }
            let Some(lang) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match Self::load_file(&path) {
                Ok(messages) => {
                    self.languages
                        .entry(lang.to_string())
                        .or_default()
                        .extend(messages);
                }
                Err(err) => {
                    warn!(file = %path.display(), error = %err, "skipping translation file");
                }
            }
        }
        Ok(())
    }

    fn load_file(path: &Path) -> Result<HashMap<String, Message>> {
        let text =
            std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let messages: HashMap<String, Message> =
            toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
        Ok(messages)
    }

    fn lookup(&self, language: &str, message_id: &str) -> Option<&Message> {
        if let Some(message) = self
            .languages
            .get(language)
            .and_then(|table| table.get(message_id))
        {
            return Some(message);
        }
        if let Some(primary) = language.split('-').next() {
            if primary != language {
                if let Some(message) = self
                    .languages
                    .get(primary)
                    .and_then(|table| table.get(message_id))
                {
                    return Some(message);
                }
            }
        }
        self.languages
            .get(&self.default_language)
            .and_then(|table| table.get(message_id))
    }
}

impl Localize for MessageCatalog {
    fn localize(
        &self,
        language: &str,
        message_id: &str,
        data: &Map<String, Value>,
        plural: Option<i64>,
    ) -> Result<String> {
        let message = self
            .lookup(language, message_id)
            .ok_or_else(|| anyhow!("unknown message id: {message_id}"))?;

        let mut text = message.template(plural).to_string();
        for (key, value) in data {
            let rendered = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            text = text.replace(&format!("{{{key}}}"), &rendered);
        }
        if let Some(count) = plural {
            text = text.replace("{count}", &count.to_string());
        }
        Ok(text)
    }
}
