// ABOUTME: Reply value object published to a chat's notify topic
// ABOUTME: Plain, translatable, photo and audio message kinds

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// How a reply's content should be interpreted by the chat front-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyKind {
    PlainMessage,
    /// Content holds a [`TranslationRequest`]; the notifier resolves it to
    /// plain text before it reaches the chat.
    TranslatableMessage,
    Photo,
    Audio,
}

/// A message routed back to a chat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reply {
    pub chat_id: String,
    pub kind: ReplyKind,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub content: Value,
}

impl Reply {
    pub fn plain(chat_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            chat_id: chat_id.into(),
            kind: ReplyKind::PlainMessage,
            content: Value::String(text.into()),
        }
    }

    pub fn translatable(chat_id: impl Into<String>, request: TranslationRequest) -> Self {
        Self {
            chat_id: chat_id.into(),
            kind: ReplyKind::TranslatableMessage,
            content: serde_json::to_value(request).unwrap_or(Value::Null),
        }
    }

    pub fn photo(chat_id: impl Into<String>, content: Value) -> Self {
        Self {
            chat_id: chat_id.into(),
            kind: ReplyKind::Photo,
            content,
        }
    }

    pub fn audio(chat_id: impl Into<String>, content: Value) -> Self {
        Self {
            chat_id: chat_id.into(),
            kind: ReplyKind::Audio,
            content,
        }
    }
}

/// A deferred localization: resolved against the chat's language right
/// before delivery.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationRequest {
    pub message_id: String,
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plural: Option<i64>,
}

impl TranslationRequest {
    pub fn new(message_id: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            data: Map::new(),
            plural: None,
        }
    }

    /// Add a `{key}` substitution for the message template.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn plural(mut self, count: i64) -> Self {
        self.plural = Some(count);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_reply() {
        let reply = Reply::plain("42", "pong");
        assert_eq!(reply.kind, ReplyKind::PlainMessage);
        assert_eq!(reply.content, Value::String("pong".into()));
    }

    #[test]
    fn test_translatable_round_trip() {
        let request = TranslationRequest::new("ClientResponse")
            .with("serviceNodeKey", "node1")
            .with("command", "/ping")
            .plural(2);
        let reply = Reply::translatable("42", request.clone());

        let json = serde_json::to_string(&reply).unwrap();
        let back: Reply = serde_json::from_str(&json).unwrap();
        assert_eq!(back.kind, ReplyKind::TranslatableMessage);

        let parsed: TranslationRequest = serde_json::from_value(back.content).unwrap();
        assert_eq!(parsed, request);
    }

    #[test]
    fn test_kind_wire_names() {
        let json = serde_json::to_string(&ReplyKind::TranslatableMessage).unwrap();
        assert_eq!(json, "\"translatable_message\"");
    }
}
