// ABOUTME: Topic address algebra for the pub/sub transport
// ABOUTME: Extracts wildcard captures from topics and builds topics from templates

use crate::error::TopicError;

/// Topic templates the services subscribe to or publish on.
///
/// `+` captures exactly one segment; the captured ids come back in
/// left-to-right order from [`extract_ids`].
pub mod templates {
    /// Chat requests authorization
    pub const CHAT_AUTH: &str = "chat/+/auth";
    /// Chat requests de-authorization
    pub const CHAT_DEAUTH: &str = "chat/+/deauth";
    /// Chat requests a language change
    pub const CHAT_SET_LANG: &str = "chat/+/lang/set";
    /// Chat manages its subscription filters
    pub const CHAT_SUBSCRIBE: &str = "chat/+/subscribe";
    pub const CHAT_UNSUBSCRIBE: &str = "chat/+/unsubscribe";
    /// Outbound notification to a chat
    pub const CHAT_NOTIFY: &str = "chat/+/notify";
    /// Client heartbeat
    pub const CLIENT_HEARTBEAT: &str = "client/+/heartbeat";
    /// Client registration
    pub const CLIENT_REGISTER: &str = "client/+/register";
    /// Client plugin response
    pub const CLIENT_PLUGIN_REPLY: &str = "client/+/plugin/+/reply";
    /// Per-client dispatch of a payload
    pub const CLIENT_DISPATCH: &str = "client/+/cmd/+/execute";
    /// Gated plugin execution request coming from the chat side
    pub const PLUGIN_EXECUTE_REQUEST: &str = "plugin/cmd/+/execute";
    /// Plugin execution request, post-authorization
    pub const CMD_EXECUTE: &str = "cmd/+/execute";
    /// Plugin execution response from a client
    pub const CMD_EXECUTE_RESPONSE: &str = "cmd/+/execute/response";
}

/// Extract the ids captured by `+` wildcards in `template` from a concrete
/// topic.
///
/// For example, `actual = "some/id1/sub/id2/topic"` against
/// `template = "some/+/sub/+/topic"` yields `["id1", "id2"]`.
///
/// `#` segments only count towards template validity; they capture nothing
/// and must match an actual `#` segment byte-for-byte.
pub fn extract_ids(actual: &str, template: &str) -> Result<Vec<String>, TopicError> {
    let actual_segments: Vec<&str> = actual.split('/').collect();
    let template_segments: Vec<&str> = template.split('/').collect();

    // Same segment count would indicate the same topic shape
    if actual_segments.len() != template_segments.len() {
        return Err(TopicError::NotSameTopic);
    }

    // A subscription template has at least one + or #
    if !template.contains('+') && !template.contains('#') {
        return Err(TopicError::NotValidSubscriptionTemplate);
    }

    let mut ids = Vec::new();
    for (template_segment, actual_segment) in template_segments.iter().zip(&actual_segments) {
        if *template_segment == "+" {
            ids.push((*actual_segment).to_string());
        } else if template_segment != actual_segment {
            return Err(TopicError::NotSubscribedTopic);
        }
    }

    Ok(ids)
}

/// Build a concrete topic by substituting each `+` in `template` with the
/// next id, left to right.
///
/// The number of ids must equal the number of `+` occurrences and no id may
/// be empty.
pub fn build_topic(template: &str, ids: &[&str]) -> Result<String, TopicError> {
    if template.matches('+').count() != ids.len() {
        return Err(TopicError::InvalidArgumentCount);
    }

    if ids.iter().any(|id| id.is_empty()) {
        return Err(TopicError::InvalidIds);
    }

    let mut topic = template.to_string();
    for id in ids {
        topic = topic.replacen('+', id, 1);
    }

    Ok(topic)
}

/// Check whether a concrete topic falls under a subscription filter.
///
/// `+` matches any single segment, a trailing `#` matches the rest of the
/// topic. Used by the in-process transport to route published messages.
pub fn matches_filter(filter: &str, topic: &str) -> bool {
    let filter_segments: Vec<&str> = filter.split('/').collect();
    let topic_segments: Vec<&str> = topic.split('/').collect();

    for (i, filter_segment) in filter_segments.iter().enumerate() {
        if *filter_segment == "#" {
            return true;
        }
        match topic_segments.get(i) {
            Some(topic_segment) if *filter_segment == "+" || filter_segment == topic_segment => {}
            _ => return false,
        }
    }

    filter_segments.len() == topic_segments.len()
}
