// ABOUTME: Payload value object exchanged with service node clients
// ABOUTME: Carries correlation id, target node key, data and outcome flags

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Data shipped to a client (or received back from one) for a command.
///
/// `id` is the correlation key; it stays empty until the dispatch engine
/// assigns one just before publishing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payload {
    #[serde(rename = "Id", default)]
    pub id: String,
    /// Determines the target client for the data
    pub service_node_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    pub command: String,
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

impl Payload {
    /// Create an empty payload addressed to nobody. Use the builder methods
    /// to fill it in.
    pub fn new() -> Self {
        Self {
            id: String::new(),
            service_node_key: String::new(),
            data: None,
            command: String::new(),
            success: false,
            error: String::new(),
        }
    }

    /// Set the target client.
    pub fn for_client(mut self, service_node_key: impl Into<String>) -> Self {
        self.service_node_key = service_node_key.into();
        self
    }

    /// Set the command the payload executes or originates from.
    pub fn for_command(mut self, command: impl Into<String>) -> Self {
        self.command = command.into();
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Mark the payload successful and clear any error.
    pub fn successful(mut self) -> Self {
        self.success = true;
        self.error.clear();
        self
    }

    pub fn with_error(mut self, err: &anyhow::Error) -> Self {
        self.set_error(err);
        self
    }

    /// Record that something went wrong with the payload.
    pub fn set_error(&mut self, err: &anyhow::Error) {
        self.success = false;
        self.error = err.to_string();
    }
}

impl Default for Payload {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builder_chain() {
        let payload = Payload::new()
            .for_client("node1")
            .for_command("/ping")
            .with_data(json!({"rtt_ms": 12}))
            .successful();

        assert_eq!(payload.service_node_key, "node1");
        assert_eq!(payload.command, "/ping");
        assert!(payload.success);
        assert!(payload.error.is_empty());
        assert!(payload.id.is_empty());
    }

    #[test]
    fn test_set_error_clears_success() {
        let mut payload = Payload::new().successful();
        payload.set_error(&anyhow::anyhow!("node unreachable"));
        assert!(!payload.success);
        assert_eq!(payload.error, "node unreachable");
    }

    #[test]
    fn test_wire_format_omits_empty_fields() {
        let payload = Payload::new().for_client("node1").for_command("/ping");
        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.contains("\"serviceNodeKey\":\"node1\""));
        assert!(json.contains("\"Id\":\"\""));
        assert!(!json.contains("\"data\""));
        assert!(!json.contains("\"error\""));
    }

    #[test]
    fn test_decodes_without_optional_fields() {
        let payload: Payload =
            serde_json::from_str(r#"{"Id":"abc","serviceNodeKey":"n","command":"/c"}"#).unwrap();
        assert_eq!(payload.id, "abc");
        assert!(!payload.success);
        assert!(payload.data.is_none());
    }
}
