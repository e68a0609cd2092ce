//! Application messages exchanged with the controller.
//!
//! Every message is a JSON object with a `type` field and, where sent by the
//! device, a unix `timestamp`.

use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};

pub const PING: &str = "ping";
pub const PONG: &str = "pong";
pub const STATUS: &str = "status";
pub const COMMAND: &str = "command";
pub const COMMAND_RESPONSE: &str = "command_response";
pub const DEACTIVATED: &str = "deactivated";
pub const ERROR: &str = "error";
pub const DISCONNECT: &str = "disconnect";

pub fn now_ts() -> i64 {
    Utc::now().timestamp()
}

pub fn message_type(message: &Value) -> Option<&str> {
    message.get("type").and_then(Value::as_str)
}

pub fn pong() -> Value {
    json!({ "type": PONG, "timestamp": now_ts() })
}

pub fn disconnect_notice(client_id: &str) -> Value {
    json!({
        "type": DISCONNECT,
        "clientId": client_id,
        "reason": "shutdown",
        "timestamp": now_ts(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    Acknowledged,
    Success,
    Error,
}

/// Reply to a controller command, correlated by `command_id`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandResponse {
    pub command_id: String,
    pub command: String,
    pub status: CommandStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandResponse {
    pub fn success(command_id: &str, command: &str, result: Option<Value>) -> Self {
        Self {
            command_id: command_id.to_string(),
            command: command.to_string(),
            status: CommandStatus::Success,
            result,
            error: None,
        }
    }

    pub fn acknowledged(command_id: &str, command: &str) -> Self {
        Self {
            status: CommandStatus::Acknowledged,
            ..Self::success(command_id, command, None)
        }
    }

    pub fn error(command_id: &str, command: &str, error: impl Into<String>) -> Self {
        Self {
            status: CommandStatus::Error,
            error: Some(error.into()),
            ..Self::success(command_id, command, None)
        }
    }

    pub fn to_message(&self) -> Value {
        let mut message = serde_json::to_value(self).unwrap_or_else(|_| json!({}));
        if let Some(obj) = message.as_object_mut() {
            obj.insert("type".into(), json!(COMMAND_RESPONSE));
            obj.insert("timestamp".into(), json!(now_ts()));
        }
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_response_message_shape() {
        let msg = CommandResponse::error("c-1", "reboot", "commands are disabled").to_message();
        assert_eq!(msg["type"], COMMAND_RESPONSE);
        assert_eq!(msg["command_id"], "c-1");
        assert_eq!(msg["status"], "error");
        assert!(msg.get("result").is_none());
        assert!(msg["timestamp"].is_i64());
    }

    #[test]
    fn pong_carries_timestamp() {
        let msg = pong();
        assert_eq!(message_type(&msg), Some(PONG));
        assert!(msg["timestamp"].as_i64().unwrap() > 0);
    }
}
