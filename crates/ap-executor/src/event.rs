// event.rs - Execution lifecycle events emitted by backends.
//
// A well-formed stream is: start, any number of text/tool-call/tool-result,
// then exactly one of end or error.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionEventKind {
    Start,
    Text,
    ToolCall,
    ToolResult,
    End,
    Error,
}

impl fmt::Display for ExecutionEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExecutionEventKind::Start => "start",
            ExecutionEventKind::Text => "text",
            ExecutionEventKind::ToolCall => "tool-call",
            ExecutionEventKind::ToolResult => "tool-result",
            ExecutionEventKind::End => "end",
            ExecutionEventKind::Error => "error",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionEvent {
    #[serde(rename = "type")]
    pub kind: ExecutionEventKind,
    pub action_id: Uuid,
    #[serde(default)]
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

impl ExecutionEvent {
    pub fn new(kind: ExecutionEventKind, action_id: Uuid, payload: Value) -> Self {
        Self {
            kind,
            action_id,
            payload,
            timestamp: Utc::now(),
        }
    }

    pub fn start(action_id: Uuid, backend_id: &str) -> Self {
        Self::new(
            ExecutionEventKind::Start,
            action_id,
            json!({ "backend": backend_id }),
        )
    }

    pub fn text(action_id: Uuid, text: impl Into<String>) -> Self {
        Self::new(
            ExecutionEventKind::Text,
            action_id,
            json!({ "text": text.into() }),
        )
    }

    pub fn tool_call(action_id: Uuid, payload: Value) -> Self {
        Self::new(ExecutionEventKind::ToolCall, action_id, payload)
    }

    pub fn tool_result(action_id: Uuid, payload: Value) -> Self {
        Self::new(ExecutionEventKind::ToolResult, action_id, payload)
    }

    /// Successful end. `result` overrides the accumulated text output when set.
    pub fn end(action_id: Uuid, result: Option<String>) -> Self {
        let payload = match result {
            Some(result) => json!({ "result": result }),
            None => Value::Null,
        };
        Self::new(ExecutionEventKind::End, action_id, payload)
    }

    /// Unclassified error. The executor falls back to reading the message.
    pub fn error(action_id: Uuid, message: impl Into<String>) -> Self {
        Self::new(
            ExecutionEventKind::Error,
            action_id,
            json!({ "message": message.into() }),
        )
    }

    /// Error the backend has classified itself. The flag wins over whatever
    /// the message text says.
    pub fn classified_error(action_id: Uuid, message: impl Into<String>, rate_limited: bool) -> Self {
        Self::new(
            ExecutionEventKind::Error,
            action_id,
            json!({ "message": message.into(), "rate_limited": rate_limited }),
        )
    }

    /// Error that the backend positively identified as quota exhaustion.
    pub fn rate_limited(action_id: Uuid, message: impl Into<String>) -> Self {
        Self::classified_error(action_id, message, true)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.kind,
            ExecutionEventKind::End | ExecutionEventKind::Error
        )
    }

    /// Text carried by `text` events, or the message of an `error` event.
    pub fn text_content(&self) -> Option<&str> {
        match self.kind {
            ExecutionEventKind::Text => self.payload.get("text").and_then(Value::as_str),
            ExecutionEventKind::Error => self.payload.get("message").and_then(Value::as_str),
            _ => None,
        }
    }

    pub fn end_result(&self) -> Option<&str> {
        match self.kind {
            ExecutionEventKind::End => self.payload.get("result").and_then(Value::as_str),
            _ => None,
        }
    }

    /// The backend's own rate-limit verdict, if it gave one.
    pub fn rate_limit_flag(&self) -> Option<bool> {
        self.payload.get("rate_limited").and_then(Value::as_bool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_serializes_kebab_case() {
        let event = ExecutionEvent::tool_call(Uuid::new_v4(), json!({"name": "search"}));
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"tool-call\""));
    }

    #[test]
    fn accessors_read_payloads() {
        let id = Uuid::new_v4();
        assert_eq!(ExecutionEvent::text(id, "hi").text_content(), Some("hi"));
        assert_eq!(
            ExecutionEvent::error(id, "boom").text_content(),
            Some("boom")
        );
        assert_eq!(
            ExecutionEvent::end(id, Some("done".into())).end_result(),
            Some("done")
        );
        assert!(ExecutionEvent::end(id, None).end_result().is_none());
        assert_eq!(
            ExecutionEvent::rate_limited(id, "slow down").rate_limit_flag(),
            Some(true)
        );
        assert_eq!(
            ExecutionEvent::classified_error(id, "quota", false).rate_limit_flag(),
            Some(false)
        );
        assert_eq!(ExecutionEvent::error(id, "x").rate_limit_flag(), None);
    }
}
