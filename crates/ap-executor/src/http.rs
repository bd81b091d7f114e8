//! Plain request/response backend - one POST per action, no tool use.

use std::time::Duration;

use ap_action::Action;
use reqwest::StatusCode;
use serde_json::{json, Value};

use crate::backend::{EventStream, ExecutionBackend};
use crate::command::DEFAULT_TIMEOUT;
use crate::error::ExecutorError;
use crate::event::ExecutionEvent;

/// POSTs the action as JSON to `endpoint` and treats the response body as
/// the action's output.
///
/// Request body: `{action_id, title, type, prompt, parameters}`.
/// Response: JSON with an `output`, `result` or `text` string field, or any
/// plain text body. HTTP 429 is reported as a rate-limit error.
pub struct HttpBackend {
    id: String,
    endpoint: String,
    client: reqwest::Client,
    bearer_token: Option<String>,
    enabled: bool,
    timeout: Duration,
}

impl HttpBackend {
    pub fn new(id: impl Into<String>, endpoint: impl Into<String>) -> Result<Self, ExecutorError> {
        Self::with_timeout(id, endpoint, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(
        id: impl Into<String>,
        endpoint: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ExecutorError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            id: id.into(),
            endpoint: endpoint.into(),
            client,
            bearer_token: None,
            enabled: true,
            timeout,
        })
    }

    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }
}

impl ExecutionBackend for HttpBackend {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_available(&self) -> bool {
        self.enabled && !self.endpoint.trim().is_empty()
    }

    fn execute(&self, action: &Action) -> EventStream {
        let backend_id = self.id.clone();
        let action_id = action.id;
        let timeout = self.timeout;
        let body = json!({
            "action_id": action.id,
            "title": action.title,
            "type": action.action_type,
            "prompt": action.plan.prompt,
            "parameters": action.plan.parameters,
        });
        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }

        Box::pin(async_stream::stream! {
            yield ExecutionEvent::start(action_id, &backend_id);

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) if e.is_timeout() => {
                    yield ExecutionEvent::error(
                        action_id,
                        format!("request timed out after {}s", timeout.as_secs()),
                    );
                    return;
                }
                Err(e) => {
                    yield ExecutionEvent::error(action_id, format!("request failed: {}", e));
                    return;
                }
            };

            let status = response.status();
            let text = match response.text().await {
                Ok(text) => text,
                Err(e) => {
                    yield ExecutionEvent::error(action_id, format!("failed reading response: {}", e));
                    return;
                }
            };

            if status == StatusCode::TOO_MANY_REQUESTS {
                yield ExecutionEvent::rate_limited(action_id, format!("rate_limited: {}", text.trim()));
                return;
            }
            if !status.is_success() {
                yield ExecutionEvent::classified_error(
                    action_id,
                    format!("HTTP {}: {}", status, text.trim()),
                    false,
                );
                return;
            }

            let output = extract_output(&text);
            yield ExecutionEvent::text(action_id, output.clone());
            yield ExecutionEvent::end(action_id, Some(output));
        })
    }
}

fn extract_output(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        for key in ["output", "result", "text"] {
            if let Some(text) = value.get(key).and_then(Value::as_str) {
                return text.to_string();
            }
        }
    }
    body.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_output_prefers_known_fields() {
        assert_eq!(extract_output(r#"{"output":"a","result":"b"}"#), "a");
        assert_eq!(extract_output(r#"{"result":"b"}"#), "b");
        assert_eq!(extract_output("plain body"), "plain body");
        assert_eq!(extract_output(r#"{"other":1}"#), r#"{"other":1}"#);
    }

    #[test]
    fn availability_follows_config() {
        let mut backend = HttpBackend::new("plain", "http://127.0.0.1:9/run").unwrap();
        assert!(backend.is_available());
        backend.set_enabled(false);
        assert!(!backend.is_available());

        let empty = HttpBackend::new("plain", "  ").unwrap();
        assert!(!empty.is_available());
    }
}
