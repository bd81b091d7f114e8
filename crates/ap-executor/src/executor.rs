// executor.rs - ToolExecutor: backend selection and stream normalization.
//
// Selection is a fixed priority order (registration order). An action that
// pins a backend via `plan.backend_id` gets that backend if it is available,
// otherwise selection falls back to the normal order. Availability is read
// once, before execution starts.

use std::sync::Arc;

use ap_action::Action;
use serde::{Deserialize, Serialize};
use tokio_stream::StreamExt;

use crate::backend::ExecutionBackend;
use crate::error::ExecutorError;
use crate::event::{ExecutionEvent, ExecutionEventKind};
use crate::rate_limit::is_rate_limit_message;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeStatus {
    Completed { result: String },
    Failed { error: String, rate_limited: bool },
}

/// What happened to one action on one backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionOutcome {
    pub backend_id: String,
    pub status: OutcomeStatus,
    pub event_count: usize,
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self.status, OutcomeStatus::Completed { .. })
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(
            self.status,
            OutcomeStatus::Failed {
                rate_limited: true,
                ..
            }
        )
    }
}

#[derive(Default)]
pub struct ToolExecutor {
    backends: Vec<Arc<dyn ExecutionBackend>>,
}

impl ToolExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend. Earlier registrations are preferred.
    pub fn register(&mut self, backend: Arc<dyn ExecutionBackend>) {
        tracing::debug!(backend = backend.id(), "backend registered");
        self.backends.push(backend);
    }

    pub fn with_backend(mut self, backend: Arc<dyn ExecutionBackend>) -> Self {
        self.register(backend);
        self
    }

    pub fn backend_ids(&self) -> Vec<String> {
        self.backends.iter().map(|b| b.id().to_string()).collect()
    }

    /// Ids of backends that currently report themselves available.
    pub fn available_backends(&self) -> Vec<String> {
        self.backends
            .iter()
            .filter(|b| b.is_available())
            .map(|b| b.id().to_string())
            .collect()
    }

    /// Pick the backend that would run `action` right now.
    pub fn select_backend(&self, action: &Action) -> Result<Arc<dyn ExecutionBackend>, ExecutorError> {
        if let Some(pinned) = action.plan.backend_id.as_deref() {
            if let Some(backend) = self
                .backends
                .iter()
                .find(|b| b.id() == pinned && b.is_available())
            {
                return Ok(Arc::clone(backend));
            }
            tracing::debug!(backend = pinned, "pinned backend unavailable, falling back");
        }

        self.backends
            .iter()
            .find(|b| b.is_available())
            .cloned()
            .ok_or_else(|| ExecutorError::NoBackendAvailable {
                registered: self.backend_ids().join(", "),
            })
    }

    /// Run `backend` on `action`, forwarding every event to `on_event` in the
    /// order the backend produced it.
    ///
    /// Events are stamped with the action's id. Anything after the first
    /// terminal event is dropped. A stream that stops without `end` or
    /// `error` counts as a failure.
    pub async fn run_on<F>(
        &self,
        backend: Arc<dyn ExecutionBackend>,
        action: &Action,
        mut on_event: F,
    ) -> ExecutionOutcome
    where
        F: FnMut(&ExecutionEvent) + Send,
    {
        let backend_id = backend.id().to_string();
        let mut stream = backend.execute(action);
        let mut output: Vec<String> = Vec::new();
        let mut event_count = 0;

        while let Some(mut event) = stream.next().await {
            event.action_id = action.id;
            event_count += 1;
            on_event(&event);

            match event.kind {
                ExecutionEventKind::Text => {
                    if let Some(text) = event.text_content() {
                        output.push(text.to_string());
                    }
                }
                ExecutionEventKind::End => {
                    let result = event
                        .end_result()
                        .map(str::to_string)
                        .unwrap_or_else(|| output.join("\n"));
                    return ExecutionOutcome {
                        backend_id,
                        status: OutcomeStatus::Completed { result },
                        event_count,
                    };
                }
                ExecutionEventKind::Error => {
                    let error = event
                        .text_content()
                        .unwrap_or("backend reported an error")
                        .to_string();
                    let rate_limited = event
                        .rate_limit_flag()
                        .unwrap_or_else(|| is_rate_limit_message(&error));
                    return ExecutionOutcome {
                        backend_id,
                        status: OutcomeStatus::Failed {
                            error,
                            rate_limited,
                        },
                        event_count,
                    };
                }
                ExecutionEventKind::Start
                | ExecutionEventKind::ToolCall
                | ExecutionEventKind::ToolResult => {}
            }
        }

        tracing::warn!(backend = %backend_id, action_id = %action.id, "stream ended without a terminal event");
        ExecutionOutcome {
            backend_id,
            status: OutcomeStatus::Failed {
                error: "backend stream ended without end or error".to_string(),
                rate_limited: false,
            },
            event_count,
        }
    }

    /// Select a backend and run `action` on it.
    pub async fn execute<F>(&self, action: &Action, on_event: F) -> Result<ExecutionOutcome, ExecutorError>
    where
        F: FnMut(&ExecutionEvent) + Send,
    {
        let backend = self.select_backend(action)?;
        tracing::info!(backend = backend.id(), action_id = %action.id, "dispatching action");
        Ok(self.run_on(backend, action, on_event).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::EventStream;
    use ap_action::{ActionType, ProposedAction};
    use chrono::Utc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use uuid::Uuid;

    struct Scripted {
        id: &'static str,
        available: AtomicBool,
        events: Vec<ExecutionEventKind>,
    }

    impl Scripted {
        fn new(id: &'static str, available: bool, events: Vec<ExecutionEventKind>) -> Arc<Self> {
            Arc::new(Self {
                id,
                available: AtomicBool::new(available),
                events,
            })
        }
    }

    impl ExecutionBackend for Scripted {
        fn id(&self) -> &str {
            self.id
        }

        fn is_available(&self) -> bool {
            self.available.load(Ordering::SeqCst)
        }

        fn execute(&self, _action: &Action) -> EventStream {
            // Deliberately stamp a foreign id to check the executor overrides it.
            let foreign = Uuid::new_v4();
            let events: Vec<ExecutionEvent> = self
                .events
                .iter()
                .map(|kind| match kind {
                    ExecutionEventKind::Start => ExecutionEvent::start(foreign, self.id),
                    ExecutionEventKind::Text => ExecutionEvent::text(foreign, "chunk"),
                    ExecutionEventKind::End => ExecutionEvent::end(foreign, None),
                    ExecutionEventKind::Error => ExecutionEvent::error(foreign, "rate_limited"),
                    other => ExecutionEvent::new(*other, foreign, serde_json::Value::Null),
                })
                .collect();
            Box::pin(tokio_stream::iter(events))
        }
    }

    /// Replays fixed events, for checking how error payloads are read.
    struct Replay(Vec<ExecutionEvent>);

    impl ExecutionBackend for Replay {
        fn id(&self) -> &str {
            "replay"
        }

        fn is_available(&self) -> bool {
            true
        }

        fn execute(&self, _action: &Action) -> EventStream {
            Box::pin(tokio_stream::iter(self.0.clone()))
        }
    }

    async fn failure_of(event: ExecutionEvent) -> bool {
        let executor = ToolExecutor::new().with_backend(Arc::new(Replay(vec![event])));
        let outcome = executor.execute(&action(), |_| {}).await.unwrap();
        assert!(!outcome.is_success());
        outcome.is_rate_limited()
    }

    fn action() -> Action {
        let mut action = Action::from_proposal(
            ProposedAction::new("Research X", ActionType::Research),
            false,
            Utc::now(),
        );
        action.approve().unwrap();
        action
    }

    #[test]
    fn selects_first_available_in_order() {
        let executor = ToolExecutor::new()
            .with_backend(Scripted::new("agentic", false, vec![]))
            .with_backend(Scripted::new("plain", true, vec![]));
        assert_eq!(executor.select_backend(&action()).unwrap().id(), "plain");
        assert_eq!(executor.available_backends(), vec!["plain".to_string()]);
    }

    #[test]
    fn pinned_backend_wins_when_available() {
        let executor = ToolExecutor::new()
            .with_backend(Scripted::new("agentic", true, vec![]))
            .with_backend(Scripted::new("plain", true, vec![]));
        let mut action = action();
        action.plan.backend_id = Some("plain".into());
        assert_eq!(executor.select_backend(&action).unwrap().id(), "plain");
    }

    #[test]
    fn no_backend_is_an_error() {
        let executor = ToolExecutor::new().with_backend(Scripted::new("agentic", false, vec![]));
        assert!(matches!(
            executor.select_backend(&action()),
            Err(ExecutorError::NoBackendAvailable { .. })
        ));
    }

    #[tokio::test]
    async fn end_completes_with_accumulated_text() {
        use ExecutionEventKind::*;
        let executor =
            ToolExecutor::new().with_backend(Scripted::new("agentic", true, vec![Start, Text, Text, End]));
        let action = action();
        let mut seen = Vec::new();
        let outcome = executor
            .execute(&action, |e| seen.push((e.kind, e.action_id)))
            .await
            .unwrap();

        assert_eq!(
            outcome.status,
            OutcomeStatus::Completed {
                result: "chunk\nchunk".into()
            }
        );
        assert_eq!(seen.len(), 4);
        assert!(seen.iter().all(|(_, id)| *id == action.id));
        assert_eq!(seen.last().unwrap().0, End);
    }

    #[tokio::test]
    async fn error_fails_and_flags_rate_limit() {
        use ExecutionEventKind::*;
        let executor =
            ToolExecutor::new().with_backend(Scripted::new("agentic", true, vec![Start, Error, Text]));
        let mut count = 0;
        let outcome = executor.execute(&action(), |_| count += 1).await.unwrap();

        assert!(outcome.is_rate_limited());
        assert!(!outcome.is_success());
        // The trailing text after the terminal event is never forwarded.
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn explicit_flag_overrides_message_text() {
        let id = Uuid::new_v4();
        assert!(!failure_of(ExecutionEvent::classified_error(id, "quota dashboard unreachable", false)).await);
        assert!(failure_of(ExecutionEvent::classified_error(id, "upstream said no", true)).await);
        assert!(failure_of(ExecutionEvent::error(id, "Rate limit exceeded")).await);
        assert!(
            !failure_of(ExecutionEvent::error(
                id,
                "HTTP 500 Internal Server Error: trace id 7f4290ab"
            ))
            .await
        );
    }

    #[tokio::test]
    async fn missing_terminal_event_is_failure() {
        use ExecutionEventKind::*;
        let executor = ToolExecutor::new().with_backend(Scripted::new("agentic", true, vec![Start, Text]));
        let outcome = executor.execute(&action(), |_| {}).await.unwrap();
        assert!(matches!(outcome.status, OutcomeStatus::Failed { rate_limited: false, .. }));
    }
}
