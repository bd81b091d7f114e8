//! Server-Sent Events stream of work-log entries.

use std::collections::HashSet;
use std::convert::Infallible;
use std::time::Duration;

use ap_worklog::WorkEntry;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use tokio::sync::broadcast;
use tokio_stream::Stream;

use crate::api::AppState;

/// Recent entries replayed to a new subscriber before live ones.
const REPLAY: usize = 50;

fn entry_event(entry: &WorkEntry) -> Option<Event> {
    let json = serde_json::to_string(entry).ok()?;
    Some(Event::default().event("entry").id(entry.id.to_string()).data(json))
}

/// GET /events
pub async fn events_handler(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let work_log = state.controller.work_log();
    // Subscribe before reading the backlog so nothing falls in between.
    let mut rx = work_log.subscribe();
    let backlog = work_log.recent(REPLAY);

    let stream = async_stream::stream! {
        yield Ok(Event::default().event("connected").data("{}"));

        let mut replayed: HashSet<_> = backlog.iter().map(|e| e.id).collect();
        for entry in &backlog {
            if let Some(event) = entry_event(entry) {
                yield Ok(event);
            }
        }

        loop {
            match rx.recv().await {
                Ok(entry) => {
                    if replayed.remove(&entry.id) {
                        continue;
                    }
                    if let Some(event) = entry_event(&entry) {
                        yield Ok(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "SSE client lagged, some entries dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use ap_action::ProposedAction;
    use ap_engine::{ActionProposer, AutonomousController, ProposerContext, ProviderError};
    use ap_executor::ToolExecutor;
    use ap_goal::{GoalManager, MemoryGoalStore};
    use ap_worklog::{EntryStatus, WorkLog};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use axum::routing::get;
    use axum::Router;
    use tokio_stream::StreamExt;
    use tower::ServiceExt;

    struct Silent;

    #[async_trait]
    impl ActionProposer for Silent {
        async fn generate_actions(
            &self,
            _context: &ProposerContext,
            _desired_count: usize,
        ) -> Result<Vec<ProposedAction>, ProviderError> {
            Ok(Vec::new())
        }

        async fn observe(&self, _context: &ProposerContext) -> Result<String, ProviderError> {
            Ok(String::new())
        }
    }

    #[tokio::test]
    async fn replays_backlog_then_streams_live_entries() {
        let work_log = Arc::new(WorkLog::new());
        work_log.append("test", "before connect", EntryStatus::Info);
        let controller = AutonomousController::builder(
            GoalManager::new(Box::new(MemoryGoalStore::new())),
            Arc::new(Silent),
            ToolExecutor::new(),
        )
        .work_log(Arc::clone(&work_log))
        .build();
        let router = Router::new()
            .route("/events", get(events_handler))
            .with_state(AppState::new(controller));

        let response = router
            .oneshot(Request::builder().uri("/events").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(
            response.headers()["content-type"],
            "text/event-stream"
        );
        let mut body = response.into_body().into_data_stream();

        work_log.append("test", "after connect", EntryStatus::Success);

        let mut seen = String::new();
        let read = tokio::time::timeout(Duration::from_secs(5), async {
            while let Some(Ok(chunk)) = body.next().await {
                seen.push_str(&String::from_utf8_lossy(&chunk));
                if seen.contains("after connect") {
                    break;
                }
            }
        })
        .await;
        assert!(read.is_ok(), "stream stalled, got: {}", seen);

        let connected = seen.find("event: connected").unwrap();
        let before = seen.find("before connect").unwrap();
        let after = seen.find("after connect").unwrap();
        assert!(connected < before && before < after);
        assert_eq!(seen.matches("before connect").count(), 1);
    }
}
