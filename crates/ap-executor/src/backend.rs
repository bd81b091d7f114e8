//! Core ExecutionBackend trait

use std::pin::Pin;

use ap_action::Action;
use tokio_stream::Stream;

use crate::event::ExecutionEvent;

/// Boxed event stream returned by [`ExecutionBackend::execute`].
pub type EventStream = Pin<Box<dyn Stream<Item = ExecutionEvent> + Send>>;

/// Pluggable adapter that can run one action.
///
/// The selection loop is backend-agnostic: it only asks `is_available()` and
/// consumes the stream. How a backend decides it is available (binary on
/// PATH, endpoint configured, logged in) stays inside the backend.
pub trait ExecutionBackend: Send + Sync {
    /// Stable identifier used in config, logs and `Action::plan.backend_id`.
    fn id(&self) -> &str;

    /// Whether this backend can take work right now.
    fn is_available(&self) -> bool;

    /// Start running `action`.
    ///
    /// The stream must end with exactly one `end` or `error` event. Backends
    /// enforce their own timeout; the executor never force-aborts a stream.
    fn execute(&self, action: &Action) -> EventStream;
}
