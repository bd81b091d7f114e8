//! # ap-executor
//!
//! Runs one [`Action`](ap_action::Action) on the first available backend and
//! normalizes the backend's event stream.
//!
//! Backends implement [`ExecutionBackend`]: a pure availability query plus an
//! `execute` call that returns a stream of [`ExecutionEvent`]s ending in
//! either `end` or `error`. The [`ToolExecutor`] tries backends in
//! registration order and never re-checks availability mid-execution.
//!
//! Built-in backends:
//!
//! - [`CommandBackend`] - an agentic CLI; streams stdout lines
//! - [`HttpBackend`] - a plain request/response endpoint

pub mod backend;
pub mod command;
pub mod error;
pub mod event;
pub mod executor;
pub mod http;
pub mod rate_limit;

pub use backend::{EventStream, ExecutionBackend};
pub use command::CommandBackend;
pub use error::ExecutorError;
pub use event::{ExecutionEvent, ExecutionEventKind};
pub use executor::{ExecutionOutcome, OutcomeStatus, ToolExecutor};
pub use http::HttpBackend;
pub use rate_limit::is_rate_limit_message;
