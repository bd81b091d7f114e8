//! # ap-worklog
//!
//! Append-only record of everything the engine does.
//!
//! Every state transition and action lifecycle change becomes one
//! [`WorkEntry`] `{source, message, status, timestamp}`. Entries are
//! immutable once written and are fanned out, in emission order, to
//! broadcast subscribers and to [`LogSink`]s. Appending never waits on a
//! subscriber.
//!
//! ## Quick Example
//!
//! ```rust,no_run
//! use ap_worklog::{EntryStatus, JsonlSink, WorkLog};
//!
//! let log = WorkLog::new();
//! log.add_sink(Box::new(JsonlSink::open("/tmp/work.jsonl").unwrap()));
//! let _rx = log.subscribe();
//! log.append("controller", "cycle started", EntryStatus::Info);
//! ```

pub mod entry;
pub mod error;
pub mod hasher;
pub mod log;
pub mod sink;

pub use entry::{EntryStatus, WorkEntry};
pub use error::WorkLogError;
pub use log::WorkLog;
pub use sink::{ChainedEntry, JsonlSink, LogSink};
