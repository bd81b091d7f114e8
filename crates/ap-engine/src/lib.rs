//! # ap-engine
//!
//! The Autopilot autonomy loop.
//!
//! [`AutonomousController`] repeatedly selects the highest-priority goal,
//! asks an [`ActionProposer`] for candidate actions, runs them through the
//! approval policy, dispatches approved ones to the tool executor one at a
//! time, and decides how long to rest before the next cycle:
//!
//! | Outcome | Rest |
//! |---|---|
//! | normal cycle (including failures) | 15 min |
//! | any rate-limit signal | 30 min |
//! | cycle lands in quiet hours | 60 min, no work |
//!
//! ## Key invariants
//!
//! - **One running action**: only the loop executes, and cycles never overlap.
//! - **Never fatal after startup**: proposer, backend and store failures turn
//!   into a work-log entry plus a rest. Only `initialize()` can fail hard.
//! - **Deterministic time**: every scheduling decision reads a [`Clock`];
//!   tests use [`ManualClock`] and drive [`AutonomousController::run_cycle`].

pub mod clock;
pub mod config;
pub mod context;
pub mod controller;
pub mod error;
pub mod events;
pub mod handoff;
pub mod proposer;
pub mod rejections;
pub mod schedule;
pub mod state;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigUpdate, EngineConfig, QuietHours, MIN_REST_MS};
pub use context::{ContextProvider, ContextRegistry, ProposerContext};
pub use controller::{AutonomousController, ControllerBuilder, GOAL_ABANDONED, INTERRUPTED_BY_RESTART};
pub use error::{ConfigError, EngineError, ProviderError, StoreError};
pub use events::{EngineEvent, EngineObserver, EventDispatcher};
pub use handoff::HandoffContext;
pub use proposer::ActionProposer;
pub use schedule::RestLevel;
pub use state::{CycleReport, EngineMode, EngineState, EngineStatus};
pub use store::{EngineSnapshot, JsonStateStore, MemoryStateStore, StateStore};
