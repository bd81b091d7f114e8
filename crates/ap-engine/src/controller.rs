// controller.rs - AutonomousController: the engine's state machine.
//
// One cycle:
//
//   quiet-hours check -> SELECTING -> PROPOSING -> policy filter
//     -> EXECUTING (one approved action at a time) -> handoff + save -> RESTING
//
// Controller-owned state sits behind one std mutex that is never held across
// an await. Cycles are serialized by an async mutex and only a cycle ever
// executes an action, so at most one action is running per engine.
// Approvals only flip status; the next cycle picks approved actions up.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use ap_action::{Action, ProposedAction};
use ap_executor::{ExecutionEvent, ExecutionEventKind, OutcomeStatus, ToolExecutor};
use ap_goal::{Goal, GoalManager};
use ap_policy::{ApprovalPolicy, ApprovalQueue};
use ap_worklog::{EntryStatus, WorkLog};
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::config::{ConfigUpdate, EngineConfig};
use crate::context::{ContextRegistry, ProposerContext, GOAL_KEY, HANDOFF_KEY};
use crate::error::{EngineError, ProviderError, StoreError};
use crate::events::{EngineEvent, EngineObserver, EventDispatcher};
use crate::handoff::HandoffContext;
use crate::proposer::ActionProposer;
use crate::rejections::{RejectionMemory, REJECTION_MEMORY_LIMIT};
use crate::schedule::{in_quiet_hours, level_for, rest_delay, to_chrono, RestLevel};
use crate::state::{CycleReport, EngineMode, EngineState, EngineStatus};
use crate::store::{EngineSnapshot, MemoryStateStore, StateStore};

const SOURCE: &str = "controller";

/// Terminal actions kept in memory and in snapshots. Older ones are dropped;
/// their rejection fingerprints are kept separately.
pub const ACTION_HISTORY_LIMIT: usize = 500;

/// Failure message given to actions found `running` at startup.
pub const INTERRUPTED_BY_RESTART: &str = "interrupted by restart";

/// Rejection reason used when a goal is abandoned under pending actions.
pub const GOAL_ABANDONED: &str = "goal abandoned";

struct Core {
    goals: GoalManager,
    actions: BTreeMap<Uuid, Action>,
    queue: ApprovalQueue,
    policy: ApprovalPolicy,
    state: EngineState,
    handoff: Option<HandoffContext>,
    rejected: RejectionMemory,
    last_error: Option<String>,
    config: EngineConfig,
    store: Box<dyn StateStore>,
    initialized: bool,
}

struct LoopHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

struct Inner {
    core: Mutex<Core>,
    proposer: Arc<dyn ActionProposer>,
    executor: ToolExecutor,
    clock: Arc<dyn Clock>,
    context: ContextRegistry,
    work_log: Arc<WorkLog>,
    events: EventDispatcher,
    cycle: tokio::sync::Mutex<()>,
    runner: Mutex<Option<LoopHandle>>,
    wake: Notify,
}

/// Handle to the engine. Cheap to clone; every clone drives the same engine.
#[derive(Clone)]
pub struct AutonomousController {
    inner: Arc<Inner>,
}

pub struct ControllerBuilder {
    goals: GoalManager,
    proposer: Arc<dyn ActionProposer>,
    executor: ToolExecutor,
    store: Box<dyn StateStore>,
    clock: Arc<dyn Clock>,
    context: ContextRegistry,
    work_log: Arc<WorkLog>,
    events: EventDispatcher,
    config: EngineConfig,
}

impl ControllerBuilder {
    pub fn state_store(mut self, store: impl StateStore + 'static) -> Self {
        self.store = Box::new(store);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn context(mut self, context: ContextRegistry) -> Self {
        self.context = context;
        self
    }

    pub fn work_log(mut self, work_log: Arc<WorkLog>) -> Self {
        self.work_log = work_log;
        self
    }

    pub fn observer(mut self, observer: Arc<dyn EngineObserver>) -> Self {
        self.events.add_observer(observer);
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> AutonomousController {
        let state = EngineState {
            cycle_interval_ms: self.config.cycle_interval_ms,
            ..EngineState::default()
        };
        let core = Core {
            goals: self.goals,
            actions: BTreeMap::new(),
            queue: ApprovalQueue::new(),
            policy: ApprovalPolicy::new(self.config.auto_approve_types.clone()),
            state,
            handoff: None,
            rejected: RejectionMemory::default(),
            last_error: None,
            config: self.config,
            store: self.store,
            initialized: false,
        };
        AutonomousController {
            inner: Arc::new(Inner {
                core: Mutex::new(core),
                proposer: self.proposer,
                executor: self.executor,
                clock: self.clock,
                context: self.context,
                work_log: self.work_log,
                events: self.events,
                cycle: tokio::sync::Mutex::new(()),
                runner: Mutex::new(None),
                wake: Notify::new(),
            }),
        }
    }
}

/// Result of trying to run one approved action.
enum Executed {
    Completed(Action),
    Failed { action: Action, rate_limited: bool },
    /// Nothing ran; the action stays approved for a later cycle.
    NotStarted,
}

impl AutonomousController {
    /// Start building a controller. Defaults: in-memory state store, system
    /// clock, no context providers, a fresh work log, default config.
    pub fn builder(
        goals: GoalManager,
        proposer: Arc<dyn ActionProposer>,
        executor: ToolExecutor,
    ) -> ControllerBuilder {
        ControllerBuilder {
            goals,
            proposer,
            executor,
            store: Box::new(MemoryStateStore::new()),
            clock: Arc::new(SystemClock),
            context: ContextRegistry::new(),
            work_log: Arc::new(WorkLog::new()),
            events: EventDispatcher::new(),
            config: EngineConfig::default(),
        }
    }

    // ── Lifecycle ──────────────────────────────────────────────────

    /// Load goals and engine state. A store failure here is fatal: the
    /// engine refuses to start and `last_error()` says why.
    ///
    /// Actions found `running` were cut off by a restart and become
    /// `failed`. Pending approvals are re-queued.
    pub fn initialize(&self) -> Result<(), EngineError> {
        let now = self.inner.clock.now();
        let mut guard = self.core();
        let core = &mut *guard;

        let (goal_count, snapshot) = match core.load() {
            Ok(loaded) => loaded,
            Err(e) => {
                tracing::error!(error = %e, "engine initialization failed");
                let message = format!("initialization failed: {}", e);
                core.last_error = Some(message.clone());
                drop(guard);
                self.log(message, EntryStatus::Failed);
                return Err(EngineError::Store(e));
            }
        };

        core.actions.clear();
        core.queue = ApprovalQueue::new();
        let mut interrupted = 0;
        for mut action in snapshot.actions {
            if action.status == ap_action::ActionStatus::Running
                && action.fail(INTERRUPTED_BY_RESTART, now).is_ok()
            {
                interrupted += 1;
            }
            if action.is_pending_approval() {
                if let Err(e) = core.queue.enqueue(&action, action.proposed_at) {
                    tracing::warn!(action_id = %action.id, error = %e, "could not re-queue pending action");
                }
            }
            core.actions.insert(action.id, action);
        }
        core.handoff = snapshot.handoff;
        core.rejected =
            RejectionMemory::restore(snapshot.rejected_fingerprints, REJECTION_MEMORY_LIMIT);
        core.state.mode = EngineMode::Idle;
        core.last_error = None;
        core.initialized = true;
        if interrupted > 0 {
            core.persist(&self.inner.work_log, now);
        }

        let message = format!(
            "initialized: {} goals, {} actions ({} pending approval, {} interrupted)",
            goal_count,
            core.actions.len(),
            core.queue.len(),
            interrupted
        );
        drop(guard);
        tracing::info!(goals = goal_count, interrupted, "engine initialized");
        self.log(message, EntryStatus::Info);
        Ok(())
    }

    /// Spawn the autonomous loop. The first cycle starts immediately.
    /// Calling this while the loop is already running is a no-op.
    pub fn start_autonomous_loop(&self) -> Result<(), EngineError> {
        self.core().ensure_initialized()?;

        let mut runner = self.runner();
        if runner.as_ref().is_some_and(|h| !h.task.is_finished()) {
            tracing::debug!("autonomous loop already running");
            return Ok(());
        }
        let token = CancellationToken::new();
        let task = tokio::spawn(self.clone().run_loop(token.clone()));
        *runner = Some(LoopHandle { token, task });
        drop(runner);

        tracing::info!("autonomous loop started");
        self.log("autonomous loop started", EntryStatus::Info);
        Ok(())
    }

    /// Stop scheduling new cycles. An action already running is left to
    /// finish or hit its backend's own timeout.
    pub fn stop(&self) {
        let handle = self.runner().take();
        if let Some(handle) = handle {
            handle.token.cancel();
            tracing::info!("autonomous loop stop requested");
            self.log("stop requested, no new cycles will start", EntryStatus::Info);
        }
    }

    /// `stop()` and wait for the loop task to exit.
    pub async fn shutdown(&self) {
        let handle = self.runner().take();
        if let Some(handle) = handle {
            handle.token.cancel();
            if let Err(e) = handle.task.await {
                tracing::warn!(error = %e, "autonomous loop task ended abnormally");
            }
            self.log("autonomous loop stopped", EntryStatus::Info);
        }
    }

    pub fn is_running(&self) -> bool {
        self.runner()
            .as_ref()
            .is_some_and(|h| !h.token.is_cancelled() && !h.task.is_finished())
    }

    pub fn last_error(&self) -> Option<String> {
        self.core().last_error.clone()
    }

    /// Run one cycle now. Waits for any cycle already in progress.
    pub async fn trigger_cycle(&self) -> Result<CycleReport, EngineError> {
        self.log("cycle triggered manually", EntryStatus::Info);
        self.run_cycle().await
    }

    // ── The cycle ──────────────────────────────────────────────────

    /// Run a single cycle and return what it did. The loop calls this on
    /// its timer; tests call it directly.
    ///
    /// Only a missing `initialize()` is an error. Proposer, backend and
    /// store failures are logged and folded into the rest decision.
    pub async fn run_cycle(&self) -> Result<CycleReport, EngineError> {
        let _cycle = self.inner.cycle.lock().await;
        let started_at = self.inner.clock.now();
        let mut report = CycleReport {
            started_at,
            goal_id: None,
            quiet_hours: false,
            proposed: Vec::new(),
            queued: Vec::new(),
            completed: Vec::new(),
            failed: Vec::new(),
            provider_error: None,
            rest_level: RestLevel::Normal,
            delay_ms: 0,
            next_cycle_at: started_at,
        };

        let quiet = {
            let mut core = self.core();
            core.ensure_initialized()?;
            core.state.last_cycle_at = Some(started_at);
            in_quiet_hours(&core.config, self.inner.clock.local_time())
        };
        if quiet {
            tracing::info!("inside quiet hours, skipping cycle");
            self.log("quiet hours, no work this cycle", EntryStatus::Skipped);
            report.quiet_hours = true;
            return Ok(self.finish_cycle(report, RestLevel::QuietHours));
        }

        // SELECTING
        let (goal, handoff, handoff_expired, desired) = {
            let mut guard = self.core();
            let core = &mut *guard;
            core.enter(EngineMode::Selecting, &self.inner.work_log);
            let expired = core.handoff.as_ref().is_some_and(|h| h.is_expired(started_at));
            if expired {
                core.handoff = None;
            }
            let goal = core.goals.select_next_goal().cloned();
            core.state.current_goal_id = goal.as_ref().map(|g| g.id);
            (goal, core.handoff.clone(), expired, core.config.desired_actions)
        };
        if handoff_expired {
            self.log("previous handoff expired, discarded", EntryStatus::Info);
        }
        report.goal_id = goal.as_ref().map(|g| g.id);
        match &goal {
            Some(goal) => {
                tracing::info!(goal_id = %goal.id, title = %goal.title, "selected goal");
                self.log(
                    format!("selected goal '{}' (priority {})", goal.title, goal.priority),
                    EntryStatus::Info,
                );
            }
            None => self.log("no active goal, proposing without one", EntryStatus::Info),
        }

        // PROPOSING
        self.core().enter(EngineMode::Proposing, &self.inner.work_log);
        let context = self.build_context(goal.as_ref(), handoff.as_ref());
        let mut rate_limited = false;
        let mut provider_failed = false;
        let proposals = match self.inner.proposer.generate_actions(&context, desired).await {
            Ok(proposals) => proposals,
            Err(e) => {
                provider_failed = true;
                rate_limited |= e.is_rate_limited();
                tracing::warn!(error = %e, rate_limited, "proposer failed");
                self.record_error(format!("proposer failed: {}", e));
                self.log(format!("proposer failed: {}", e), EntryStatus::Failed);
                report.provider_error = Some(e.to_string());
                Vec::new()
            }
        };

        let proposals_event = {
            let now = self.inner.clock.now();
            let mut core = self.core();
            let goal_id = goal.as_ref().map(|g| g.id);
            let (proposed, queued) = core.admit(proposals, goal_id, now, &self.inner.work_log);
            let event = (!proposed.is_empty()).then(|| EngineEvent::ProposalsUpdated {
                proposed: proposed.clone(),
                auto_approved: proposed.len() - queued.len(),
                pending_approval: core.queue.len(),
                timestamp: now,
            });
            report.proposed = proposed;
            report.queued = queued;
            event
        };
        if let Some(event) = proposals_event {
            self.inner.events.dispatch(&event);
        }

        // EXECUTING. A failed proposer call ends the cycle here; approved
        // actions wait for the next one.
        let mut last_action: Option<Action> = None;
        if provider_failed {
            self.log("skipping execution after proposer failure", EntryStatus::Skipped);
        } else if !rate_limited {
            loop {
                let next = self.core().next_approved();
                let Some(action) = next else { break };
                match self.execute_action(action).await {
                    Executed::Completed(action) => {
                        report.completed.push(action.id);
                        last_action = Some(action);
                    }
                    Executed::Failed {
                        action,
                        rate_limited: limited,
                    } => {
                        report.failed.push(action.id);
                        last_action = Some(action);
                        if limited {
                            // Leave the rest approved for after the long rest.
                            rate_limited = true;
                            break;
                        }
                    }
                    Executed::NotStarted => break,
                }
            }
        }

        // Handoff + persistence
        {
            let now = self.inner.clock.now();
            let mut guard = self.core();
            let core = &mut *guard;
            let fresh_goal = goal.as_ref().and_then(|g| core.goals.get_goal(g.id)).cloned();
            if fresh_goal.is_some() || last_action.is_some() {
                let ttl = to_chrono(Duration::from_millis(core.config.handoff_ttl_ms));
                core.handoff = Some(HandoffContext::new(
                    fresh_goal.as_ref(),
                    last_action.as_ref(),
                    now,
                    ttl,
                ));
            }
            core.prune_history();
            core.persist(&self.inner.work_log, now);
        }

        Ok(self.finish_cycle(report, level_for(rate_limited)))
    }

    fn finish_cycle(&self, mut report: CycleReport, level: RestLevel) -> CycleReport {
        let now = self.inner.clock.now();
        let delay = {
            let mut core = self.core();
            let delay = rest_delay(level, &core.config);
            core.enter(EngineMode::Resting, &self.inner.work_log);
            core.state.current_action_id = None;
            core.state.rest_level = level;
            core.state.next_cycle_at = Some(now + to_chrono(delay));
            delay
        };

        report.rest_level = level;
        report.delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        report.next_cycle_at = now + to_chrono(delay);
        tracing::info!(
            rest = %level,
            minutes = delay.as_secs() / 60,
            next_cycle_at = %report.next_cycle_at,
            "cycle finished"
        );
        self.log(
            format!("resting {} min ({})", delay.as_secs() / 60, level),
            EntryStatus::Info,
        );
        self.inner.wake.notify_waiters();
        report
    }

    async fn execute_action(&self, action: Action) -> Executed {
        let backend = match self.inner.executor.select_backend(&action) {
            Ok(backend) => backend,
            Err(e) => {
                tracing::warn!(action_id = %action.id, error = %e, "no backend for action");
                self.record_error(e.to_string());
                self.log(
                    format!("cannot run '{}' yet: {}", action.title, e),
                    EntryStatus::Warning,
                );
                return Executed::NotStarted;
            }
        };

        let started_at = self.inner.clock.now();
        let running = {
            let mut guard = self.core();
            let core = &mut *guard;
            let Some(stored) = core.actions.get_mut(&action.id) else {
                return Executed::NotStarted;
            };
            if let Err(e) = stored.start(backend.id(), started_at) {
                tracing::warn!(action_id = %action.id, error = %e, "action could not start");
                return Executed::NotStarted;
            }
            let running = stored.clone();
            core.enter(EngineMode::Executing, &self.inner.work_log);
            core.state.current_action_id = Some(running.id);
            if let Some(goal_id) = running.goal_id {
                if let Err(e) = core.goals.activate(goal_id) {
                    tracing::debug!(goal_id = %goal_id, error = %e, "goal not activated");
                }
            }
            running
        };

        tracing::info!(action_id = %running.id, backend = backend.id(), title = %running.title, "action started");
        self.log(
            format!("started '{}' on {}", running.title, backend.id()),
            EntryStatus::Running,
        );
        self.inner.events.dispatch(&EngineEvent::ActionStarted {
            action_id: running.id,
            goal_id: running.goal_id,
            title: running.title.clone(),
            backend_id: backend.id().to_string(),
            timestamp: started_at,
        });

        let work_log = Arc::clone(&self.inner.work_log);
        let outcome = self
            .inner
            .executor
            .run_on(backend, &running, move |event| forward_execution_event(&work_log, event))
            .await;

        let finished_at = self.inner.clock.now();
        let mut events = Vec::new();
        let executed = {
            let mut guard = self.core();
            let core = &mut *guard;
            core.state.current_action_id = None;
            let progress_per_action = core.config.progress_per_action;

            let Some(stored) = core.actions.get_mut(&running.id) else {
                return Executed::NotStarted;
            };
            let transition = match &outcome.status {
                OutcomeStatus::Completed { result } => stored.complete(result.clone(), finished_at),
                OutcomeStatus::Failed { error, .. } => stored.fail(error.clone(), finished_at),
            };
            if let Err(e) = transition {
                tracing::warn!(action_id = %running.id, error = %e, "could not record outcome");
            }
            let finished = stored.clone();

            match &outcome.status {
                OutcomeStatus::Completed { result } => {
                    events.push(EngineEvent::ActionCompleted {
                        action_id: finished.id,
                        goal_id: finished.goal_id,
                        title: finished.title.clone(),
                        result: result.clone(),
                        timestamp: finished_at,
                    });
                    if let Some(goal_id) = finished.goal_id {
                        match core.goals.update_progress(goal_id, progress_per_action) {
                            Ok(progress) => events.push(EngineEvent::GoalProgress(progress)),
                            Err(e) => {
                                tracing::debug!(goal_id = %goal_id, error = %e, "progress not recorded")
                            }
                        }
                    }
                    Executed::Completed(finished)
                }
                OutcomeStatus::Failed {
                    error,
                    rate_limited,
                } => {
                    events.push(EngineEvent::ActionFailed {
                        action_id: finished.id,
                        goal_id: finished.goal_id,
                        title: finished.title.clone(),
                        error: error.clone(),
                        rate_limited: *rate_limited,
                        timestamp: finished_at,
                    });
                    if *rate_limited {
                        core.last_error = Some(format!("rate limited: {}", error));
                    }
                    Executed::Failed {
                        action: finished,
                        rate_limited: *rate_limited,
                    }
                }
            }
        };

        match &executed {
            Executed::Completed(action) => {
                tracing::info!(action_id = %action.id, "action completed");
                self.log(format!("completed '{}'", action.title), EntryStatus::Success);
            }
            Executed::Failed {
                action,
                rate_limited,
            } => {
                let error = action.error.as_deref().unwrap_or("unknown error");
                tracing::warn!(action_id = %action.id, error, rate_limited, "action failed");
                self.log(format!("failed '{}': {}", action.title, error), EntryStatus::Failed);
                if *rate_limited {
                    self.log(
                        format!("rate limit reported by {}", outcome.backend_id),
                        EntryStatus::Warning,
                    );
                }
            }
            Executed::NotStarted => {}
        }
        for event in &events {
            if let EngineEvent::GoalProgress(progress) = event {
                let status = if progress.completed {
                    EntryStatus::Success
                } else {
                    EntryStatus::Info
                };
                self.log(
                    format!(
                        "goal '{}' progress {:.0}% -> {:.0}%",
                        progress.title,
                        progress.previous * 100.0,
                        progress.progress * 100.0
                    ),
                    status,
                );
            }
        }
        self.inner.events.dispatch_all(events);
        executed
    }

    async fn run_loop(self, token: CancellationToken) {
        loop {
            if token.is_cancelled() {
                break;
            }
            if let Err(e) = self.run_cycle().await {
                tracing::error!(error = %e, "cycle aborted");
                self.record_error(e.to_string());
                let interval = rest_delay(RestLevel::Normal, &self.core().config);
                let next = self.inner.clock.now() + to_chrono(interval);
                self.core().state.next_cycle_at = Some(next);
            }

            // Rest until `next_cycle_at`. A manual cycle moves the deadline
            // and wakes us to re-read it.
            loop {
                let delay = self.until_next_cycle();
                tokio::select! {
                    _ = token.cancelled() => {
                        self.core().enter(EngineMode::Idle, &self.inner.work_log);
                        return;
                    }
                    _ = tokio::time::sleep(delay) => break,
                    _ = self.inner.wake.notified() => continue,
                }
            }
            self.core().enter(EngineMode::Idle, &self.inner.work_log);
        }
        self.core().enter(EngineMode::Idle, &self.inner.work_log);
    }

    fn until_next_cycle(&self) -> Duration {
        let next = self.core().state.next_cycle_at;
        let now = self.inner.clock.now();
        next.and_then(|next| (next - now).to_std().ok())
            .unwrap_or(Duration::ZERO)
    }

    // ── Approval API ───────────────────────────────────────────────

    /// Approve a pending action. It runs in the next executing phase.
    pub fn approve_action(&self, action_id: Uuid) -> Result<Action, EngineError> {
        let now = self.inner.clock.now();
        let (approved, pending) = {
            let mut guard = self.core();
            let core = &mut *guard;
            core.ensure_initialized()?;
            let approved = core.approve(action_id)?;
            core.persist(&self.inner.work_log, now);
            (approved, core.queue.len())
        };
        tracing::info!(action_id = %action_id, "action approved");
        self.log(format!("approved '{}'", approved.title), EntryStatus::Success);
        self.dispatch_pending_changed(pending, now);
        Ok(approved)
    }

    /// Reject a pending action. Its fingerprint is remembered so the same
    /// proposal is dropped in later cycles, until newer rejections push it
    /// out of the bounded memory.
    pub fn reject_action(&self, action_id: Uuid, reason: Option<&str>) -> Result<Action, EngineError> {
        let now = self.inner.clock.now();
        let reason = reason
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or("rejected by approver");
        let (rejected, pending) = {
            let mut guard = self.core();
            let core = &mut *guard;
            core.ensure_initialized()?;
            let rejected = core.reject(action_id, reason, now)?;
            core.persist(&self.inner.work_log, now);
            (rejected, core.queue.len())
        };
        tracing::info!(action_id = %action_id, reason, "action rejected");
        self.log(
            format!("rejected '{}': {}", rejected.title, reason),
            EntryStatus::Skipped,
        );
        self.dispatch_pending_changed(pending, now);
        Ok(rejected)
    }

    /// Approve every pending action, highest priority first.
    pub fn approve_all(&self) -> Result<Vec<Action>, EngineError> {
        let now = self.inner.clock.now();
        let (approved, pending) = {
            let mut guard = self.core();
            let core = &mut *guard;
            core.ensure_initialized()?;
            let mut approved = Vec::new();
            for entry in core.queue.by_priority() {
                match core.approve(entry.action_id) {
                    Ok(action) => approved.push(action),
                    Err(e) => {
                        tracing::warn!(action_id = %entry.action_id, error = %e, "approve-all skipped action")
                    }
                }
            }
            if !approved.is_empty() {
                core.persist(&self.inner.work_log, now);
            }
            (approved, core.queue.len())
        };
        if !approved.is_empty() {
            tracing::info!(count = approved.len(), "approved all pending actions");
            self.log(
                format!("approved {} pending actions", approved.len()),
                EntryStatus::Success,
            );
            self.dispatch_pending_changed(pending, now);
        }
        Ok(approved)
    }

    // ── Goals ──────────────────────────────────────────────────────

    pub fn add_goal(&self, goal: Goal, auto_activate: bool) -> Result<Uuid, EngineError> {
        let now = self.inner.clock.now();
        let title = goal.title.clone();
        let id = {
            let mut core = self.core();
            core.ensure_initialized()?;
            let id = core.goals.add_goal(goal, auto_activate)?;
            core.persist(&self.inner.work_log, now);
            id
        };
        self.log(format!("goal added: '{}'", title), EntryStatus::Info);
        Ok(id)
    }

    /// Abandon a goal and reject every action of it still waiting for
    /// approval, with reason `goal abandoned`. Returns the rejected ids.
    pub fn abandon_goal(&self, goal_id: Uuid) -> Result<Vec<Uuid>, EngineError> {
        let now = self.inner.clock.now();
        let (title, rejected, pending) = {
            let mut guard = self.core();
            let core = &mut *guard;
            core.ensure_initialized()?;
            core.goals.abandon_goal(goal_id)?;
            let title = core
                .goals
                .get_goal(goal_id)
                .map(|g| g.title.clone())
                .unwrap_or_default();
            let mut rejected = Vec::new();
            for action_id in core.queue.ids_for_goal(goal_id) {
                match core.reject(action_id, GOAL_ABANDONED, now) {
                    Ok(action) => rejected.push(action.id),
                    Err(e) => tracing::warn!(action_id = %action_id, error = %e, "cascade reject failed"),
                }
            }
            core.persist(&self.inner.work_log, now);
            (title, rejected, core.queue.len())
        };
        self.log(
            format!(
                "goal abandoned: '{}' ({} pending actions rejected)",
                title,
                rejected.len()
            ),
            EntryStatus::Skipped,
        );
        if !rejected.is_empty() {
            self.dispatch_pending_changed(pending, now);
        }
        Ok(rejected)
    }

    // ── Config & observation ───────────────────────────────────────

    pub fn update_config(&self, update: ConfigUpdate) -> Result<EngineConfig, EngineError> {
        let config = {
            let mut guard = self.core();
            let core = &mut *guard;
            if let Err(e) = core.config.apply(&update) {
                tracing::warn!(error = %e, "config update refused");
                return Err(e.into());
            }
            if update.auto_approve_types.is_some() {
                core.policy
                    .set_auto_approve_types(core.config.auto_approve_types.clone());
            }
            core.state.cycle_interval_ms = core.config.cycle_interval_ms;
            core.config.clone()
        };
        tracing::info!(?update, "engine config updated");
        self.log("configuration updated", EntryStatus::Info);
        Ok(config)
    }

    /// Ask the proposer for a narrative read of the current context.
    pub async fn observe(&self) -> Result<String, ProviderError> {
        let (goal, handoff) = {
            let core = self.core();
            let now = self.inner.clock.now();
            (
                core.goals.select_next_goal().cloned(),
                HandoffContext::valid_at(core.handoff.as_ref(), now).cloned(),
            )
        };
        let context = self.build_context(goal.as_ref(), handoff.as_ref());
        let observation = self.inner.proposer.observe(&context).await?;
        self.log(format!("observation: {}", observation), EntryStatus::Info);
        Ok(observation)
    }

    pub fn status(&self) -> EngineStatus {
        let core = self.core();
        let status = EngineStatus {
            state: core.state.clone(),
            running: false,
            initialized: core.initialized,
            pending_approvals: core.queue.len(),
            active_goals: core.goals.get_active_goals().len(),
            available_backends: Vec::new(),
            last_error: core.last_error.clone(),
        };
        drop(core);
        EngineStatus {
            running: self.is_running(),
            available_backends: self.inner.executor.available_backends(),
            ..status
        }
    }

    pub fn config(&self) -> EngineConfig {
        self.core().config.clone()
    }

    pub fn state(&self) -> EngineState {
        self.core().state.clone()
    }

    pub fn goals(&self) -> Vec<Goal> {
        self.core().goals.all_goals().to_vec()
    }

    pub fn goal(&self, goal_id: Uuid) -> Option<Goal> {
        self.core().goals.get_goal(goal_id).cloned()
    }

    /// Every tracked action, oldest proposal first.
    pub fn actions(&self) -> Vec<Action> {
        let mut actions: Vec<Action> = self.core().actions.values().cloned().collect();
        actions.sort_by(|a, b| a.proposed_at.cmp(&b.proposed_at));
        actions
    }

    pub fn action(&self, action_id: Uuid) -> Option<Action> {
        self.core().actions.get(&action_id).cloned()
    }

    /// Actions waiting for approval, in approval order.
    pub fn pending_actions(&self) -> Vec<Action> {
        let core = self.core();
        core.queue
            .by_priority()
            .into_iter()
            .filter_map(|entry| core.actions.get(&entry.action_id).cloned())
            .collect()
    }

    /// The current handoff, if it has not expired.
    pub fn handoff(&self) -> Option<HandoffContext> {
        let now = self.inner.clock.now();
        HandoffContext::valid_at(self.core().handoff.as_ref(), now).cloned()
    }

    pub fn work_log(&self) -> Arc<WorkLog> {
        Arc::clone(&self.inner.work_log)
    }

    // ── Internals ──────────────────────────────────────────────────

    fn core(&self) -> MutexGuard<'_, Core> {
        self.inner.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn runner(&self) -> MutexGuard<'_, Option<LoopHandle>> {
        self.inner.runner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn log(&self, message: impl Into<String>, status: EntryStatus) {
        self.inner.work_log.append(SOURCE, message, status);
    }

    fn record_error(&self, message: String) {
        self.core().last_error = Some(message);
    }

    fn dispatch_pending_changed(&self, pending: usize, now: DateTime<Utc>) {
        self.inner.events.dispatch(&EngineEvent::ProposalsUpdated {
            proposed: Vec::new(),
            auto_approved: 0,
            pending_approval: pending,
            timestamp: now,
        });
    }

    /// Provider values plus the reserved `goal` and `handoff` keys.
    fn build_context(&self, goal: Option<&Goal>, handoff: Option<&HandoffContext>) -> ProposerContext {
        let mut context = self.inner.context.collect();
        context.insert(GOAL_KEY.to_string(), to_json(goal));
        context.insert(HANDOFF_KEY.to_string(), to_json(handoff));
        context
    }
}

impl Core {
    fn load(&mut self) -> Result<(usize, EngineSnapshot), StoreError> {
        let goal_count = self.goals.initialize()?;
        let snapshot = self.store.load()?;
        Ok((goal_count, snapshot))
    }

    fn ensure_initialized(&self) -> Result<(), EngineError> {
        if self.initialized {
            Ok(())
        } else {
            Err(EngineError::NotInitialized)
        }
    }

    fn enter(&mut self, mode: EngineMode, log: &WorkLog) {
        if self.state.mode == mode {
            return;
        }
        let from = self.state.mode;
        self.state.mode = mode;
        tracing::debug!(%from, to = %mode, "engine mode changed");
        log.append(SOURCE, format!("{} -> {}", from, mode), EntryStatus::Info);
    }

    /// Turn proposals into tracked actions. Returns (created, queued) ids.
    ///
    /// Dropped: blank titles, proposals matching a rejected fingerprint, and
    /// proposals duplicating an action that is still live.
    fn admit(
        &mut self,
        proposals: Vec<ProposedAction>,
        goal_id: Option<Uuid>,
        now: DateTime<Utc>,
        log: &WorkLog,
    ) -> (Vec<Uuid>, Vec<Uuid>) {
        let mut proposed = Vec::new();
        let mut queued = Vec::new();

        for mut proposal in proposals {
            if proposal.title.trim().is_empty() {
                tracing::debug!("dropping proposal with empty title");
                continue;
            }
            if proposal.goal_id.is_none() {
                proposal.goal_id = goal_id;
            }
            let fingerprint = proposal.fingerprint();
            if self.rejected.contains(&fingerprint) {
                log.append(
                    SOURCE,
                    format!("dropped previously rejected proposal '{}'", proposal.title),
                    EntryStatus::Skipped,
                );
                continue;
            }
            if self
                .actions
                .values()
                .any(|a| !a.status.is_terminal() && a.fingerprint() == fingerprint)
            {
                log.append(
                    SOURCE,
                    format!("dropped duplicate proposal '{}'", proposal.title),
                    EntryStatus::Skipped,
                );
                continue;
            }

            let decision = self.policy.evaluate(&proposal);
            let mut action = Action::from_proposal(proposal, decision.requires_approval(), now);
            if action.requires_approval {
                if let Err(e) = self.queue.enqueue(&action, now) {
                    tracing::warn!(action_id = %action.id, error = %e, "could not queue action");
                    continue;
                }
                log.append(
                    "policy",
                    format!("awaiting approval: '{}' ({})", action.title, action.action_type),
                    EntryStatus::Pending,
                );
                queued.push(action.id);
            } else {
                if let Err(e) = action.approve() {
                    tracing::warn!(action_id = %action.id, error = %e, "could not auto-approve action");
                    continue;
                }
                log.append(
                    "policy",
                    format!("auto-approved: '{}' ({})", action.title, action.action_type),
                    EntryStatus::Info,
                );
            }
            proposed.push(action.id);
            self.actions.insert(action.id, action);
        }

        (proposed, queued)
    }

    /// Highest-priority approved action, oldest proposal first on ties.
    fn next_approved(&self) -> Option<Action> {
        self.actions
            .values()
            .filter(|a| a.status == ap_action::ActionStatus::Approved)
            .min_by(|a, b| {
                b.priority
                    .cmp(&a.priority)
                    .then_with(|| a.proposed_at.cmp(&b.proposed_at))
            })
            .cloned()
    }

    fn approve(&mut self, action_id: Uuid) -> Result<Action, EngineError> {
        if !self.actions.contains_key(&action_id) {
            return Err(EngineError::ActionNotFound(action_id));
        }
        self.queue.remove(action_id)?;
        let action = self
            .actions
            .get_mut(&action_id)
            .ok_or(EngineError::ActionNotFound(action_id))?;
        action.approve()?;
        Ok(action.clone())
    }

    fn reject(&mut self, action_id: Uuid, reason: &str, now: DateTime<Utc>) -> Result<Action, EngineError> {
        if !self.actions.contains_key(&action_id) {
            return Err(EngineError::ActionNotFound(action_id));
        }
        self.queue.remove(action_id)?;
        let action = self
            .actions
            .get_mut(&action_id)
            .ok_or(EngineError::ActionNotFound(action_id))?;
        action.reject(reason, now)?;
        self.rejected.remember(action.fingerprint());
        Ok(action.clone())
    }

    fn prune_history(&mut self) {
        let mut terminal: Vec<(DateTime<Utc>, Uuid)> = self
            .actions
            .values()
            .filter(|a| a.status.is_terminal())
            .map(|a| (a.completed_at.unwrap_or(a.proposed_at), a.id))
            .collect();
        if terminal.len() <= ACTION_HISTORY_LIMIT {
            return;
        }
        terminal.sort();
        let excess = terminal.len() - ACTION_HISTORY_LIMIT;
        for (_, id) in terminal.into_iter().take(excess) {
            self.actions.remove(&id);
        }
    }

    fn snapshot(&self, now: DateTime<Utc>) -> EngineSnapshot {
        let mut actions: Vec<Action> = self.actions.values().cloned().collect();
        actions.sort_by(|a, b| a.proposed_at.cmp(&b.proposed_at));
        EngineSnapshot {
            actions,
            handoff: self.handoff.clone(),
            rejected_fingerprints: self.rejected.to_vec(),
            saved_at: Some(now),
        }
    }

    /// Save goals and engine state. Failures are logged and retried on the
    /// next call; they never abort the caller.
    fn persist(&mut self, log: &WorkLog, now: DateTime<Utc>) {
        if let Err(e) = self.goals.flush() {
            tracing::warn!(error = %e, "goal save failed, will retry");
            self.last_error = Some(format!("goal save failed: {}", e));
            log.append(SOURCE, format!("goal save failed: {}", e), EntryStatus::Warning);
        }
        let snapshot = self.snapshot(now);
        if let Err(e) = self.store.save(&snapshot) {
            tracing::warn!(error = %e, "engine state save failed, will retry");
            self.last_error = Some(format!("state save failed: {}", e));
            log.append(SOURCE, format!("state save failed: {}", e), EntryStatus::Warning);
        }
    }
}

fn to_json<T: serde::Serialize>(value: Option<&T>) -> Value {
    value
        .and_then(|v| serde_json::to_value(v).ok())
        .unwrap_or(Value::Null)
}

/// Re-emit backend progress upward while an action runs.
fn forward_execution_event(work_log: &WorkLog, event: &ExecutionEvent) {
    match event.kind {
        ExecutionEventKind::ToolCall => {
            let name = event
                .payload
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or("tool");
            work_log.append("executor", format!("tool call: {}", name), EntryStatus::Running);
        }
        ExecutionEventKind::ToolResult => {
            work_log.append("executor", "tool result received", EntryStatus::Info);
        }
        ExecutionEventKind::Text => {
            if let Some(text) = event.text_content() {
                tracing::debug!(action_id = %event.action_id, "{}", text);
            }
        }
        ExecutionEventKind::Start | ExecutionEventKind::End | ExecutionEventKind::Error => {}
    }
}
