// common/mod.rs - Scripted collaborators shared by the engine integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use ap_action::{Action, ProposedAction};
use ap_engine::{
    ActionProposer, AutonomousController, ContextRegistry, EngineConfig, EngineEvent, ManualClock,
    MemoryStateStore, ProposerContext, ProviderError,
};
use ap_executor::{EventStream, ExecutionBackend, ExecutionEvent, ToolExecutor};
use ap_goal::{Goal, GoalManager, MemoryGoalStore};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

/// Monday noon, UTC. ManualClock's local time is UTC too.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap()
}

#[derive(Default)]
pub struct ScriptedProposer {
    responses: Mutex<VecDeque<Result<Vec<ProposedAction>, ProviderError>>>,
    contexts: Mutex<Vec<ProposerContext>>,
}

impl ScriptedProposer {
    pub fn push_actions(&self, actions: Vec<ProposedAction>) {
        self.responses.lock().unwrap().push_back(Ok(actions));
    }

    pub fn push_error(&self, error: ProviderError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    pub fn calls(&self) -> usize {
        self.contexts.lock().unwrap().len()
    }

    pub fn last_context(&self) -> ProposerContext {
        self.contexts.lock().unwrap().last().cloned().unwrap()
    }
}

#[async_trait]
impl ActionProposer for ScriptedProposer {
    async fn generate_actions(
        &self,
        context: &ProposerContext,
        _desired_count: usize,
    ) -> Result<Vec<ProposedAction>, ProviderError> {
        self.contexts.lock().unwrap().push(context.clone());
        let next = self.responses.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn observe(&self, context: &ProposerContext) -> Result<String, ProviderError> {
        let keys: Vec<&String> = context.keys().collect();
        Ok(format!("observed {} context keys", keys.len()))
    }
}

pub enum Script {
    Succeed(&'static str),
    Fail(&'static str),
}

pub struct ScriptedBackend {
    id: &'static str,
    available: Mutex<bool>,
    script: Mutex<VecDeque<Script>>,
    runs: Mutex<Vec<Uuid>>,
}

impl ScriptedBackend {
    pub fn new(id: &'static str) -> Arc<Self> {
        Arc::new(Self {
            id,
            available: Mutex::new(true),
            script: Mutex::new(VecDeque::new()),
            runs: Mutex::new(Vec::new()),
        })
    }

    pub fn then(&self, step: Script) {
        self.script.lock().unwrap().push_back(step);
    }

    pub fn set_available(&self, available: bool) {
        *self.available.lock().unwrap() = available;
    }

    /// Ids of the actions this backend was asked to run, in order.
    pub fn runs(&self) -> Vec<Uuid> {
        self.runs.lock().unwrap().clone()
    }
}

impl ExecutionBackend for ScriptedBackend {
    fn id(&self) -> &str {
        self.id
    }

    fn is_available(&self) -> bool {
        *self.available.lock().unwrap()
    }

    fn execute(&self, action: &Action) -> EventStream {
        self.runs.lock().unwrap().push(action.id);
        let step = self.script.lock().unwrap().pop_front();
        let events = match step.unwrap_or(Script::Succeed("done")) {
            Script::Succeed(output) => vec![
                ExecutionEvent::start(action.id, self.id),
                ExecutionEvent::text(action.id, output),
                ExecutionEvent::end(action.id, None),
            ],
            Script::Fail(message) => vec![
                ExecutionEvent::start(action.id, self.id),
                ExecutionEvent::error(action.id, message),
            ],
        };
        Box::pin(tokio_stream::iter(events))
    }
}

pub struct Harness {
    pub controller: AutonomousController,
    pub proposer: Arc<ScriptedProposer>,
    pub backend: Arc<ScriptedBackend>,
    pub clock: Arc<ManualClock>,
    pub store: Arc<MemoryStateStore>,
    pub events: Arc<Mutex<Vec<EngineEvent>>>,
}

impl Harness {
    pub fn event_types(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().iter().map(EngineEvent::event_type).collect()
    }

    pub fn clear_events(&self) {
        self.events.lock().unwrap().clear();
    }
}

pub fn harness(goals: Vec<Goal>, config: EngineConfig) -> Harness {
    harness_with(goals, config, ContextRegistry::new())
}

pub fn harness_with(goals: Vec<Goal>, config: EngineConfig, context: ContextRegistry) -> Harness {
    let clock = Arc::new(ManualClock::new(t0()));
    let proposer = Arc::new(ScriptedProposer::default());
    let backend = ScriptedBackend::new("agentic");
    let store = Arc::new(MemoryStateStore::new());
    let events = Arc::new(Mutex::new(Vec::new()));

    let sink = Arc::clone(&events);
    let controller = AutonomousController::builder(
        GoalManager::new(Box::new(MemoryGoalStore::with_goals(goals))),
        proposer.clone(),
        ToolExecutor::new().with_backend(backend.clone()),
    )
    .clock(clock.clone())
    .config(config)
    .context(context)
    .state_store(Arc::clone(&store))
    .observer(Arc::new(move |event: &EngineEvent| {
        sink.lock().unwrap().push(event.clone())
    }))
    .build();
    controller.initialize().unwrap();

    Harness {
        controller,
        proposer,
        backend,
        clock,
        store,
        events,
    }
}
