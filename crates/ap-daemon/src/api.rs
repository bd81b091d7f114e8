//! HTTP route handlers for the approval and control API.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post, put};
use axum::Router;
use ap_action::Action;
use ap_engine::{AutonomousController, ConfigUpdate, EngineConfig, EngineError, EngineStatus};
use ap_goal::{Goal, GoalCategory, GoalError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub controller: AutonomousController,
}

impl AppState {
    pub fn new(controller: AutonomousController) -> Self {
        Self { controller }
    }
}

/// Build the API router, mounted under `/api`.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/goals", get(list_goals).post(create_goal))
        .route("/goals/{id}/abandon", post(abandon_goal))
        .route("/actions", get(list_actions))
        .route("/actions/pending", get(pending_actions))
        .route("/actions/approve-all", post(approve_all))
        .route("/actions/{id}/approve", post(approve_action))
        .route("/actions/{id}/reject", post(reject_action))
        .route("/loop/start", post(start_loop))
        .route("/loop/stop", post(stop_loop))
        .route("/loop/trigger", post(trigger_cycle))
        .route("/config", put(update_config))
        .route("/observe", get(observe))
}

/// Engine errors mapped onto status codes, with the message as JSON.
pub struct ApiError(StatusCode, String);

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        let status = match &e {
            EngineError::ActionNotFound(_) | EngineError::Goal(GoalError::NotFound(_)) => {
                StatusCode::NOT_FOUND
            }
            EngineError::Action(_) | EngineError::Policy(_) | EngineError::Goal(_) => {
                StatusCode::CONFLICT
            }
            EngineError::NotInitialized => StatusCode::SERVICE_UNAVAILABLE,
            EngineError::Provider(_) => StatusCode::BAD_GATEWAY,
            EngineError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            EngineError::Config(_) => StatusCode::BAD_REQUEST,
        };
        ApiError(status, e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(json!({ "error": self.1 }))).into_response()
    }
}

async fn health() -> &'static str {
    "ok"
}

/// GET /api/status
async fn status(State(state): State<AppState>) -> Json<EngineStatus> {
    Json(state.controller.status())
}

/// GET /api/goals
async fn list_goals(State(state): State<AppState>) -> Json<Vec<Goal>> {
    Json(state.controller.goals())
}

#[derive(Debug, Deserialize)]
struct NewGoal {
    title: String,
    #[serde(default)]
    description: String,
    category: GoalCategory,
    #[serde(default)]
    priority: i32,
    #[serde(default)]
    due_date: Option<DateTime<Utc>>,
    /// Start the goal as active instead of pending.
    #[serde(default)]
    activate: bool,
}

/// POST /api/goals
async fn create_goal(
    State(state): State<AppState>,
    Json(body): Json<NewGoal>,
) -> Result<(StatusCode, Json<Goal>), ApiError> {
    if body.title.trim().is_empty() {
        return Err(ApiError(StatusCode::BAD_REQUEST, "title must not be empty".into()));
    }
    let mut goal = Goal::new(body.title, body.category, body.priority).with_description(body.description);
    if let Some(due) = body.due_date {
        goal = goal.with_due_date(due);
    }
    let id = state.controller.add_goal(goal, body.activate)?;
    let goal = state
        .controller
        .goal(id)
        .ok_or(ApiError(StatusCode::INTERNAL_SERVER_ERROR, "goal vanished after insert".into()))?;
    Ok((StatusCode::CREATED, Json(goal)))
}

#[derive(Serialize)]
struct AbandonResponse {
    goal: Option<Goal>,
    rejected: Vec<Uuid>,
}

/// POST /api/goals/{id}/abandon
async fn abandon_goal(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<AbandonResponse>, ApiError> {
    let rejected = state.controller.abandon_goal(id)?;
    Ok(Json(AbandonResponse {
        goal: state.controller.goal(id),
        rejected,
    }))
}

/// GET /api/actions
async fn list_actions(State(state): State<AppState>) -> Json<Vec<Action>> {
    Json(state.controller.actions())
}

/// GET /api/actions/pending - highest priority first.
async fn pending_actions(State(state): State<AppState>) -> Json<Vec<Action>> {
    Json(state.controller.pending_actions())
}

/// POST /api/actions/{id}/approve
async fn approve_action(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Action>, ApiError> {
    Ok(Json(state.controller.approve_action(id)?))
}

#[derive(Debug, Default, Deserialize)]
struct RejectBody {
    #[serde(default)]
    reason: Option<String>,
}

/// POST /api/actions/{id}/reject - body `{"reason": "..."}` is optional.
async fn reject_action(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> Result<Json<Action>, ApiError> {
    let body: RejectBody = if body.iter().all(u8::is_ascii_whitespace) {
        RejectBody::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError(StatusCode::BAD_REQUEST, format!("invalid body: {}", e)))?
    };
    Ok(Json(state.controller.reject_action(id, body.reason.as_deref())?))
}

/// POST /api/actions/approve-all
async fn approve_all(State(state): State<AppState>) -> Result<Json<Vec<Action>>, ApiError> {
    Ok(Json(state.controller.approve_all()?))
}

/// POST /api/loop/start
async fn start_loop(State(state): State<AppState>) -> Result<Json<EngineStatus>, ApiError> {
    state.controller.start_autonomous_loop()?;
    Ok(Json(state.controller.status()))
}

/// POST /api/loop/stop - no new cycles; a running action finishes on its own.
async fn stop_loop(State(state): State<AppState>) -> Json<EngineStatus> {
    state.controller.stop();
    Json(state.controller.status())
}

/// POST /api/loop/trigger - starts a cycle in the background.
async fn trigger_cycle(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    if !state.controller.status().initialized {
        return Err(EngineError::NotInitialized.into());
    }
    let controller = state.controller.clone();
    tokio::spawn(async move {
        if let Err(e) = controller.trigger_cycle().await {
            tracing::warn!(error = %e, "triggered cycle failed");
        }
    });
    Ok(StatusCode::ACCEPTED)
}

/// PUT /api/config
async fn update_config(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<EngineConfig>, ApiError> {
    let update: ConfigUpdate = serde_json::from_slice(&body)
        .map_err(|e| ApiError(StatusCode::BAD_REQUEST, format!("invalid config update: {}", e)))?;
    Ok(Json(state.controller.update_config(update)?))
}

/// GET /api/observe
async fn observe(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let observation = state
        .controller
        .observe()
        .await
        .map_err(EngineError::from)?;
    Ok(Json(json!({ "observation": observation })))
}
