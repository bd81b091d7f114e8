//! # ap-daemon
//!
//! Autopilot daemon. Loads goals and engine state from the state
//! directory, runs the autonomous loop, and serves the approval and
//! control API plus a live work-log stream.
//!
//! ## Usage
//!
//! ```text
//! ap-daemon --config autopilot.toml
//! ap-daemon --paused --bind 127.0.0.1:9000
//! ```
//!
//! Approvals and control go through `/api/*`; `GET /events` streams the
//! work log as Server-Sent Events.

mod api;
mod config;
mod context;
mod proposer;
mod sse;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use ap_engine::{AutonomousController, EngineEvent, JsonStateStore};
use ap_goal::{GoalFileStore, GoalManager};
use ap_worklog::{JsonlSink, WorkLog};
use axum::routing::get;
use axum::Router;
use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::EnvFilter;

use crate::api::AppState;
use crate::config::DaemonConfig;
use crate::proposer::HttpProposer;

/// Autopilot daemon.
#[derive(Parser)]
#[command(name = "ap-daemon", about = "Autonomous goal loop with human approval")]
struct Cli {
    /// Path to the daemon config file. Missing file means defaults.
    #[arg(long, default_value = "autopilot.toml")]
    config: PathBuf,

    /// Overrides `[server] state_dir`.
    #[arg(long)]
    state_dir: Option<PathBuf>,

    /// Overrides `[server] bind`.
    #[arg(long)]
    bind: Option<String>,

    /// Serve the API without starting the loop.
    #[arg(long)]
    paused: bool,

    /// Emit logs as JSON lines.
    #[arg(long)]
    log_json: bool,
}

fn init_tracing(json: bool) -> Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive("ap_daemon=info".parse()?)
        .add_directive("ap_engine=info".parse()?)
        .add_directive("ap_executor=info".parse()?);
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json)?;

    let mut config = DaemonConfig::load_or_default(&cli.config)?;
    if let Some(dir) = cli.state_dir {
        config.server.state_dir = dir;
    }
    if let Some(bind) = cli.bind {
        config.server.bind = bind;
    }
    let state_dir = &config.server.state_dir;
    std::fs::create_dir_all(state_dir)
        .with_context(|| format!("creating state dir {}", state_dir.display()))?;

    tracing::info!("Starting autopilot daemon");
    tracing::info!("State dir: {}", state_dir.display());

    let Some(endpoint) = config.proposer.endpoint.clone() else {
        bail!("[proposer] endpoint is not set in {}", cli.config.display());
    };
    let mut proposer = HttpProposer::new(endpoint, config.proposer.timeout())
        .context("building proposer client")?;
    if let Some(observe) = &config.proposer.observe_endpoint {
        proposer = proposer.with_observe_endpoint(observe);
    }
    if let Some(key) = config.proposer.api_key() {
        proposer = proposer.with_api_key(key);
    }

    let executor = config::build_executor(&config.backends, config.engine.backend_timeout())?;
    if config.backends.is_empty() {
        tracing::warn!("no [[backends]] configured, approved actions will wait");
    }

    let work_log = Arc::new(WorkLog::new());
    let sink = JsonlSink::open(state_dir.join("worklog.jsonl")).context("opening work log")?;
    work_log.add_sink(Box::new(sink));

    let goals = GoalManager::new(Box::new(
        GoalFileStore::new(state_dir.join("goals")).context("opening goal store")?,
    ));
    let state_store = JsonStateStore::new(state_dir.join("engine.json")).context("opening state store")?;

    let controller = AutonomousController::builder(goals, Arc::new(proposer), executor)
        .config(config.engine.clone())
        .state_store(state_store)
        .context(context::registry_from(&config.context))
        .work_log(Arc::clone(&work_log))
        .observer(Arc::new(|event: &EngineEvent| {
            tracing::info!(event = event.event_type(), "engine event");
        }))
        .build();

    controller
        .initialize()
        .context("engine refused to start")?;
    if cli.paused {
        tracing::info!("Loop paused, start it with POST /api/loop/start");
    } else {
        controller.start_autonomous_loop()?;
    }

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let app = Router::new()
        .nest("/api", api::api_router())
        .route("/events", get(sse::events_handler))
        .layer(cors)
        .with_state(AppState::new(controller.clone()));

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("binding {}", config.server.bind))?;
    tracing::info!("Listening on {}", config.server.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down, waiting for the loop to stop");
    controller.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
}
