//! Daemon configuration from autopilot.toml

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use ap_engine::EngineConfig;
use ap_executor::{CommandBackend, ExecutionBackend, HttpBackend, ToolExecutor};
use serde::{Deserialize, Serialize};

/// Top-level daemon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Loop tuning handed to the controller as-is.
    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub proposer: ProposerConfig,

    /// Execution backends in preference order.
    #[serde(default)]
    pub backends: Vec<BackendConfig>,

    /// File-backed context providers.
    #[serde(default)]
    pub context: Vec<ContextSource>,

    #[serde(default)]
    pub server: ServerConfig,
}

/// Where the reasoning provider lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposerConfig {
    /// Receives `{context, desired_count}` and answers with proposed actions.
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Receives `{context}` and answers with a narrative observation.
    /// Falls back to `endpoint` when unset.
    #[serde(default)]
    pub observe_endpoint: Option<String>,

    /// Name of the environment variable holding a bearer token.
    #[serde(default)]
    pub api_key_env: Option<String>,

    #[serde(default = "default_proposer_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_proposer_timeout_ms() -> u64 {
    2 * 60 * 1000
}

impl Default for ProposerConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            observe_endpoint: None,
            api_key_env: None,
            timeout_ms: default_proposer_timeout_ms(),
        }
    }
}

impl ProposerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn api_key(&self) -> Option<String> {
        self.api_key_env
            .as_deref()
            .and_then(|name| std::env::var(name).ok())
            .filter(|key| !key.trim().is_empty())
    }
}

/// One `[[backends]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
    /// Local agentic CLI, e.g. `program = "claude"`, `args = ["-p"]`.
    Command {
        id: String,
        program: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        working_dir: Option<PathBuf>,
    },
    /// Plain request/response endpoint.
    Http {
        id: String,
        endpoint: String,
        #[serde(default)]
        bearer_token_env: Option<String>,
        #[serde(default = "default_enabled")]
        enabled: bool,
    },
}

fn default_enabled() -> bool {
    true
}

impl BackendConfig {
    pub fn id(&self) -> &str {
        match self {
            BackendConfig::Command { id, .. } | BackendConfig::Http { id, .. } => id,
        }
    }

    /// Construct the backend with the engine's self-enforced timeout.
    pub fn build(&self, timeout: Duration) -> Result<Arc<dyn ExecutionBackend>> {
        match self {
            BackendConfig::Command {
                id,
                program,
                args,
                working_dir,
            } => {
                let mut backend = CommandBackend::new(id, program)
                    .with_args(args.iter().cloned())
                    .with_timeout(timeout);
                if let Some(dir) = working_dir {
                    backend = backend.with_working_dir(dir.clone());
                }
                Ok(Arc::new(backend))
            }
            BackendConfig::Http {
                id,
                endpoint,
                bearer_token_env,
                enabled,
            } => {
                let mut backend = HttpBackend::with_timeout(id, endpoint, timeout)
                    .with_context(|| format!("building http backend '{}'", id))?;
                if let Some(token) = bearer_token_env.as_deref().and_then(|name| std::env::var(name).ok()) {
                    backend = backend.with_bearer_token(token);
                }
                backend.set_enabled(*enabled);
                Ok(Arc::new(backend))
            }
        }
    }
}

/// Register every configured backend in order.
pub fn build_executor(backends: &[BackendConfig], timeout: Duration) -> Result<ToolExecutor> {
    let mut executor = ToolExecutor::new();
    for config in backends {
        executor.register(config.build(timeout)?);
    }
    Ok(executor)
}

/// One `[[context]]` entry: the JSON file at `path` is exposed under `name`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContextSource {
    pub name: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Goals, engine state and the work log live here.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
}

fn default_bind() -> String {
    "127.0.0.1:7878".to_string()
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".autopilot")
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            state_dir: default_state_dir(),
        }
    }
}

impl DaemonConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Self =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        config
            .engine
            .validate()
            .with_context(|| format!("invalid [engine] in {}", path.display()))?;
        Ok(config)
    }

    /// Missing file means defaults. A file that exists but does not parse
    /// is still an error.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ap_action::ActionType;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = DaemonConfig::load_or_default(&dir.path().join("autopilot.toml")).unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:7878");
        assert_eq!(config.engine, EngineConfig::default());
        assert!(config.backends.is_empty());
        assert!(config.proposer.endpoint.is_none());
    }

    #[test]
    fn parses_full_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("autopilot.toml");
        std::fs::write(
            &path,
            r#"
[engine]
auto_approve_types = ["research"]
cycle_interval_ms = 60000
quiet_hours = { start = "22:00", end = "07:00" }

[proposer]
endpoint = "http://127.0.0.1:9000/propose"
timeout_ms = 5000

[[backends]]
kind = "command"
id = "agentic"
program = "claude"
args = ["-p"]

[[backends]]
kind = "http"
id = "plain"
endpoint = "http://127.0.0.1:9000/run"
enabled = false

[[context]]
name = "calendar"
path = "ctx/calendar.json"

[server]
bind = "0.0.0.0:8080"
"#,
        )
        .unwrap();

        let config = DaemonConfig::load(&path).unwrap();
        assert_eq!(config.engine.auto_approve_types, vec![ActionType::Research]);
        assert_eq!(config.engine.cycle_interval_ms, 60_000);
        assert!(config.engine.quiet_hours.is_some());
        assert_eq!(config.engine.desired_actions, EngineConfig::default().desired_actions);
        assert_eq!(config.proposer.timeout(), Duration::from_secs(5));
        assert_eq!(config.backends.len(), 2);
        assert_eq!(config.backends[0].id(), "agentic");
        assert!(matches!(config.backends[1], BackendConfig::Http { enabled: false, .. }));
        assert_eq!(config.context[0].name, "calendar");
        assert_eq!(config.server.bind, "0.0.0.0:8080");
        assert_eq!(config.server.state_dir, PathBuf::from(".autopilot"));
    }

    #[test]
    fn broken_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("autopilot.toml");
        std::fs::write(&path, "[engine\ncycle_interval_ms = ").unwrap();
        assert!(DaemonConfig::load_or_default(&path).is_err());
    }

    #[test]
    fn sub_second_rest_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("autopilot.toml");
        std::fs::write(&path, "[engine]\ncycle_interval_ms = 0\n").unwrap();
        let err = DaemonConfig::load(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("at least 1000 ms"));

        std::fs::write(&path, "[engine]\nquiet_hours_rest_ms = 500\n").unwrap();
        assert!(DaemonConfig::load(&path).is_err());
    }

    #[test]
    fn executor_keeps_configured_order() {
        let backends = vec![
            BackendConfig::Command {
                id: "agentic".into(),
                program: "definitely-not-a-real-binary-xyz".into(),
                args: Vec::new(),
                working_dir: None,
            },
            BackendConfig::Http {
                id: "plain".into(),
                endpoint: "http://127.0.0.1:9/run".into(),
                bearer_token_env: None,
                enabled: true,
            },
        ];
        let executor = build_executor(&backends, Duration::from_secs(1)).unwrap();
        assert_eq!(executor.backend_ids(), vec!["agentic".to_string(), "plain".to_string()]);
        assert_eq!(executor.available_backends(), vec!["plain".to_string()]);
    }
}
