//! Agentic CLI backend - runs a local tool-using agent as a subprocess.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use ap_action::Action;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::time::Instant;
use uuid::Uuid;

use crate::backend::{EventStream, ExecutionBackend};
use crate::event::ExecutionEvent;

/// Default self-enforced execution timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Runs `program [args..] <prompt>` and streams its stdout.
///
/// Each stdout line becomes one event. Lines that are JSON objects with a
/// `type` of `tool_call`/`tool_result`/`text` are mapped to the matching
/// event kind; anything else is plain text. A zero exit status ends the
/// stream with `end`, anything else with `error` carrying stderr.
///
/// Available when `program` resolves on PATH (or is an existing path).
pub struct CommandBackend {
    id: String,
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
    timeout: Duration,
}

impl CommandBackend {
    pub fn new(id: impl Into<String>, program: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl ExecutionBackend for CommandBackend {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_available(&self) -> bool {
        which::which(&self.program).is_ok()
    }

    fn execute(&self, action: &Action) -> EventStream {
        let backend_id = self.id.clone();
        let program = self.program.clone();
        let args = self.args.clone();
        let working_dir = self.working_dir.clone();
        let timeout = self.timeout;
        let action_id = action.id;
        let prompt = action.plan.prompt.clone();

        Box::pin(async_stream::stream! {
            yield ExecutionEvent::start(action_id, &backend_id);

            let mut command = Command::new(&program);
            command
                .args(&args)
                .arg(&prompt)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true);
            if let Some(dir) = &working_dir {
                command.current_dir(dir);
            }

            let mut child = match command.spawn() {
                Ok(child) => child,
                Err(e) => {
                    yield ExecutionEvent::error(action_id, format!("failed to spawn {}: {}", program, e));
                    return;
                }
            };

            let Some(stdout) = child.stdout.take() else {
                yield ExecutionEvent::error(action_id, "child stdout was not captured");
                return;
            };
            let stderr_task = child.stderr.take().map(|mut stderr| {
                tokio::spawn(async move {
                    let mut buf = String::new();
                    let _ = stderr.read_to_string(&mut buf).await;
                    buf
                })
            });

            let deadline = Instant::now() + timeout;
            let mut lines = BufReader::new(stdout).lines();
            let mut output: Vec<String> = Vec::new();

            loop {
                match tokio::time::timeout_at(deadline, lines.next_line()).await {
                    Err(_) => {
                        let _ = child.kill().await;
                        tracing::warn!(backend = %backend_id, action_id = %action_id, "command timed out");
                        yield ExecutionEvent::error(
                            action_id,
                            format!("{} timed out after {}s", program, timeout.as_secs()),
                        );
                        return;
                    }
                    Ok(Err(e)) => {
                        let _ = child.kill().await;
                        yield ExecutionEvent::error(action_id, format!("failed reading output: {}", e));
                        return;
                    }
                    Ok(Ok(None)) => break,
                    Ok(Ok(Some(line))) => {
                        let event = parse_line(action_id, &line);
                        if let Some(text) = event.text_content() {
                            output.push(text.to_string());
                        }
                        yield event;
                    }
                }
            }

            let status = match tokio::time::timeout_at(deadline, child.wait()).await {
                Err(_) => {
                    let _ = child.kill().await;
                    yield ExecutionEvent::error(
                        action_id,
                        format!("{} timed out after {}s", program, timeout.as_secs()),
                    );
                    return;
                }
                Ok(Err(e)) => {
                    yield ExecutionEvent::error(action_id, format!("failed waiting for {}: {}", program, e));
                    return;
                }
                Ok(Ok(status)) => status,
            };

            let stderr = match stderr_task {
                Some(task) => task.await.unwrap_or_default(),
                None => String::new(),
            };

            if status.success() {
                yield ExecutionEvent::end(action_id, Some(output.join("\n")));
            } else {
                let detail = stderr.trim();
                let message = if detail.is_empty() {
                    format!("{} exited with {}", program, status)
                } else {
                    format!("{} exited with {}: {}", program, status, detail)
                };
                yield ExecutionEvent::error(action_id, message);
            }
        })
    }
}

/// Map one stdout line to an event.
fn parse_line(action_id: Uuid, line: &str) -> ExecutionEvent {
    let trimmed = line.trim_start();
    if trimmed.starts_with('{') {
        if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
            match value.get("type").and_then(Value::as_str) {
                Some("tool_call") | Some("tool-call") | Some("tool_use") => {
                    return ExecutionEvent::tool_call(action_id, value);
                }
                Some("tool_result") | Some("tool-result") => {
                    return ExecutionEvent::tool_result(action_id, value);
                }
                Some("text") => {
                    if let Some(text) = value.get("text").and_then(Value::as_str) {
                        return ExecutionEvent::text(action_id, text);
                    }
                }
                _ => {}
            }
        }
    }
    ExecutionEvent::text(action_id, line)
}
