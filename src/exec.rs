//! Command execution engine.
//!
//! One [`Executor`] exists per sandbox instance. It owns the registry of
//! in-flight commands and offers two modes over the same machinery:
//!
//! - [`Executor::run`] — spawn, wait, return a [`CommandResult`];
//! - [`Executor::run_streaming`] — spawn and return an ordered stream of
//!   [`StreamEvent`]s that ends when the command completes.
//!
//! The backend pushes raw [`OutputChunk`]s into an unbounded channel; a
//! forwarder task turns them into events, invokes caller callbacks, and
//! accumulates the final stdout/stderr. The consuming stream suspends while
//! the channel is empty and resumes when a chunk lands or the channel closes,
//! so a slow consumer never loses events.
//!
//! Execution failures (non-zero exit, spawn error, timeout) are data: they
//! land in [`CommandResult::error`] and `exit_code`, never in `Err`, so
//! callers can still inspect partial output. `Err` is reserved for registry
//! violations — a duplicate id on start, an unknown id on stop.

use crate::error::SandboxError;
use crate::sandbox::SandboxBackend;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_stream::wrappers::UnboundedReceiverStream;
use uuid::Uuid;

/// Callback invoked with each produced output line.
pub type OutputCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Everything needed to run one command.
#[derive(Clone, Default)]
pub struct ExecRequest {
    /// Shell command text, run via `sh -c`.
    pub command: String,
    /// Explicit registry id. Generated when absent.
    pub id: Option<String>,
    /// Working directory; the sandbox workspace when absent.
    pub cwd: Option<String>,
    /// Extra environment entries layered over the backend's own.
    pub env: HashMap<String, String>,
    /// Per-command execution bound. The sandbox default when absent.
    pub timeout: Option<Duration>,
    /// Bound on how long a blocking [`Executor::run`] call waits. The
    /// command itself keeps running past it.
    pub request_timeout: Option<Duration>,
    pub on_stdout: Option<OutputCallback>,
    pub on_stderr: Option<OutputCallback>,
}

impl ExecRequest {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_cwd(mut self, cwd: impl Into<String>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn on_stdout(mut self, callback: OutputCallback) -> Self {
        self.on_stdout = Some(callback);
        self
    }

    pub fn on_stderr(mut self, callback: OutputCallback) -> Self {
        self.on_stderr = Some(callback);
        self
    }
}

impl From<&str> for ExecRequest {
    fn from(command: &str) -> Self {
        Self::new(command)
    }
}

impl From<String> for ExecRequest {
    fn from(command: String) -> Self {
        Self::new(command)
    }
}

impl std::fmt::Debug for ExecRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecRequest")
            .field("command", &self.command)
            .field("id", &self.id)
            .field("cwd", &self.cwd)
            .field("env", &self.env)
            .field("timeout", &self.timeout)
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

/// Registry entry for an in-flight command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandHandle {
    pub id: String,
    pub command: String,
    pub pid: Option<u32>,
    pub started_at: DateTime<Utc>,
}

/// Final outcome of one command. Immutable after creation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommandResult {
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0 && self.error.is_none()
    }

    /// A result for a command that never ran to a real exit code.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            exit_code: -1,
            error: Some(message.into()),
            ..Self::default()
        }
    }
}

/// One element of a streaming execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Stdout {
        text: String,
    },
    Stderr {
        text: String,
    },
    Status {
        id: String,
        command: String,
        pid: Option<u32>,
        started_at: DateTime<Utc>,
    },
}

/// Raw output produced by a backend while a command runs.
///
/// Backends push chunks in production order and leave stdout/stderr
/// accumulation to the engine: the [`CommandResult`] a backend returns from
/// `execute` carries only exit code, error, and duration.
#[derive(Debug, Clone)]
pub enum OutputChunk {
    Started { pid: Option<u32> },
    Stdout(String),
    Stderr(String),
}

struct ActiveCommand {
    handle: Mutex<CommandHandle>,
    kill: Mutex<Option<oneshot::Sender<()>>>,
    done: watch::Receiver<Option<CommandResult>>,
}

struct SpawnedCommand {
    handle: CommandHandle,
    events: mpsc::UnboundedReceiver<StreamEvent>,
    done: watch::Receiver<Option<CommandResult>>,
}

/// Per-sandbox execution engine. Cheap to clone; clones share the registry.
#[derive(Clone)]
pub struct Executor {
    backend: Arc<dyn SandboxBackend>,
    default_timeout: Duration,
    active: Arc<DashMap<String, ActiveCommand>>,
}

impl Executor {
    pub fn new(backend: Arc<dyn SandboxBackend>, default_timeout: Duration) -> Self {
        Self {
            backend,
            default_timeout,
            active: Arc::new(DashMap::new()),
        }
    }

    /// Run a command to completion and return its result.
    ///
    /// `request_timeout` bounds only this wait: when it elapses the command
    /// keeps running under its registry id and the returned result says so.
    pub async fn run(&self, request: impl Into<ExecRequest>) -> Result<CommandResult, SandboxError> {
        let request = request.into();
        let request_timeout = request.request_timeout;
        let spawned = self.spawn(request)?;
        // Nobody consumes events in blocking mode; the forwarder tolerates
        // the dropped receiver.
        drop(spawned.events);
        let id = spawned.handle.id;

        match request_timeout {
            Some(bound) => match tokio::time::timeout(bound, wait_done(spawned.done)).await {
                Ok(result) => Ok(result),
                Err(_) => Ok(CommandResult::failure(format!(
                    "request timed out after {}ms; command '{id}' is still running",
                    bound.as_millis()
                ))),
            },
            None => Ok(wait_done(spawned.done).await),
        }
    }

    /// Run a command and stream its output.
    ///
    /// The first event is always [`StreamEvent::Status`]; stdout/stderr
    /// events follow in production order; the stream ends when the command
    /// completes.
    pub fn run_streaming(
        &self,
        request: impl Into<ExecRequest>,
    ) -> Result<(CommandHandle, UnboundedReceiverStream<StreamEvent>), SandboxError> {
        let spawned = self.spawn(request.into())?;
        Ok((
            spawned.handle,
            UnboundedReceiverStream::new(spawned.events),
        ))
    }

    /// Stop a running command and return its final result.
    ///
    /// When the backend cannot terminate commands
    /// ([`Capabilities::can_terminate_commands`](crate::sandbox::Capabilities)
    /// is false) this degrades to awaiting natural completion.
    pub async fn stop(&self, id: &str) -> Result<CommandResult, SandboxError> {
        let (kill, done) = {
            let entry = self
                .active
                .get(id)
                .ok_or_else(|| SandboxError::CommandNotRunning { id: id.to_string() })?;
            let pair = (entry.kill.lock().take(), entry.done.clone());
            pair
        };

        if self.backend.capabilities().can_terminate_commands {
            if let Some(kill) = kill {
                let _ = kill.send(());
            }
        } else {
            tracing::debug!(id, "backend cannot terminate commands; awaiting natural completion");
        }

        Ok(wait_done(done).await)
    }

    /// Handle for a registered command, if it is still running.
    pub fn handle(&self, id: &str) -> Option<CommandHandle> {
        self.active.get(id).map(|entry| entry.handle.lock().clone())
    }

    pub fn is_running(&self, id: &str) -> bool {
        self.active.contains_key(id)
    }

    /// Snapshot of every in-flight command.
    pub fn handles(&self) -> Vec<CommandHandle> {
        self.active
            .iter()
            .map(|entry| entry.handle.lock().clone())
            .collect()
    }

    fn spawn(&self, mut request: ExecRequest) -> Result<SpawnedCommand, SandboxError> {
        let id = request
            .id
            .get_or_insert_with(|| Uuid::new_v4().to_string())
            .clone();
        request.timeout = Some(request.timeout.unwrap_or(self.default_timeout));

        let handle = CommandHandle {
            id: id.clone(),
            command: request.command.clone(),
            pid: None,
            started_at: Utc::now(),
        };

        let (done_tx, done_rx) = watch::channel(None);
        let (kill_tx, kill_rx) = oneshot::channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        // The entry API serializes concurrent starts on the same id: exactly
        // one caller inserts, every other one fails.
        match self.active.entry(id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(SandboxError::CommandAlreadyRunning { id });
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(ActiveCommand {
                    handle: Mutex::new(handle.clone()),
                    kill: Mutex::new(Some(kill_tx)),
                    done: done_rx.clone(),
                });
            }
        }

        let _ = event_tx.send(StreamEvent::Status {
            id: handle.id.clone(),
            command: handle.command.clone(),
            pid: None,
            started_at: handle.started_at,
        });

        let (chunk_tx, chunk_rx) = mpsc::unbounded_channel();
        let backend = self.backend.clone();
        let active = self.active.clone();
        let on_stdout = request.on_stdout.clone();
        let on_stderr = request.on_stderr.clone();

        tokio::spawn(async move {
            let exec_task = tokio::spawn({
                let backend = backend.clone();
                async move { backend.execute(request, chunk_tx, kill_rx).await }
            });

            let mut chunk_rx = chunk_rx;
            let mut stdout = String::new();
            let mut stderr = String::new();

            // The channel closes when the backend drops its sender, which
            // happens exactly at command completion.
            while let Some(chunk) = chunk_rx.recv().await {
                match chunk {
                    OutputChunk::Started { pid } => {
                        if let Some(entry) = active.get(&id) {
                            entry.handle.lock().pid = pid;
                        }
                    }
                    OutputChunk::Stdout(text) => {
                        if let Some(callback) = &on_stdout {
                            callback(&text);
                        }
                        push_line(&mut stdout, &text);
                        let _ = event_tx.send(StreamEvent::Stdout { text });
                    }
                    OutputChunk::Stderr(text) => {
                        if let Some(callback) = &on_stderr {
                            callback(&text);
                        }
                        push_line(&mut stderr, &text);
                        let _ = event_tx.send(StreamEvent::Stderr { text });
                    }
                }
            }

            let mut result = match exec_task.await {
                Ok(result) => result,
                Err(e) => CommandResult::failure(format!("execution task failed: {e}")),
            };
            result.stdout = stdout;
            result.stderr = stderr;

            // Remove-then-signal: observers woken by `done` must already see
            // a clean registry. Removal happens here and nowhere else.
            active.remove(&id);
            let _ = done_tx.send(Some(result));
        });

        Ok(SpawnedCommand {
            handle,
            events: event_rx,
            done: done_rx,
        })
    }
}

fn push_line(buffer: &mut String, line: &str) {
    if !buffer.is_empty() {
        buffer.push('\n');
    }
    buffer.push_str(line);
}

async fn wait_done(mut done: watch::Receiver<Option<CommandResult>>) -> CommandResult {
    loop {
        if let Some(result) = done.borrow_and_update().clone() {
            return result;
        }
        if done.changed().await.is_err() {
            return CommandResult::failure("command task dropped before completion");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_builder_accumulates() {
        let request = ExecRequest::new("echo hi")
            .with_id("cmd-1")
            .with_cwd("/tmp")
            .with_env("FOO", "bar")
            .with_timeout(Duration::from_secs(5));
        assert_eq!(request.command, "echo hi");
        assert_eq!(request.id.as_deref(), Some("cmd-1"));
        assert_eq!(request.cwd.as_deref(), Some("/tmp"));
        assert_eq!(request.env.get("FOO").map(String::as_str), Some("bar"));
        assert_eq!(request.timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn result_success_requires_zero_exit_and_no_error() {
        let ok = CommandResult {
            exit_code: 0,
            ..Default::default()
        };
        assert!(ok.success());

        let nonzero = CommandResult {
            exit_code: 2,
            ..Default::default()
        };
        assert!(!nonzero.success());

        assert!(!CommandResult::failure("spawn failed").success());
    }

    #[test]
    fn stream_events_serialize_tagged() {
        let event = StreamEvent::Stdout {
            text: "hello".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "stdout");
        assert_eq!(json["text"], "hello");

        let status = StreamEvent::Status {
            id: "cmd-1".to_string(),
            command: "echo".to_string(),
            pid: Some(42),
            started_at: Utc::now(),
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["type"], "status");
        assert_eq!(json["pid"], 42);
    }
}
