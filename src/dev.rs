//! Dev server manager — thin state tracking over the execution engine for
//! long-lived background processes.
//!
//! Starting a dev server registers a normal command under the engine with a
//! day-long timeout; the manager only remembers which registry ids are dev
//! servers and normalizes results. Stopping goes through the engine and
//! inherits its semantics, including the degraded await-natural-completion
//! mode on backends that cannot terminate commands.

use crate::config::DEFAULT_DEV_SERVER_TIMEOUT;
use crate::error::SandboxError;
use crate::exec::{CommandHandle, ExecRequest, Executor, StreamEvent};
use crate::sandbox::SandboxBackend;
use chrono::{DateTime, Utc};
use futures_util::{Stream, StreamExt};
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use uuid::Uuid;

/// Package-manager banner lines filtered from streamed stderr. Stdout is
/// never filtered.
fn stderr_noise() -> &'static Regex {
    static NOISE: OnceLock<Regex> = OnceLock::new();
    NOISE.get_or_init(|| Regex::new(r"^\s*npm\s+(notice|warn)\b").expect("static regex"))
}

/// Parameters for starting a dev server.
#[derive(Debug, Clone, Default)]
pub struct DevServerOptions {
    pub command: String,
    pub id: Option<String>,
    pub cwd: Option<String>,
    pub env: HashMap<String, String>,
    pub timeout: Option<Duration>,
}

impl DevServerOptions {
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
}

/// Normalized shape returned by start and stop.
#[derive(Debug, Clone, Serialize)]
pub struct DevServerResult {
    pub id: String,
    pub command: String,
    pub pid: Option<u32>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Tracks dev-server commands for one sandbox. Clones share state.
#[derive(Clone)]
pub struct DevServerManager {
    exec: Executor,
    backend: Arc<dyn SandboxBackend>,
}

impl DevServerManager {
    pub fn new(exec: Executor, backend: Arc<dyn SandboxBackend>) -> Self {
        Self { exec, backend }
    }

    fn request(&self, opts: DevServerOptions) -> ExecRequest {
        let id = opts
            .id
            .unwrap_or_else(|| format!("dev-{}", Uuid::new_v4()));
        let mut request = ExecRequest::new(opts.command)
            .with_id(id)
            .with_timeout(opts.timeout.unwrap_or(DEFAULT_DEV_SERVER_TIMEOUT));
        request.cwd = opts.cwd;
        request.env = opts.env;
        request
    }

    /// Start a dev server and return immediately; the process keeps running
    /// in the background under the engine's registry.
    pub fn start(&self, opts: DevServerOptions) -> Result<DevServerResult, SandboxError> {
        let (handle, mut events) = self.exec.run_streaming(self.request(opts))?;

        // Drain in the background so output never piles up unconsumed.
        let id = handle.id.clone();
        tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if let StreamEvent::Stderr { text } = &event {
                    tracing::debug!(dev_server = %id, line = %text, "dev server stderr");
                }
            }
        });

        Ok(Self::running_result(handle))
    }

    /// Start a dev server and stream its output. The first event is the
    /// status event; stderr lines matching the package-manager noise pattern
    /// are dropped.
    pub fn start_streaming(
        &self,
        opts: DevServerOptions,
    ) -> Result<(CommandHandle, impl Stream<Item = StreamEvent>), SandboxError> {
        let (handle, events) = self.exec.run_streaming(self.request(opts))?;
        let filtered = events.filter(|event| {
            let keep = match event {
                StreamEvent::Stderr { text } => !stderr_noise().is_match(text),
                _ => true,
            };
            futures_util::future::ready(keep)
        });
        Ok((handle, filtered))
    }

    /// Stop a dev server and return its final state. Unknown ids fail with
    /// [`SandboxError::CommandNotRunning`].
    pub async fn stop(&self, id: &str) -> Result<DevServerResult, SandboxError> {
        let handle = self
            .exec
            .handle(id)
            .ok_or_else(|| SandboxError::CommandNotRunning { id: id.to_string() })?;
        let result = self.exec.stop(id).await?;
        Ok(DevServerResult {
            id: handle.id,
            command: handle.command,
            pid: handle.pid,
            started_at: handle.started_at,
            exit_code: Some(result.exit_code),
            error: result.error,
        })
    }

    /// Public URL for a port, when the backend has one. Local sandboxes
    /// return `None` here rather than erroring.
    pub async fn host(&self, port: u16) -> Option<String> {
        self.backend.host(port).await
    }

    fn running_result(handle: CommandHandle) -> DevServerResult {
        DevServerResult {
            id: handle.id,
            command: handle.command,
            pid: handle.pid,
            started_at: handle.started_at,
            exit_code: None,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noise_pattern_matches_package_manager_banners() {
        let noise = stderr_noise();
        assert!(noise.is_match("npm notice New major version of npm available!"));
        assert!(noise.is_match("npm warn deprecated lodash@1.0.0"));
        assert!(noise.is_match("  npm warn indented"));
        assert!(!noise.is_match("error: build failed"));
        assert!(!noise.is_match("npminstall weirdness"));
    }

    #[test]
    fn options_builder_sets_identity() {
        let opts = DevServerOptions::new("npm run dev")
            .with_id("dev-1")
            .with_cwd("/srv/app");
        assert_eq!(opts.command, "npm run dev");
        assert_eq!(opts.id.as_deref(), Some("dev-1"));
        assert_eq!(opts.cwd.as_deref(), Some("/srv/app"));
    }
}
