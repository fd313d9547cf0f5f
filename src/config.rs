//! Sandbox configuration: one immutable [`SandboxConfig`] per sandbox
//! instance, plus the environment settings the host process feeds into the
//! resolver (API key, API base URL, default workspace).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default per-command timeout.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(300);

/// Default ceiling on sandbox reuse before a refresh rebuilds it.
pub const DEFAULT_MAX_LIFETIME: Duration = Duration::from_secs(3600);

/// Default idle window before the remote service may reclaim a container.
/// Doubles as the TTL of the keep-alive lease.
pub const DEFAULT_AUTO_STOP_DELAY: Duration = Duration::from_secs(300);

/// Timeout applied to dev-server commands, which run until stopped.
pub const DEFAULT_DEV_SERVER_TIMEOUT: Duration = Duration::from_secs(24 * 3600);

/// Working directory inside a remote container when none is configured.
pub const DEFAULT_REMOTE_WORKSPACE: &str = "/home/user/project";

/// Parameters for creating (or re-attaching to) one sandbox.
///
/// Identity fields (`sandbox_id`, `workspace_path`) feed the resolver's cache
/// key; the rest parameterize backend creation. The struct is cloned into the
/// sandbox instance at creation time and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Logical identity. Remote: the container id shared across caller
    /// processes. Local: disambiguates multiple sandboxes over one workspace.
    pub sandbox_id: Option<String>,
    /// Working directory root. Local: host path (created if missing).
    /// Remote: path inside the container.
    pub workspace_path: Option<PathBuf>,
    /// Per-command timeout unless a request overrides it.
    pub timeout: Duration,
    /// Total reuse window; a sandbox older than this reports
    /// `reusable: false` and is rebuilt on the next access.
    pub max_lifetime: Duration,
    /// Ports the remote service should expose.
    pub ports: Vec<u16>,
    /// Remote runtime image identifier (e.g. "node22").
    pub runtime: Option<String>,
    /// Remote vCPU allocation.
    pub vcpus: Option<u32>,
    /// Remote idle window before reclamation; the heartbeat lease TTL.
    pub auto_stop_delay: Duration,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            sandbox_id: None,
            workspace_path: None,
            timeout: DEFAULT_COMMAND_TIMEOUT,
            max_lifetime: DEFAULT_MAX_LIFETIME,
            ports: Vec::new(),
            runtime: None,
            vcpus: None,
            auto_stop_delay: DEFAULT_AUTO_STOP_DELAY,
        }
    }
}

impl SandboxConfig {
    pub fn with_sandbox_id(mut self, id: impl Into<String>) -> Self {
        self.sandbox_id = Some(id.into());
        self
    }

    pub fn with_workspace_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.workspace_path = Some(path.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_lifetime(mut self, max_lifetime: Duration) -> Self {
        self.max_lifetime = max_lifetime;
        self
    }
}

/// Settings read from the process environment. Parsing config files is the
/// host application's concern; this only lifts the well-known variables into
/// typed values the resolver consumes.
#[derive(Debug, Clone, Default)]
pub struct EnvSettings {
    pub api_key: Option<String>,
    pub api_base: Option<String>,
    pub workspace_path: Option<PathBuf>,
    pub sandbox_id: Option<String>,
}

impl EnvSettings {
    pub fn from_env() -> Self {
        Self {
            api_key: non_empty_var("SANDBOX_API_KEY"),
            api_base: non_empty_var("SANDBOX_API_BASE"),
            workspace_path: non_empty_var("SANDBOX_WORKSPACE").map(PathBuf::from),
            sandbox_id: non_empty_var("SANDBOX_ID"),
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
