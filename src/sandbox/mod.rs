//! Sandbox abstraction layer.
//!
//! Defines the [`SandboxBackend`] trait that all providers implement and the
//! [`Sandbox`] handle callers hold. Two providers exist:
//!
//! - [`local::LocalBackend`] — a process tree on the calling machine, scoped
//!   to a workspace directory (no credentials needed)
//! - [`remote::RemoteBackend`] — an ephemeral container behind the sandbox
//!   service REST API (requires an API key and a shared key-value store for
//!   keep-alive leases)
//!
//! [`resolver::SandboxResolver`] selects a provider, builds or reuses an
//! instance, and collapses concurrent creation races;
//! [`service::SandboxService`] is the facade tool code consumes.

pub mod local;
pub mod remote;
pub mod resolver;
pub mod service;

use crate::config::SandboxConfig;
use crate::dev::DevServerManager;
use crate::error::SandboxError;
use crate::exec::{ExecRequest, Executor, OutputChunk};
use crate::keepalive::Heartbeat;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};

/// Which provider a sandbox runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Local,
    Remote,
}

/// What a backend can and cannot do. Declared up front so callers never have
/// to infer degraded behavior.
#[derive(Debug, Clone, Copy)]
pub struct Capabilities {
    /// Whether `stop` can forcibly terminate a running command. When false,
    /// `stop` awaits natural completion instead.
    pub can_terminate_commands: bool,
    /// Whether the backend can resolve a public host for an exposed port.
    pub has_public_hosts: bool,
}

/// One entry from a directory listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEntry {
    pub name: String,
    pub is_dir: bool,
}

/// Point-in-time snapshot of a sandbox. Recomputed on every call, never
/// cached.
#[derive(Debug, Clone, Serialize)]
pub struct SandboxStatus {
    pub active: bool,
    pub sandbox_id: Option<String>,
    pub uptime: Duration,
    pub last_activity: Duration,
    pub reusable: bool,
}

impl SandboxStatus {
    /// Status reported before any sandbox has been created.
    pub fn inactive() -> Self {
        Self {
            active: false,
            sandbox_id: None,
            uptime: Duration::ZERO,
            last_activity: Duration::ZERO,
            reusable: false,
        }
    }
}

/// Provider-agnostic sandbox interface.
///
/// `execute` streams raw output chunks into the engine's channel and returns
/// a result carrying only exit code, error, and duration — stdout/stderr
/// accumulation is the engine's job. File operations resolve relative paths
/// against the workspace.
#[async_trait]
pub trait SandboxBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    fn capabilities(&self) -> Capabilities;

    /// Provider-assigned identity, shared across caller processes for the
    /// remote backend.
    fn sandbox_id(&self) -> String;

    /// Default working directory for commands and relative paths.
    fn workspace(&self) -> String;

    /// Run one shell command, pushing output chunks as they are produced.
    /// `kill` resolves when the engine wants the command terminated;
    /// backends without that capability ignore it.
    async fn execute(
        &self,
        request: ExecRequest,
        chunks: mpsc::UnboundedSender<OutputChunk>,
        kill: oneshot::Receiver<()>,
    ) -> crate::exec::CommandResult;

    async fn read_file(&self, path: &str) -> Result<String, SandboxError>;

    /// Write a file, creating parent directories as needed.
    async fn write_file(&self, path: &str, content: &str) -> Result<(), SandboxError>;

    async fn list_files(&self, path: &str) -> Result<Vec<FileEntry>, SandboxError>;

    async fn exists(&self, path: &str) -> Result<bool, SandboxError>;

    async fn remove(&self, path: &str) -> Result<(), SandboxError>;

    async fn mkdirp(&self, path: &str) -> Result<(), SandboxError>;

    /// Public URL for an exposed port. Best-effort: `None` when the backend
    /// has no reverse-proxy concept or the lookup fails.
    async fn host(&self, port: u16) -> Option<String>;

    /// Tear down the underlying container/workspace resources.
    async fn terminate(&self) -> Result<(), SandboxError>;
}

struct SandboxInner {
    config: SandboxConfig,
    backend: Arc<dyn SandboxBackend>,
    exec: Executor,
    dev: DevServerManager,
    heartbeat: Option<Heartbeat>,
    created_at: Instant,
    last_activity: Mutex<Instant>,
    terminated: Mutex<bool>,
}

/// Cheaply clonable handle to one live sandbox. All clones share the same
/// backend, command registry, and dev-server state.
#[derive(Clone)]
pub struct Sandbox {
    inner: Arc<SandboxInner>,
}

impl Sandbox {
    pub fn new(
        config: SandboxConfig,
        backend: Arc<dyn SandboxBackend>,
        heartbeat: Option<Heartbeat>,
    ) -> Self {
        let exec = Executor::new(backend.clone(), config.timeout);
        let dev = DevServerManager::new(exec.clone(), backend.clone());
        Self {
            inner: Arc::new(SandboxInner {
                config,
                backend,
                exec,
                dev,
                heartbeat,
                created_at: Instant::now(),
                last_activity: Mutex::new(Instant::now()),
                terminated: Mutex::new(false),
            }),
        }
    }

    pub fn id(&self) -> String {
        self.inner.backend.sandbox_id()
    }

    pub fn kind(&self) -> BackendKind {
        self.inner.backend.kind()
    }

    pub fn capabilities(&self) -> Capabilities {
        self.inner.backend.capabilities()
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.inner.config
    }

    pub fn backend(&self) -> &Arc<dyn SandboxBackend> {
        &self.inner.backend
    }

    pub fn exec(&self) -> &Executor {
        &self.inner.exec
    }

    pub fn dev(&self) -> &DevServerManager {
        &self.inner.dev
    }

    /// Record activity: bumps `last_activity` and refreshes the keep-alive
    /// lease for remote sandboxes. Called by every capability operation.
    pub fn touch(&self) {
        *self.inner.last_activity.lock() = Instant::now();
        if let Some(heartbeat) = &self.inner.heartbeat {
            heartbeat.beat();
        }
    }

    pub fn status(&self) -> SandboxStatus {
        let active = !*self.inner.terminated.lock();
        let uptime = self.inner.created_at.elapsed();
        SandboxStatus {
            active,
            sandbox_id: Some(self.id()),
            uptime,
            last_activity: self.inner.last_activity.lock().elapsed(),
            reusable: active && uptime < self.inner.config.max_lifetime,
        }
    }

    pub async fn terminate(&self) -> Result<(), SandboxError> {
        {
            let mut terminated = self.inner.terminated.lock();
            if *terminated {
                return Ok(());
            }
            *terminated = true;
        }
        self.inner.backend.terminate().await
    }

    /// Whether two handles share one underlying instance.
    pub fn ptr_eq(&self, other: &Sandbox) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for Sandbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sandbox")
            .field("id", &self.id())
            .field("kind", &self.kind())
            .finish_non_exhaustive()
    }
}
