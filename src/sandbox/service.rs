//! The capability surface tool code holds.
//!
//! [`SandboxService`] lazily resolves its sandbox through the resolver and
//! routes every operation through the handle, bumping activity tracking and
//! the remote keep-alive lease on each call. The `fs`/`bash`/`git`/`dev`
//! accessors hand out thin API objects that share the service.

use super::resolver::SandboxResolver;
use super::{Sandbox, SandboxStatus};
use crate::config::SandboxConfig;
use crate::edit::EditEngine;
use crate::error::SandboxError;
use crate::exec::{CommandHandle, CommandResult, ExecRequest, StreamEvent};
use crate::grep::{self, GrepOptions, GrepResult};
use crate::sandbox::remote::shell_quote;
use crate::sandbox::FileEntry;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio_stream::wrappers::UnboundedReceiverStream;

struct ServiceInner {
    resolver: Arc<SandboxResolver>,
    config: RwLock<SandboxConfig>,
}

/// One logical sandbox as seen by tool code. Cheap to clone.
#[derive(Clone)]
pub struct SandboxService {
    inner: Arc<ServiceInner>,
}

impl SandboxService {
    pub fn new(resolver: Arc<SandboxResolver>, config: SandboxConfig) -> Self {
        Self {
            inner: Arc::new(ServiceInner {
                resolver,
                config: RwLock::new(config),
            }),
        }
    }

    pub fn config(&self) -> SandboxConfig {
        self.inner.config.read().clone()
    }

    /// Replace the configuration used for subsequent resolution. Does not
    /// touch an already-created sandbox; pair with [`refresh`](Self::refresh)
    /// to rebuild.
    pub fn set_config(&self, config: SandboxConfig) {
        *self.inner.config.write() = config;
    }

    /// Resolve (creating if needed) the sandbox for the current config. A
    /// sandbox past its `max_lifetime` is torn down and rebuilt here.
    pub async fn get_sandbox(&self) -> Result<Sandbox, SandboxError> {
        let config = self.config();
        let sandbox = self.inner.resolver.resolve(&config).await?;
        if sandbox.status().reusable {
            return Ok(sandbox);
        }
        tracing::debug!(sandbox_id = %sandbox.id(), "sandbox exceeded max lifetime; rebuilding");
        self.refresh(None).await
    }

    /// Resolve and record activity. Every capability operation funnels
    /// through here, which is what keeps the remote lease fresh.
    pub(crate) async fn sandbox(&self) -> Result<Sandbox, SandboxError> {
        let sandbox = self.get_sandbox().await?;
        sandbox.touch();
        Ok(sandbox)
    }

    /// Terminate the sandbox and drop it from the resolver cache.
    pub async fn stop(&self) -> Result<(), SandboxError> {
        let config = self.config();
        match self.inner.resolver.evict(&config) {
            Some(sandbox) => sandbox.terminate().await,
            None => Ok(()),
        }
    }

    /// Tear down the current sandbox (if any) and build a fresh one,
    /// optionally swapping the configuration first.
    pub async fn refresh(&self, config: Option<SandboxConfig>) -> Result<Sandbox, SandboxError> {
        if let Some(config) = config {
            self.set_config(config);
        }
        self.stop().await?;
        let config = self.config();
        self.inner.resolver.resolve(&config).await
    }

    /// Drop the cached handle without terminating the backend. A remote
    /// container shared with other callers stays alive for them.
    pub fn dispose(&self) {
        let config = self.config();
        self.inner.resolver.evict(&config);
    }

    pub async fn status(&self) -> SandboxStatus {
        match self.inner.resolver.peek(&self.config()) {
            Some(sandbox) => sandbox.status(),
            None => SandboxStatus::inactive(),
        }
    }

    pub async fn sandbox_id(&self) -> Option<String> {
        self.inner.resolver.peek(&self.config()).map(|s| s.id())
    }

    pub async fn is_active(&self) -> bool {
        self.status().await.active
    }

    /// Refresh the keep-alive lease without performing an operation.
    pub async fn keep_alive(&self) {
        if let Some(sandbox) = self.inner.resolver.peek(&self.config()) {
            sandbox.touch();
        }
    }

    pub fn fs(&self) -> FsApi {
        FsApi {
            service: self.clone(),
        }
    }

    pub fn bash(&self) -> BashApi {
        BashApi {
            service: self.clone(),
        }
    }

    pub fn git(&self) -> GitApi {
        GitApi {
            service: self.clone(),
        }
    }

    pub fn dev(&self) -> DevApi {
        DevApi {
            service: self.clone(),
        }
    }

    pub fn edit(&self) -> EditEngine {
        EditEngine::new(self.fs(), self.git())
    }
}

// ── fs ────────────────────────────────────────────────────────────────────

/// File operations, uniform over both backends.
#[derive(Clone)]
pub struct FsApi {
    service: SandboxService,
}

impl FsApi {
    pub async fn read_file(&self, path: &str) -> Result<String, SandboxError> {
        self.service.sandbox().await?.backend().read_file(path).await
    }

    /// Write a file, creating parent directories as needed.
    pub async fn write_file(&self, path: &str, content: &str) -> Result<(), SandboxError> {
        self.service
            .sandbox()
            .await?
            .backend()
            .write_file(path, content)
            .await
    }

    pub async fn list_files(&self, path: &str) -> Result<Vec<FileEntry>, SandboxError> {
        self.service.sandbox().await?.backend().list_files(path).await
    }

    pub async fn exists(&self, path: &str) -> Result<bool, SandboxError> {
        self.service.sandbox().await?.backend().exists(path).await
    }

    pub async fn remove(&self, path: &str) -> Result<(), SandboxError> {
        self.service.sandbox().await?.backend().remove(path).await
    }

    pub async fn mkdirp(&self, path: &str) -> Result<(), SandboxError> {
        self.service.sandbox().await?.backend().mkdirp(path).await
    }
}

// ── bash ──────────────────────────────────────────────────────────────────

/// Shell execution. `sh` accepts plain command text or a full
/// [`ExecRequest`] with cwd, env, callbacks, and timeouts.
#[derive(Clone)]
pub struct BashApi {
    service: SandboxService,
}

impl BashApi {
    pub async fn sh(
        &self,
        request: impl Into<ExecRequest>,
    ) -> Result<CommandResult, SandboxError> {
        let sandbox = self.service.sandbox().await?;
        sandbox.exec().run(request).await
    }

    pub async fn sh_streaming(
        &self,
        request: impl Into<ExecRequest>,
    ) -> Result<(CommandHandle, UnboundedReceiverStream<StreamEvent>), SandboxError> {
        let sandbox = self.service.sandbox().await?;
        sandbox.exec().run_streaming(request)
    }

    /// Stop a running command by registry id.
    pub async fn stop(&self, id: &str) -> Result<CommandResult, SandboxError> {
        let sandbox = self.service.sandbox().await?;
        sandbox.exec().stop(id).await
    }

    /// Search sandbox files. Exit code 1 from grep (no matches) yields an
    /// empty result rather than an error.
    pub async fn grep(
        &self,
        pattern: &str,
        options: GrepOptions,
    ) -> Result<GrepResult, SandboxError> {
        let sandbox = self.service.sandbox().await?;
        let command = grep::build_command(pattern, &options, &sandbox.backend().workspace());
        let result = sandbox.exec().run(ExecRequest::new(command)).await?;
        grep::parse_result(&result, &options)
    }
}

// ── git ───────────────────────────────────────────────────────────────────

/// Version control over the sandbox workspace, executed through the sandbox
/// shell so it works identically on both backends.
#[derive(Clone)]
pub struct GitApi {
    service: SandboxService,
}

impl GitApi {
    async fn run(&self, command: String) -> Result<CommandResult, SandboxError> {
        let sandbox = self.service.sandbox().await?;
        let cwd = sandbox.backend().workspace();
        sandbox
            .exec()
            .run(ExecRequest::new(command).with_cwd(cwd))
            .await
    }

    /// Initialize a repository in the workspace unless one is already there.
    pub async fn init_if_needed(&self) -> Result<(), SandboxError> {
        let result = self
            .run("git rev-parse --git-dir >/dev/null 2>&1 || git init -q".to_string())
            .await?;
        if result.success() {
            Ok(())
        } else {
            Err(SandboxError::Backend(format!(
                "git init failed: {}",
                result.error.unwrap_or(result.stderr)
            )))
        }
    }

    /// Stage everything and commit, returning the resulting HEAD hash. A
    /// commit with nothing staged resolves to the current HEAD.
    pub async fn commit_all(&self, message: &str) -> Result<String, SandboxError> {
        let add = self.run("git add -A".to_string()).await?;
        if !add.success() {
            return Err(SandboxError::Backend(format!(
                "git add failed: {}",
                add.error.unwrap_or(add.stderr)
            )));
        }

        let commit = self
            .run(format!(
                "git -c user.name=buildbox -c user.email=buildbox@localhost \
                 commit -q -m {}",
                shell_quote(message)
            ))
            .await?;
        if !commit.success() {
            let detail = format!("{}\n{}", commit.stdout, commit.stderr);
            if !detail.contains("nothing to commit") {
                return Err(SandboxError::Backend(format!(
                    "git commit failed: {}",
                    commit.error.unwrap_or(detail)
                )));
            }
        }

        self.head().await
    }

    /// Current HEAD hash.
    pub async fn head(&self) -> Result<String, SandboxError> {
        let result = self.run("git rev-parse HEAD".to_string()).await?;
        if result.success() {
            Ok(result.stdout.trim().to_string())
        } else {
            Err(SandboxError::Backend(format!(
                "git rev-parse failed: {}",
                result.error.unwrap_or(result.stderr)
            )))
        }
    }
}

// ── dev ───────────────────────────────────────────────────────────────────

/// Dev-server lifecycle, delegating to the per-sandbox manager.
#[derive(Clone)]
pub struct DevApi {
    service: SandboxService,
}

impl DevApi {
    pub async fn start(
        &self,
        opts: crate::dev::DevServerOptions,
    ) -> Result<crate::dev::DevServerResult, SandboxError> {
        let sandbox = self.service.sandbox().await?;
        sandbox.dev().start(opts)
    }

    pub async fn start_streaming(
        &self,
        opts: crate::dev::DevServerOptions,
    ) -> Result<
        (
            CommandHandle,
            impl futures_util::Stream<Item = StreamEvent>,
        ),
        SandboxError,
    > {
        let sandbox = self.service.sandbox().await?;
        sandbox.dev().start_streaming(opts)
    }

    pub async fn stop(&self, id: &str) -> Result<crate::dev::DevServerResult, SandboxError> {
        let sandbox = self.service.sandbox().await?;
        sandbox.dev().stop(id).await
    }

    pub async fn host(&self, port: u16) -> Result<Option<String>, SandboxError> {
        let sandbox = self.service.sandbox().await?;
        Ok(sandbox.dev().host(port).await)
    }
}
