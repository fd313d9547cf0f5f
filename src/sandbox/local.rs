//! Local sandbox provider — runs commands as child processes on the calling
//! machine, scoped to a workspace directory.
//!
//! No credentials or external services needed. Lifetime is the calling
//! process's own lifetime, so there is no keep-alive requirement. Commands
//! can be forcibly terminated; port lookups return `None` because there is
//! no reverse proxy in front of a local process.

use super::{BackendKind, Capabilities, FileEntry, SandboxBackend};
use crate::config::SandboxConfig;
use crate::error::SandboxError;
use crate::exec::{CommandResult, ExecRequest, OutputChunk};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

enum Interrupt {
    Stopped,
    TimedOut,
}

/// Local process-tree backend over one workspace directory.
pub struct LocalBackend {
    sandbox_id: String,
    workspace: PathBuf,
}

impl LocalBackend {
    /// Build a backend for the configured workspace, creating the directory
    /// if it does not exist. Without a configured path the workspace lands
    /// under the system temp directory, keyed by sandbox id.
    pub fn create(config: &SandboxConfig) -> Result<Self, SandboxError> {
        let sandbox_id = config
            .sandbox_id
            .clone()
            .unwrap_or_else(|| format!("local-{}", Uuid::new_v4()));

        let workspace = match &config.workspace_path {
            Some(path) => path.clone(),
            None => std::env::temp_dir().join(format!("buildbox-{sandbox_id}")),
        };

        std::fs::create_dir_all(&workspace)
            .map_err(|e| SandboxError::Backend(format!("failed to create workspace: {e}")))?;

        Ok(Self {
            sandbox_id,
            workspace,
        })
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let candidate = Path::new(path);
        if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.workspace.join(candidate)
        }
    }
}

#[async_trait]
impl SandboxBackend for LocalBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            can_terminate_commands: true,
            has_public_hosts: false,
        }
    }

    fn sandbox_id(&self) -> String {
        self.sandbox_id.clone()
    }

    fn workspace(&self) -> String {
        self.workspace.to_string_lossy().into_owned()
    }

    async fn execute(
        &self,
        request: ExecRequest,
        chunks: mpsc::UnboundedSender<OutputChunk>,
        kill: oneshot::Receiver<()>,
    ) -> CommandResult {
        let started = Instant::now();
        let cwd = request
            .cwd
            .clone()
            .unwrap_or_else(|| self.workspace());

        let mut command = tokio::process::Command::new("sh");
        command
            .arg("-c")
            .arg(&request.command)
            .current_dir(&cwd)
            .envs(&request.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => return CommandResult::failure(format!("failed to spawn command: {e}")),
        };
        let _ = chunks.send(OutputChunk::Started { pid: child.id() });

        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            let chunks = chunks.clone();
            readers.push(tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if chunks.send(OutputChunk::Stdout(line)).is_err() {
                        break;
                    }
                }
            }));
        }
        if let Some(stderr) = child.stderr.take() {
            let chunks = chunks.clone();
            readers.push(tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if chunks.send(OutputChunk::Stderr(line)).is_err() {
                        break;
                    }
                }
            }));
        }

        let timeout = request.timeout.unwrap_or(Duration::from_secs(300));
        // A dropped kill sender must not read as a terminate request.
        let interrupt = async move {
            tokio::select! {
                received = kill => match received {
                    Ok(()) => Interrupt::Stopped,
                    Err(_) => std::future::pending().await,
                },
                _ = tokio::time::sleep(timeout) => Interrupt::TimedOut,
            }
        };
        tokio::pin!(interrupt);

        // The interrupt branch only reports why; the child is signaled after
        // the select ends so the wait future's borrow is released first.
        let outcome = tokio::select! {
            status = child.wait() => Ok(status),
            why = &mut interrupt => Err(why),
        };

        let mut result = match outcome {
            Ok(Ok(status)) => CommandResult {
                exit_code: status.code().map(i64::from).unwrap_or(-1),
                error: status
                    .code()
                    .is_none()
                    .then(|| "command terminated by signal".to_string()),
                ..CommandResult::default()
            },
            Ok(Err(e)) => CommandResult::failure(format!("failed to wait on command: {e}")),
            Err(why) => {
                let _ = child.start_kill();
                let _ = child.wait().await;
                match why {
                    Interrupt::Stopped => {
                        CommandResult::failure("command terminated by stop request")
                    }
                    Interrupt::TimedOut => CommandResult::failure(format!(
                        "command timed out after {}ms",
                        timeout.as_millis()
                    )),
                }
            }
        };

        // Flush whatever the pipes still hold before completion is reported.
        for reader in readers {
            let _ = reader.await;
        }

        result.duration_ms = Some(started.elapsed().as_millis() as u64);
        result
    }

    async fn read_file(&self, path: &str) -> Result<String, SandboxError> {
        let resolved = self.resolve(path);
        match tokio::fs::read_to_string(&resolved).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(SandboxError::FileNotFound {
                    path: path.to_string(),
                })
            }
            Err(e) => Err(SandboxError::Backend(format!("read {path}: {e}"))),
        }
    }

    async fn write_file(&self, path: &str, content: &str) -> Result<(), SandboxError> {
        let resolved = self.resolve(path);
        if let Some(parent) = resolved.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SandboxError::Backend(format!("mkdir for {path}: {e}")))?;
        }
        tokio::fs::write(&resolved, content)
            .await
            .map_err(|e| SandboxError::Backend(format!("write {path}: {e}")))
    }

    async fn list_files(&self, path: &str) -> Result<Vec<FileEntry>, SandboxError> {
        let resolved = self.resolve(path);
        let mut entries = Vec::new();
        for entry in walkdir::WalkDir::new(&resolved)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry =
                entry.map_err(|e| SandboxError::Backend(format!("list {path}: {e}")))?;
            entries.push(FileEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_dir: entry.file_type().is_dir(),
            });
        }
        Ok(entries)
    }

    async fn exists(&self, path: &str) -> Result<bool, SandboxError> {
        tokio::fs::try_exists(self.resolve(path))
            .await
            .map_err(|e| SandboxError::Backend(format!("stat {path}: {e}")))
    }

    async fn remove(&self, path: &str) -> Result<(), SandboxError> {
        let resolved = self.resolve(path);
        let meta = tokio::fs::metadata(&resolved)
            .await
            .map_err(|_| SandboxError::FileNotFound {
                path: path.to_string(),
            })?;
        let result = if meta.is_dir() {
            tokio::fs::remove_dir_all(&resolved).await
        } else {
            tokio::fs::remove_file(&resolved).await
        };
        result.map_err(|e| SandboxError::Backend(format!("remove {path}: {e}")))
    }

    async fn mkdirp(&self, path: &str) -> Result<(), SandboxError> {
        tokio::fs::create_dir_all(self.resolve(path))
            .await
            .map_err(|e| SandboxError::Backend(format!("mkdir {path}: {e}")))
    }

    async fn host(&self, _port: u16) -> Option<String> {
        // No reverse proxy in front of local processes.
        None
    }

    async fn terminate(&self) -> Result<(), SandboxError> {
        Ok(())
    }
}
