//! buildbox — unified local and remote execution sandboxes for AI coding
//! agents.
//!
//! A sandbox is an isolated working directory plus command-execution
//! context. Two providers hide behind one contract: a local process tree
//! whose lifetime is the calling process's own, and a remotely hosted
//! container kept alive against idle eviction by a shared-store heartbeat.
//! Tool code talks to [`sandbox::service::SandboxService`], which exposes
//! `fs`/`bash`/`git`/`dev` capabilities plus lifecycle control, and the
//! [`sandbox::resolver::SandboxResolver`] guarantees at most one live
//! instance per logical identity no matter how many callers race to create
//! it.
//!
//! ```no_run
//! use buildbox::config::SandboxConfig;
//! use buildbox::sandbox::resolver::{ResolverOptions, SandboxResolver};
//! use buildbox::sandbox::service::SandboxService;
//! use std::sync::Arc;
//!
//! # async fn demo() -> Result<(), buildbox::error::SandboxError> {
//! let resolver = Arc::new(SandboxResolver::new(ResolverOptions::local()));
//! let service = SandboxService::new(resolver, SandboxConfig::default());
//!
//! let result = service.bash().sh("echo hello").await?;
//! assert_eq!(result.stdout, "hello");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod dev;
pub mod edit;
pub mod error;
pub mod exec;
pub mod grep;
pub mod keepalive;
pub mod sandbox;
pub mod tools;

pub use config::SandboxConfig;
pub use error::{EditError, SandboxError};
pub use exec::{CommandHandle, CommandResult, ExecRequest, StreamEvent};
pub use sandbox::resolver::{ResolverOptions, SandboxResolver};
pub use sandbox::service::SandboxService;
pub use sandbox::{Sandbox, SandboxStatus};
