//! Error taxonomy for the sandbox core.
//!
//! Three families of failure are kept distinct so tool code can react
//! specifically:
//!
//! - configuration errors (missing credentials, missing shared store) are
//!   fatal at resolve time and carry a stable machine-readable code;
//! - concurrency/state errors (duplicate command id, stop on an unknown id)
//!   surface synchronously and are never silently ignored;
//! - edit errors (not found, ambiguous match, equal old/new) map to distinct
//!   remediation messages in the calling agent.
//!
//! Execution failures (non-zero exit, spawn failure, timeout) are *data*, not
//! errors: they are reported through [`CommandResult`](crate::exec::CommandResult)
//! so callers can still inspect partial stdout/stderr.
//!
//! All variants hold owned strings so the whole enum is `Clone` — the
//! resolver caches creation futures whose output must be clonable across
//! every caller awaiting the same in-flight creation.

use thiserror::Error;

/// Stable code: the remote backend was selected but no API key was supplied.
pub const SANDBOX_API_KEY_MISSING: &str = "SANDBOX_API_KEY_MISSING";

/// Stable code: the remote backend was selected but no shared key-value
/// store was supplied for heartbeat coordination.
pub const SECONDARY_MEMORY_MISSING: &str = "SECONDARY_MEMORY_MISSING";

#[derive(Debug, Clone, Error)]
pub enum SandboxError {
    /// Fatal at resolve time; not retried automatically.
    #[error("sandbox configuration error [{code}]: {message}")]
    Configuration {
        code: &'static str,
        message: String,
    },

    /// A command with this id is already registered for this sandbox.
    #[error("a command with id '{id}' is already running")]
    CommandAlreadyRunning { id: String },

    /// `stop` was called for an id that is not in the active registry.
    #[error("no running command with id '{id}'")]
    CommandNotRunning { id: String },

    #[error("file not found: {path}")]
    FileNotFound { path: String },

    #[error(transparent)]
    Edit(#[from] EditError),

    /// Backend/process-level failure (spawn, filesystem, git plumbing).
    #[error("sandbox backend error: {0}")]
    Backend(String),

    /// Transport failure talking to the remote sandbox service. Propagates
    /// to the resolver, which evicts the cache entry so the next call
    /// retries creation from scratch.
    #[error("sandbox API request failed: {0}")]
    Http(String),
}

impl SandboxError {
    pub fn api_key_missing() -> Self {
        Self::Configuration {
            code: SANDBOX_API_KEY_MISSING,
            message: "remote sandboxes require an API key (set SANDBOX_API_KEY)".to_string(),
        }
    }

    pub fn secondary_memory_missing() -> Self {
        Self::Configuration {
            code: SECONDARY_MEMORY_MISSING,
            message: "remote sandboxes require a shared key-value store for keep-alive leases"
                .to_string(),
        }
    }

    /// The stable error code, if this error carries one.
    pub fn code(&self) -> Option<&'static str> {
        match self {
            Self::Configuration { code, .. } => Some(code),
            _ => None,
        }
    }
}

/// Failure modes of the text-replacement engine.
#[derive(Debug, Clone, Error)]
pub enum EditError {
    #[error("invalid edit arguments: {0}")]
    InvalidArgument(String),

    /// No strategy located the target text.
    #[error("could not find the text to replace in {path}")]
    NotFound { path: String },

    /// A strategy matched more than once while `replace_all` was false.
    #[error(
        "the text to replace occurs {count} times in {path}; \
         pass replace_all or include more surrounding context"
    )]
    AmbiguousMatch { path: String, count: usize },
}
