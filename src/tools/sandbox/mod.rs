//! Sandbox tools for an agent loop.
//!
//! Provider-agnostic tools over [`SandboxService`](crate::SandboxService):
//! the same tool set works whether the service resolves a local workspace or
//! a remote container. Each tool is a thin delegator; all sandbox logic
//! lives in the core modules.

pub mod command;
pub mod create;
pub mod dev;
pub mod edit;
pub mod files;
pub mod grep;
pub mod host;
pub mod stop;

pub use command::SandboxRunCommandTool;
pub use create::SandboxCreateTool;
pub use dev::SandboxDevServerTool;
pub use edit::SandboxEditFileTool;
pub use files::{SandboxListFilesTool, SandboxReadFileTool, SandboxWriteFileTool};
pub use grep::SandboxGrepTool;
pub use host::SandboxGetHostTool;
pub use stop::SandboxStopTool;

/// Tool name constants for reference.
pub const TOOL_CREATE: &str = "sandbox_create";
pub const TOOL_RUN_COMMAND: &str = "sandbox_run_command";
pub const TOOL_EDIT_FILE: &str = "sandbox_edit_file";
pub const TOOL_WRITE_FILE: &str = "sandbox_write_file";
pub const TOOL_READ_FILE: &str = "sandbox_read_file";
pub const TOOL_LIST_FILES: &str = "sandbox_list_files";
pub const TOOL_GREP: &str = "sandbox_grep";
pub const TOOL_DEV_SERVER: &str = "sandbox_dev_server";
pub const TOOL_GET_HOST: &str = "sandbox_get_host";
pub const TOOL_STOP: &str = "sandbox_stop";
