//! `sandbox_run_command` tool — execute a shell command in the sandbox.

use crate::exec::ExecRequest;
use crate::sandbox::service::SandboxService;
use crate::tools::{Tool, ToolResult};
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

const TOOL_NAME: &str = "sandbox_run_command";

pub struct SandboxRunCommandTool {
    service: SandboxService,
}

impl SandboxRunCommandTool {
    pub fn new(service: SandboxService) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Tool for SandboxRunCommandTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        "Run a shell command inside the sandbox. \
         Returns stdout, stderr, and exit_code. \
         Use this for: npm install, cargo build, npm run build, test suites, etc. \
         Long-running servers belong in sandbox_dev_server instead."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "Shell command to execute (e.g. 'npm install')"
                },
                "cwd": {
                    "type": "string",
                    "description": "Working directory. Default: the sandbox workspace."
                },
                "timeout_ms": {
                    "type": "integer",
                    "description": "Timeout in milliseconds. Default: 300000 (5 minutes)."
                },
                "id": {
                    "type": "string",
                    "description": "Optional explicit command id. Fails if a command with this id is already running."
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> anyhow::Result<ToolResult> {
        let command = args["command"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("Missing required parameter: command"))?;

        if command.trim().is_empty() {
            return Ok(ToolResult {
                success: false,
                output: String::new(),
                error: Some("command cannot be empty".to_string()),
            });
        }

        let mut request = ExecRequest::new(command);
        if let Some(cwd) = args["cwd"].as_str() {
            request = request.with_cwd(cwd);
        }
        if let Some(timeout_ms) = args["timeout_ms"].as_u64() {
            request = request.with_timeout(Duration::from_millis(timeout_ms));
        }
        if let Some(id) = args["id"].as_str() {
            request = request.with_id(id);
        }

        match self.service.bash().sh(request).await {
            Ok(result) => {
                let exit_code = result.exit_code;
                let success = result.success();

                let mut out = format!("exit_code: {exit_code}");
                if !result.stdout.is_empty() {
                    out.push_str(&format!("\n\nstdout:\n{}", result.stdout));
                }
                if !result.stderr.is_empty() {
                    out.push_str(&format!("\n\nstderr:\n{}", result.stderr));
                }

                if success {
                    Ok(ToolResult {
                        success: true,
                        output: out,
                        error: None,
                    })
                } else {
                    Ok(ToolResult {
                        success: false,
                        output: out,
                        error: Some(
                            result
                                .error
                                .unwrap_or_else(|| format!("Command exited with code {exit_code}")),
                        ),
                    })
                }
            }
            Err(e) => Ok(ToolResult {
                success: false,
                output: String::new(),
                error: Some(format!("Failed to run command: {e}")),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SandboxConfig;
    use crate::sandbox::resolver::{ResolverOptions, SandboxResolver};
    use std::sync::Arc;

    fn service() -> SandboxService {
        let resolver = Arc::new(SandboxResolver::new(ResolverOptions::local()));
        SandboxService::new(resolver, SandboxConfig::default())
    }

    #[test]
    fn tool_name() {
        assert_eq!(SandboxRunCommandTool::new(service()).name(), TOOL_NAME);
    }

    #[tokio::test]
    async fn empty_command_is_rejected() {
        let tool = SandboxRunCommandTool::new(service());
        let result = tool.execute(json!({"command": "  "})).await.unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("empty"));
    }
}
