//! `sandbox_dev_server` tool — start and stop long-running dev servers.

use crate::dev::DevServerOptions;
use crate::sandbox::service::SandboxService;
use crate::tools::{Tool, ToolResult};
use async_trait::async_trait;
use serde_json::json;

const TOOL_NAME: &str = "sandbox_dev_server";

pub struct SandboxDevServerTool {
    service: SandboxService,
}

impl SandboxDevServerTool {
    pub fn new(service: SandboxService) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Tool for SandboxDevServerTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        "Manage long-running dev servers in the sandbox. \
         action=start launches the command in the background and returns its id immediately; \
         action=stop terminates a server by id (on remote sandboxes this waits for it to exit). \
         Use sandbox_get_host to find the public URL for a port."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["start", "stop"],
                    "description": "start or stop"
                },
                "command": {
                    "type": "string",
                    "description": "Shell command to launch (start only), e.g. 'npm run dev'"
                },
                "id": {
                    "type": "string",
                    "description": "Server id: optional on start, required on stop"
                },
                "cwd": {
                    "type": "string",
                    "description": "Working directory (start only). Default: the workspace."
                }
            },
            "required": ["action"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> anyhow::Result<ToolResult> {
        let action = args["action"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("Missing required parameter: action"))?;

        match action {
            "start" => {
                let command = args["command"]
                    .as_str()
                    .ok_or_else(|| anyhow::anyhow!("Missing required parameter: command"))?;
                let mut opts = DevServerOptions::new(command);
                if let Some(id) = args["id"].as_str() {
                    opts = opts.with_id(id);
                }
                if let Some(cwd) = args["cwd"].as_str() {
                    opts = opts.with_cwd(cwd);
                }

                match self.service.dev().start(opts).await {
                    Ok(result) => Ok(ToolResult {
                        success: true,
                        output: format!(
                            "Started '{}' with id {} at {}",
                            result.command, result.id, result.started_at
                        ),
                        error: None,
                    }),
                    Err(e) => Ok(ToolResult {
                        success: false,
                        output: String::new(),
                        error: Some(format!("Failed to start dev server: {e}")),
                    }),
                }
            }
            "stop" => {
                let id = args["id"]
                    .as_str()
                    .ok_or_else(|| anyhow::anyhow!("Missing required parameter: id"))?;

                match self.service.dev().stop(id).await {
                    Ok(result) => Ok(ToolResult {
                        success: true,
                        output: format!(
                            "Stopped {} (exit_code: {})",
                            result.id,
                            result
                                .exit_code
                                .map(|c| c.to_string())
                                .unwrap_or_else(|| "unknown".to_string())
                        ),
                        error: None,
                    }),
                    Err(e) => Ok(ToolResult {
                        success: false,
                        output: String::new(),
                        error: Some(format!("Failed to stop dev server: {e}")),
                    }),
                }
            }
            other => Ok(ToolResult {
                success: false,
                output: String::new(),
                error: Some(format!("Unknown action '{other}'; use start or stop")),
            }),
        }
    }
}
