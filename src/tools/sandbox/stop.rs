//! `sandbox_stop` tool — terminate the current sandbox.

use crate::sandbox::service::SandboxService;
use crate::tools::{Tool, ToolResult};
use async_trait::async_trait;
use serde_json::json;

const TOOL_NAME: &str = "sandbox_stop";

pub struct SandboxStopTool {
    service: SandboxService,
}

impl SandboxStopTool {
    pub fn new(service: SandboxService) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Tool for SandboxStopTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        "Terminate the current sandbox and release its resources. \
         The next sandbox operation creates a fresh one. \
         A no-op when no sandbox has been created yet."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {}
        })
    }

    async fn execute(&self, _args: serde_json::Value) -> anyhow::Result<ToolResult> {
        let id = self.service.sandbox_id().await;

        match self.service.stop().await {
            Ok(()) => Ok(ToolResult {
                success: true,
                output: match id {
                    Some(id) => format!("Sandbox {id} terminated."),
                    None => "No active sandbox to stop.".to_string(),
                },
                error: None,
            }),
            Err(e) => Ok(ToolResult {
                success: false,
                output: String::new(),
                error: Some(format!("Failed to stop sandbox: {e}")),
            }),
        }
    }
}
