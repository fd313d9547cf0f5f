//! `sandbox_create` tool — create or reuse the sandbox for this service.

use crate::sandbox::service::SandboxService;
use crate::tools::{Tool, ToolResult};
use async_trait::async_trait;
use serde_json::json;

const TOOL_NAME: &str = "sandbox_create";

pub struct SandboxCreateTool {
    service: SandboxService,
}

impl SandboxCreateTool {
    pub fn new(service: SandboxService) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Tool for SandboxCreateTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        "Create the sandbox for this session, or reuse the existing one. \
         Pass reset=true to tear the current sandbox down and build a fresh one. \
         Other sandbox tools create the sandbox on demand, so calling this \
         first is optional but makes startup cost explicit."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "reset": {
                    "type": "boolean",
                    "description": "Discard the existing sandbox and create a new one. Default: false."
                }
            }
        })
    }

    async fn execute(&self, args: serde_json::Value) -> anyhow::Result<ToolResult> {
        let reset = args["reset"].as_bool().unwrap_or(false);

        let created = if reset {
            self.service.refresh(None).await
        } else {
            self.service.get_sandbox().await
        };

        match created {
            Ok(sandbox) => Ok(ToolResult {
                success: true,
                output: format!(
                    "Sandbox {} ready ({:?} backend, workspace {})",
                    sandbox.id(),
                    sandbox.kind(),
                    sandbox.backend().workspace()
                ),
                error: None,
            }),
            Err(e) => Ok(ToolResult {
                success: false,
                output: String::new(),
                error: Some(format!("Failed to create sandbox: {e}")),
            }),
        }
    }
}
