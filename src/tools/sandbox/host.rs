//! `sandbox_get_host` tool — public URL lookup for an exposed port.

use crate::sandbox::service::SandboxService;
use crate::tools::{Tool, ToolResult};
use async_trait::async_trait;
use serde_json::json;

const TOOL_NAME: &str = "sandbox_get_host";

pub struct SandboxGetHostTool {
    service: SandboxService,
}

impl SandboxGetHostTool {
    pub fn new(service: SandboxService) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Tool for SandboxGetHostTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        "Return the public URL for a port exposed by the sandbox. \
         Local sandboxes have no public hosts; the lookup reports that \
         rather than failing."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "port": {
                    "type": "integer",
                    "description": "Port the dev server listens on (e.g. 3000)"
                }
            },
            "required": ["port"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> anyhow::Result<ToolResult> {
        let port = args["port"]
            .as_u64()
            .ok_or_else(|| anyhow::anyhow!("Missing required parameter: port"))?;
        let port = u16::try_from(port)
            .map_err(|_| anyhow::anyhow!("port must be between 1 and 65535"))?;

        match self.service.dev().host(port).await {
            Ok(Some(url)) => Ok(ToolResult {
                success: true,
                output: url,
                error: None,
            }),
            Ok(None) => Ok(ToolResult {
                success: true,
                output: format!("No public host available for port {port} on this sandbox."),
                error: None,
            }),
            Err(e) => Ok(ToolResult {
                success: false,
                output: String::new(),
                error: Some(format!("Host lookup failed: {e}")),
            }),
        }
    }
}
