//! Sandbox file operation tools: write_file, read_file, list_files.

use crate::sandbox::service::SandboxService;
use crate::tools::{Tool, ToolResult};
use async_trait::async_trait;
use serde_json::json;

// ── sandbox_write_file ────────────────────────────────────────────────────

pub struct SandboxWriteFileTool {
    service: SandboxService,
}

impl SandboxWriteFileTool {
    pub fn new(service: SandboxService) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Tool for SandboxWriteFileTool {
    fn name(&self) -> &str {
        "sandbox_write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file in the sandbox. Creates the file and any parent directories. \
         Use this for new files or full rewrites; prefer sandbox_edit_file for targeted changes."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "File path in the sandbox; relative paths resolve against the workspace"
                },
                "content": {
                    "type": "string",
                    "description": "Full file content to write"
                }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> anyhow::Result<ToolResult> {
        let path = args["path"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("Missing required parameter: path"))?;
        let content = args["content"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("Missing required parameter: content"))?;

        match self.service.fs().write_file(path, content).await {
            Ok(()) => Ok(ToolResult {
                success: true,
                output: format!("Wrote {} bytes to {path}", content.len()),
                error: None,
            }),
            Err(e) => Ok(ToolResult {
                success: false,
                output: String::new(),
                error: Some(format!("Failed to write {path}: {e}")),
            }),
        }
    }
}

// ── sandbox_read_file ─────────────────────────────────────────────────────

pub struct SandboxReadFileTool {
    service: SandboxService,
}

impl SandboxReadFileTool {
    pub fn new(service: SandboxService) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Tool for SandboxReadFileTool {
    fn name(&self) -> &str {
        "sandbox_read_file"
    }

    fn description(&self) -> &str {
        "Read a file from the sandbox and return its content."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "File path in the sandbox"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> anyhow::Result<ToolResult> {
        let path = args["path"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("Missing required parameter: path"))?;

        match self.service.fs().read_file(path).await {
            Ok(content) => Ok(ToolResult {
                success: true,
                output: content,
                error: None,
            }),
            Err(e) => Ok(ToolResult {
                success: false,
                output: String::new(),
                error: Some(format!("Failed to read {path}: {e}")),
            }),
        }
    }
}

// ── sandbox_list_files ────────────────────────────────────────────────────

pub struct SandboxListFilesTool {
    service: SandboxService,
}

impl SandboxListFilesTool {
    pub fn new(service: SandboxService) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Tool for SandboxListFilesTool {
    fn name(&self) -> &str {
        "sandbox_list_files"
    }

    fn description(&self) -> &str {
        "List entries at a directory path in the sandbox."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Directory path. Default: the workspace root."
                }
            }
        })
    }

    async fn execute(&self, args: serde_json::Value) -> anyhow::Result<ToolResult> {
        let path = args["path"].as_str().unwrap_or(".");

        match self.service.fs().list_files(path).await {
            Ok(entries) => {
                let mut lines = vec![format!("Files in {path}:")];
                for entry in entries {
                    let kind = if entry.is_dir { "dir" } else { "file" };
                    lines.push(format!("  [{kind}] {}", entry.name));
                }
                Ok(ToolResult {
                    success: true,
                    output: lines.join("\n"),
                    error: None,
                })
            }
            Err(e) => Ok(ToolResult {
                success: false,
                output: String::new(),
                error: Some(format!("Failed to list {path}: {e}")),
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
        let dir = tempfile::tempdir().unwrap();
        let config = SandboxConfig::default().with_workspace_path(dir.keep());
        SandboxService::new(resolver, config)
    }

    #[tokio::test]
    async fn write_then_read_roundtrip() {
        let service = service();
        let write = SandboxWriteFileTool::new(service.clone());
        let read = SandboxReadFileTool::new(service);

        let result = write
            .execute(json!({"path": "src/app.rs", "content": "fn main() {}"}))
            .await
            .unwrap();
        assert!(result.success, "{:?}", result.error);

        let result = read.execute(json!({"path": "src/app.rs"})).await.unwrap();
        assert!(result.success);
        assert_eq!(result.output, "fn main() {}");
    }

    #[tokio::test]
    async fn reading_a_missing_file_fails_cleanly() {
        let tool = SandboxReadFileTool::new(service());
        let result = tool.execute(json!({"path": "missing.txt"})).await.unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("missing.txt"));
    }
}
