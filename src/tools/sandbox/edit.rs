//! `sandbox_edit_file` tool — targeted text replacement with
//! commit-on-change.

use crate::error::{EditError, SandboxError};
use crate::sandbox::service::SandboxService;
use crate::tools::{Tool, ToolResult};
use async_trait::async_trait;
use serde_json::json;

const TOOL_NAME: &str = "sandbox_edit_file";

pub struct SandboxEditFileTool {
    service: SandboxService,
}

impl SandboxEditFileTool {
    pub fn new(service: SandboxService) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Tool for SandboxEditFileTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        "Replace old_string with new_string in a sandbox file and commit the change. \
         Pass an empty old_string to create a new file. \
         The old_string must match exactly once unless replace_all is set; \
         include surrounding context to disambiguate repeated snippets."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "File path in the sandbox"
                },
                "old_string": {
                    "type": "string",
                    "description": "Text to replace. Empty string creates the file with new_string."
                },
                "new_string": {
                    "type": "string",
                    "description": "Replacement text"
                },
                "replace_all": {
                    "type": "boolean",
                    "description": "Replace every occurrence instead of requiring a unique match. Default: false."
                }
            },
            "required": ["path", "old_string", "new_string"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> anyhow::Result<ToolResult> {
        let path = args["path"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("Missing required parameter: path"))?;
        let old_string = args["old_string"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("Missing required parameter: old_string"))?;
        let new_string = args["new_string"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("Missing required parameter: new_string"))?;
        let replace_all = args["replace_all"].as_bool().unwrap_or(false);

        match self
            .service
            .edit()
            .apply(path, old_string, new_string, replace_all)
            .await
        {
            Ok(outcome) => {
                let action = if outcome.created {
                    format!("Created {path}")
                } else {
                    format!(
                        "Replaced {} occurrence(s) in {path}",
                        outcome.replacements
                    )
                };
                Ok(ToolResult {
                    success: true,
                    output: format!("{action} (commit {})", outcome.commit_hash),
                    error: None,
                })
            }
            Err(e) => Ok(ToolResult {
                success: false,
                output: String::new(),
                error: Some(remediation(&e)),
            }),
        }
    }
}

/// Distinct, actionable messages per edit failure mode.
fn remediation(error: &SandboxError) -> String {
    match error {
        SandboxError::Edit(EditError::NotFound { path }) => format!(
            "Could not find old_string in {path}. Re-read the file and copy the text exactly."
        ),
        SandboxError::Edit(EditError::AmbiguousMatch { path, count }) => format!(
            "old_string occurs {count} times in {path}. \
             Add surrounding lines to make it unique, or set replace_all."
        ),
        SandboxError::Edit(EditError::InvalidArgument(message)) => {
            format!("Invalid edit: {message}")
        }
        other => format!("Edit failed: {other}"),
    }
}
