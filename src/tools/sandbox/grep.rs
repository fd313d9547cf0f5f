//! `sandbox_grep` tool — pattern search over sandbox files.

use crate::grep::GrepOptions;
use crate::sandbox::service::SandboxService;
use crate::tools::{Tool, ToolResult};
use async_trait::async_trait;
use serde_json::json;

const TOOL_NAME: &str = "sandbox_grep";

pub struct SandboxGrepTool {
    service: SandboxService,
}

impl SandboxGrepTool {
    pub fn new(service: SandboxService) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Tool for SandboxGrepTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        "Search sandbox files for a pattern. Returns matches grouped by file \
         with line numbers. No matches is a success with an empty result."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Pattern to search for (basic regular expression)"
                },
                "path": {
                    "type": "string",
                    "description": "File or directory to search. Default: the workspace root."
                },
                "include": {
                    "type": "string",
                    "description": "Only search file names matching this glob, e.g. '*.rs'"
                },
                "ignore_case": { "type": "boolean" },
                "whole_word": { "type": "boolean" },
                "context": {
                    "type": "integer",
                    "description": "Lines of context around each match"
                },
                "max_results": {
                    "type": "integer",
                    "description": "Cap on returned match lines"
                }
            },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> anyhow::Result<ToolResult> {
        let pattern = args["pattern"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("Missing required parameter: pattern"))?;

        let options = GrepOptions {
            path: args["path"].as_str().map(str::to_string),
            include: args["include"].as_str().map(str::to_string),
            ignore_case: args["ignore_case"].as_bool().unwrap_or(false),
            whole_word: args["whole_word"].as_bool().unwrap_or(false),
            context: args["context"].as_u64().map(|c| c as u32),
            max_results: args["max_results"].as_u64().map(|m| m as usize),
            ..GrepOptions::default()
        };

        match self.service.bash().grep(pattern, options).await {
            Ok(result) => {
                if result.files.is_empty() {
                    return Ok(ToolResult {
                        success: true,
                        output: format!("No matches for '{pattern}'."),
                        error: None,
                    });
                }

                let mut lines = vec![format!(
                    "{} match(es) for '{pattern}'{}:",
                    result.total_matches,
                    if result.truncated { " (truncated)" } else { "" }
                )];
                for file in &result.files {
                    lines.push(format!("{}:", file.path));
                    for m in &file.matches {
                        let marker = if m.is_context { " " } else { ":" };
                        match m.line_number {
                            Some(n) => lines.push(format!("  {n}{marker} {}", m.text)),
                            None => lines.push(format!("  {}", m.text)),
                        }
                    }
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
                error: Some(format!("Search failed: {e}")),
            }),
        }
    }
}
