//! Tool layer: the boundary between the sandbox core and an agent loop.
//!
//! Engine and edit errors never crash the caller here — every tool converts
//! them into a structured [`ToolResult`] with a remediation-oriented
//! message. The core's typed errors ([`crate::error`]) stop at this layer.

pub mod sandbox;

use async_trait::async_trait;

/// Structured outcome handed back to the agent loop.
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
}

/// One callable tool.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema for the tool's arguments.
    fn parameters_schema(&self) -> serde_json::Value;

    async fn execute(&self, args: serde_json::Value) -> anyhow::Result<ToolResult>;
}
