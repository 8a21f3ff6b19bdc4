//! Tools module - pluggable capabilities the model may invoke
//!
//! Tools declare JSON Schemas for their arguments and results; the agent
//! treats the schemas as opaque and only the validator interprets them.

mod registry;
mod reply;
mod wrapped;

pub use registry::ToolRegistry;
pub use reply::SendReplyTool;
pub use wrapped::WrappedTool;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::Result;

/// Tool trait - interface for all agent tools
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name used in function calls
    fn name(&self) -> &str;

    /// Description of what the tool does, shown to the model
    fn description(&self) -> &str;

    /// JSON Schema for the argument map
    fn parameters_schema(&self) -> Value;

    /// JSON Schema for the result map
    fn response_schema(&self) -> Value;

    /// Execute the tool with already-validated arguments
    async fn execute(&self, args: Map<String, Value>) -> Result<Map<String, Value>>;
}

/// Dummy tool for testing
pub struct DummyTool {
    pub name: String,
    pub result: Map<String, Value>,
}

#[async_trait]
impl Tool for DummyTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Dummy tool for testing"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({"type": "object"})
    }

    fn response_schema(&self) -> Value {
        serde_json::json!({"type": "object"})
    }

    async fn execute(&self, _args: Map<String, Value>) -> Result<Map<String, Value>> {
        Ok(self.result.clone())
    }
}
