//! Wrapped tool - schema-validated dispatch

use jsonschema::JSONSchema;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::Error;
use crate::Result;

use super::Tool;

/// A tool plus its two compiled validators.
///
/// Wrapping happens exactly once, at agent construction; a schema that
/// fails to compile aborts construction instead of surfacing at call time.
pub struct WrappedTool {
    tool: Box<dyn Tool>,
    input: JSONSchema,
    output: JSONSchema,
}

impl std::fmt::Debug for WrappedTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WrappedTool")
            .field("name", &self.tool.name())
            .finish_non_exhaustive()
    }
}

impl WrappedTool {
    /// Compile both schemas and wrap the tool.
    pub fn new(tool: Box<dyn Tool>) -> Result<Self> {
        let input = compile(tool.name(), &tool.parameters_schema())?;
        let output = compile(tool.name(), &tool.response_schema())?;
        Ok(Self {
            tool,
            input,
            output,
        })
    }

    pub fn name(&self) -> &str {
        self.tool.name()
    }

    pub fn description(&self) -> &str {
        self.tool.description()
    }

    pub fn parameters_schema(&self) -> Value {
        self.tool.parameters_schema()
    }

    /// Validate arguments, execute, validate the result.
    ///
    /// An input validation failure returns an error without invoking the
    /// tool. An output validation failure means the tool author produced a
    /// non-conforming result; it is surfaced rather than passed to the
    /// model.
    pub async fn invoke(&self, args: Map<String, Value>) -> Result<Map<String, Value>> {
        if let Err(detail) = check(&self.input, &args) {
            return Err(Error::ToolInput {
                tool: self.name().to_string(),
                detail,
            });
        }

        debug!("Executing tool: {}", self.name());
        let result = self.tool.execute(args).await?;

        if let Err(detail) = check(&self.output, &result) {
            return Err(Error::ToolOutput {
                tool: self.name().to_string(),
                detail,
            });
        }

        Ok(result)
    }
}

fn compile(tool: &str, schema: &Value) -> Result<JSONSchema> {
    JSONSchema::compile(schema).map_err(|err| Error::Schema {
        tool: tool.to_string(),
        detail: err.to_string(),
    })
}

fn check(schema: &JSONSchema, map: &Map<String, Value>) -> std::result::Result<(), String> {
    let instance = Value::Object(map.clone());
    if let Err(errors) = schema.validate(&instance) {
        let detail = errors
            .map(|err| err.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        return Err(detail);
    }
    Ok(())
}
