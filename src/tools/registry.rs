//! Tool registry - name-keyed lookup of wrapped tools

use std::collections::HashMap;

use crate::agent::backend::ToolDeclaration;
use crate::Result;

use super::{Tool, WrappedTool};

/// Registry of wrapped tools, immutable after agent construction.
pub struct ToolRegistry {
    tools: HashMap<String, WrappedTool>,
}

impl ToolRegistry {
    /// Wrap every tool; any schema compilation failure aborts construction.
    pub fn new(tools: Vec<Box<dyn Tool>>) -> Result<Self> {
        let mut map = HashMap::with_capacity(tools.len());
        for tool in tools {
            let wrapped = WrappedTool::new(tool)?;
            map.insert(wrapped.name().to_string(), wrapped);
        }
        Ok(Self { tools: map })
    }

    /// Look up a tool by the name the model used.
    pub fn get(&self, name: &str) -> Option<&WrappedTool> {
        self.tools.get(name)
    }

    /// Function declarations advertised to the model.
    pub fn declarations(&self) -> Vec<ToolDeclaration> {
        self.tools
            .values()
            .map(|tool| ToolDeclaration {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters_schema(),
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }
}
