use crate::dialect::ToolDialect;
use crate::runtime::ToolHandler;
use crate::tool::{Tool, ToolContext, ToolDefinition, ToolInvocation, ToolResult};
use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Manages available tools, their schemas, and dispatch.
/// Registration order is kept so schemas are described deterministically.
pub struct ToolRegistry {
    tools: IndexMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: IndexMap::new(),
        }
    }

    /// Register a tool. Fails if the name is taken or the definition is invalid.
    pub fn register(&mut self, tool: impl Tool + 'static) -> Result<(), RegistryError> {
        self.register_arc(Arc::new(tool))
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) -> Result<(), RegistryError> {
        let def = tool.definition();
        def.validate()
            .map_err(|reason| RegistryError::InvalidDefinition {
                name: def.name.clone(),
                reason,
            })?;
        if self.tools.contains_key(&def.name) {
            return Err(RegistryError::DuplicateTool(def.name));
        }
        self.tools.insert(def.name, tool);
        Ok(())
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// List all registered tool definitions.
    pub fn list(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.definition()).collect()
    }

    /// Schema list in the given provider dialect.
    pub fn describe(&self, dialect: ToolDialect) -> Vec<Value> {
        self.tools
            .values()
            .map(|t| dialect.render(&t.definition()))
            .collect()
    }

    /// Run the named tool. Never fails: an unknown name or a handler error
    /// comes back as an error-flagged result for the model to read.
    pub async fn dispatch(&self, invocation: &ToolInvocation, context: &ToolContext) -> ToolResult {
        let Some(tool) = self.tools.get(&invocation.name) else {
            warn!(tool = %invocation.name, "tool not found");
            return ToolResult::error(
                &invocation.id,
                &invocation.name,
                format!("Tool '{}' not found", invocation.name),
            );
        };

        debug!(tool = %invocation.name, round = invocation.round, "dispatching tool");
        match tool.execute(invocation, context).await {
            Ok(content) => ToolResult::ok(&invocation.id, &invocation.name, content),
            Err(e) => {
                warn!(tool = %invocation.name, error = %e, "tool failed");
                ToolResult::error(
                    &invocation.id,
                    &invocation.name,
                    format!("Tool '{}' failed: {}", invocation.name, e),
                )
            }
        }
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolHandler for ToolRegistry {
    fn describe(&self, dialect: ToolDialect) -> Vec<Value> {
        ToolRegistry::describe(self, dialect)
    }

    async fn handle(&self, invocation: &ToolInvocation, context: &ToolContext) -> ToolResult {
        self.dispatch(invocation, context).await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Tool with name '{0}' is already registered")]
    DuplicateTool(String),
    #[error("Tool '{name}' has an invalid definition: {reason}")]
    InvalidDefinition { name: String, reason: String },
}
