//! Tool registry used by the runtime to list and execute tools.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use proto::{ConfigError, ToolDefinition, ToolDescriptor, ToolError, ToolResult};
use tools::Tool;
use tracing::{debug, error, warn};

/// Registry of available tools, kept in registration order.
pub struct ToolRegistry {
    order: Vec<String>,
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Creates an empty tool registry.
    pub fn new() -> Self {
        Self {
            order: Vec::new(),
            tools: HashMap::new(),
        }
    }

    /// Register a tool
    pub fn register(&mut self, tool: impl Tool + 'static) -> Result<(), ConfigError> {
        self.register_shared(Arc::new(tool))
    }

    /// Register an already shared tool. Names must be unique.
    pub fn register_shared(&mut self, tool: Arc<dyn Tool>) -> Result<(), ConfigError> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(ConfigError::DuplicateTool(name));
        }
        debug!("Registering tool: {name}");
        self.order.push(name.clone());
        self.tools.insert(name, tool);
        Ok(())
    }

    /// Descriptors of every tool, in registration order.
    pub fn describe(&self) -> Vec<ToolDescriptor> {
        self.ordered().map(|t| t.descriptor()).collect()
    }

    /// Get tool definitions for function-calling orchestrators
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.ordered().map(|t| t.definition()).collect()
    }

    /// Returns the list of registered tool names.
    pub fn names(&self) -> Vec<&str> {
        self.order.iter().map(String::as_str).collect()
    }

    /// Runs one tool call. Failures and panics come back as error results.
    pub async fn run(&self, name: &str, args: serde_json::Value) -> ToolResult {
        let Some(tool) = self.tools.get(name) else {
            warn!("Unknown tool requested: {name}");
            return ToolResult::from_error(ToolError::UnknownTool(name.to_string()));
        };

        debug!("Executing tool: {name}");
        match AssertUnwindSafe(tool.execute(args)).catch_unwind().await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                debug!(tool = name, kind = ?e.kind(), "Tool returned error: {e}");
                ToolResult::from_error(e)
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(tool = name, "Tool panicked: {message}");
                ToolResult::from_error(ToolError::ExecutionFailed(format!(
                    "Tool {name} failed unexpectedly: {message}"
                )))
            }
        }
    }

    fn ordered(&self) -> impl Iterator<Item = &Arc<dyn Tool>> {
        self.order.iter().filter_map(|name| self.tools.get(name))
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}
