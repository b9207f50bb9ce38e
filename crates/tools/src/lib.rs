//! Tool trait and built-in tool implementations.
//!
//! The runtime uses this crate to expose the three interactive tools: a
//! persistent shell, a screen/keyboard/mouse controller and a file editor
//! with undo history.

pub mod bash;
pub mod computer;
pub mod edit;
pub mod shell;

pub use bash::{BashTool, ShellOptions};
pub use computer::{ComputerTool, InputDriver, ScreenOptions, XdoDriver};
pub use edit::{EditTool, EditorOptions};

use async_trait::async_trait;
use proto::{ToolDefinition, ToolDescriptor, ToolError, ToolResult};

/// Trait that all tools must implement
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique tool name used for dispatch.
    fn name(&self) -> &str;
    /// Versioned built-in tool type advertised to the orchestrator.
    fn api_type(&self) -> &str;
    /// Human-readable description for tool selection.
    fn description(&self) -> &str;
    /// JSON schema for accepted tool arguments.
    fn parameters_schema(&self) -> serde_json::Value;
    /// Static options flattened into the descriptor.
    fn options(&self) -> serde_json::Value {
        serde_json::Value::Null
    }
    /// Executes the tool with JSON args.
    async fn execute(&self, args: serde_json::Value) -> Result<ToolResult, ToolError>;

    /// Capability descriptor built from the static identity.
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new(self.name(), self.api_type()).with_options(self.options())
    }

    /// Function-calling definition built from the schema.
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(self.name(), self.description(), self.parameters_schema())
    }
}

/// Deserializes tool arguments, mapping serde failures to a validation error.
pub(crate) fn parse_args<T: serde::de::DeserializeOwned>(
    args: serde_json::Value,
) -> Result<T, ToolError> {
    serde_json::from_value(args).map_err(|e| ToolError::invalid(format!("Invalid arguments: {e}")))
}
