use serde::{Deserialize, Serialize};

use crate::RESTART_REQUIRED_NOTE;
use crate::error::{ErrorKind, ToolError};

/// Static identity a tool advertises for capability negotiation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Stable tool name used for dispatch.
    pub name: String,
    /// Versioned built-in tool type understood by the orchestrator.
    pub api_type: String,
    /// Extra static options, flattened next to `name`/`api_type`.
    #[serde(flatten, default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub options: serde_json::Map<String, serde_json::Value>,
}

impl ToolDescriptor {
    /// Creates a descriptor without options.
    pub fn new(name: impl Into<String>, api_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            api_type: api_type.into(),
            options: serde_json::Map::new(),
        }
    }

    /// Attaches options; non-object values are ignored.
    pub fn with_options(mut self, options: serde_json::Value) -> Self {
        if let serde_json::Value::Object(map) = options {
            self.options = map;
        }
        self
    }
}

/// JSON-schema view of a tool for function-calling orchestrators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name.
    pub name: String,
    /// Human-readable description used for tool selection.
    pub description: String,
    /// JSON schema of accepted arguments.
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    /// Creates a definition from name, description and schema.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// Uniform outcome of every tool invocation.
///
/// `output` and `error` carry success and failure text, `screenshot` a
/// base64-encoded PNG, and `system` an advisory note that is independent of
/// success or failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    /// Structured discriminator for `error`, when it came from a [`ToolError`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl ToolResult {
    /// Successful result with text output.
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            output: Some(output.into()),
            ..Self::default()
        }
    }

    /// Result carrying only a screenshot.
    pub fn with_screenshot(base64_png: impl Into<String>) -> Self {
        Self {
            screenshot: Some(base64_png.into()),
            ..Self::default()
        }
    }

    /// Result carrying only a system note.
    pub fn system(note: impl Into<String>) -> Self {
        Self {
            system: Some(note.into()),
            ..Self::default()
        }
    }

    /// Converts a tool failure into an error result.
    ///
    /// Session failures additionally carry the restart note.
    pub fn from_error(err: ToolError) -> Self {
        let kind = err.kind();
        Self {
            error: Some(err.to_string()),
            error_kind: Some(kind),
            system: kind
                .requires_restart()
                .then(|| RESTART_REQUIRED_NOTE.to_string()),
            ..Self::default()
        }
    }

    /// Returns `true` when the error field is populated.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Returns `true` when no field is populated.
    pub fn is_empty(&self) -> bool {
        self.output.is_none()
            && self.error.is_none()
            && self.screenshot.is_none()
            && self.system.is_none()
    }
}

impl From<ToolError> for ToolResult {
    fn from(err: ToolError) -> Self {
        Self::from_error(err)
    }
}
