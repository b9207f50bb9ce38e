//! Shared protocol types for the tool runtime.
//!
//! This crate defines the uniform tool result, the descriptors tools
//! advertise to an orchestrator, and the strongly-typed error enums shared
//! across the workspace.

pub mod error;
pub mod tool;

/// Re-export of all protocol error types.
pub use error::*;
/// Re-export of tool descriptor, definition and result types.
pub use tool::{ToolDefinition, ToolDescriptor, ToolResult};

/// System note attached to results that leave a tool unusable until restarted.
pub const RESTART_REQUIRED_NOTE: &str = "tool must be restarted";
