use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level error type
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration loading/validation error.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Tool registration/execution error.
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required field was not provided.
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// A field has an invalid value and reason.
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    /// Filesystem read error.
    #[error("IO error reading config: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parse error.
    #[error("TOML parse error: {0}")]
    Toml(String),

    /// Two tools were registered under the same name.
    #[error("Duplicate tool registration: {0}")]
    DuplicateTool(String),
}

/// Coarse classification of a tool failure.
///
/// Callers branch on this instead of parsing the error message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad or missing arguments. Never retried automatically.
    Validation,
    /// Path, file, history entry or tool missing.
    NotFound,
    /// Ambiguous replacement or create-on-existing-path.
    Conflict,
    /// Session not started or terminated.
    SessionState,
    /// Shell did not answer in time.
    Timeout,
    /// OS-level failure: spawn, I/O, failsafe, device access.
    Environment,
}

impl ErrorKind {
    /// Returns `true` when the tool has to be restarted before it can be used again.
    pub fn requires_restart(self) -> bool {
        matches!(self, Self::SessionState | Self::Timeout)
    }
}

/// Tool execution errors
#[derive(Debug, Error)]
pub enum ToolError {
    /// Requested tool is unknown.
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// Tool call arguments are invalid.
    #[error("{0}")]
    InvalidArgs(String),

    /// A path, string or history entry does not exist.
    #[error("{0}")]
    NotFound(String),

    /// The request collides with existing state.
    #[error("{0}")]
    Conflict(String),

    /// `old_str` occurs more than once; nothing was replaced.
    #[error(
        "Found {occurrences} occurrences of '{needle}' in {shown}. Please be more specific.\nLines containing the string:\n{listing}",
        shown = .path.display(),
        listing = format_line_listing(.lines)
    )]
    AmbiguousMatch {
        needle: String,
        path: PathBuf,
        occurrences: usize,
        /// 1-indexed line number and content of every occurrence.
        lines: Vec<(usize, String)>,
    },

    /// The shell session is not in a usable state.
    #[error("{0}")]
    SessionState(String),

    /// Tool exceeded allowed execution time.
    #[error("timed out: shell has not returned in {0} seconds and must be restarted")]
    Timeout(u64),

    /// Pointer was driven into a screen corner.
    #[error("Mouse movement failed (hit screen edge): {0}")]
    FailSafe(String),

    /// Tool process or device operation failed.
    #[error("{0}")]
    ExecutionFailed(String),

    /// Filesystem/process IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ToolError {
    /// Maps the error onto its [`ErrorKind`].
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgs(_) => ErrorKind::Validation,
            Self::UnknownTool(_) | Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) | Self::AmbiguousMatch { .. } => ErrorKind::Conflict,
            Self::SessionState(_) => ErrorKind::SessionState,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::FailSafe(_) | Self::ExecutionFailed(_) | Self::Io(_) => ErrorKind::Environment,
        }
    }

    /// Shorthand for an [`ToolError::InvalidArgs`] error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgs(msg.into())
    }
}

fn format_line_listing(lines: &[(usize, String)]) -> String {
    lines
        .iter()
        .map(|(n, line)| format!("{n}: {line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displays_config_error_variant() {
        let err = ConfigError::MissingField("shell.program".to_string());
        assert!(err.to_string().contains("Missing required field"));
    }

    #[test]
    fn wraps_tool_and_config_errors_into_top_level_error() {
        let tool_err: Error = ToolError::invalid("missing command").into();
        assert!(tool_err.to_string().contains("Tool error"));

        let config_err: Error = ConfigError::DuplicateTool("bash".to_string()).into();
        assert!(config_err.to_string().contains("Config error"));
        assert!(config_err.to_string().contains("bash"));
    }

    #[test]
    fn kinds_follow_variants() {
        assert_eq!(ToolError::invalid("x").kind(), ErrorKind::Validation);
        assert_eq!(ToolError::NotFound("x".into()).kind(), ErrorKind::NotFound);
        assert_eq!(ToolError::UnknownTool("x".into()).kind(), ErrorKind::NotFound);
        assert_eq!(ToolError::Conflict("x".into()).kind(), ErrorKind::Conflict);
        assert_eq!(ToolError::Timeout(120).kind(), ErrorKind::Timeout);
        assert_eq!(ToolError::FailSafe("x".into()).kind(), ErrorKind::Environment);
        let io = std::io::Error::other("disk");
        assert_eq!(ToolError::from(io).kind(), ErrorKind::Environment);
    }

    #[test]
    fn restart_is_required_only_for_session_failures() {
        assert!(ErrorKind::SessionState.requires_restart());
        assert!(ErrorKind::Timeout.requires_restart());
        assert!(!ErrorKind::Validation.requires_restart());
        assert!(!ErrorKind::Environment.requires_restart());
    }

    #[test]
    fn ambiguous_match_lists_every_line() {
        let err = ToolError::AmbiguousMatch {
            needle: "foo".to_string(),
            path: PathBuf::from("/tmp/a.txt"),
            occurrences: 2,
            lines: vec![(1, "foo".to_string()), (3, "a foo b".to_string())],
        };
        let text = err.to_string();
        assert!(text.starts_with("Found 2 occurrences of 'foo' in /tmp/a.txt"));
        assert!(text.ends_with("1: foo\n3: a foo b"));
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn timeout_message_asks_for_restart() {
        let text = ToolError::Timeout(120).to_string();
        assert!(text.contains("120 seconds"));
        assert!(text.contains("must be restarted"));
    }
}
