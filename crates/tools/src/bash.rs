//! Bash tool implementation.

use async_trait::async_trait;
use proto::{ToolError, ToolResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::shell::{self, ShellSession};
use crate::{Tool, parse_args};

const DEFAULT_TIMEOUT_SECS: u64 = 120;
const DEFAULT_MAX_OUTPUT_CHARS: usize = 16_000;
const TRUNCATED_NOTICE: &str = "<response clipped><NOTE>To save on context, only part of this output has been shown. Use search/filter commands for your platform to find specific content.</NOTE>";

/// Shell tool settings (`[shell]` config section).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellOptions {
    /// Seconds a command may run before the session is marked timed out.
    pub timeout_secs: u64,
    /// Interpreter override; the platform shell when unset.
    pub program: Option<String>,
    /// Maximum characters kept from each of stdout and stderr.
    pub max_output_chars: usize,
    /// Case-insensitive substrings that reject a command outright.
    pub deny_patterns: Vec<String>,
}

impl Default for ShellOptions {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            program: None,
            max_output_chars: DEFAULT_MAX_OUTPUT_CHARS,
            deny_patterns: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct BashArgs {
    #[serde(default)]
    command: Option<String>,
    #[serde(default)]
    restart: bool,
}

/// Tool that runs commands in one persistent shell session
pub struct BashTool {
    options: ShellOptions,
    session: Mutex<Option<Box<dyn ShellSession>>>,
}

impl BashTool {
    /// Creates a bash tool with default options.
    pub fn new() -> Self {
        Self::with_options(ShellOptions::default())
    }

    /// Creates a bash tool with explicit options.
    pub fn with_options(options: ShellOptions) -> Self {
        Self {
            options,
            session: Mutex::new(None),
        }
    }

    /// Creates a bash tool with a custom command timeout in seconds.
    pub fn with_timeout(secs: u64) -> Self {
        Self::with_options(ShellOptions {
            timeout_secs: secs,
            ..ShellOptions::default()
        })
    }

    async fn spawn_session(&self) -> Result<Box<dyn ShellSession>, ToolError> {
        let mut session = shell::new_session(
            self.options.program.as_deref(),
            Duration::from_secs(self.options.timeout_secs),
        );
        session.start().await?;
        Ok(session)
    }

    fn check_denied(&self, command: &str) -> Result<(), ToolError> {
        let lowered = command.to_lowercase();
        let denied = self
            .options
            .deny_patterns
            .iter()
            .any(|pattern| !pattern.is_empty() && lowered.contains(&pattern.to_lowercase()));
        if denied {
            return Err(ToolError::invalid("Command contains forbidden operations"));
        }
        Ok(())
    }
}

impl Default for BashTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for BashTool {
    fn name(&self) -> &str {
        "bash"
    }

    fn api_type(&self) -> &str {
        "bash_20241022"
    }

    fn description(&self) -> &str {
        "Run commands in a persistent bash shell. State such as the working directory \
         and exported variables is kept between calls. Set `restart` to get a fresh shell \
         after a timeout."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The command to run"
                },
                "restart": {
                    "type": "boolean",
                    "description": "Restart the shell session instead of running a command"
                }
            }
        })
    }

    async fn execute(&self, args: serde_json::Value) -> Result<ToolResult, ToolError> {
        let bash_args: BashArgs = parse_args(args)?;
        let mut session = self.session.lock().await;

        if bash_args.restart {
            if let Some(mut old) = session.take()
                && let Err(e) = old.stop().await
            {
                debug!("Ignoring stop failure during restart: {e}");
            }
            *session = Some(self.spawn_session().await?);
            info!("Shell session restarted");
            return Ok(ToolResult::system("tool has been restarted."));
        }

        let Some(command) = bash_args.command else {
            return Err(ToolError::invalid("no command provided."));
        };
        self.check_denied(&command)?;

        if session.is_none() {
            *session = Some(self.spawn_session().await?);
        }
        let Some(active) = session.as_mut() else {
            return Err(ToolError::SessionState("Session has not started.".to_string()));
        };

        let mut result = active.run(&command).await?;
        let limit = self.options.max_output_chars;
        result.output = result.output.map(|out| truncate_str(&out, limit));
        result.error = result.error.map(|err| truncate_str(&err, limit));
        Ok(result)
    }
}

/// Truncates UTF-8 text to `max_chars` code points and appends a notice when truncated.
fn truncate_str(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_chars).collect();
        format!("{truncated}\n{TRUNCATED_NOTICE}")
    }
}
