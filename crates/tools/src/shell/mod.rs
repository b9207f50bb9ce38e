//! Persistent shell sessions.
//!
//! A session keeps one interpreter process alive and frames every command
//! with a sentinel echo so that the output of consecutive commands can be
//! told apart on the shared stdout/stderr pipes. Two reader strategies exist
//! behind [`ShellSession`]; [`new_session`] is the only place that picks one.

mod buffered;
mod line;

pub use buffered::BufferedSession;
pub use line::LineSession;

use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use proto::{ToolError, ToolResult};
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};
use tokio::time::timeout;
use tracing::{debug, warn};

/// Default time a command may take before the session is considered hung.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Common prefix of every sentinel token.
pub const SENTINEL_PREFIX: &str = "__DESKHAND_DONE_";

const STOP_GRACE: Duration = Duration::from_secs(1);

/// Lifecycle of a shell session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    NotStarted,
    Running,
    TimedOut,
    Stopped,
}

/// Command syntax understood by the interpreter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellFlavor {
    /// `sh`-compatible shells.
    Posix,
    /// Windows `cmd.exe`.
    Cmd,
}

/// Interpreter to spawn for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellProgram {
    pub program: String,
    pub args: Vec<String>,
    pub flavor: ShellFlavor,
}

impl ShellProgram {
    /// `/bin/bash` reading commands from stdin.
    pub fn bash() -> Self {
        Self {
            program: "/bin/bash".to_string(),
            args: Vec::new(),
            flavor: ShellFlavor::Posix,
        }
    }

    /// `cmd.exe` with command echo disabled.
    pub fn cmd() -> Self {
        Self {
            program: "cmd.exe".to_string(),
            args: vec!["/Q".to_string()],
            flavor: ShellFlavor::Cmd,
        }
    }

    /// Interpreter for the current platform.
    pub fn platform_default() -> Self {
        if cfg!(windows) { Self::cmd() } else { Self::bash() }
    }

    /// Replaces the program path, keeping the flavor.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self.args.clear();
        self
    }

    /// Appends the sentinel echo to both streams after `command`.
    pub(crate) fn frame(&self, command: &str, sentinel: &str) -> String {
        match self.flavor {
            ShellFlavor::Posix => {
                format!("{command}\necho '{sentinel}'\necho '{sentinel}' >&2\n")
            }
            ShellFlavor::Cmd => {
                format!("{command}\r\necho {sentinel}\r\n1>&2 echo {sentinel}\r\n")
            }
        }
    }

    fn spawn(&self) -> Result<Child, ToolError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Keep terminal signals aimed at the host away from the shell.
        #[cfg(unix)]
        cmd.process_group(0);

        cmd.spawn().map_err(|e| {
            ToolError::ExecutionFailed(format!("Failed to start shell {}: {e}", self.program))
        })
    }
}

/// One persistent interpreter process.
#[async_trait]
pub trait ShellSession: Send {
    /// Current lifecycle state.
    fn state(&self) -> SessionState;
    /// Spawns the interpreter; no-op once started.
    async fn start(&mut self) -> Result<(), ToolError>;
    /// Runs one command and returns its stdout as output and stderr as error.
    async fn run(&mut self, command: &str) -> Result<ToolResult, ToolError>;
    /// Requests termination; no-op once stopped.
    async fn stop(&mut self) -> Result<(), ToolError>;
}

/// Builds the session variant for the current platform.
pub fn new_session(program: Option<&str>, timeout: Duration) -> Box<dyn ShellSession> {
    let mut shell = ShellProgram::platform_default();
    if let Some(program) = program {
        shell = shell.with_program(program);
    }
    if cfg!(windows) {
        Box::new(LineSession::new(shell, timeout))
    } else {
        Box::new(BufferedSession::new(shell, timeout))
    }
}

/// Per-session sentinel source: a random nonce plus a command counter.
#[derive(Debug)]
pub(crate) struct Sentinel {
    nonce: String,
    seq: u64,
}

impl Sentinel {
    pub(crate) fn new() -> Self {
        let mut nonce = uuid::Uuid::new_v4().simple().to_string();
        nonce.truncate(12);
        Self { nonce, seq: 0 }
    }

    pub(crate) fn next_token(&mut self) -> String {
        self.seq += 1;
        format!("{SENTINEL_PREFIX}{}_{}__", self.nonce, self.seq)
    }
}

/// Rejects `run` unless the session is running.
pub(crate) fn ensure_running(state: SessionState, limit: Duration) -> Result<(), ToolError> {
    match state {
        SessionState::Running => Ok(()),
        SessionState::NotStarted => Err(ToolError::SessionState(
            "Session has not started.".to_string(),
        )),
        SessionState::TimedOut => Err(ToolError::Timeout(limit.as_secs())),
        SessionState::Stopped => Err(ToolError::SessionState(
            "shell session has been stopped and must be restarted".to_string(),
        )),
    }
}

pub(crate) fn exited(status: ExitStatus) -> ToolError {
    let code = status
        .code()
        .map(|c| c.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    ToolError::SessionState(format!("shell has exited with returncode {code}"))
}

/// Waits for the exit status of a shell whose pipes have closed.
pub(crate) async fn reap(child: &mut Child) -> ToolError {
    match timeout(STOP_GRACE, child.wait()).await {
        Ok(Ok(status)) => exited(status),
        _ => ToolError::SessionState("shell output closed unexpectedly".to_string()),
    }
}

pub(crate) async fn write_framed(stdin: &mut ChildStdin, framed: &str) -> Result<(), ToolError> {
    stdin.write_all(framed.as_bytes()).await?;
    stdin.flush().await?;
    Ok(())
}

/// Closes stdin and waits briefly before killing the interpreter.
pub(crate) async fn terminate(mut child: Child, stdin: ChildStdin) {
    drop(stdin);
    match timeout(STOP_GRACE, child.wait()).await {
        Ok(Ok(status)) => debug!(?status, "Shell exited after stdin closed"),
        _ => {
            warn!("Shell did not exit after stdin closed, killing it");
            if let Err(e) = child.start_kill() {
                warn!("Failed to kill shell: {e}");
            }
            let _ = child.wait().await;
        }
    }
}

/// Drops one trailing line break (`\n` or `\r\n`).
pub(crate) fn strip_trailing_newline(mut text: String) -> String {
    if text.ends_with('\n') {
        text.pop();
        if text.ends_with('\r') {
            text.pop();
        }
    }
    text
}

/// Builds the result of a completed command.
pub(crate) fn command_result(stdout: String, stderr: String) -> ToolResult {
    let stderr = strip_trailing_newline(stderr);
    ToolResult {
        output: Some(strip_trailing_newline(stdout)),
        error: (!stderr.is_empty()).then_some(stderr),
        ..ToolResult::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_tokens_are_unique_per_command() {
        let mut sentinel = Sentinel::new();
        let a = sentinel.next_token();
        let b = sentinel.next_token();
        assert_ne!(a, b);
        assert!(a.starts_with(SENTINEL_PREFIX));
        assert!(a.ends_with("_1__"));
        assert!(b.ends_with("_2__"));
    }

    #[test]
    fn sentinel_nonce_differs_between_sessions() {
        let a = Sentinel::new().next_token();
        let b = Sentinel::new().next_token();
        assert_ne!(a, b);
    }

    #[test]
    fn posix_frame_echoes_sentinel_on_both_streams() {
        let framed = ShellProgram::bash().frame("ls", "TOK");
        assert_eq!(framed, "ls\necho 'TOK'\necho 'TOK' >&2\n");
    }

    #[test]
    fn cmd_frame_uses_crlf_and_stderr_redirect() {
        let framed = ShellProgram::cmd().frame("dir", "TOK");
        assert_eq!(framed, "dir\r\necho TOK\r\n1>&2 echo TOK\r\n");
    }

    #[test]
    fn with_program_keeps_flavor() {
        let shell = ShellProgram::bash().with_program("/bin/sh");
        assert_eq!(shell.program, "/bin/sh");
        assert_eq!(shell.flavor, ShellFlavor::Posix);
    }

    #[test]
    fn ensure_running_maps_states_to_errors() {
        let limit = Duration::from_secs(7);
        assert!(ensure_running(SessionState::Running, limit).is_ok());
        let err = ensure_running(SessionState::NotStarted, limit).unwrap_err();
        assert_eq!(err.kind(), proto::ErrorKind::SessionState);
        let err = ensure_running(SessionState::TimedOut, limit).unwrap_err();
        assert_eq!(err.kind(), proto::ErrorKind::Timeout);
        assert!(err.to_string().contains("7 seconds"));
        let err = ensure_running(SessionState::Stopped, limit).unwrap_err();
        assert!(err.to_string().contains("must be restarted"));
    }

    #[test]
    fn strip_trailing_newline_removes_one_break() {
        assert_eq!(strip_trailing_newline("a\n\n".to_string()), "a\n");
        assert_eq!(strip_trailing_newline("a\r\n".to_string()), "a");
        assert_eq!(strip_trailing_newline("a".to_string()), "a");
    }

    #[test]
    fn command_result_omits_empty_stderr() {
        let result = command_result("out\n".to_string(), String::new());
        assert_eq!(result.output.as_deref(), Some("out"));
        assert!(result.error.is_none());

        let result = command_result(String::new(), "oops\n".to_string());
        assert_eq!(result.output.as_deref(), Some(""));
        assert_eq!(result.error.as_deref(), Some("oops"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn new_session_starts_platform_shell() {
        let mut session = new_session(None, Duration::from_secs(10));
        assert_eq!(session.state(), SessionState::NotStarted);
        session.start().await.expect("start");
        let result = session.run("echo ready").await.expect("run");
        assert_eq!(result.output.as_deref(), Some("ready"));
        session.stop().await.expect("stop");
        assert_eq!(session.state(), SessionState::Stopped);
    }
}
