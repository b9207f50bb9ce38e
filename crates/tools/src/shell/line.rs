//! Line-oriented session: one reader task per stream feeding bounded channels.

use std::time::Duration;

use async_trait::async_trait;
use proto::{ToolError, ToolResult};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, ChildStdin};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{
    SessionState, Sentinel, ShellProgram, ShellSession, command_result, ensure_running, exited,
    reap, terminate, write_framed,
};

const LINE_CHANNEL_CAPACITY: usize = 1024;

struct Pipes {
    child: Child,
    stdin: ChildStdin,
    stdout: mpsc::Receiver<String>,
    stderr: mpsc::Receiver<String>,
}

/// Session that receives output line by line.
pub struct LineSession {
    shell: ShellProgram,
    timeout: Duration,
    state: SessionState,
    sentinel: Sentinel,
    pipes: Option<Pipes>,
}

impl LineSession {
    /// Creates a session that is not started yet.
    pub fn new(shell: ShellProgram, timeout: Duration) -> Self {
        Self {
            shell,
            timeout,
            state: SessionState::NotStarted,
            sentinel: Sentinel::new(),
            pipes: None,
        }
    }
}

fn spawn_line_reader<R>(stream: R, tx: mpsc::Sender<String>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf).into_owned();
                    if tx.send(line).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    debug!("Shell stream read failed: {e}");
                    break;
                }
            }
        }
    });
}

/// Appends `line` to `buf`; returns `true` once the sentinel line is seen.
///
/// Text printed before the sentinel on the same line (output without a
/// trailing newline) is kept.
fn absorb_line(buf: &mut String, line: &str, token: &str) -> bool {
    match line.trim_end().strip_suffix(token) {
        Some(prefix) => {
            buf.push_str(prefix);
            true
        }
        None => {
            buf.push_str(line);
            false
        }
    }
}

#[async_trait]
impl ShellSession for LineSession {
    fn state(&self) -> SessionState {
        self.state
    }

    async fn start(&mut self) -> Result<(), ToolError> {
        if self.state != SessionState::NotStarted {
            return Ok(());
        }

        let mut child = self.shell.spawn()?;
        let missing = || ToolError::ExecutionFailed("shell pipes unavailable".to_string());
        let stdin = child.stdin.take().ok_or_else(missing)?;
        let stdout = child.stdout.take().ok_or_else(missing)?;
        let stderr = child.stderr.take().ok_or_else(missing)?;

        let (out_tx, out_rx) = mpsc::channel(LINE_CHANNEL_CAPACITY);
        let (err_tx, err_rx) = mpsc::channel(LINE_CHANNEL_CAPACITY);
        spawn_line_reader(stdout, out_tx);
        spawn_line_reader(stderr, err_tx);

        self.pipes = Some(Pipes {
            child,
            stdin,
            stdout: out_rx,
            stderr: err_rx,
        });
        self.state = SessionState::Running;
        info!(program = %self.shell.program, "Line shell session started");
        Ok(())
    }

    async fn run(&mut self, command: &str) -> Result<ToolResult, ToolError> {
        ensure_running(self.state, self.timeout)?;
        let Some(pipes) = self.pipes.as_mut() else {
            self.state = SessionState::Stopped;
            return Err(ToolError::SessionState(
                "shell session has been stopped and must be restarted".to_string(),
            ));
        };

        if let Some(status) = pipes.child.try_wait()? {
            self.state = SessionState::Stopped;
            return Err(exited(status));
        }

        // Anything left over belongs to background jobs of earlier commands.
        while pipes.stdout.try_recv().is_ok() {}
        while pipes.stderr.try_recv().is_ok() {}

        let token = self.sentinel.next_token();
        debug!(command, "Running shell command");
        if let Err(e) = write_framed(&mut pipes.stdin, &self.shell.frame(command, &token)).await {
            warn!("Writing to shell failed: {e}");
            self.state = SessionState::Stopped;
            return Err(reap(&mut pipes.child).await);
        }

        let deadline = tokio::time::sleep(self.timeout);
        tokio::pin!(deadline);

        let mut stdout = String::new();
        let mut stderr = String::new();
        let mut stdout_done = false;
        let mut stderr_done = false;

        while !(stdout_done && stderr_done) {
            tokio::select! {
                line = pipes.stdout.recv(), if !stdout_done => match line {
                    Some(line) => stdout_done = absorb_line(&mut stdout, &line, &token),
                    None => {
                        self.state = SessionState::Stopped;
                        return Err(reap(&mut pipes.child).await);
                    }
                },
                line = pipes.stderr.recv(), if !stderr_done => match line {
                    Some(line) => stderr_done = absorb_line(&mut stderr, &line, &token),
                    None => {
                        self.state = SessionState::Stopped;
                        return Err(reap(&mut pipes.child).await);
                    }
                },
                () = &mut deadline => {
                    warn!(command, secs = self.timeout.as_secs(), "Shell command timed out");
                    self.state = SessionState::TimedOut;
                    return Err(ToolError::Timeout(self.timeout.as_secs()));
                }
            }
        }

        Ok(command_result(stdout, stderr))
    }

    async fn stop(&mut self) -> Result<(), ToolError> {
        match self.state {
            SessionState::NotStarted => Err(ToolError::SessionState(
                "Session has not started.".to_string(),
            )),
            SessionState::Stopped => Ok(()),
            SessionState::Running | SessionState::TimedOut => {
                if let Some(pipes) = self.pipes.take() {
                    terminate(pipes.child, pipes.stdin).await;
                }
                self.state = SessionState::Stopped;
                info!("Line shell session stopped");
                Ok(())
            }
        }
    }
}
