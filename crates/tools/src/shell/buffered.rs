//! Buffered session: readers append raw bytes to shared buffers and notify.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use proto::{ToolError, ToolResult};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, ChildStdin};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use super::{
    SessionState, Sentinel, ShellProgram, ShellSession, command_result, ensure_running, exited,
    reap, terminate, write_framed,
};

const READ_CHUNK: usize = 4096;

#[derive(Default)]
struct StreamBuffer {
    data: Mutex<Vec<u8>>,
    closed: AtomicBool,
}

impl StreamBuffer {
    fn clear(&self) {
        self.data.lock().clear();
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Removes everything up to and including the sentinel line and returns
    /// the text before the sentinel. `None` while the sentinel is incomplete.
    fn take_through(&self, token: &str) -> Option<String> {
        let mut data = self.data.lock();
        let (start, end) = find_sentinel_line(&data, token.as_bytes())?;
        let text = String::from_utf8_lossy(&data[..start]).into_owned();
        data.drain(..end);
        Some(text)
    }
}

/// Locates `token` followed by a line break; returns the token start and the
/// index just past the line break.
fn find_sentinel_line(haystack: &[u8], token: &[u8]) -> Option<(usize, usize)> {
    let mut from = 0;
    while let Some(offset) = find_subslice(&haystack[from..], token) {
        let start = from + offset;
        let after = start + token.len();
        let rest = &haystack[after..];
        // `echo` on some shells leaves trailing spaces before the line break.
        let spaces = rest.iter().take_while(|b| **b == b' ').count();
        match &rest[spaces..] {
            [b'\n', ..] => return Some((start, after + spaces + 1)),
            [b'\r', b'\n', ..] => return Some((start, after + spaces + 2)),
            _ => from = start + 1,
        }
    }
    None
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn spawn_buffer_reader<R>(mut stream: R, buffer: Arc<StreamBuffer>, notify: Arc<Notify>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match stream.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => {
                    buffer.data.lock().extend_from_slice(&chunk[..n]);
                    notify.notify_waiters();
                }
                Err(e) => {
                    debug!("Shell stream read failed: {e}");
                    break;
                }
            }
        }
        buffer.closed.store(true, Ordering::Release);
        notify.notify_waiters();
    });
}

struct Pipes {
    child: Child,
    stdin: ChildStdin,
    stdout: Arc<StreamBuffer>,
    stderr: Arc<StreamBuffer>,
    notify: Arc<Notify>,
}

/// Session that scans accumulated output for the sentinel.
pub struct BufferedSession {
    shell: ShellProgram,
    timeout: Duration,
    state: SessionState,
    sentinel: Sentinel,
    pipes: Option<Pipes>,
}

impl BufferedSession {
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

#[async_trait]
impl ShellSession for BufferedSession {
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

        let notify = Arc::new(Notify::new());
        let out_buf = Arc::new(StreamBuffer::default());
        let err_buf = Arc::new(StreamBuffer::default());
        spawn_buffer_reader(stdout, out_buf.clone(), notify.clone());
        spawn_buffer_reader(stderr, err_buf.clone(), notify.clone());

        self.pipes = Some(Pipes {
            child,
            stdin,
            stdout: out_buf,
            stderr: err_buf,
            notify,
        });
        self.state = SessionState::Running;
        info!(program = %self.shell.program, "Buffered shell session started");
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

        pipes.stdout.clear();
        pipes.stderr.clear();

        let token = self.sentinel.next_token();
        debug!(command, "Running shell command");
        if let Err(e) = write_framed(&mut pipes.stdin, &self.shell.frame(command, &token)).await {
            warn!("Writing to shell failed: {e}");
            self.state = SessionState::Stopped;
            return Err(reap(&mut pipes.child).await);
        }

        let deadline = tokio::time::sleep(self.timeout);
        tokio::pin!(deadline);

        let mut stdout = None;
        let mut stderr = None;
        loop {
            // Registered before inspecting the buffers so no wakeup is lost.
            let notified = pipes.notify.notified();
            tokio::pin!(notified);
            // Sampled before scanning so a sentinel written just before EOF is still seen.
            let stdout_closed = pipes.stdout.is_closed();
            let stderr_closed = pipes.stderr.is_closed();

            if stdout.is_none() {
                stdout = pipes.stdout.take_through(&token);
            }
            if stderr.is_none() {
                stderr = pipes.stderr.take_through(&token);
            }
            if stdout.is_some() && stderr.is_some() {
                break;
            }
            if (stdout.is_none() && stdout_closed) || (stderr.is_none() && stderr_closed) {
                self.state = SessionState::Stopped;
                return Err(reap(&mut pipes.child).await);
            }

            tokio::select! {
                () = &mut notified => {}
                () = &mut deadline => {
                    warn!(command, secs = self.timeout.as_secs(), "Shell command timed out");
                    self.state = SessionState::TimedOut;
                    return Err(ToolError::Timeout(self.timeout.as_secs()));
                }
            }
        }

        Ok(command_result(
            stdout.unwrap_or_default(),
            stderr.unwrap_or_default(),
        ))
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
                info!("Buffered shell session stopped");
                Ok(())
            }
        }
    }
}
