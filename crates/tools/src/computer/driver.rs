//! Device access for the computer tool.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use image::RgbaImage;
use proto::ToolError;
use tokio::process::Command;
use tracing::debug;

use super::scaling::Resolution;

const XDOTOOL_TIMEOUT: Duration = Duration::from_secs(15);

/// Mouse buttons the controller can press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

impl MouseButton {
    fn xdotool_code(self) -> &'static str {
        match self {
            Self::Left => "1",
            Self::Middle => "2",
            Self::Right => "3",
        }
    }
}

/// Pointer, keyboard and capture primitives in device coordinates.
#[async_trait]
pub trait InputDriver: Send + Sync {
    async fn screen_size(&self) -> Result<Resolution, ToolError>;
    /// Live pointer position; may be negative on multi-monitor layouts.
    async fn cursor_position(&self) -> Result<(i32, i32), ToolError>;
    async fn move_to(&self, x: u32, y: u32) -> Result<(), ToolError>;
    /// Presses the left button, moves to the target and releases.
    async fn drag_to(&self, x: u32, y: u32) -> Result<(), ToolError>;
    async fn click(&self, button: MouseButton) -> Result<(), ToolError>;
    async fn double_click(&self) -> Result<(), ToolError>;
    /// Presses a key or chord such as `Return` or `ctrl+s`.
    async fn press_key(&self, key: &str) -> Result<(), ToolError>;
    async fn type_text(&self, text: &str, delay: Duration) -> Result<(), ToolError>;
    /// Grabs the full screen at native resolution.
    async fn capture(&self) -> Result<RgbaImage, ToolError>;
}

/// X11 driver backed by the `xdotool` command.
#[derive(Debug, Clone)]
pub struct XdoDriver {
    display: u32,
    program: String,
}

impl XdoDriver {
    pub fn new(display: u32) -> Self {
        Self {
            display,
            program: "xdotool".to_string(),
        }
    }

    async fn xdotool(&self, args: &[&str]) -> Result<String, ToolError> {
        let subcommand = args.first().copied().unwrap_or_default();
        debug!(?args, "Running xdotool");
        let output = tokio::time::timeout(
            XDOTOOL_TIMEOUT,
            Command::new(&self.program)
                .args(args)
                .env("DISPLAY", format!(":{}", self.display))
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| ToolError::ExecutionFailed(format!("xdotool {subcommand} timed out")))?
        .map_err(|e| ToolError::ExecutionFailed(format!("Failed to execute xdotool: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ToolError::ExecutionFailed(format!(
                "xdotool {subcommand} failed: {}",
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl InputDriver for XdoDriver {
    async fn screen_size(&self) -> Result<Resolution, ToolError> {
        let out = self.xdotool(&["getdisplaygeometry"]).await?;
        parse_geometry(&out).ok_or_else(|| {
            ToolError::ExecutionFailed(format!("Unexpected display geometry: {}", out.trim()))
        })
    }

    async fn cursor_position(&self) -> Result<(i32, i32), ToolError> {
        let out = self.xdotool(&["getmouselocation", "--shell"]).await?;
        parse_mouse_location(&out).ok_or_else(|| {
            ToolError::ExecutionFailed(format!("Unexpected mouse location: {}", out.trim()))
        })
    }

    async fn move_to(&self, x: u32, y: u32) -> Result<(), ToolError> {
        let (x, y) = (x.to_string(), y.to_string());
        self.xdotool(&["mousemove", "--sync", &x, &y]).await?;
        Ok(())
    }

    async fn drag_to(&self, x: u32, y: u32) -> Result<(), ToolError> {
        let (x, y) = (x.to_string(), y.to_string());
        self.xdotool(&["mousedown", "1"]).await?;
        let moved = self.xdotool(&["mousemove", "--sync", &x, &y]).await;
        // Release even when the move failed so the button is not left held.
        self.xdotool(&["mouseup", "1"]).await?;
        moved.map(|_| ())
    }

    async fn click(&self, button: MouseButton) -> Result<(), ToolError> {
        self.xdotool(&["click", button.xdotool_code()]).await?;
        Ok(())
    }

    async fn double_click(&self) -> Result<(), ToolError> {
        self.xdotool(&["click", "--repeat", "2", MouseButton::Left.xdotool_code()])
            .await?;
        Ok(())
    }

    async fn press_key(&self, key: &str) -> Result<(), ToolError> {
        self.xdotool(&["key", "--", key]).await?;
        Ok(())
    }

    async fn type_text(&self, text: &str, delay: Duration) -> Result<(), ToolError> {
        let delay = delay.as_millis().to_string();
        self.xdotool(&["type", "--delay", &delay, "--", text]).await?;
        Ok(())
    }

    async fn capture(&self) -> Result<RgbaImage, ToolError> {
        tokio::task::spawn_blocking(capture_primary)
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("Screen capture task failed: {e}")))?
    }
}

#[cfg(not(target_env = "musl"))]
fn capture_primary() -> Result<RgbaImage, ToolError> {
    let screens = screenshots::Screen::all()
        .map_err(|e| ToolError::ExecutionFailed(format!("Failed to enumerate displays: {e}")))?;
    let screen = screens
        .first()
        .ok_or_else(|| ToolError::ExecutionFailed("No displays found".to_string()))?;
    screen
        .capture()
        .map_err(|e| ToolError::ExecutionFailed(format!("Screen capture failed: {e}")))
}

#[cfg(target_env = "musl")]
fn capture_primary() -> Result<RgbaImage, ToolError> {
    Err(ToolError::ExecutionFailed(
        "screen capture is not supported on musl targets".to_string(),
    ))
}

/// Display number of an X display name such as `:1`, `:0.0` or `host:2.1`.
fn parse_display_number(name: &str) -> Option<u32> {
    let (_, rest) = name.trim().rsplit_once(':')?;
    let number = rest.split('.').next()?;
    number.parse().ok()
}

/// Capture always reads the process `$DISPLAY`, so it must name the same
/// display that input is sent to.
pub(crate) fn check_capture_display(configured: u32, env: Option<&str>) -> Result<(), ToolError> {
    match env.and_then(parse_display_number) {
        Some(number) if number == configured => Ok(()),
        _ => Err(ToolError::ExecutionFailed(format!(
            "Display :{configured} is configured but screen capture reads DISPLAY={}",
            env.unwrap_or("<unset>")
        ))),
    }
}

/// Parses `getdisplaygeometry` output (`"1920 1080"`).
fn parse_geometry(out: &str) -> Option<Resolution> {
    let mut parts = out.split_whitespace();
    let width = parts.next()?.parse().ok()?;
    let height = parts.next()?.parse().ok()?;
    Some(Resolution::new(width, height))
}

/// Parses `getmouselocation --shell` output (`X=..`, `Y=..` lines).
fn parse_mouse_location(out: &str) -> Option<(i32, i32)> {
    let mut x = None;
    let mut y = None;
    for line in out.lines() {
        match line.trim().split_once('=') {
            Some(("X", value)) => x = value.parse().ok(),
            Some(("Y", value)) => y = value.parse().ok(),
            _ => {}
        }
    }
    Some((x?, y?))
}
