//! Screen, keyboard and mouse controller.
//!
//! Coordinates exchanged with the agent live in API space, which may be a
//! scaled-down version of the native screen (see [`scaling`]). Every action
//! except `cursor_position` answers with a fresh screenshot.

mod capture;
pub mod driver;
pub mod scaling;

pub use driver::{InputDriver, MouseButton, XdoDriver};
pub use scaling::{Resolution, Scaler};

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use proto::{ToolError, ToolResult};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{Tool, parse_args};

/// Screen tool settings (`[screen]` config section).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenOptions {
    /// Reduce large screens to a standard API resolution.
    pub scaling_enabled: bool,
    /// Settle time between capture and read-back.
    pub screenshot_delay_ms: u64,
    /// Characters sent per `type` chunk.
    pub typing_group_size: usize,
    /// Delay between keystrokes inside a chunk.
    pub typing_delay_ms: u64,
    /// Refuse input while the pointer sits in a screen corner.
    pub failsafe: bool,
    /// Directory for screenshot scratch files; `<tmp>/outputs` when unset.
    pub output_dir: Option<PathBuf>,
    /// X display number; must match `$DISPLAY`, which screen capture reads.
    pub display: u32,
}

impl Default for ScreenOptions {
    fn default() -> Self {
        Self {
            scaling_enabled: true,
            screenshot_delay_ms: 2000,
            typing_group_size: 50,
            typing_delay_ms: 12,
            failsafe: true,
            output_dir: None,
            display: 0,
        }
    }
}

impl ScreenOptions {
    fn resolved_output_dir(&self) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("outputs"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Action {
    Key,
    Type,
    MouseMove,
    LeftClick,
    LeftClickDrag,
    RightClick,
    MiddleClick,
    DoubleClick,
    Screenshot,
    CursorPosition,
}

impl Action {
    fn as_str(self) -> &'static str {
        match self {
            Self::Key => "key",
            Self::Type => "type",
            Self::MouseMove => "mouse_move",
            Self::LeftClick => "left_click",
            Self::LeftClickDrag => "left_click_drag",
            Self::RightClick => "right_click",
            Self::MiddleClick => "middle_click",
            Self::DoubleClick => "double_click",
            Self::Screenshot => "screenshot",
            Self::CursorPosition => "cursor_position",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Deserialize)]
struct ComputerArgs {
    action: Action,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    coordinate: Option<serde_json::Value>,
}

/// Validated action with coordinates already in device space.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    MoveTo(u32, u32),
    DragTo(u32, u32),
    Key(String),
    Type(String),
    Click(MouseButton),
    DoubleClick,
    Screenshot,
    CursorPosition,
}

impl Command {
    fn is_input(&self) -> bool {
        !matches!(self, Self::Screenshot | Self::CursorPosition)
    }
}

/// Validates the argument shape of `args` before anything touches the device.
fn plan(args: ComputerArgs, scaler: &Scaler) -> Result<Command, ToolError> {
    let ComputerArgs {
        action,
        text,
        coordinate,
    } = args;
    match action {
        Action::MouseMove | Action::LeftClickDrag => {
            let Some(coordinate) = coordinate else {
                return Err(ToolError::invalid(format!(
                    "coordinate is required for {action}"
                )));
            };
            if text.is_some() {
                return Err(ToolError::invalid(format!("text is not accepted for {action}")));
            }
            let (x, y) = parse_coordinate(&coordinate)?;
            let (x, y) = scaler.api_to_device(x, y)?;
            Ok(if action == Action::MouseMove {
                Command::MoveTo(x, y)
            } else {
                Command::DragTo(x, y)
            })
        }
        Action::Key | Action::Type => {
            let Some(text) = text else {
                return Err(ToolError::invalid(format!("text is required for {action}")));
            };
            if coordinate.is_some() {
                return Err(ToolError::invalid(format!(
                    "coordinate is not accepted for {action}"
                )));
            }
            if text.is_empty() {
                return Err(ToolError::invalid(format!("text must not be empty for {action}")));
            }
            Ok(if action == Action::Key {
                Command::Key(text)
            } else {
                Command::Type(text)
            })
        }
        _ => {
            if text.is_some() {
                return Err(ToolError::invalid(format!("text is not accepted for {action}")));
            }
            if coordinate.is_some() {
                return Err(ToolError::invalid(format!(
                    "coordinate is not accepted for {action}"
                )));
            }
            Ok(match action {
                Action::LeftClick => Command::Click(MouseButton::Left),
                Action::RightClick => Command::Click(MouseButton::Right),
                Action::MiddleClick => Command::Click(MouseButton::Middle),
                Action::DoubleClick => Command::DoubleClick,
                Action::CursorPosition => Command::CursorPosition,
                _ => Command::Screenshot,
            })
        }
    }
}

fn parse_coordinate(value: &serde_json::Value) -> Result<(u32, u32), ToolError> {
    let pair = match value.as_array() {
        Some(items) if items.len() == 2 => items,
        _ => return Err(ToolError::invalid(format!("{value} must be a tuple of length 2"))),
    };
    let component = |item: &serde_json::Value| {
        item.as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| {
                ToolError::invalid(format!("{value} must be a tuple of non-negative ints"))
            })
    };
    Ok((component(&pair[0])?, component(&pair[1])?))
}

/// Splits `text` into chunks of at most `size` characters.
fn chunks(text: &str, size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(size.max(1))
        .map(|chunk| chunk.iter().collect())
        .collect()
}

fn in_corner(position: (i32, i32), native: Resolution) -> bool {
    let (x, y) = position;
    let right = i64::from(native.width) - 1;
    let bottom = i64::from(native.height) - 1;
    let at_x_edge = x <= 0 || i64::from(x) >= right;
    let at_y_edge = y <= 0 || i64::from(y) >= bottom;
    at_x_edge && at_y_edge
}

/// Tool that drives the desktop through an [`InputDriver`].
pub struct ComputerTool {
    driver: Arc<dyn InputDriver>,
    scaler: Scaler,
    options: ScreenOptions,
    output_dir: PathBuf,
    // One action at a time; a drag must not interleave with a click.
    busy: Mutex<()>,
}

impl ComputerTool {
    /// Creates a controller for a screen of `native` size.
    pub fn new(driver: Arc<dyn InputDriver>, native: Resolution, options: ScreenOptions) -> Self {
        let scaler = Scaler::new(native, options.scaling_enabled);
        let output_dir = options.resolved_output_dir();
        Self {
            driver,
            scaler,
            options,
            output_dir,
            busy: Mutex::new(()),
        }
    }

    /// Creates a controller after querying the driver for the screen size.
    pub async fn connect(
        driver: Arc<dyn InputDriver>,
        options: ScreenOptions,
    ) -> Result<Self, ToolError> {
        let native = driver.screen_size().await?;
        let tool = Self::new(driver, native, options);
        let api = tool.scaler.api_resolution();
        info!(
            native_width = native.width,
            native_height = native.height,
            api_width = api.width,
            api_height = api.height,
            "Computer tool connected"
        );
        Ok(tool)
    }

    /// Creates a controller for the local X display through `xdotool`.
    pub async fn detect(options: ScreenOptions) -> Result<Self, ToolError> {
        let env_display = std::env::var("DISPLAY").ok();
        driver::check_capture_display(options.display, env_display.as_deref())?;
        let driver = Arc::new(XdoDriver::new(options.display));
        Self::connect(driver, options).await
    }

    /// Coordinate mapping in use.
    pub fn scaler(&self) -> &Scaler {
        &self.scaler
    }

    async fn check_failsafe(&self) -> Result<(), ToolError> {
        if !self.options.failsafe {
            return Ok(());
        }
        let position = self.driver.cursor_position().await?;
        if in_corner(position, self.scaler.native()) {
            return Err(ToolError::FailSafe(format!(
                "pointer is in a screen corner at ({}, {})",
                position.0, position.1
            )));
        }
        Ok(())
    }

    async fn screenshot(&self) -> Result<ToolResult, ToolError> {
        let resize_to = self
            .scaler
            .is_scaling()
            .then(|| self.scaler.api_resolution());
        let b64 = capture::capture_base64(
            self.driver.as_ref(),
            resize_to,
            &self.output_dir,
            Duration::from_millis(self.options.screenshot_delay_ms),
        )
        .await
        .map_err(|e| ToolError::ExecutionFailed(format!("Failed to take screenshot: {e}")))?;
        Ok(ToolResult::with_screenshot(b64))
    }

    async fn perform(&self, command: Command) -> Result<ToolResult, ToolError> {
        if command.is_input() {
            self.check_failsafe().await?;
        }
        match command {
            Command::MoveTo(x, y) => self.driver.move_to(x, y).await?,
            Command::DragTo(x, y) => self.driver.drag_to(x, y).await?,
            Command::Key(key) => self.driver.press_key(&key).await?,
            Command::Type(text) => {
                let delay = Duration::from_millis(self.options.typing_delay_ms);
                for chunk in chunks(&text, self.options.typing_group_size) {
                    self.driver.type_text(&chunk, delay).await?;
                }
            }
            Command::Click(button) => self.driver.click(button).await?,
            Command::DoubleClick => self.driver.double_click().await?,
            Command::Screenshot => {}
            Command::CursorPosition => {
                let (x, y) = self.driver.cursor_position().await?;
                let clamp = |v: i32| u32::try_from(v).unwrap_or(0);
                let (x, y) = self.scaler.device_to_api(clamp(x), clamp(y));
                return Ok(ToolResult::success(format!("X={x},Y={y}")));
            }
        }
        self.screenshot().await
    }
}

#[async_trait]
impl Tool for ComputerTool {
    fn name(&self) -> &str {
        "computer"
    }

    fn api_type(&self) -> &str {
        "computer_20241022"
    }

    fn description(&self) -> &str {
        "Control the screen, keyboard and mouse. Coordinates are in the advertised \
         display size. Every action except cursor_position returns a screenshot."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": [
                        "key", "type", "mouse_move", "left_click", "left_click_drag",
                        "right_click", "middle_click", "double_click", "screenshot",
                        "cursor_position"
                    ],
                    "description": "Action to perform"
                },
                "text": {
                    "type": "string",
                    "description": "Text to type or key chord to press (key/type only)"
                },
                "coordinate": {
                    "type": "array",
                    "items": {"type": "integer", "minimum": 0},
                    "minItems": 2,
                    "maxItems": 2,
                    "description": "[x, y] target (mouse_move/left_click_drag only)"
                }
            },
            "required": ["action"]
        })
    }

    fn options(&self) -> serde_json::Value {
        let api = self.scaler.api_resolution();
        serde_json::json!({
            "display_width_px": api.width,
            "display_height_px": api.height,
            "display_number": self.options.display,
        })
    }

    async fn execute(&self, args: serde_json::Value) -> Result<ToolResult, ToolError> {
        let args: ComputerArgs = parse_args(args)?;
        let action = args.action;
        let command = plan(args, &self.scaler)?;
        debug!(%action, ?command, "Computer action");

        let _busy = self.busy.lock().await;
        self.perform(command).await.map_err(|e| match e {
            ToolError::FailSafe(_) => {
                warn!(%action, "Failsafe tripped: {e}");
                e
            }
            ToolError::InvalidArgs(_) => e,
            other => ToolError::ExecutionFailed(format!("Action failed: {other}")),
        })
    }
}
