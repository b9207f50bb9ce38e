//! Tool runtime: registry, dispatch and the standard tool set.

mod registry;

pub use registry::ToolRegistry;

use proto::ConfigError;
use serde::{Deserialize, Serialize};
use tools::{BashTool, ComputerTool, EditTool, EditorOptions, ScreenOptions, ShellOptions};
use tracing::{info, warn};

/// Per-tool settings, one section each.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolSettings {
    pub shell: ShellOptions,
    pub screen: ScreenOptions,
    pub editor: EditorOptions,
}

/// Builds a registry with `bash`, `computer` and `str_replace_editor`.
///
/// The computer tool is left out with a warning when no display can be
/// reached, so the shell and editor stay usable on headless hosts.
pub async fn standard_registry(settings: &ToolSettings) -> Result<ToolRegistry, ConfigError> {
    let mut registry = ToolRegistry::new();
    registry.register(BashTool::with_options(settings.shell.clone()))?;
    match ComputerTool::detect(settings.screen.clone()).await {
        Ok(computer) => registry.register(computer)?,
        Err(e) => warn!("Computer tool unavailable: {e}"),
    }
    registry.register(EditTool::with_options(settings.editor.clone()))?;
    info!(tools = ?registry.names(), "Tool registry ready");
    Ok(registry)
}
