use proto::ConfigError;
use runtime::ToolSettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tools::{EditorOptions, ScreenOptions, ShellOptions};
use tracing::debug;

const CONFIG_FILE_NAME: &str = "deskhand.toml";

/// Top-level CLI configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Config {
    /// Persistent shell settings.
    #[serde(default)]
    pub shell: ShellOptions,

    /// Screen controller settings.
    #[serde(default)]
    pub screen: ScreenOptions,

    /// File editor settings.
    #[serde(default)]
    pub editor: EditorOptions,
}

/// Returns `~/.deskhand`.
pub fn home_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".deskhand")
}

impl Config {
    /// Loads configuration from explicit path, fallback locations, and env overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config_path = path.map(|p| p.to_path_buf()).or_else(|| {
            // Look in current dir, then home dir
            let cwd = std::env::current_dir().ok()?.join(CONFIG_FILE_NAME);
            if cwd.exists() {
                return Some(cwd);
            }
            let home_config = home_dir().join("config.toml");
            if home_config.exists() {
                return Some(home_config);
            }
            None
        });
        debug!(path = ?config_path, "Config file resolved");

        let mut config = if let Some(path) = config_path {
            let content = std::fs::read_to_string(&path).map_err(ConfigError::Io)?;
            toml::from_str(&content).map_err(|e| ConfigError::Toml(e.to_string()))?
        } else {
            Config::default()
        };

        config.apply_env_overrides()?;
        config.validate()?;

        debug!(
            shell_timeout_secs = config.shell.timeout_secs,
            scaling = config.screen.scaling_enabled,
            snippet_lines = config.editor.snippet_lines,
            "Config loaded"
        );
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(secs) = std::env::var("DESKHAND_SHELL_TIMEOUT_SECS") {
            self.shell.timeout_secs = parse_env("DESKHAND_SHELL_TIMEOUT_SECS", &secs)?;
        }
        if let Ok(program) = std::env::var("DESKHAND_SHELL_PROGRAM")
            && !program.trim().is_empty()
        {
            self.shell.program = Some(program);
        }
        if let Ok(scaling) = std::env::var("DESKHAND_SCREEN_SCALING") {
            self.screen.scaling_enabled = parse_bool("DESKHAND_SCREEN_SCALING", &scaling)?;
        }
        if let Ok(delay) = std::env::var("DESKHAND_SCREENSHOT_DELAY_MS") {
            self.screen.screenshot_delay_ms = parse_env("DESKHAND_SCREENSHOT_DELAY_MS", &delay)?;
        }
        if let Ok(dir) = std::env::var("DESKHAND_OUTPUT_DIR")
            && !dir.trim().is_empty()
        {
            self.screen.output_dir = Some(PathBuf::from(dir));
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.shell.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "shell.timeout_secs".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.screen.typing_group_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "screen.typing_group_size".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Splits the config into the settings the tool runtime consumes.
    pub fn tool_settings(&self) -> ToolSettings {
        ToolSettings {
            shell: self.shell.clone(),
            screen: self.screen.clone(),
            editor: self.editor.clone(),
        }
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::InvalidValue {
            field: name.to_string(),
            reason: e.to_string(),
        })
}

fn parse_bool(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            field: name.to_string(),
            reason: format!("expected true or false, got '{other}'"),
        }),
    }
}
