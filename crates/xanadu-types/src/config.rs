//! Shell configuration, loaded from `xanadu.toml`.
//!
//! Every field has a default, so an empty or missing file yields a usable
//! configuration.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Result, XanaduError};
use crate::level::LogLevel;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "XANADU_CONFIG";

/// Config file looked up in the working directory when `XANADU_CONFIG` is unset.
pub const DEFAULT_CONFIG_FILE: &str = "xanadu.toml";

/// Top-level shell configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ShellConfig {
    /// Prompt shown when no continuation is pending.
    #[serde(default = "default_prompt")]
    pub prompt: String,

    /// Initial user-visible log level.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Render width in columns. Zero means unbounded.
    #[serde(default = "default_width")]
    pub width: usize,

    /// Render height in rows. Zero means unbounded.
    #[serde(default = "default_height")]
    pub height: usize,

    #[serde(default)]
    pub agent: AgentConfig,
}

/// Settings for the agent conversation loop.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Backend id used until `agent model backend:name` switches it.
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Model name passed to the backend.
    #[serde(default = "default_model")]
    pub model: String,

    /// Hard cap on backend calls per agent invocation.
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,

    /// Columns a tool call's live output is indented by.
    #[serde(default = "default_tool_indent")]
    pub tool_indent: usize,
}

fn default_prompt() -> String {
    "> ".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_width() -> usize {
    100
}
fn default_height() -> usize {
    40
}
fn default_backend() -> String {
    "echo".to_string()
}
fn default_model() -> String {
    "echo-1".to_string()
}
fn default_max_turns() -> usize {
    50
}
fn default_tool_indent() -> usize {
    6
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            model: default_model(),
            max_turns: default_max_turns(),
            tool_indent: default_tool_indent(),
        }
    }
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            prompt: default_prompt(),
            log_level: default_log_level(),
            width: default_width(),
            height: default_height(),
            agent: AgentConfig::default(),
        }
    }
}

impl ShellConfig {
    /// Parse a configuration from TOML text and validate it.
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: ShellConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        log::debug!("Loaded config from {}", path.display());
        Self::from_toml(&text)
    }

    /// Resolve the config location: `$XANADU_CONFIG`, then `./xanadu.toml`,
    /// then built-in defaults.
    pub fn load() -> Result<Self> {
        match Self::locate(std::env::var_os(CONFIG_ENV).map(PathBuf::from)) {
            Some(path) => Self::from_file(&path),
            None => {
                log::debug!("No config file found, using defaults");
                Ok(Self::default())
            },
        }
    }

    fn locate(explicit: Option<PathBuf>) -> Option<PathBuf> {
        if explicit.is_some() {
            return explicit;
        }
        let local = PathBuf::from(DEFAULT_CONFIG_FILE);
        local.is_file().then_some(local)
    }

    /// The configured log level, parsed.
    pub fn log_level(&self) -> Result<LogLevel> {
        self.log_level.parse()
    }

    fn validate(&self) -> Result<()> {
        self.log_level()?;
        if self.agent.max_turns == 0 {
            return Err(XanaduError::Config(
                "agent.max_turns must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
