//! Configuration system for corebridge

use crate::error::{BridgeError, Result};
use crate::options::OptionSet;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub paths: PathConfig,
    pub audio: AudioConfig,
    pub video: VideoConfig,
    pub input: InputConfig,
    pub logging: LoggingConfig,
    /// Option values applied when a core starts
    pub options: OptionSet,
}

/// Lifecycle settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// How long `stop` waits for the core thread to exit
    pub stop_timeout_ms: u64,
    /// How long a control call waits for the core thread to answer
    pub command_timeout_ms: u64,
    pub start_paused: bool,
}

/// Where battery and state files live
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathConfig {
    pub saves: PathBuf,
    pub states: PathBuf,
}

/// Audio settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub backend: AudioBackendKind,
    pub enable: bool,
}

/// Audio backend selection
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub enum AudioBackendKind {
    /// Default host output device
    #[default]
    Auto,
    /// Discard output on a timer thread
    Null,
}

/// Presentation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    /// Timer-driven display rate for hosts without a refresh callback
    pub display_link_hz: f64,
}

/// Input settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct InputConfig {
    pub keyboard_mapping: KeyboardMapping,
}

/// Keyboard key names for each keypad button
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyboardMapping {
    pub a: String,
    pub b: String,
    pub select: String,
    pub start: String,
    pub right: String,
    pub left: String,
    pub up: String,
    pub down: String,
    pub r: String,
    pub l: String,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub log_to_file: bool,
    pub log_path: PathBuf,
}

/// Logging level
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Directive understood by `tracing_subscriber::EnvFilter`
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            stop_timeout_ms: 5000,
            command_timeout_ms: 2000,
            start_paused: false,
        }
    }
}

impl Default for PathConfig {
    fn default() -> Self {
        let base = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("corebridge");

        Self {
            saves: base.join("saves"),
            states: base.join("states"),
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            backend: AudioBackendKind::default(),
            enable: true,
        }
    }
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            display_link_hz: 60.0,
        }
    }
}

impl Default for KeyboardMapping {
    fn default() -> Self {
        Self {
            a: "X".to_string(),
            b: "Z".to_string(),
            select: "Backspace".to_string(),
            start: "Enter".to_string(),
            right: "ArrowRight".to_string(),
            left: "ArrowLeft".to_string(),
            up: "ArrowUp".to_string(),
            down: "ArrowDown".to_string(),
            r: "S".to_string(),
            l: "A".to_string(),
        }
    }
}

impl KeyboardMapping {
    /// `(button name, key name)` pairs in keypad bit order
    pub fn entries(&self) -> [(&'static str, &str); 10] {
        [
            ("a", self.a.as_str()),
            ("b", self.b.as_str()),
            ("select", self.select.as_str()),
            ("start", self.start.as_str()),
            ("right", self.right.as_str()),
            ("left", self.left.as_str()),
            ("up", self.up.as_str()),
            ("down", self.down.as_str()),
            ("r", self.r.as_str()),
            ("l", self.l.as_str()),
        ]
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::default(),
            log_to_file: false,
            log_path: PathBuf::from("corebridge.log"),
        }
    }
}

impl Config {
    /// Load configuration from the default location, or create it
    pub fn load() -> Result<Self> {
        let path = Self::config_path();

        if path.exists() {
            Self::load_from(&path)
        } else {
            let config = Self::default();
            config.save()?;
            Ok(config)
        }
    }

    /// Load configuration from an explicit file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| BridgeError::Config(format!("{}: {}", path.display(), e)))?;
        config.options.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    /// Save configuration to an explicit file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content =
            toml::to_string_pretty(self).map_err(|e| BridgeError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the path to the configuration file
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("corebridge")
            .join("config.toml")
    }

    /// Config with both save directories under `root`
    pub fn with_save_root(root: &Path) -> Self {
        let mut config = Self::default();
        config.paths.saves = root.join("saves");
        config.paths.states = root.join("states");
        config
    }
}
