//! Error types for the corebridge host layer

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for bridge operations
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Load error: {0}")]
    Load(#[from] LoadError),

    #[error("A core is already running")]
    AlreadyRunning,

    #[error("The core is still stopping")]
    Stopping,

    #[error("No core is running")]
    NotRunning,

    #[error("Save state error: {0}")]
    StateIo(#[from] StateIoError),

    #[error("Audio sink error: {0}")]
    AudioSink(#[from] AudioSinkError),

    #[error("Surface error: {0}")]
    Surface(#[from] SurfaceError),

    #[error("Option error: {0}")]
    Option(#[from] OptionError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(String),
}

/// ROM loading errors
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Cannot read {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid ROM image: {0}")]
    InvalidImage(String),

    #[error("Core rejected the image: {0}")]
    Core(String),
}

/// Save state and battery persistence errors
#[derive(Error, Debug)]
pub enum StateIoError {
    #[error("Invalid save slot: {0}")]
    InvalidSlot(u32),

    #[error("No core is running")]
    NotRunning,

    #[error("Slot {0} is empty")]
    Missing(u32),

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Core state error: {0}")]
    Core(String),

    #[error("Core thread did not answer in time")]
    Timeout,
}

/// Host audio sink errors
#[derive(Error, Debug)]
pub enum AudioSinkError {
    #[error("No output device available")]
    NoDevice,

    #[error("Unsupported stream config: {0}")]
    Config(String),

    #[error("Stream error: {0}")]
    Stream(String),
}

/// Presentation surface errors
#[derive(Error, Debug)]
pub enum SurfaceError {
    #[error("GPU resource allocation failed: {0}")]
    Allocation(String),

    #[error("Display has not been started")]
    NotStarted,

    #[error("Present failed: {0}")]
    Present(String),
}

/// Runtime option errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OptionError {
    #[error("Unknown option: {0}")]
    Unknown(String),

    #[error("Option {name} expects a {expected} value")]
    TypeMismatch { name: String, expected: &'static str },

    #[error("Value {value} out of range for {name}")]
    OutOfRange { name: String, value: String },

    #[error("Unknown palette preset: {0}")]
    UnknownPreset(String),
}

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;
