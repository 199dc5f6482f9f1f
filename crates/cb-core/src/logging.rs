//! Tracing subscriber setup

use crate::config::LoggingConfig;
use crate::error::{BridgeError, Result};
use std::fs::File;
use std::sync::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over the configured level. With
/// `log_to_file` set, events are also appended to `log_path`.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_filter()));

    let file_layer = if config.log_to_file {
        let file = File::options()
            .create(true)
            .append(true)
            .open(&config.log_path)?;
        Some(
            fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .boxed(),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .try_init()
        .map_err(|e| BridgeError::Config(format!("logging already initialised: {}", e)))
}
