//! Tracing subscriber setup for binaries. Libraries only emit events.

use anyhow::{anyhow, Context, Result};
use std::fs::OpenOptions;
use std::io;
use std::sync::Mutex;
use tracing::Level;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Target prefix shared by every crate in the workspace.
const TARGET_PREFIX: &str = "cinder";

/// The filter directive used when `RUST_LOG` is not set.
pub fn default_directive(config: &LoggingConfig) -> String {
    format!("{TARGET_PREFIX}={}", config.level.to_ascii_lowercase())
}

/// Install the global tracing subscriber. `RUST_LOG` takes precedence over the
/// configured level. Returns `Ok(false)` when logging is disabled.
pub fn init_tracing(config: &LoggingConfig) -> Result<bool> {
    if !config.enabled {
        return Ok(false);
    }

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_directive(config))
            .with_context(|| format!("Invalid log level: {}", config.level))?,
    };

    let writer = match &config.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file: {}", path.display()))?;
            BoxMakeWriter::new(Mutex::new(file).and(io::stderr.with_max_level(Level::WARN)))
        }
        None => BoxMakeWriter::new(io::stdout),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(config.file.is_none())
        .with_writer(writer);

    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|err| anyhow!("Failed to install tracing subscriber: {err}"))?;

    Ok(true)
}
