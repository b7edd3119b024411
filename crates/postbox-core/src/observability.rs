//! Logging setup: compact console output plus an optional plain log file.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;

use tracing::metadata::LevelFilter;
use tracing_subscriber::{
    Layer, filter::FilterFn, fmt::time::ChronoUtc, prelude::__tracing_subscriber_SubscriberExt,
    util::SubscriberInitExt,
};

use crate::config::LogConfig;

/// Only events from our own crates are emitted.
const TARGET_PREFIX: &str = "postbox";

#[derive(Debug, thiserror::Error)]
pub enum ObservabilityError {
    #[error("failed to open log file {path}: {source}")]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("a global subscriber is already installed: {0}")]
    AlreadyInitialised(#[from] tracing_subscriber::util::TryInitError),
}

fn default_level() -> LevelFilter {
    if cfg!(debug_assertions) {
        LevelFilter::TRACE
    } else {
        LevelFilter::INFO
    }
}

/// Parse `level`, falling back to the build default when unset or invalid.
pub fn resolve_level(level: Option<&str>) -> LevelFilter {
    let default = default_level();
    level.map_or(default, |level| {
        LevelFilter::from_str(level).unwrap_or_else(|_| {
            eprintln!("Invalid log level specified {level}, defaulting to {default}");
            default
        })
    })
}

fn open_log_file(path: &Path) -> Result<File, ObservabilityError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| ObservabilityError::LogFile {
            path: path.to_path_buf(),
            source,
        })
}

fn is_ours(target: &str) -> bool {
    target.starts_with(TARGET_PREFIX)
}

/// Install the global subscriber described by `config`.
pub fn init(config: &LogConfig) -> Result<(), ObservabilityError> {
    let level = resolve_level(config.level.as_deref());

    let file = match config.file.as_deref() {
        Some(path) if !path.as_os_str().is_empty() => Some(open_log_file(path)?),
        _ => None,
    };

    let file_layer = file.map(|file| {
        tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_target(true)
            .with_timer(ChronoUtc::rfc_3339())
            .with_writer(Mutex::new(file))
            .with_filter(level)
            .with_filter(FilterFn::new(|metadata| is_ours(metadata.target())))
    });

    tracing_subscriber::Registry::default()
        .with(
            tracing_subscriber::fmt::layer()
                .with_file(false)
                .with_line_number(false)
                .compact()
                .with_ansi(true)
                .with_timer(ChronoUtc::rfc_3339())
                .with_filter(level)
                .with_filter(FilterFn::new(|metadata| is_ours(metadata.target()))),
        )
        .with(file_layer)
        .try_init()?;

    Ok(())
}
