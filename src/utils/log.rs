// src/utils/log.rs

//! Logger setup for the command-line binary.
//!
//! Output goes to stderr, or is appended to `logging.file` when one is
//! configured. `RUST_LOG` overrides the configured level.

use std::fs::OpenOptions;

use ::log::LevelFilter;
use env_logger::{Builder, Env, Target};

use crate::error::{AppError, Result};
use crate::models::LoggingConfig;

/// Effective level for the configured name and the `--verbose` flag.
pub fn level_filter(level: &str, verbose: bool) -> LevelFilter {
    if verbose {
        return LevelFilter::Debug;
    }
    level.trim().parse().unwrap_or(LevelFilter::Info)
}

/// Install the global logger. Call once, before anything logs.
pub fn init(config: &LoggingConfig, verbose: bool) -> Result<()> {
    let level = level_filter(&config.level, verbose);
    let mut builder =
        Builder::from_env(Env::default().default_filter_or(level.to_string().to_lowercase()));
    builder.format_timestamp_secs();

    if let Some(path) = &config.file {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        builder.target(Target::Pipe(Box::new(file)));
    }

    builder
        .try_init()
        .map_err(|e| AppError::config(format!("logger already initialised: {e}")))
}
