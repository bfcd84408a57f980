//! Logging system setup and configuration
//!
//! This module handles the initialization of the tracing-based logging system
//! used throughout the host for debugging, monitoring, and diagnostic output.

use anyhow::Result;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{Args, Config};

/// Initialize the logging system
///
/// Sets up structured logging using the tracing crate with configurable
/// output format and filtering levels. The `--debug` flag wins over the
/// config file level; the `RUST_LOG` environment variable wins over both.
///
/// # Arguments
/// * `args` - Command line arguments containing the debug flag
/// * `config` - Loaded configuration with the optional logging section
///
/// # Returns
/// * `Result<()>` - Success or error during logging setup
pub fn setup_logging(args: &Args, config: &Config) -> Result<()> {
    let level = if args.debug {
        "debug".to_string()
    } else {
        config
            .logging
            .as_ref()
            .map(|l| l.level.clone())
            .unwrap_or_else(|| "info".to_string())
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let json_format = config.logging.as_ref().is_some_and(|l| l.json_format);
    if json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(false))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false))
            .init();
    }

    Ok(())
}
