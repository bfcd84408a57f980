//! Command-line argument parsing
//!
//! This module defines the command-line interface for the Bastion minigame
//! host using the clap crate for argument parsing.

use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments for the Bastion minigame host
///
/// These arguments allow users to override configuration file settings
/// and control host behavior from the command line.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path
    ///
    /// Specifies the path to the TOML configuration file.
    /// If the file doesn't exist, a default configuration will be created.
    #[arg(short, long, default_value = "bastion.toml")]
    pub config: PathBuf,

    /// Engine bridge listen address
    ///
    /// Override the listen address from the configuration file.
    /// Format: "IP:PORT" (e.g., "127.0.0.1:25565")
    #[arg(short, long)]
    pub listen: Option<String>,

    /// Container identifier
    ///
    /// Override the container id announced to the fleet. Every process
    /// connected to the same broker needs a distinct id.
    #[arg(long)]
    pub container_id: Option<String>,

    /// Broker address
    ///
    /// Override the broker address from the configuration file. When neither
    /// is set, the host runs in local-only mode with no fleet messaging.
    #[arg(short, long)]
    pub broker: Option<String>,

    /// Enable debug logging
    ///
    /// When enabled, sets the logging level to debug, providing more
    /// detailed output for troubleshooting.
    #[arg(short, long)]
    pub debug: bool,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            config: PathBuf::from("bastion.toml"),
            listen: None,
            container_id: None,
            broker: None,
            debug: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_default() {
        let args = Args::default();
        assert_eq!(args.config, PathBuf::from("bastion.toml"));
        assert!(!args.debug);
        assert!(args.listen.is_none());
        assert!(args.container_id.is_none());
        assert!(args.broker.is_none());
    }
}
