//! Configuration module for the Bastion minigame host
//!
//! This module handles command-line arguments, configuration file parsing,
//! and provides default settings for the host.

pub mod args;
pub mod settings;

pub use args::Args;
pub use settings::{Config, LoggingSettings, MapSettings, ServerSettings};

use anyhow::Result;
use tracing::{info, warn};

/// Load configuration from file or create default configuration
///
/// This function attempts to load configuration from the specified file.
/// If the file doesn't exist, it creates a default configuration file
/// and returns the default settings.
///
/// # Arguments
/// * `args` - Command line arguments containing the config file path
///
/// # Returns
/// * `Result<Config>` - The loaded or default configuration
///
/// # Errors
/// * Returns error if file I/O operations fail
/// * Returns error if TOML parsing fails
pub async fn load_config(args: &Args) -> Result<Config> {
    if args.config.exists() {
        let config_str = tokio::fs::read_to_string(&args.config).await?;
        match toml::de::from_str::<Config>(&config_str) {
            Ok(config) => Ok(config),
            Err(e) => {
                warn!("Failed to parse config file {}: {}", args.config.display(), e);
                Err(e.into())
            }
        }
    } else {
        warn!(
            "Configuration file not found: {}, using defaults",
            args.config.display()
        );

        // Create default config file
        let default_config = Config::default();
        let config_str = toml::to_string_pretty(&default_config)?;
        tokio::fs::write(&args.config, config_str).await?;
        info!("Created default configuration file: {}", args.config.display());

        Ok(default_config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_load_config_default() {
        let dir = tempfile::tempdir().unwrap();
        let args = Args {
            config: dir.path().join("bastion.toml"),
            ..Default::default()
        };

        let config = load_config(&args).await.unwrap();
        assert_eq!(config.server.container_id, "bastion-1");
        assert!(config.server.broker_addr.is_none());
        // The default file was written for next time.
        assert!(args.config.exists());
    }

    #[tokio::test]
    async fn test_load_config_existing() {
        let mut temp_file = NamedTempFile::new().unwrap();
        let config_content = r#"
[server]
listen_addr = "0.0.0.0:25565"
container_id = "bastion-eu-3"
broker_addr = "10.0.0.5:7400"
heartbeat_interval = 2000

[maps]
directory = "/srv/maps"

[logging]
level = "debug"
json_format = true
        "#;

        temp_file.write_all(config_content.as_bytes()).unwrap();

        let args = Args {
            config: temp_file.path().to_path_buf(),
            ..Default::default()
        };

        let config = load_config(&args).await.unwrap();
        assert_eq!(config.server.container_id, "bastion-eu-3");
        assert_eq!(config.server.broker_addr.as_deref(), Some("10.0.0.5:7400"));
        assert_eq!(config.server.heartbeat_interval, 2000);
        assert_eq!(config.maps.directory, "/srv/maps");
        assert!(config.logging.unwrap().json_format);
    }

    #[tokio::test]
    async fn test_load_config_malformed() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"[server\nnot toml").unwrap();

        let args = Args {
            config: temp_file.path().to_path_buf(),
            ..Default::default()
        };
        assert!(load_config(&args).await.is_err());
    }
}
