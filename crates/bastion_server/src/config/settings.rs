//! Configuration settings structures
//!
//! This module defines all the configuration structures used by the host,
//! including server settings, map storage settings, and logging options.

use serde::{Deserialize, Serialize};

/// Main configuration structure
///
/// This is the root configuration object that contains all host settings.
/// It can be serialized to/from TOML format for configuration files.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Config {
    /// Host-level settings
    pub server: ServerSettings,
    /// Map storage settings
    pub maps: MapSettings,
    /// Optional logging configuration
    pub logging: Option<LoggingSettings>,
}

/// Host configuration settings
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ServerSettings {
    /// Network address the engine bridge binds to
    ///
    /// Format: "IP:PORT" (e.g., "127.0.0.1:25565" for localhost)
    pub listen_addr: String,

    /// Container identifier announced to the fleet
    ///
    /// Must be unique across all processes connected to the same broker;
    /// it is also how a container recognizes (and skips) its own frames.
    pub container_id: String,

    /// Broker address for fleet messaging
    ///
    /// When absent, the host runs in local-only mode: instances work
    /// normally but nothing is announced to other containers.
    pub broker_addr: Option<String>,

    /// Heartbeat interval in milliseconds
    pub heartbeat_interval: u64,
}

/// Map storage configuration
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct MapSettings {
    /// Root directory containing one subdirectory per map
    ///
    /// A map named "arenas/castle" is loaded from
    /// `<directory>/arenas/castle/map.json`.
    pub directory: String,
}

/// Logging system configuration
///
/// Controls how the host outputs log messages and diagnostic information.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct LoggingSettings {
    /// Logging level filter
    ///
    /// Valid values: "trace", "debug", "info", "warn", "error"
    pub level: String,

    /// Enable JSON-formatted log output
    ///
    /// When true, logs are output in structured JSON format,
    /// useful for log aggregation systems.
    pub json_format: bool,
}

impl Default for Config {
    /// Create a default configuration suitable for development
    ///
    /// This provides sensible defaults that work out of the box
    /// for local development and testing.
    fn default() -> Self {
        Self {
            server: ServerSettings {
                listen_addr: "127.0.0.1:25565".to_string(),
                container_id: "bastion-1".to_string(),
                broker_addr: None,
                heartbeat_interval: 5000,
            },
            maps: MapSettings {
                directory: "maps".to_string(),
            },
            logging: Some(LoggingSettings {
                level: "info".to_string(),
                json_format: false,
            }),
        }
    }
}
