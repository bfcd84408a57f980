//! # Bastion Server
//!
//! The host process around `bastion_core`: command-line arguments, TOML
//! configuration, logging, graceful shutdown, and the [`InstanceHost`] that
//! owns the running game instances and answers fleet RPCs about them.

pub mod config;
pub mod context;
pub mod host;
pub mod logging;
pub mod modules;
pub mod shutdown;

pub use config::{Args, Config};
pub use context::ServicesContext;
pub use host::InstanceHost;
pub use modules::ChatScopeModule;
