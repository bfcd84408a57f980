//! Core identifier types shared across the instance engine.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a running game instance.
///
/// A wrapper around UUID v4 so instance ids cannot be confused with player
/// ids or correlation ids elsewhere in the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceId(pub Uuid);

impl InstanceId {
    /// Creates a new random instance ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for InstanceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for InstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlayerId(pub Uuid);

impl PlayerId {
    /// Creates a new random player ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PlayerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PlayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier for a loadable map, typically the map's folder path relative to
/// the maps root. Keys the process-wide [`InstanceDirectory`].
///
/// [`InstanceDirectory`]: crate::InstanceDirectory
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MapId(pub String);

impl MapId {
    /// Returns the map identifier as a path-like string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for MapId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for MapId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for MapId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle phase of a [`GameInstance`](crate::GameInstance).
///
/// The module list is append-only in `Constructing` and immutable afterward.
/// Players are only admitted in `Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GamePhase {
    /// Modules may still be attached; no module has been initialized.
    Constructing,
    /// `ready()` is running module initializers in registration order.
    Initializing,
    /// All modules initialized; the instance accepts players and events.
    Ready,
    /// Teardown in progress; module deinitializers run in registration order.
    Deinitializing,
    /// Fully torn down; the instance will never transition again.
    Destroyed,
}

impl std::fmt::Display for GamePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            GamePhase::Constructing => "constructing",
            GamePhase::Initializing => "initializing",
            GamePhase::Ready => "ready",
            GamePhase::Deinitializing => "deinitializing",
            GamePhase::Destroyed => "destroyed",
        };
        write!(f, "{name}")
    }
}

/// Current Unix timestamp in seconds.
pub fn current_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
