//! Error taxonomy for instance composition and map loading.
//!
//! Lifecycle errors (`ModuleLookup`, `DuplicateModule`, `LifecycleState`)
//! are programming errors and abort instance startup; a player never sees a
//! partially initialized instance. `MapLoad` propagates to the caller of the
//! directory without corrupting it. Event-handler failures are NOT part of
//! this taxonomy — those are isolated and logged by the event bus.

use crate::types::{GamePhase, MapId};
use thiserror::Error;

/// Errors raised while loading map data from disk.
#[derive(Debug, Error)]
pub enum MapLoadError {
    /// Reading the map folder failed.
    #[error("failed to read map data: {0}")]
    Io(#[from] std::io::Error),

    /// The map folder exists but its contents could not be parsed.
    #[error("map data is corrupt: {0}")]
    Corrupt(String),
}

/// Errors raised by the instance engine.
#[derive(Debug, Error)]
pub enum GameError {
    /// A module asked for a sibling that was never attached. Fatal: module
    /// dependencies are satisfied by registration order, so this is a wiring
    /// bug, not a runtime condition.
    #[error("no module of type {0} is attached to this instance")]
    ModuleLookup(&'static str),

    /// A second module of the same concrete type was attached. Fatal at
    /// registration time; replacement would silently reorder initialization.
    #[error("a module of type {0} is already attached")]
    DuplicateModule(&'static str),

    /// An operation was called in the wrong lifecycle phase (e.g. attaching
    /// a module after `ready()`, or a player joining a dead instance).
    #[error("operation requires phase '{expected}' but instance is '{actual}'")]
    LifecycleState {
        expected: GamePhase,
        actual: GamePhase,
    },

    /// Loading the instance's map failed. The directory is left clean: a
    /// failed load never leaves a half-populated entry behind.
    #[error("map load failed: {0}")]
    MapLoad(#[from] MapLoadError),

    /// A module needed the instance's world before any provider supplied it.
    /// Usually means the world provider was not registered first.
    #[error("instance world has not been provided yet")]
    WorldUnavailable,

    /// Two providers tried to supply a world for the same instance.
    #[error("instance world was already provided")]
    WorldAlreadySet,

    /// The directory has no loaded template for the given map.
    #[error("map template '{0}' is not loaded")]
    TemplateMissing(MapId),
}
