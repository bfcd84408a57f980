//! # Bastion Core
//!
//! The composition engine of the Bastion minigame host. One long-lived
//! process runs many concurrent, isolated game rounds; each round is a
//! [`GameInstance`] assembled from independently authored [`GameModule`]s
//! (combat rules, scoring, spawning, chat scoping, map loading) that share a
//! strict, ordered lifecycle:
//!
//! ```text
//! Constructing → Initializing → Ready → Deinitializing → Destroyed
//! ```
//!
//! Modules are initialized strictly in registration order — later modules may
//! assume earlier modules' state exists — and torn down in that same order,
//! which keeps fleet-facing announcements (see `bastion_messaging`) in a
//! stable position relative to module teardown.
//!
//! Map data is shared through the process-wide [`InstanceDirectory`]: the
//! first instance to ask for a map path loads it, later instances reuse the
//! loaded template, and the entry is evicted when the last referencing
//! instance releases its [`MapLease`]. Worlds reach an instance through one
//! of three [`WorldProvider`] module variants: file-backed (through the
//! directory), shared view over another instance's world, or procedurally
//! generated.

pub mod directory;
pub mod error;
pub mod events;
pub mod game;
pub mod module;
pub mod provider;
pub mod types;
pub mod world;


pub use directory::{InstanceDirectory, MapLease};
pub use error::{GameError, MapLoadError};
pub use events::{ChatEvent, DeathEvent, GameStartEvent, PlayerJoinEvent, PlayerLeaveEvent};
pub use game::{GameInstance, InstanceConfig};
pub use module::GameModule;
pub use provider::{
    CopyPolicy, DimensionSpec, FileWorldProvider, GeneratedWorldProvider, SharedWorldProvider,
    WorldProvider,
};
pub use types::{current_timestamp, GamePhase, InstanceId, MapId, PlayerId};
pub use world::{World, WorldState, WorldTemplate};
