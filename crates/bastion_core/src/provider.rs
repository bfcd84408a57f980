//! World provider modules: file-backed, shared-view, and generated.
//!
//! A provider is an ordinary [`GameModule`] whose `initialize` populates the
//! instance's world handle. By convention the provider is registered FIRST
//! in the module list so every later module can call
//! [`GameInstance::world`] during its own `initialize`; this is a documented
//! convention, not a runtime-enforced invariant (`ready()` logs a warning
//! when it is violated).

use crate::directory::InstanceDirectory;
use crate::error::GameError;
use crate::game::GameInstance;
use crate::module::GameModule;
use crate::types::MapId;
use crate::world::{World, WorldState, WorldTemplate};
use async_trait::async_trait;
use bastion_event_system::EventBus;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use tracing::debug;

/// Typed access to the world a provider produced, for modules that hold a
/// provider handle rather than going through [`GameInstance::world`].
pub trait WorldProvider: GameModule {
    /// The world this provider produced during `initialize`.
    fn world(&self) -> Result<World, GameError>;
}

/// Ownership decision for file-backed worlds, made at construction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyPolicy {
    /// Independent structural copy of the template: mutations stay private
    /// to this instance. The default, and what minigame rounds want.
    StructuralCopy,
    /// Reuse the directory's shared world for this template (identity
    /// equality with every other sharer). Writes are visible to all
    /// instances that chose this policy — callers must want that.
    SharedTemplate,
}

/// Loads world data from a map folder, deduplicated process-wide through the
/// [`InstanceDirectory`]: the first instance for a given map id performs the
/// disk load, later instances reuse the cached template.
pub struct FileWorldProvider {
    map_id: MapId,
    path: PathBuf,
    directory: Arc<InstanceDirectory>,
    copy: CopyPolicy,
    slot: OnceLock<World>,
}

impl FileWorldProvider {
    pub fn new(
        map_id: impl Into<MapId>,
        path: impl Into<PathBuf>,
        directory: Arc<InstanceDirectory>,
    ) -> Self {
        Self {
            map_id: map_id.into(),
            path: path.into(),
            directory,
            copy: CopyPolicy::StructuralCopy,
            slot: OnceLock::new(),
        }
    }

    pub fn with_policy(mut self, copy: CopyPolicy) -> Self {
        self.copy = copy;
        self
    }
}

#[async_trait]
impl GameModule for FileWorldProvider {
    fn name(&self) -> &'static str {
        "file_world_provider"
    }

    fn provides_world(&self) -> bool {
        true
    }

    async fn initialize(
        &self,
        game: &Arc<GameInstance>,
        _events: &Arc<EventBus>,
    ) -> Result<(), GameError> {
        let map_path = self.path.clone();
        let (template, lease) = self
            .directory
            .get_or_load(&self.map_id, game.id(), move || async move {
                WorldTemplate::load_from_dir(&map_path).await
            })
            .await?;
        game.attach_lease(lease);

        let world = match self.copy {
            CopyPolicy::StructuralCopy => template.instantiate(),
            CopyPolicy::SharedTemplate => self.directory.shared_world(&self.map_id).await?,
        };
        debug!(
            "instance {} using map '{}' ({:?})",
            game.id(),
            self.map_id,
            self.copy
        );
        let _ = self.slot.set(world.clone());
        game.set_world(world)
    }
}

impl WorldProvider for FileWorldProvider {
    fn world(&self) -> Result<World, GameError> {
        self.slot.get().cloned().ok_or(GameError::WorldUnavailable)
    }
}

/// Wraps another instance's world as a shared view: many instances rendering
/// the same geography, with writes visible to all of them. No directory
/// entry is involved.
pub struct SharedWorldProvider {
    source: World,
    slot: OnceLock<World>,
}

impl SharedWorldProvider {
    /// `source` is typically `other_game.world()?`.
    pub fn new(source: World) -> Self {
        Self {
            source,
            slot: OnceLock::new(),
        }
    }
}

#[async_trait]
impl GameModule for SharedWorldProvider {
    fn name(&self) -> &'static str {
        "shared_world_provider"
    }

    fn provides_world(&self) -> bool {
        true
    }

    async fn initialize(
        &self,
        game: &Arc<GameInstance>,
        _events: &Arc<EventBus>,
    ) -> Result<(), GameError> {
        let world = self.source.share_view();
        let _ = self.slot.set(world.clone());
        game.set_world(world)
    }
}

impl WorldProvider for SharedWorldProvider {
    fn world(&self) -> Result<World, GameError> {
        self.slot.get().cloned().ok_or(GameError::WorldUnavailable)
    }
}

/// Descriptor handed to procedural generators.
#[derive(Debug, Clone)]
pub struct DimensionSpec {
    pub name: String,
    pub seed: u64,
}

type Generator = Box<dyn Fn(&DimensionSpec) -> WorldState + Send + Sync>;

/// Generates a world procedurally, per instance. Generated worlds are never
/// cached in the [`InstanceDirectory`] — generation is per-instance by
/// nature, so there is nothing to share.
pub struct GeneratedWorldProvider {
    dimension: DimensionSpec,
    generator: Generator,
    slot: OnceLock<World>,
}

impl GeneratedWorldProvider {
    pub fn new(
        dimension: DimensionSpec,
        generator: impl Fn(&DimensionSpec) -> WorldState + Send + Sync + 'static,
    ) -> Self {
        Self {
            dimension,
            generator: Box::new(generator),
            slot: OnceLock::new(),
        }
    }
}

#[async_trait]
impl GameModule for GeneratedWorldProvider {
    fn name(&self) -> &'static str {
        "generated_world_provider"
    }

    fn provides_world(&self) -> bool {
        true
    }

    async fn initialize(
        &self,
        game: &Arc<GameInstance>,
        _events: &Arc<EventBus>,
    ) -> Result<(), GameError> {
        debug!(
            "generating dimension '{}' (seed {}) for instance {}",
            self.dimension.name,
            self.dimension.seed,
            game.id()
        );
        let state = (self.generator)(&self.dimension);
        let world = World::from_state(state);
        let _ = self.slot.set(world.clone());
        game.set_world(world)
    }
}

impl WorldProvider for GeneratedWorldProvider {
    fn world(&self) -> Result<World, GameError> {
        self.slot.get().cloned().ok_or(GameError::WorldUnavailable)
    }
}
