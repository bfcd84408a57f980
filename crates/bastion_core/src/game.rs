//! The game instance: an isolated, module-composed minigame round.

use crate::directory::MapLease;
use crate::error::GameError;
use crate::events::{GameStartEvent, PlayerJoinEvent, PlayerLeaveEvent};
use crate::module::GameModule;
use crate::types::{current_timestamp, GamePhase, InstanceId, MapId, PlayerId};
use crate::world::World;
use bastion_event_system::EventBus;
use bastion_messaging::{Message, MessagingBus};
use std::any::{Any, TypeId};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use tracing::{debug, error, info, warn};

/// Construction-time options for a [`GameInstance`].
#[derive(Debug, Clone)]
pub struct InstanceConfig {
    /// Display name used in logs and fleet announcements.
    pub name: String,
    /// Minigame type tag announced to the fleet (e.g. "bedwars", "lobby").
    pub game_type: String,
    /// Map this instance runs on, if any.
    pub map_id: Option<MapId>,
    /// Tear the instance down automatically when the last player leaves.
    pub auto_remove: bool,
    /// Preload chunks around spawn once the instance becomes ready.
    pub preload_spawn_chunks: bool,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            name: "game".to_string(),
            game_type: "unknown".to_string(),
            map_id: None,
            auto_remove: true,
            preload_spawn_chunks: false,
        }
    }
}

#[derive(Clone)]
struct ModuleSlot {
    type_id: TypeId,
    name: &'static str,
    module: Arc<dyn GameModule>,
}

/// One running round of a minigame.
///
/// Owns an ordered module list, a private event scope (child of the process
/// root bus), and the world its gameplay runs inside. The lifecycle is a
/// strict state machine; see [`GamePhase`]. Instances are always handled as
/// `Arc<GameInstance>` — modules receive the same `Arc` during
/// initialization and may keep weak references.
pub struct GameInstance {
    id: InstanceId,
    name: String,
    game_type: String,
    map_id: Option<MapId>,
    auto_remove: bool,
    preload_spawn_chunks: bool,
    events: Arc<EventBus>,
    messaging: Option<Arc<MessagingBus>>,
    phase: Mutex<GamePhase>,
    modules: Mutex<Vec<ModuleSlot>>,
    by_type: Mutex<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
    /// Number of modules whose `initialize` completed; bounds teardown.
    initialized: AtomicUsize,
    players: Mutex<HashSet<PlayerId>>,
    world: OnceLock<World>,
    lease: Mutex<Option<MapLease>>,
    removal_announced: AtomicBool,
}

impl std::fmt::Debug for GameInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameInstance")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("phase", &self.phase())
            .finish()
    }
}

impl GameInstance {
    /// Creates a new instance in the `Constructing` phase.
    ///
    /// The instance's event scope is created as a child of `parent_events`,
    /// so events fired inside this instance are visible to process-wide
    /// listeners but never to sibling instances. When a messaging bus is
    /// supplied, `InstanceCreated`/`InstanceRemoved` announcements are
    /// published on it.
    pub fn new(
        config: InstanceConfig,
        parent_events: &Arc<EventBus>,
        messaging: Option<Arc<MessagingBus>>,
    ) -> Arc<Self> {
        let id = InstanceId::new();
        let events = parent_events.child(format!("instance:{id}"));
        info!("created instance '{}' ({})", config.name, id);
        Arc::new(Self {
            id,
            name: config.name,
            game_type: config.game_type,
            map_id: config.map_id,
            auto_remove: config.auto_remove,
            preload_spawn_chunks: config.preload_spawn_chunks,
            events,
            messaging,
            phase: Mutex::new(GamePhase::Constructing),
            modules: Mutex::new(Vec::new()),
            by_type: Mutex::new(HashMap::new()),
            initialized: AtomicUsize::new(0),
            players: Mutex::new(HashSet::new()),
            world: OnceLock::new(),
            lease: Mutex::new(None),
            removal_announced: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn game_type(&self) -> &str {
        &self.game_type
    }

    pub fn map_id(&self) -> Option<&MapId> {
        self.map_id.as_ref()
    }

    /// The instance's private event scope.
    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> GamePhase {
        *self.phase.lock().expect("phase lock poisoned")
    }

    fn transition(&self, expected: GamePhase, next: GamePhase) -> Result<(), GameError> {
        let mut phase = self.phase.lock().expect("phase lock poisoned");
        if *phase != expected {
            return Err(GameError::LifecycleState {
                expected,
                actual: *phase,
            });
        }
        *phase = next;
        Ok(())
    }

    fn force_phase(&self, next: GamePhase) {
        *self.phase.lock().expect("phase lock poisoned") = next;
    }

    /// Attaches a module. Only valid while `Constructing`; attaching a second
    /// module of the same concrete type is fatal.
    ///
    /// Returns the shared handle under which the module was stored, which is
    /// also what later [`module`](Self::module) lookups return.
    pub fn attach<M: GameModule>(&self, module: M) -> Result<Arc<M>, GameError> {
        let phase = self.phase();
        if phase != GamePhase::Constructing {
            return Err(GameError::LifecycleState {
                expected: GamePhase::Constructing,
                actual: phase,
            });
        }

        let type_id = TypeId::of::<M>();
        let name = module.name();
        let mut by_type = self.by_type.lock().expect("module table poisoned");
        if by_type.contains_key(&type_id) {
            return Err(GameError::DuplicateModule(name));
        }

        let handle = Arc::new(module);
        by_type.insert(type_id, handle.clone() as Arc<dyn Any + Send + Sync>);
        self.modules
            .lock()
            .expect("module list poisoned")
            .push(ModuleSlot {
                type_id,
                name,
                module: handle.clone(),
            });
        debug!("attached module '{}' to instance '{}'", name, self.name);
        Ok(handle)
    }

    /// Looks up an attached module by its concrete type.
    ///
    /// Asking for a module that was never attached is a programming error
    /// (module dependencies are a registration-order contract) and fails
    /// loudly with [`GameError::ModuleLookup`].
    pub fn module<M: GameModule>(&self) -> Result<Arc<M>, GameError> {
        let by_type = self.by_type.lock().expect("module table poisoned");
        by_type
            .get(&TypeId::of::<M>())
            .cloned()
            .and_then(|handle| handle.downcast::<M>().ok())
            .ok_or_else(|| GameError::ModuleLookup(std::any::type_name::<M>()))
    }

    /// Names of the attached modules, in registration order.
    pub fn module_names(&self) -> Vec<&'static str> {
        self.modules
            .lock()
            .expect("module list poisoned")
            .iter()
            .map(|slot| slot.name)
            .collect()
    }

    /// Runs every module's `initialize` in registration order and brings the
    /// instance to `Ready`.
    ///
    /// Each initializer runs to completion before the next module starts. If
    /// any module fails, startup aborts: already-initialized modules are torn
    /// down (in registration order), the instance is destroyed, and the error
    /// is returned — no partially initialized instance is ever exposed to
    /// players. On success a [`GameStartEvent`] is fired once on the
    /// instance's event scope and `InstanceCreated` is announced to the
    /// fleet.
    pub async fn ready(self: &Arc<Self>) -> Result<(), GameError> {
        self.transition(GamePhase::Constructing, GamePhase::Initializing)?;

        let slots: Vec<ModuleSlot> = self.modules.lock().expect("module list poisoned").clone();
        match slots.first() {
            Some(first) if !first.module.provides_world() => {
                // Convention, not enforced: a non-provider first module means
                // later modules cannot rely on the world handle.
                warn!(
                    "instance '{}': first module '{}' is not a world provider",
                    self.name, first.name
                );
            }
            None => warn!("instance '{}' has no modules", self.name),
            _ => {}
        }

        for (index, slot) in slots.iter().enumerate() {
            debug!(
                "initializing module '{}' ({}/{}) on instance '{}'",
                slot.name,
                index + 1,
                slots.len(),
                self.name
            );
            if let Err(e) = slot.module.initialize(self, &self.events).await {
                error!(
                    "module '{}' failed to initialize on instance '{}': {}",
                    slot.name, self.name, e
                );
                self.abort_startup().await;
                return Err(e);
            }
            self.initialized.fetch_add(1, Ordering::SeqCst);
        }

        if self.preload_spawn_chunks {
            if let Ok(world) = self.world() {
                world.preload_spawn(2).await;
            }
        }

        self.transition(GamePhase::Initializing, GamePhase::Ready)?;

        let mut start = GameStartEvent {
            instance_id: self.id,
            timestamp: current_timestamp(),
        };
        self.events.fire(&mut start);
        self.announce_created().await;

        info!(
            "instance '{}' ({}) ready with {} modules",
            self.name,
            self.id,
            slots.len()
        );
        Ok(())
    }

    /// Tears the instance down.
    ///
    /// Module deinitializers run in the SAME order as initialization —
    /// reversing the order would move fleet announcements relative to module
    /// teardown and change observable messaging semantics. Exactly one
    /// `InstanceRemoved` is published and the map lease is released exactly
    /// once. Calling `shutdown` on an already-destroyed instance is a no-op.
    pub async fn shutdown(self: &Arc<Self>) -> Result<(), GameError> {
        {
            let mut phase = self.phase.lock().expect("phase lock poisoned");
            match *phase {
                GamePhase::Ready => *phase = GamePhase::Deinitializing,
                GamePhase::Deinitializing | GamePhase::Destroyed => return Ok(()),
                actual => {
                    return Err(GameError::LifecycleState {
                        expected: GamePhase::Ready,
                        actual,
                    })
                }
            }
        }

        self.deinitialize_modules().await;
        self.announce_removed().await;
        self.release_lease();
        self.force_phase(GamePhase::Destroyed);
        info!("instance '{}' ({}) destroyed", self.name, self.id);
        Ok(())
    }

    /// Startup failure path: tear down whatever prefix initialized, then
    /// destroy. No `InstanceCreated` was announced, so nothing is published.
    async fn abort_startup(self: &Arc<Self>) {
        self.force_phase(GamePhase::Deinitializing);
        self.deinitialize_modules().await;
        self.release_lease();
        self.force_phase(GamePhase::Destroyed);
        warn!("instance '{}' ({}) startup aborted", self.name, self.id);
    }

    async fn deinitialize_modules(self: &Arc<Self>) {
        let count = self.initialized.swap(0, Ordering::SeqCst);
        let slots: Vec<ModuleSlot> = self
            .modules
            .lock()
            .expect("module list poisoned")
            .iter()
            .take(count)
            .cloned()
            .collect();
        for slot in slots {
            debug!(
                "deinitializing module '{}' on instance '{}'",
                slot.name, self.name
            );
            if let Err(e) = slot.module.deinitialize(self).await {
                error!(
                    "module '{}' failed to deinitialize on instance '{}': {}",
                    slot.name, self.name, e
                );
            }
        }
    }

    async fn announce_created(&self) {
        let Some(bus) = &self.messaging else { return };
        let message = Message::InstanceCreated {
            container_id: bus.container_id().to_string(),
            instance_id: self.id.0,
            game_type: self.game_type.clone(),
            map_name: self
                .map_id
                .as_ref()
                .map(|m| m.to_string())
                .unwrap_or_default(),
        };
        if let Err(e) = bus.publish(message).await {
            warn!("failed to announce creation of instance {}: {}", self.id, e);
        }
    }

    async fn announce_removed(&self) {
        let Some(bus) = &self.messaging else { return };
        if self.removal_announced.swap(true, Ordering::SeqCst) {
            return;
        }
        let message = Message::InstanceRemoved {
            container_id: bus.container_id().to_string(),
            instance_id: self.id.0,
        };
        if let Err(e) = bus.publish(message).await {
            warn!("failed to announce removal of instance {}: {}", self.id, e);
        }
    }

    /// Stores the world handle supplied by a provider module. Called by the
    /// provider during its `initialize`; a second call is fatal.
    pub fn set_world(&self, world: World) -> Result<(), GameError> {
        self.world
            .set(world)
            .map_err(|_| GameError::WorldAlreadySet)
    }

    /// The world this instance runs inside. Available once the provider
    /// module (registered first, by convention) has initialized.
    pub fn world(&self) -> Result<World, GameError> {
        self.world.get().cloned().ok_or(GameError::WorldUnavailable)
    }

    /// Attaches the map-directory lease whose release is tied to this
    /// instance's teardown (including the crash path, via the lease's Drop).
    pub fn attach_lease(&self, lease: MapLease) {
        *self.lease.lock().expect("lease lock poisoned") = Some(lease);
    }

    fn release_lease(&self) {
        if let Some(lease) = self.lease.lock().expect("lease lock poisoned").take() {
            lease.release();
        }
    }

    /// Admits a player. Only ready instances accept players; anything else
    /// is a rejection the caller surfaces as a kick.
    pub fn add_player(&self, player: PlayerId) -> Result<(), GameError> {
        let phase = self.phase();
        if phase != GamePhase::Ready {
            return Err(GameError::LifecycleState {
                expected: GamePhase::Ready,
                actual: phase,
            });
        }
        self.players
            .lock()
            .expect("player set poisoned")
            .insert(player);
        let mut event = PlayerJoinEvent {
            instance_id: self.id,
            player_id: player,
            timestamp: current_timestamp(),
        };
        self.events.fire(&mut event);
        Ok(())
    }

    /// Removes a player. When the last player leaves and `auto_remove` is
    /// set, the instance tears itself down; returns true in that case.
    /// Removing a player who was never admitted is a no-op: no event fires
    /// and no teardown is triggered.
    pub async fn remove_player(self: &Arc<Self>, player: PlayerId) -> Result<bool, GameError> {
        let now_empty = {
            let mut players = self.players.lock().expect("player set poisoned");
            if !players.remove(&player) {
                return Ok(false);
            }
            players.is_empty()
        };
        let mut event = PlayerLeaveEvent {
            instance_id: self.id,
            player_id: player,
            timestamp: current_timestamp(),
        };
        self.events.fire(&mut event);

        if now_empty && self.auto_remove && self.phase() == GamePhase::Ready {
            info!(
                "last player left instance '{}' ({}), removing",
                self.name, self.id
            );
            self.shutdown().await?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Whether the given player is currently in this instance.
    pub fn has_player(&self, player: PlayerId) -> bool {
        self.players
            .lock()
            .expect("player set poisoned")
            .contains(&player)
    }

    /// Snapshot of the current player set.
    pub fn players(&self) -> HashSet<PlayerId> {
        self.players.lock().expect("player set poisoned").clone()
    }

    pub fn player_count(&self) -> usize {
        self.players.lock().expect("player set poisoned").len()
    }
}

impl std::fmt::Debug for ModuleSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleSlot")
            .field("name", &self.name)
            .field("type_id", &self.type_id)
            .finish()
    }
}
