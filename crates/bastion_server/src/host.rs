//! Ownership and fleet-facing bookkeeping of running game instances.

use crate::context::ServicesContext;
use crate::modules::ChatScopeModule;
use bastion_core::{
    FileWorldProvider, GameError, GameInstance, GamePhase, InstanceConfig, InstanceId,
};
use dashmap::DashMap;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Owns every [`GameInstance`] running in this process.
///
/// The host is the only place instances are tracked by id: it spawns them
/// (assembling modules, bringing them to `Ready`), looks them up for the
/// engine bridge, answers `list_instances` RPCs from other containers, and
/// tears everything down on shutdown. Instances that removed themselves
/// (auto-removal on last player leaving) stay in the table until the next
/// sweep but report as destroyed.
pub struct InstanceHost {
    context: ServicesContext,
    maps_root: PathBuf,
    instances: DashMap<InstanceId, Arc<GameInstance>>,
}

impl InstanceHost {
    pub fn new(context: ServicesContext, maps_root: impl Into<PathBuf>) -> Arc<Self> {
        Arc::new(Self {
            context,
            maps_root: maps_root.into(),
            instances: DashMap::new(),
        })
    }

    pub fn context(&self) -> &ServicesContext {
        &self.context
    }

    /// Spawns an instance: construct, let `assemble` attach its modules, and
    /// bring it to `Ready`. On assembly or startup failure nothing is
    /// registered.
    pub async fn spawn<F>(
        &self,
        config: InstanceConfig,
        assemble: F,
    ) -> Result<Arc<GameInstance>, GameError>
    where
        F: FnOnce(&Arc<GameInstance>) -> Result<(), GameError>,
    {
        let game = GameInstance::new(
            config,
            &self.context.events,
            self.context.messaging.clone(),
        );
        assemble(&game)?;
        game.ready().await?;
        self.instances.insert(game.id(), Arc::clone(&game));
        info!(
            "host now running {} instance(s) after spawning '{}'",
            self.instance_count(),
            game.name()
        );
        Ok(game)
    }

    /// Spawns an instance on a file-backed map under the configured maps
    /// root, with chat scoping attached. The common case for minigame
    /// rounds.
    pub async fn spawn_on_map(
        &self,
        name: impl Into<String>,
        game_type: impl Into<String>,
        map_name: &str,
    ) -> Result<Arc<GameInstance>, GameError> {
        let config = InstanceConfig {
            name: name.into(),
            game_type: game_type.into(),
            map_id: Some(map_name.into()),
            ..Default::default()
        };
        let map_path = self.maps_root.join(map_name);
        let directory = Arc::clone(&self.context.directory);
        self.spawn(config, move |game| {
            game.attach(FileWorldProvider::new(map_name, map_path, directory))?;
            game.attach(ChatScopeModule)?;
            Ok(())
        })
        .await
    }

    pub fn get(&self, id: InstanceId) -> Option<Arc<GameInstance>> {
        self.instances.get(&id).map(|entry| Arc::clone(&entry))
    }

    /// Number of live (non-destroyed) instances.
    pub fn instance_count(&self) -> usize {
        self.instances
            .iter()
            .filter(|entry| entry.phase() != GamePhase::Destroyed)
            .count()
    }

    /// Shuts down and forgets one instance. Returns false for unknown ids.
    pub async fn remove(&self, id: InstanceId) -> Result<bool, GameError> {
        let Some((_, game)) = self.instances.remove(&id) else {
            return Ok(false);
        };
        game.shutdown().await?;
        Ok(true)
    }

    /// Drops table entries for instances that already destroyed themselves.
    pub fn sweep(&self) {
        self.instances
            .retain(|_, game| game.phase() != GamePhase::Destroyed);
    }

    /// Tears down every remaining instance, in no particular order. Errors
    /// are logged and do not stop the teardown of other instances.
    pub async fn shutdown_all(&self) {
        let games: Vec<Arc<GameInstance>> = self
            .instances
            .iter()
            .map(|entry| Arc::clone(&entry))
            .collect();
        self.instances.clear();
        for game in games {
            if game.phase() == GamePhase::Destroyed {
                continue;
            }
            if let Err(e) = game.shutdown().await {
                warn!("failed to shut down instance {}: {}", game.id(), e);
            }
        }
        info!("all instances shut down");
    }

    /// Registers the fleet RPCs this host answers. Currently only
    /// `list_instances`, used by lobby containers to route players.
    pub fn register_rpc(self: &Arc<Self>) {
        let Some(bus) = &self.context.messaging else {
            return;
        };
        let host = Arc::clone(self);
        bus.subscribe_rpc("list_instances", move |_payload| {
            Ok(host.describe_instances())
        });
    }

    fn describe_instances(&self) -> Value {
        let instances: Vec<Value> = self
            .instances
            .iter()
            .filter(|entry| entry.phase() == GamePhase::Ready)
            .map(|entry| {
                json!({
                    "id": entry.id().to_string(),
                    "name": entry.name(),
                    "game_type": entry.game_type(),
                    "map": entry.map_id().map(|m| m.to_string()),
                    "players": entry.player_count(),
                })
            })
            .collect();
        json!({ "instances": instances })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bastion_core::{DimensionSpec, GeneratedWorldProvider, PlayerId, WorldState};
    use bastion_messaging::{BrokerLink, LocalBroker, MessagingBus};
    use serde_json::json;
    use std::time::Duration;

    fn flat_lobby() -> GeneratedWorldProvider {
        GeneratedWorldProvider::new(
            DimensionSpec {
                name: "lobby".to_string(),
                seed: 0,
            },
            |_spec| {
                let mut state = WorldState::default();
                state.insert_chunk((0, 0), json!({"flat": true}));
                state
            },
        )
    }

    fn write_map(root: &std::path::Path, name: &str) {
        let dir = root.join(name);
        std::fs::create_dir_all(&dir).unwrap();
        let map = json!({"name": name, "chunks": [{"x": 0, "z": 0, "data": 1}]});
        std::fs::write(dir.join("map.json"), serde_json::to_vec(&map).unwrap()).unwrap();
    }

    #[tokio::test]
    async fn spawn_and_remove_round_trip() {
        let host = InstanceHost::new(ServicesContext::local(), "maps");

        let game = host
            .spawn(InstanceConfig::default(), |game| {
                game.attach(flat_lobby())?;
                Ok(())
            })
            .await
            .unwrap();
        assert_eq!(host.instance_count(), 1);
        assert!(host.get(game.id()).is_some());

        assert!(host.remove(game.id()).await.unwrap());
        assert_eq!(host.instance_count(), 0);
        assert!(!host.remove(game.id()).await.unwrap());
    }

    #[tokio::test]
    async fn spawn_on_map_loads_through_the_shared_directory() {
        let maps = tempfile::tempdir().unwrap();
        write_map(maps.path(), "castle");
        let context = ServicesContext::local();
        let host = InstanceHost::new(context.clone(), maps.path());

        let a = host.spawn_on_map("round-1", "bedwars", "castle").await.unwrap();
        let b = host.spawn_on_map("round-2", "bedwars", "castle").await.unwrap();
        assert_eq!(context.directory.len(), 1);

        let world_a = a.world().unwrap();
        let world_b = b.world().unwrap();
        assert!(!world_a.same_container(&world_b));

        host.shutdown_all().await;
        assert!(context.directory.is_empty());
    }

    #[tokio::test]
    async fn spawn_failure_registers_nothing() {
        let host = InstanceHost::new(ServicesContext::local(), "maps");

        // No such map on disk: the provider's load fails during ready().
        let result = host
            .spawn_on_map("doomed", "bedwars", "missing_map")
            .await;
        assert!(result.is_err());
        assert_eq!(host.instance_count(), 0);
    }

    #[tokio::test]
    async fn sweep_forgets_self_removed_instances() {
        let host = InstanceHost::new(ServicesContext::local(), "maps");
        let game = host
            .spawn(InstanceConfig::default(), |game| {
                game.attach(flat_lobby())?;
                Ok(())
            })
            .await
            .unwrap();

        let player = PlayerId::new();
        game.add_player(player).unwrap();
        assert!(game.remove_player(player).await.unwrap());

        assert_eq!(host.instance_count(), 0);
        host.sweep();
        assert!(host.get(game.id()).is_none());
    }

    #[tokio::test]
    async fn list_instances_rpc_describes_ready_instances() {
        let broker = LocalBroker::new();
        let bus = MessagingBus::new("host", broker.link() as Arc<dyn BrokerLink>);
        bus.start();
        let caller = MessagingBus::new("caller", broker.link() as Arc<dyn BrokerLink>);
        caller.start();

        let context = ServicesContext::new(
            bastion_event_system::EventBus::new_root(),
            Arc::new(bastion_core::InstanceDirectory::new()),
            Some(Arc::clone(&bus)),
        );
        let host = InstanceHost::new(context, "maps");
        host.register_rpc();

        host.spawn(
            InstanceConfig {
                name: "lobby".to_string(),
                game_type: "lobby".to_string(),
                auto_remove: false,
                ..Default::default()
            },
            |game| {
                game.attach(flat_lobby())?;
                Ok(())
            },
        )
        .await
        .unwrap();

        let reply = caller
            .request("list_instances", json!({}), Duration::from_secs(1))
            .await
            .unwrap();
        let instances = reply["instances"].as_array().unwrap();
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0]["game_type"], "lobby");
    }
}
