//! World containers: immutable loaded templates and live, shared-mutable
//! worlds.
//!
//! The ownership decision between "independent copy" and "shared view" is
//! made explicitly at provider construction time (see
//! [`CopyPolicy`](crate::provider::CopyPolicy)), never inferred from a code
//! path: [`WorldTemplate::instantiate`] and [`World::structural_copy`] give
//! independent state, [`World::share_view`] gives a handle onto the same
//! container whose writes every sharer observes.

use crate::error::MapLoadError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

/// Chunk coordinates within a world.
pub type ChunkPos = (i32, i32);

/// Opaque per-chunk payload. The core never interprets it; gameplay modules
/// and the engine bridge do.
pub type ChunkData = serde_json::Value;

/// The mutable contents of a world.
#[derive(Debug, Clone, Default)]
pub struct WorldState {
    chunks: HashMap<ChunkPos, ChunkData>,
}

impl WorldState {
    pub fn insert_chunk(&mut self, pos: ChunkPos, data: ChunkData) {
        self.chunks.insert(pos, data);
    }

    pub fn chunk(&self, pos: ChunkPos) -> Option<&ChunkData> {
        self.chunks.get(&pos)
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }
}

/// On-disk map file layout: one `map.json` per map folder.
#[derive(Debug, Serialize, Deserialize)]
struct MapFile {
    name: String,
    #[serde(default)]
    chunks: Vec<MapChunk>,
}

#[derive(Debug, Serialize, Deserialize)]
struct MapChunk {
    x: i32,
    z: i32,
    data: ChunkData,
}

/// An immutable, loaded map: the reusable unit cached by the
/// [`InstanceDirectory`](crate::InstanceDirectory).
///
/// Templates are never mutated. Instances that need a mutable world call
/// [`instantiate`](Self::instantiate) for an independent structural copy.
#[derive(Debug)]
pub struct WorldTemplate {
    name: String,
    state: WorldState,
}

impl WorldTemplate {
    pub fn new(name: impl Into<String>, state: WorldState) -> Self {
        Self {
            name: name.into(),
            state,
        }
    }

    /// Reads a map from `<dir>/map.json`.
    ///
    /// This is the expensive disk load the directory deduplicates; callers
    /// go through [`InstanceDirectory::get_or_load`] rather than calling
    /// this directly.
    ///
    /// [`InstanceDirectory::get_or_load`]: crate::InstanceDirectory::get_or_load
    pub async fn load_from_dir(dir: &Path) -> Result<Self, MapLoadError> {
        let file = dir.join("map.json");
        debug!("loading map template from {}", file.display());
        let raw = tokio::fs::read(&file).await?;
        let parsed: MapFile = serde_json::from_slice(&raw)
            .map_err(|e| MapLoadError::Corrupt(format!("{}: {}", file.display(), e)))?;

        let mut state = WorldState::default();
        for chunk in parsed.chunks {
            state.insert_chunk((chunk.x, chunk.z), chunk.data);
        }
        info!(
            "loaded map template '{}' ({} chunks)",
            parsed.name,
            state.chunk_count()
        );
        Ok(Self::new(parsed.name, state))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn chunk_count(&self) -> usize {
        self.state.chunk_count()
    }

    /// Produces an independent, mutable structural copy of this template.
    /// Mutating the result never affects the template or other copies.
    pub fn instantiate(&self) -> World {
        World::from_state(self.state.clone())
    }
}

/// A live, playable world container.
///
/// Cloning (or [`share_view`](Self::share_view)) yields another handle onto
/// the SAME container: writes through any handle are visible to every
/// sharer. Use [`structural_copy`](Self::structural_copy) for independent
/// state.
#[derive(Debug, Clone)]
pub struct World {
    id: Uuid,
    state: Arc<RwLock<WorldState>>,
}

impl World {
    pub fn from_state(state: WorldState) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: Arc::new(RwLock::new(state)),
        }
    }

    pub fn empty() -> Self {
        Self::from_state(WorldState::default())
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// A shared view onto this container. Writes through the view are
    /// visible to all sharers — callers choose this deliberately (e.g. many
    /// lobby instances rendering the same static geography).
    pub fn share_view(&self) -> World {
        self.clone()
    }

    /// An independent deep copy of the current state.
    pub async fn structural_copy(&self) -> World {
        World::from_state(self.state.read().await.clone())
    }

    /// Whether two handles point at the same underlying container.
    pub fn same_container(&self, other: &World) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }

    pub async fn put_chunk(&self, pos: ChunkPos, data: ChunkData) {
        self.state.write().await.insert_chunk(pos, data);
    }

    pub async fn chunk(&self, pos: ChunkPos) -> Option<ChunkData> {
        self.state.read().await.chunk(pos).cloned()
    }

    pub async fn chunk_count(&self) -> usize {
        self.state.read().await.chunk_count()
    }

    /// Ensures chunks exist in a square of the given radius around spawn.
    /// Used by instances configured with `preload_spawn_chunks`.
    pub async fn preload_spawn(&self, radius: i32) {
        let mut state = self.state.write().await;
        for x in -radius..=radius {
            for z in -radius..=radius {
                if state.chunk((x, z)).is_none() {
                    state.insert_chunk((x, z), ChunkData::Null);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn structural_copy_is_independent() {
        let world = World::empty();
        world.put_chunk((0, 0), json!({"blocks": [1, 2, 3]})).await;

        let copy = world.structural_copy().await;
        copy.put_chunk((1, 1), json!({"blocks": []})).await;

        assert_eq!(world.chunk_count().await, 1);
        assert_eq!(copy.chunk_count().await, 2);
        assert!(!world.same_container(&copy));
    }

    #[tokio::test]
    async fn shared_view_observes_writes() {
        let world = World::empty();
        let view = world.share_view();
        view.put_chunk((3, -2), json!("payload")).await;

        assert!(world.same_container(&view));
        assert_eq!(world.chunk((3, -2)).await, Some(json!("payload")));
    }

    #[tokio::test]
    async fn template_instantiation_copies_state() {
        let mut state = WorldState::default();
        state.insert_chunk((0, 0), json!(1));
        let template = WorldTemplate::new("castle", state);

        let a = template.instantiate();
        let b = template.instantiate();
        a.put_chunk((9, 9), json!(2)).await;

        assert_eq!(a.chunk_count().await, 2);
        assert_eq!(b.chunk_count().await, 1);
        assert!(!a.same_container(&b));
    }

    #[tokio::test]
    async fn preload_spawn_fills_missing_chunks() {
        let world = World::empty();
        world.put_chunk((0, 0), json!("spawn")).await;
        world.preload_spawn(1).await;

        assert_eq!(world.chunk_count().await, 9);
        // An existing chunk is not overwritten.
        assert_eq!(world.chunk((0, 0)).await, Some(json!("spawn")));
    }

    #[tokio::test]
    async fn load_from_missing_dir_is_io_error() {
        let err = WorldTemplate::load_from_dir(Path::new("/nonexistent/map"))
            .await
            .unwrap_err();
        assert!(matches!(err, MapLoadError::Io(_)));
    }
}
