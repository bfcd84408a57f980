//! Process-wide registry of loaded map templates.
//!
//! Loading a map is expensive I/O, so the directory guarantees at most one
//! load per map identifier even under concurrent requests: later callers
//! await the in-flight load instead of duplicating it. Entries are
//! reference-counted by the instances using them and evicted when the last
//! lease is released. Leases release on Drop, so an instance destroyed on a
//! crash path still returns its reference.

use crate::error::GameError;
use crate::types::{InstanceId, MapId};
use crate::world::{World, WorldTemplate};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::error::MapLoadError;

struct MapSlot {
    template: OnceCell<Arc<WorldTemplate>>,
    /// Shared world handed out under `CopyPolicy::SharedTemplate`; created
    /// lazily, once per entry.
    shared: OnceCell<World>,
    refs: Mutex<HashSet<InstanceId>>,
}

impl MapSlot {
    fn new() -> Self {
        Self {
            template: OnceCell::new(),
            shared: OnceCell::new(),
            refs: Mutex::new(HashSet::new()),
        }
    }
}

/// Registry mapping map identifiers to loaded, reusable world templates.
///
/// The slot map is the only state shared across game instances; all
/// mutation goes through one mutex, with the expensive loader running
/// outside it behind a per-slot `OnceCell`.
pub struct InstanceDirectory {
    slots: Mutex<HashMap<MapId, Arc<MapSlot>>>,
}

impl std::fmt::Debug for InstanceDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceDirectory")
            .field("entries", &self.len())
            .finish()
    }
}

impl Default for InstanceDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl InstanceDirectory {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the loaded template for `map_id`, invoking `loader` only if
    /// no load has succeeded yet, together with a [`MapLease`] registering
    /// `instance` as a referent.
    ///
    /// Concurrent callers for the same map observe exactly one successful
    /// loader invocation and the same template. On failure the error
    /// propagates and the directory is left without a half-populated entry
    /// (the slot is evicted once its last pending lease is dropped — which
    /// the error path below does immediately for this caller).
    pub async fn get_or_load<F, Fut>(
        self: &Arc<Self>,
        map_id: &MapId,
        instance: InstanceId,
        loader: F,
    ) -> Result<(Arc<WorldTemplate>, MapLease), GameError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<WorldTemplate, MapLoadError>>,
    {
        // Register the reference before awaiting the load so a concurrent
        // release of some other instance cannot evict the slot under us.
        let slot = {
            let mut slots = self.slots.lock().expect("slot map poisoned");
            let slot = slots
                .entry(map_id.clone())
                .or_insert_with(|| Arc::new(MapSlot::new()))
                .clone();
            slot.refs
                .lock()
                .expect("ref set poisoned")
                .insert(instance);
            slot
        };
        let lease = MapLease {
            directory: Arc::clone(self),
            map_id: map_id.clone(),
            instance,
            released: AtomicBool::new(false),
        };

        match slot
            .template
            .get_or_try_init(|| async { loader().await.map(Arc::new) })
            .await
        {
            Ok(template) => {
                debug!(
                    "instance {} leased map template '{}'",
                    instance, map_id
                );
                Ok((Arc::clone(template), lease))
            }
            Err(e) => {
                warn!("map load for '{}' failed: {}", map_id, e);
                lease.release();
                Err(GameError::MapLoad(e))
            }
        }
    }

    /// The shared world for an already-loaded template, instantiated once
    /// per directory entry. Later callers get a view onto the same
    /// container (identity equality), so mutations are visible to every
    /// instance that chose `CopyPolicy::SharedTemplate`.
    pub async fn shared_world(&self, map_id: &MapId) -> Result<World, GameError> {
        let slot = {
            let slots = self.slots.lock().expect("slot map poisoned");
            slots
                .get(map_id)
                .cloned()
                .ok_or_else(|| GameError::TemplateMissing(map_id.clone()))?
        };
        let template = slot
            .template
            .get()
            .cloned()
            .ok_or_else(|| GameError::TemplateMissing(map_id.clone()))?;
        let world = slot
            .shared
            .get_or_init(|| async move { template.instantiate() })
            .await;
        Ok(world.share_view())
    }

    /// Removes `instance` from the entry's reference set; evicts the entry
    /// when the set becomes empty. Returns true if the entry was evicted.
    /// Normally invoked through [`MapLease`], not directly.
    pub fn release(&self, map_id: &MapId, instance: InstanceId) -> bool {
        let mut slots = self.slots.lock().expect("slot map poisoned");
        let Some(slot) = slots.get(map_id) else {
            return false;
        };
        let now_empty = {
            let mut refs = slot.refs.lock().expect("ref set poisoned");
            refs.remove(&instance);
            refs.is_empty()
        };
        if now_empty {
            slots.remove(map_id);
            info!("evicted map template '{}' (last reference released)", map_id);
            true
        } else {
            false
        }
    }

    /// Whether a template (or in-flight load) exists for `map_id`.
    pub fn contains(&self, map_id: &MapId) -> bool {
        self.slots
            .lock()
            .expect("slot map poisoned")
            .contains_key(map_id)
    }

    /// Number of directory entries, loaded or loading.
    pub fn len(&self) -> usize {
        self.slots.lock().expect("slot map poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Guard tying one instance's reference on a map entry to a value with
/// guaranteed cleanup: release happens on [`release`](Self::release) or on
/// Drop, whichever comes first, and exactly once.
pub struct MapLease {
    directory: Arc<InstanceDirectory>,
    map_id: MapId,
    instance: InstanceId,
    released: AtomicBool,
}

impl MapLease {
    pub fn map_id(&self) -> &MapId {
        &self.map_id
    }

    /// Releases the reference now instead of at Drop.
    pub fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        self.directory.release(&self.map_id, self.instance);
    }
}

impl Drop for MapLease {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for MapLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapLease")
            .field("map_id", &self.map_id)
            .field("instance", &self.instance)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::WorldState;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn template(name: &str) -> WorldTemplate {
        let mut state = WorldState::default();
        state.insert_chunk((0, 0), json!({"fill": name}));
        WorldTemplate::new(name, state)
    }

    #[tokio::test]
    async fn concurrent_loads_invoke_loader_once() {
        let directory = Arc::new(InstanceDirectory::new());
        let loads = Arc::new(AtomicUsize::new(0));
        let map: MapId = "arenas/castle".into();

        let dir_a = Arc::clone(&directory);
        let dir_b = Arc::clone(&directory);
        let loads_a = Arc::clone(&loads);
        let loads_b = Arc::clone(&loads);
        let map_a = map.clone();
        let map_b = map.clone();

        let (a, b) = tokio::join!(
            dir_a.get_or_load(&map_a, InstanceId::new(), || async {
                loads_a.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                Ok(template("castle"))
            }),
            dir_b.get_or_load(&map_b, InstanceId::new(), || async {
                loads_b.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                Ok(template("castle"))
            }),
        );

        let (template_a, _lease_a) = a.unwrap();
        let (template_b, _lease_b) = b.unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&template_a, &template_b));
    }

    #[tokio::test]
    async fn last_release_evicts_entry() {
        let directory = Arc::new(InstanceDirectory::new());
        let map: MapId = "arenas/ruins".into();

        let (_t1, lease_one) = directory
            .get_or_load(&map, InstanceId::new(), || async { Ok(template("ruins")) })
            .await
            .unwrap();
        let (_t2, lease_two) = directory
            .get_or_load(&map, InstanceId::new(), || async {
                panic!("template already loaded, loader must not run")
            })
            .await
            .unwrap();

        lease_one.release();
        assert!(directory.contains(&map), "non-last release must not evict");

        lease_two.release();
        assert!(!directory.contains(&map), "last release must evict");
    }

    #[tokio::test]
    async fn lease_drop_releases_reference() {
        let directory = Arc::new(InstanceDirectory::new());
        let map: MapId = "arenas/keep".into();

        {
            let (_template, _lease) = directory
                .get_or_load(&map, InstanceId::new(), || async { Ok(template("keep")) })
                .await
                .unwrap();
            assert!(directory.contains(&map));
        }
        assert!(
            !directory.contains(&map),
            "dropping the last lease must evict"
        );
    }

    #[tokio::test]
    async fn failed_load_leaves_directory_clean() {
        let directory = Arc::new(InstanceDirectory::new());
        let map: MapId = "arenas/broken".into();

        let result = directory
            .get_or_load(&map, InstanceId::new(), || async {
                Err(MapLoadError::Corrupt("truncated chunk table".to_string()))
            })
            .await;
        assert!(matches!(result, Err(GameError::MapLoad(_))));
        assert!(!directory.contains(&map));

        // A later load of the same map may succeed normally.
        let retry = directory
            .get_or_load(&map, InstanceId::new(), || async { Ok(template("fixed")) })
            .await;
        assert!(retry.is_ok());
    }

    #[tokio::test]
    async fn shared_world_is_one_container_per_entry() {
        let directory = Arc::new(InstanceDirectory::new());
        let map: MapId = "lobby/main".into();

        let (_t, _lease) = directory
            .get_or_load(&map, InstanceId::new(), || async { Ok(template("lobby")) })
            .await
            .unwrap();

        let a = directory.shared_world(&map).await.unwrap();
        let b = directory.shared_world(&map).await.unwrap();
        assert!(a.same_container(&b));

        a.put_chunk((5, 5), json!("fountain")).await;
        assert_eq!(b.chunk((5, 5)).await, Some(json!("fountain")));
    }

    #[tokio::test]
    async fn shared_world_requires_loaded_template() {
        let directory = Arc::new(InstanceDirectory::new());
        let err = directory
            .shared_world(&"never/loaded".into())
            .await
            .unwrap_err();
        assert!(matches!(err, GameError::TemplateMissing(_)));
    }
}
