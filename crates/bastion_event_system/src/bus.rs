//! Event bus nodes: listener registration and tree-scoped dispatch.

use crate::{Cancellable, Event, EventError};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{debug, error, trace};

/// Registration options for a single listener.
#[derive(Debug, Clone, Copy)]
pub struct ListenerOpts {
    /// Listeners run in ascending priority; equal priorities run in
    /// registration order.
    pub priority: i32,
    /// When true the listener still runs after the event was cancelled.
    pub ignore_cancelled: bool,
}

impl Default for ListenerOpts {
    fn default() -> Self {
        Self {
            priority: 0,
            ignore_cancelled: false,
        }
    }
}

/// A registered listener, type-erased over its event type.
struct ListenerEntry {
    priority: i32,
    seq: u64,
    ignore_cancelled: bool,
    name: String,
    callback: Box<dyn Fn(&mut dyn Any) -> Result<(), EventError> + Send + Sync>,
}

/// Snapshot of a node's dispatch counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BusStats {
    /// Listeners registered on this node (descendants not included).
    pub listeners: u64,
    /// Events fired on this node (events fired on descendants not included).
    pub events_fired: u64,
    /// Listener invocations on this node that errored or panicked.
    pub listener_failures: u64,
}

/// One node in the event dispatch tree.
///
/// Nodes are created with [`EventBus::new_root`] and scoped further with
/// [`EventBus::child`]. Firing an event on a node dispatches to the node's
/// own listeners first, then walks up through each ancestor, so a listener on
/// the root observes every instance's events while a listener on an instance
/// node observes only that instance's subtree.
pub struct EventBus {
    scope: String,
    parent: Option<Arc<EventBus>>,
    listeners: RwLock<HashMap<TypeId, Vec<Arc<ListenerEntry>>>>,
    next_seq: AtomicU64,
    events_fired: AtomicU64,
    listener_failures: AtomicU64,
    listener_count: AtomicU64,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("scope", &self.scope)
            .field("has_parent", &self.parent.is_some())
            .finish()
    }
}

impl EventBus {
    /// Creates the root node of a dispatch tree.
    pub fn new_root() -> Arc<Self> {
        Arc::new(Self {
            scope: "root".to_string(),
            parent: None,
            listeners: RwLock::new(HashMap::new()),
            next_seq: AtomicU64::new(0),
            events_fired: AtomicU64::new(0),
            listener_failures: AtomicU64::new(0),
            listener_count: AtomicU64::new(0),
        })
    }

    /// Creates a child node scoped under this one.
    ///
    /// Events fired on the child propagate to this node and its ancestors;
    /// events fired here are invisible to the child's own listeners.
    pub fn child(self: &Arc<Self>, scope: impl Into<String>) -> Arc<Self> {
        let scope = scope.into();
        debug!("creating event scope '{}' under '{}'", scope, self.scope);
        Arc::new(Self {
            scope,
            parent: Some(Arc::clone(self)),
            listeners: RwLock::new(HashMap::new()),
            next_seq: AtomicU64::new(0),
            events_fired: AtomicU64::new(0),
            listener_failures: AtomicU64::new(0),
            listener_count: AtomicU64::new(0),
        })
    }

    /// The name of this dispatch scope, used in logs.
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Registers a listener for events of type `E` with default cancellation
    /// behavior (skipped once the event is cancelled).
    pub fn on<E, F>(&self, priority: i32, handler: F)
    where
        E: Event,
        F: Fn(&mut E) -> Result<(), EventError> + Send + Sync + 'static,
    {
        self.on_with(
            ListenerOpts {
                priority,
                ignore_cancelled: false,
            },
            handler,
        );
    }

    /// Registers a listener with explicit [`ListenerOpts`].
    pub fn on_with<E, F>(&self, opts: ListenerOpts, handler: F)
    where
        E: Event,
        F: Fn(&mut E) -> Result<(), EventError> + Send + Sync + 'static,
    {
        let name = format!("{}::{}", self.scope, std::any::type_name::<E>());
        let callback = Box::new(move |any: &mut dyn Any| {
            let event = any.downcast_mut::<E>().ok_or(EventError::TypeMismatch)?;
            handler(event)
        });
        let entry = Arc::new(ListenerEntry {
            priority: opts.priority,
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
            ignore_cancelled: opts.ignore_cancelled,
            name,
            callback,
        });

        let mut listeners = self.listeners.write().expect("listener table poisoned");
        let slot = listeners.entry(TypeId::of::<E>()).or_default();
        // Keep the slot sorted so dispatch never has to.
        let at = slot
            .binary_search_by(|e| {
                (e.priority, e.seq).cmp(&(entry.priority, entry.seq))
            })
            .unwrap_or_else(|i| i);
        slot.insert(at, Arc::clone(&entry));
        self.listener_count.fetch_add(1, Ordering::Relaxed);

        debug!(
            "registered listener {} (priority {})",
            entry.name, entry.priority
        );
    }

    /// Fires a non-cancellable event.
    ///
    /// Dispatch is synchronous: every listener on this node and its ancestors
    /// has run by the time this returns. Listener errors and panics are
    /// logged and swallowed.
    pub fn fire<E: Event>(&self, event: &mut E) {
        self.fire_inner(event, |_| false);
    }

    /// Fires a cancellable event.
    ///
    /// Once a listener cancels the event, remaining listeners are skipped
    /// unless they registered with `ignore_cancelled`. Cancellation also
    /// short-circuits propagation into ancestor scopes, apart from their
    /// `ignore_cancelled` listeners.
    pub fn fire_cancellable<E: Event + Cancellable>(&self, event: &mut E) {
        self.fire_inner(event, |e: &E| e.is_cancelled());
    }

    fn fire_inner<E: Event>(&self, event: &mut E, cancelled: impl Fn(&E) -> bool) {
        self.events_fired.fetch_add(1, Ordering::Relaxed);
        trace!("firing {} on '{}'", std::any::type_name::<E>(), self.scope);

        let type_id = TypeId::of::<E>();
        let mut node = Some(self);
        while let Some(bus) = node {
            bus.dispatch_local(type_id, event, &cancelled);
            node = bus.parent.as_deref();
        }
    }

    fn dispatch_local<E: Event>(
        &self,
        type_id: TypeId,
        event: &mut E,
        cancelled: &impl Fn(&E) -> bool,
    ) {
        // Snapshot the matching listeners so a listener that registers more
        // listeners mid-dispatch does not deadlock against this read lock.
        let entries: Vec<Arc<ListenerEntry>> = {
            let listeners = self.listeners.read().expect("listener table poisoned");
            match listeners.get(&type_id) {
                Some(slot) => slot.clone(),
                None => return,
            }
        };

        for entry in entries {
            if cancelled(event) && !entry.ignore_cancelled {
                trace!("skipping {} (event cancelled)", entry.name);
                continue;
            }

            let outcome =
                std::panic::catch_unwind(AssertUnwindSafe(|| (entry.callback)(event)));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    self.listener_failures.fetch_add(1, Ordering::Relaxed);
                    error!("listener {} failed: {}", entry.name, e);
                }
                Err(_) => {
                    self.listener_failures.fetch_add(1, Ordering::Relaxed);
                    error!("listener {} panicked; continuing dispatch", entry.name);
                }
            }
        }
    }

    /// Returns this node's dispatch counters.
    pub fn stats(&self) -> BusStats {
        BusStats {
            listeners: self.listener_count.load(Ordering::Relaxed),
            events_fired: self.events_fired.load(Ordering::Relaxed),
            listener_failures: self.listener_failures.load(Ordering::Relaxed),
        }
    }
}
