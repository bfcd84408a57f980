//! # Bastion Event System
//!
//! A hierarchical, type-safe event bus for a server that hosts many isolated
//! game instances in one process. Dispatch nodes form a tree (process root →
//! per-instance → per-module): an event fired on a node is seen by that node's
//! listeners and by every ancestor's listeners, never by a sibling subtree.
//! This is what keeps one game round's chat, deaths, and scoring from leaking
//! into another round running next door.
//!
//! ## Core properties
//!
//! - **Synchronous dispatch**: `fire` returns only after every listener ran.
//! - **Deterministic ordering**: listeners run in ascending priority; ties are
//!   broken by registration order.
//! - **In-flight mutation**: listeners receive `&mut E` and may reshape the
//!   event (strip recipients, replace a message) before later listeners or
//!   the engine observe it.
//! - **Cancellation**: events implementing [`Cancellable`] can be cancelled
//!   mid-dispatch; remaining listeners are skipped unless they registered
//!   with `ignore_cancelled`.
//! - **Isolation**: a listener that errors or panics is logged and skipped —
//!   it never stops dispatch to the remaining listeners and never unwinds
//!   into the caller. A broken gameplay module must not crash the instance.
//!
//! ## Quick start
//!
//! ```rust
//! use bastion_event_system::{EventBus, EventError};
//!
//! #[derive(Debug)]
//! struct GoalScored { team: u8 }
//!
//! let root = EventBus::new_root();
//! let instance = root.child("instance:demo");
//!
//! instance.on(0, |event: &mut GoalScored| {
//!     println!("team {} scored", event.team);
//!     Ok(())
//! });
//!
//! instance.fire(&mut GoalScored { team: 1 });
//! ```

mod bus;

pub use bus::{BusStats, EventBus, ListenerOpts};

use std::any::Any;
use thiserror::Error;

/// Marker trait for anything that can travel through an [`EventBus`].
///
/// Blanket-implemented: any `'static` type that is `Send + Sync + Debug`
/// qualifies, so event structs need no manual impl.
pub trait Event: Any + Send + Sync + std::fmt::Debug {}

impl<T> Event for T where T: Any + Send + Sync + std::fmt::Debug {}

/// Opt-in cancellation for events dispatched via
/// [`EventBus::fire_cancellable`].
///
/// Listeners mark the event cancelled to stop downstream delivery; listeners
/// registered with [`ListenerOpts::ignore_cancelled`] still observe the event
/// afterwards (e.g. loggers that want to see suppressed chat).
pub trait Cancellable {
    /// Whether the event has been cancelled by an earlier listener.
    fn is_cancelled(&self) -> bool;

    /// Marks or unmarks the event as cancelled.
    fn set_cancelled(&mut self, cancelled: bool);
}

/// Errors surfaced by event listeners.
///
/// A listener returning an error does not abort dispatch; the error is logged
/// against the listener's name and the remaining listeners still run.
#[derive(Debug, Error)]
pub enum EventError {
    /// The listener rejected or failed to process the event.
    #[error("listener failed: {0}")]
    Handler(String),

    /// The event payload did not match the type the listener registered for.
    /// Indicates a registration bug, not a runtime condition.
    #[error("event payload type did not match listener registration")]
    TypeMismatch,
}
