//! Engine-level events fired on instance event scopes.
//!
//! These are the events the core fires itself; gameplay modules define their
//! own event types and fire them on the same scopes. Chat and death events
//! are cancellable so modules can confine them to the originating instance.

use crate::types::{InstanceId, PlayerId};
use bastion_event_system::Cancellable;
use serde::{Deserialize, Serialize};

/// Fired exactly once on an instance's event scope when `ready()` completes.
/// Time-sensitive modules may assume game state has begun after observing it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameStartEvent {
    pub instance_id: InstanceId,
    /// Unix timestamp when the instance became ready.
    pub timestamp: u64,
}

/// Fired when a player is admitted to a ready instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerJoinEvent {
    pub instance_id: InstanceId,
    pub player_id: PlayerId,
    pub timestamp: u64,
}

/// Fired when a player leaves an instance (before any auto-removal runs).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerLeaveEvent {
    pub instance_id: InstanceId,
    pub player_id: PlayerId,
    pub timestamp: u64,
}

/// A chat message on its way to a set of recipients.
///
/// Listeners may strip recipients (scoping chat to the sender's instance) or
/// cancel the event entirely; whatever recipient list survives dispatch is
/// what the engine delivers.
#[derive(Debug, Clone)]
pub struct ChatEvent {
    pub sender: PlayerId,
    pub sender_instance: InstanceId,
    pub text: String,
    pub recipients: Vec<PlayerId>,
    cancelled: bool,
}

impl ChatEvent {
    pub fn new(
        sender: PlayerId,
        sender_instance: InstanceId,
        text: impl Into<String>,
        recipients: Vec<PlayerId>,
    ) -> Self {
        Self {
            sender,
            sender_instance,
            text: text.into(),
            recipients,
            cancelled: false,
        }
    }
}

impl Cancellable for ChatEvent {
    fn is_cancelled(&self) -> bool {
        self.cancelled
    }
    fn set_cancelled(&mut self, cancelled: bool) {
        self.cancelled = cancelled;
    }
}

/// A player death with its broadcast message.
///
/// A listener that cancels the event with a non-None replacement `message`
/// confines the message to the originating instance instead of the global
/// broadcast the engine would otherwise perform.
#[derive(Debug, Clone)]
pub struct DeathEvent {
    pub player: PlayerId,
    pub instance_id: InstanceId,
    pub message: Option<String>,
    cancelled: bool,
}

impl DeathEvent {
    pub fn new(player: PlayerId, instance_id: InstanceId, message: Option<String>) -> Self {
        Self {
            player,
            instance_id,
            message,
            cancelled: false,
        }
    }
}

impl Cancellable for DeathEvent {
    fn is_cancelled(&self) -> bool {
        self.cancelled
    }
    fn set_cancelled(&mut self, cancelled: bool) {
        self.cancelled = cancelled;
    }
}
