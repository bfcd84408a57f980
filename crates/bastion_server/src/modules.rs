//! Built-in gameplay modules shipped with the host.

use async_trait::async_trait;
use bastion_core::{ChatEvent, DeathEvent, GameError, GameInstance, GameModule};
use bastion_event_system::{Cancellable, EventBus};
use std::sync::Arc;
use tracing::trace;

/// Confines chat and death messages to the instance they originate in.
///
/// Without it, a chat event's recipient list may name players in other
/// instances (the engine bridge resolves recipients globally) and death
/// messages broadcast process-wide. The module strips out-of-instance
/// recipients, cancels chat that has nobody left to hear it, and converts
/// global death broadcasts into instance-local ones.
///
/// Registered on the instance's own event scope with a low priority so it
/// runs before gameplay listeners.
pub struct ChatScopeModule;

#[async_trait]
impl GameModule for ChatScopeModule {
    fn name(&self) -> &'static str {
        "chat_scope"
    }

    fn event_priority(&self) -> i32 {
        -100
    }

    async fn initialize(
        &self,
        game: &Arc<GameInstance>,
        events: &Arc<EventBus>,
    ) -> Result<(), GameError> {
        let scope = Arc::downgrade(game);
        events.on::<ChatEvent, _>(self.event_priority(), move |event| {
            let Some(game) = scope.upgrade() else {
                return Ok(());
            };
            let before = event.recipients.len();
            event.recipients.retain(|player| game.has_player(*player));
            if event.recipients.len() < before {
                trace!(
                    "chat from {} scoped to instance {}: {} of {} recipients kept",
                    event.sender,
                    game.id(),
                    event.recipients.len(),
                    before
                );
            }
            if event.recipients.is_empty() {
                event.set_cancelled(true);
            }
            Ok(())
        });

        let scope = Arc::downgrade(game);
        events.on::<DeathEvent, _>(self.event_priority(), move |event| {
            let Some(game) = scope.upgrade() else {
                return Ok(());
            };
            if game.has_player(event.player) {
                // Cancelling with a message in place tells the engine bridge
                // to announce locally instead of broadcasting globally.
                if event.message.is_none() {
                    event.message = Some("fell in battle".to_string());
                }
                event.set_cancelled(true);
            }
            Ok(())
        });

        Ok(())
    }
}
