//! The module contract: composable units of gameplay behavior.

use crate::error::GameError;
use crate::game::GameInstance;
use async_trait::async_trait;
use bastion_event_system::EventBus;
use std::any::Any;
use std::sync::Arc;

/// A unit of composable behavior attached to one [`GameInstance`].
///
/// Modules are attached while the instance is constructing and initialized
/// strictly in registration order when `ready()` runs; each `initialize`
/// completes before the next module starts, so a module may rely on every
/// earlier module's state (looked up with [`GameInstance::module`]).
/// Teardown runs `deinitialize` in the SAME order.
///
/// At most one module of a given concrete type may be attached per instance.
/// Modules keep their own interior state (the engine calls them through
/// `&self`) and hold only non-owning typed handles to siblings.
///
/// # Examples
///
/// ```rust,no_run
/// use bastion_core::{GameError, GameInstance, GameModule};
/// use bastion_event_system::EventBus;
/// use async_trait::async_trait;
/// use std::sync::Arc;
///
/// struct ScoreboardModule;
///
/// #[async_trait]
/// impl GameModule for ScoreboardModule {
///     fn name(&self) -> &'static str {
///         "scoreboard"
///     }
///
///     async fn initialize(
///         &self,
///         _game: &Arc<GameInstance>,
///         _events: &Arc<EventBus>,
///     ) -> Result<(), GameError> {
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait GameModule: Any + Send + Sync {
    /// Stable, human-readable module name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Default priority for the listeners this module registers. Higher
    /// values run later. Modules pass this to `EventBus::on` themselves.
    fn event_priority(&self) -> i32 {
        0
    }

    /// True for world-provider modules. `ready()` warns when the first
    /// registered module does not provide a world, since every later module
    /// may assume the world handle is populated.
    fn provides_world(&self) -> bool {
        false
    }

    /// Called exactly once, in registration order, with the owning instance
    /// and the instance's private event scope. An error here aborts instance
    /// startup: no later module is initialized and no player is admitted.
    async fn initialize(
        &self,
        game: &Arc<GameInstance>,
        events: &Arc<EventBus>,
    ) -> Result<(), GameError>;

    /// Called at most once, never before `initialize`, in the same order as
    /// initialization. Errors are logged and do not stop teardown of the
    /// remaining modules.
    async fn deinitialize(&self, _game: &Arc<GameInstance>) -> Result<(), GameError> {
        Ok(())
    }
}
