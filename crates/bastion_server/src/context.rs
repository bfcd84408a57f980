//! The explicitly constructed service bundle shared by the whole process.

use bastion_core::InstanceDirectory;
use bastion_event_system::EventBus;
use bastion_messaging::MessagingBus;
use std::sync::Arc;

/// Process-wide services, built once by bootstrap and injected everywhere
/// they are needed. Nothing in the host reaches for a global: anything that
/// needs the directory, the root event scope, or the messaging bus is handed
/// this bundle (or the individual service) by its constructor.
#[derive(Clone)]
pub struct ServicesContext {
    /// Root of the event scope tree; every instance scope is a child of it.
    pub events: Arc<EventBus>,
    /// Shared map-template registry.
    pub directory: Arc<InstanceDirectory>,
    /// Fleet messaging, absent in local-only mode.
    pub messaging: Option<Arc<MessagingBus>>,
}

impl ServicesContext {
    pub fn new(
        events: Arc<EventBus>,
        directory: Arc<InstanceDirectory>,
        messaging: Option<Arc<MessagingBus>>,
    ) -> Self {
        Self {
            events,
            directory,
            messaging,
        }
    }

    /// A context with fresh services and no fleet messaging. Used by tests
    /// and local-only runs.
    pub fn local() -> Self {
        Self::new(EventBus::new_root(), Arc::new(InstanceDirectory::new()), None)
    }
}

impl std::fmt::Debug for ServicesContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServicesContext")
            .field("directory", &self.directory)
            .field("messaging", &self.messaging.is_some())
            .finish()
    }
}
