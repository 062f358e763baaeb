use crate::commands::PrinterService;
use crate::config::BackendIdentity;
use crate::errors::BindError;
use crate::manager::{ConnectionManager, Inner};
use std::fmt;
use std::sync::{Arc, Weak};

/// Platform binding mechanism for vendor printer services.
///
/// `bind` only starts the attempt. Its outcome arrives later, on any thread,
/// through the [`SessionEvents`] handed in. An immediate `Err` counts as a
/// failed attempt and the manager moves on to the next candidate.
pub trait PrinterBackend: Send + Sync {
    fn bind(&self, identity: &BackendIdentity, events: SessionEvents) -> Result<(), BindError>;

    /// Release a binding. Must tolerate identities that are no longer bound.
    fn unbind(&self, identity: &BackendIdentity);
}

/// Lifecycle callbacks for one bind attempt.
///
/// Tagged with the attempt's generation: once the manager has moved on
/// (next candidate, `disconnect()`, new sequence) these calls are ignored.
#[derive(Clone)]
pub struct SessionEvents {
    manager: Weak<Inner>,
    generation: u64,
    identity: BackendIdentity,
}

impl SessionEvents {
    pub(crate) fn new(manager: Weak<Inner>, generation: u64, identity: BackendIdentity) -> Self {
        Self {
            manager,
            generation,
            identity,
        }
    }

    pub fn identity(&self) -> &BackendIdentity {
        &self.identity
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn connected(&self, service: Arc<dyn PrinterService>) {
        if let Some(manager) = self.manager() {
            manager.handle_connected(self.generation, &self.identity, service);
        }
    }

    pub fn disconnected(&self) {
        if let Some(manager) = self.manager() {
            manager.handle_disconnected(self.generation, &self.identity);
        }
    }

    pub fn binding_died(&self) {
        if let Some(manager) = self.manager() {
            manager.handle_binding_died(self.generation, &self.identity);
        }
    }

    pub fn null_binding(&self) {
        self.failed(BindError::NullBinding);
    }

    pub fn failed(&self, reason: BindError) {
        if let Some(manager) = self.manager() {
            manager.handle_failed(self.generation, &self.identity, reason);
        }
    }

    fn manager(&self) -> Option<ConnectionManager> {
        self.manager.upgrade().map(ConnectionManager::from_inner)
    }
}

impl fmt::Debug for SessionEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionEvents")
            .field("generation", &self.generation)
            .field("identity", &self.identity)
            .finish()
    }
}
