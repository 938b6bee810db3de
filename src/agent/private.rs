//! Module private-state slot.
//!
//! Exactly one module owns the slot of an agent. The state is stored type-erased
//! and recovered by downcasting, so a module can only read back the type it put in.

use parking_lot::RwLock;
use std::any::Any;
use std::sync::Arc;

struct Slot {
    owner: &'static str,
    state: Arc<dyn Any + Send + Sync>,
}

#[derive(Default)]
pub struct PrivateState {
    slot: RwLock<Option<Slot>>,
}

impl PrivateState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `state` on behalf of `module`.
    ///
    /// # Panics
    ///
    /// Panics when the slot already belongs to a different module. Attaching a
    /// second module to an initialised agent is a programming error.
    pub fn set<T: Any + Send + Sync>(&self, module: &'static str, state: Arc<T>) {
        let mut slot = self.slot.write();
        if let Some(existing) = slot.as_ref() {
            assert!(
                existing.owner == module,
                "agent private state is owned by module '{}', refusing to hand it to '{}'",
                existing.owner,
                module
            );
        }
        *slot = Some(Slot {
            owner: module,
            state,
        });
    }

    /// Typed access to the stored state.
    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        let slot = self.slot.read();
        slot.as_ref()
            .and_then(|s| Arc::clone(&s.state).downcast::<T>().ok())
    }

    pub fn owner(&self) -> Option<&'static str> {
        self.slot.read().as_ref().map(|s| s.owner)
    }

    /// Drop the state. Used at agent teardown.
    pub fn clear(&self) {
        self.slot.write().take();
    }
}
