//! Agent
//!
//! The addressable management identity. An agent hosts exactly one module,
//! carries that module's private state, a last-error slot, the completion
//! callback for asynchronous operations and the transport used to emit
//! events and property change notifications.

pub mod event;
pub mod private;
pub mod transport;

pub use event::{AgentEvent, HEARTBEAT_EVENT};
pub use private::PrivateState;
pub use transport::{AgentTransport, BusMessage, BusTransport, RecordingTransport};

use crate::error::{AgentError, ResultCode};
use parking_lot::{Mutex, RwLock};
use std::any::Any;
use std::sync::Arc;
use tracing::{debug, warn};

/// Completion callback for asynchronous operations: result code and status text.
pub type CompletionCallback = Arc<dyn Fn(ResultCode, String) + Send + Sync>;

/// Identity reported in heartbeats and identity properties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentIdentity {
    pub hostname: String,
    pub uuid: String,
}

impl AgentIdentity {
    pub fn new(hostname: &str, uuid: &str) -> Self {
        Self {
            hostname: hostname.to_string(),
            uuid: uuid.to_string(),
        }
    }
}

pub struct Agent {
    identity: AgentIdentity,
    transport: Arc<dyn AgentTransport>,
    private: PrivateState,
    last_error: Mutex<Option<AgentError>>,
    callback: RwLock<Option<CompletionCallback>>,
}

impl Agent {
    pub fn new(identity: AgentIdentity, transport: Arc<dyn AgentTransport>) -> Self {
        Self {
            identity,
            transport,
            private: PrivateState::new(),
            last_error: Mutex::new(None),
            callback: RwLock::new(None),
        }
    }

    pub fn identity(&self) -> &AgentIdentity {
        &self.identity
    }

    pub fn hostname(&self) -> &str {
        &self.identity.hostname
    }

    pub fn uuid(&self) -> &str {
        &self.identity.uuid
    }

    /// See [`PrivateState::set`]; panics if another module owns the slot.
    pub fn set_private<T: Any + Send + Sync>(&self, module: &'static str, state: Arc<T>) {
        self.private.set(module, state);
    }

    pub fn private<T: Any + Send + Sync>(&self) -> Result<Arc<T>, AgentError> {
        self.private.get::<T>().ok_or_else(|| {
            AgentError::Other(format!(
                "module state not initialised (owner: {})",
                self.private.owner().unwrap_or("none")
            ))
        })
    }

    pub fn private_owner(&self) -> Option<&'static str> {
        self.private.owner()
    }

    /// Record the most recent error, replacing the previous one.
    pub fn set_error(&self, error: AgentError) {
        *self.last_error.lock() = Some(error);
    }

    pub fn clear_error(&self) {
        self.last_error.lock().take();
    }

    pub fn last_error(&self) -> Option<AgentError> {
        self.last_error.lock().clone()
    }

    pub fn set_callback(&self, callback: CompletionCallback) {
        *self.callback.write() = Some(callback);
    }

    /// Deliver an asynchronous result to the registered callback.
    pub fn complete(&self, code: ResultCode, status: String) {
        let callback = self.callback.read().clone();
        match callback {
            Some(cb) => cb(code, status),
            None => debug!(code = %code, status = %status, "No completion callback registered"),
        }
    }

    pub fn emit_event(&self, event: AgentEvent) -> Result<(), AgentError> {
        self.transport.emit_event(&event).map_err(|e| {
            warn!(event = %event.name, error = %e, "Event emission failed");
            e
        })
    }

    pub fn update_properties(&self, interface: &str, names: &[String]) {
        self.transport.properties_changed(interface, names);
    }

    /// Release module state. Called once when the agent is torn down.
    pub fn teardown(&self) {
        self.private.clear();
        self.callback.write().take();
    }
}
