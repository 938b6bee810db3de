//! Agent transports
//!
//! The agent never talks to the bus directly. It emits events and property
//! change notifications through an `AgentTransport` injected at construction.

use super::event::AgentEvent;
use crate::error::AgentError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Outbound capability of an agent.
pub trait AgentTransport: Send + Sync {
    /// Broadcast a named event.
    fn emit_event(&self, event: &AgentEvent) -> Result<(), AgentError>;

    /// Announce that properties of `interface` changed.
    fn properties_changed(&self, interface: &str, names: &[String]);
}

/// Message published on the in-process bus channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BusMessage {
    Event(AgentEvent),
    PropertiesChanged { interface: String, names: Vec<String> },
}

/// Transport backed by a broadcast channel the bus adapter subscribes to.
pub struct BusTransport {
    bus_name: String,
    sender: broadcast::Sender<BusMessage>,
}

impl BusTransport {
    pub fn new(bus_name: &str, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            bus_name: bus_name.to_string(),
            sender,
        }
    }

    pub fn bus_name(&self) -> &str {
        &self.bus_name
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BusMessage> {
        self.sender.subscribe()
    }

    fn publish(&self, message: BusMessage) {
        // No subscriber is a normal state for a freshly started agent.
        if self.sender.send(message).is_err() {
            trace!(bus = %self.bus_name, "No bus subscribers, message dropped");
        }
    }
}

impl AgentTransport for BusTransport {
    fn emit_event(&self, event: &AgentEvent) -> Result<(), AgentError> {
        debug!(bus = %self.bus_name, event = %event.name, "Emitting event");
        self.publish(BusMessage::Event(event.clone()));
        Ok(())
    }

    fn properties_changed(&self, interface: &str, names: &[String]) {
        self.publish(BusMessage::PropertiesChanged {
            interface: interface.to_string(),
            names: names.to_vec(),
        });
    }
}

/// In-process transport that records everything it is asked to send.
#[derive(Default)]
pub struct RecordingTransport {
    events: Mutex<Vec<AgentEvent>>,
    changes: Mutex<Vec<(String, Vec<String>)>>,
    failures_remaining: AtomicUsize,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` emissions fail.
    pub fn fail_next_emits(&self, count: usize) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<AgentEvent> {
        self.events.lock().clone()
    }

    pub fn events_named(&self, name: &str) -> Vec<AgentEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.name == name)
            .cloned()
            .collect()
    }

    pub fn property_changes(&self) -> Vec<(String, Vec<String>)> {
        self.changes.lock().clone()
    }
}

impl AgentTransport for RecordingTransport {
    fn emit_event(&self, event: &AgentEvent) -> Result<(), AgentError> {
        let failed = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(AgentError::Other(format!(
                "simulated emission failure for {}",
                event.name
            )));
        }
        self.events.lock().push(event.clone());
        Ok(())
    }

    fn properties_changed(&self, interface: &str, names: &[String]) {
        self.changes
            .lock()
            .push((interface.to_string(), names.to_vec()));
    }
}
