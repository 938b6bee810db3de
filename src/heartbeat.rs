//! Heartbeat Emitter
//!
//! Recurring task that broadcasts `heartbeat(timestamp, sequence, hostname, uuid)`
//! through the agent transport. The emitter owns the sequence counter; nothing
//! else may advance it. A failed emission is logged and the task re-arms
//! regardless, so a single transport error never stops the heartbeat.

use crate::agent::{Agent, AgentEvent};
use crate::error::AgentError;
use chrono::Utc;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Default interval between heartbeats
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

pub struct HeartbeatEmitter {
    agent: Arc<Agent>,
    /// Next sequence number to emit. Wraps on u32 overflow.
    sequence: AtomicU32,
    interval: RwLock<Duration>,
}

impl HeartbeatEmitter {
    pub fn new(agent: Arc<Agent>, interval: Duration) -> Result<Self, AgentError> {
        validate_interval(interval)?;
        Ok(Self {
            agent,
            sequence: AtomicU32::new(0),
            interval: RwLock::new(interval),
        })
    }

    /// Sequence number the next fire will carry.
    pub fn sequence(&self) -> u32 {
        self.sequence.load(Ordering::SeqCst)
    }

    pub fn interval(&self) -> Duration {
        *self.interval.read()
    }

    /// Change the interval. Takes effect when the timer next re-arms.
    pub fn set_interval(&self, interval: Duration) -> Result<(), AgentError> {
        validate_interval(interval)?;
        *self.interval.write() = interval;
        debug!(interval_secs = interval.as_secs(), "Heartbeat interval updated");
        Ok(())
    }

    /// Emit one heartbeat, consuming a sequence number even if emission fails.
    pub fn fire(&self) -> Result<u32, AgentError> {
        let timestamp = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        let event = AgentEvent::heartbeat(
            timestamp,
            sequence,
            self.agent.hostname(),
            self.agent.uuid(),
        );
        self.agent.emit_event(event)?;
        debug!(sequence, "Heartbeat emitted");
        Ok(sequence)
    }

    /// Start the recurring task. The first heartbeat fires immediately.
    pub fn spawn(self: &Arc<Self>) -> HeartbeatHandle {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let emitter = Arc::clone(self);

        let task = tokio::spawn(async move {
            info!(interval_secs = emitter.interval().as_secs(), "Heartbeat started");
            loop {
                if let Err(e) = emitter.fire() {
                    warn!(error = %e, "Heartbeat emission failed, re-arming");
                }
                let wait = emitter.interval();
                tokio::select! {
                    _ = tokio::time::sleep(wait) => {}
                    // Either an explicit stop or the handle was dropped.
                    _ = stop_rx.changed() => break,
                }
            }
            info!(sequence = emitter.sequence(), "Heartbeat stopped");
        });

        HeartbeatHandle { stop: stop_tx, task }
    }
}

fn validate_interval(interval: Duration) -> Result<(), AgentError> {
    if interval.is_zero() {
        return Err(AgentError::InvalidArguments(
            "heartbeat interval must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

/// Cancellation handle for a running heartbeat task.
pub struct HeartbeatHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl HeartbeatHandle {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the task and wait for it to exit.
    pub async fn stop(self) {
        let _ = self.stop.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "Heartbeat task ended abnormally");
        }
    }
}
