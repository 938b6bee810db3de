//! Idempotent Config Runner
//!
//! `apply` validates the key, picks the backend, returns `Async` and drives the
//! backend on a spawned task. The outcome is recorded under the key and then
//! delivered once through the agent's completion callback.
//!
//! Record layout: `OK\n<status>\n` after success, `FAILED <code>: <message>\n`
//! after failure. A record whose first line is `OK` counts as applied; without
//! `FLAG_FORCE` such a key completes immediately as "already configured".

use super::backend::{BackendRegistry, ConfigSource};
use super::key::ConfigKey;
use super::store::{ConfigRecordStore, APPLIED_MARKER};
use crate::agent::Agent;
use crate::error::{AgentError, ResultCode};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Re-apply even when the key is already recorded as applied.
pub const FLAG_FORCE: u32 = 1 << 0;

/// Status reported for a key with no record.
pub const UNKNOWN_STATUS: &str = "unknown";

pub const ALREADY_CONFIGURED_STATUS: &str = "already configured";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Pending,
    Running,
    Done,
    Failed,
}

impl RunState {
    pub fn in_flight(self) -> bool {
        matches!(self, RunState::Pending | RunState::Running)
    }
}

pub struct ConfigRunner {
    store: ConfigRecordStore,
    backends: BackendRegistry,
    states: Mutex<HashMap<ConfigKey, RunState>>,
}

impl ConfigRunner {
    pub fn new(store: ConfigRecordStore, backends: BackendRegistry) -> Self {
        Self {
            store,
            backends,
            states: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &ConfigRecordStore {
        &self.store
    }

    pub fn backends(&self) -> &BackendRegistry {
        &self.backends
    }

    /// Start applying `source` for `key`.
    ///
    /// Synchronous errors: bad key (`InvalidArguments`), unknown scheme
    /// (`NotImplemented`), key already in flight (`Other`). Everything after
    /// the `Async` return arrives through `agent.complete`.
    pub fn apply(
        self: &Arc<Self>,
        agent: &Arc<Agent>,
        source: ConfigSource,
        flags: u32,
        scheme: &str,
        key: &str,
    ) -> Result<ResultCode, AgentError> {
        let key = ConfigKey::parse(key)?;
        let backend = self.backends.get(scheme)?;

        {
            let mut states = self.states.lock();
            if states.get(&key).is_some_and(|s| s.in_flight()) {
                warn!(key = %key, "Configuration already in progress");
                return Err(AgentError::Other(format!(
                    "configuration for key '{}' is already in progress",
                    key
                )));
            }
            states.insert(key.clone(), RunState::Pending);
        }

        let runner = Arc::clone(self);
        let agent = Arc::clone(agent);
        let scheme = scheme.to_string();
        tokio::spawn(async move {
            if flags & FLAG_FORCE == 0 && runner.store.is_applied(&key) {
                info!(key = %key, "Key already configured, skipping backend");
                runner.set_state(&key, RunState::Done);
                agent.complete(ResultCode::Success, ALREADY_CONFIGURED_STATUS.to_string());
                return;
            }

            runner.set_state(&key, RunState::Running);
            debug!(key = %key, scheme = %scheme, flags, "Running configuration backend");
            let task = {
                let key = key.clone();
                tokio::spawn(async move { backend.run(&source, flags, &key).await })
            };
            let outcome = task.await.unwrap_or_else(|e| {
                Err(AgentError::Backend(format!("backend task ended abnormally: {}", e)))
            });
            let (code, status) = runner.record_outcome(&key, outcome);
            agent.complete(code, status);
        });

        Ok(ResultCode::Async)
    }

    /// Persist the outcome and settle the key's state. Returns what the
    /// callback should receive.
    fn record_outcome(
        &self,
        key: &ConfigKey,
        outcome: Result<String, AgentError>,
    ) -> (ResultCode, String) {
        match outcome {
            Ok(status) => {
                let record = format!("{}\n{}\n", APPLIED_MARKER, status);
                match self.store.write(key, &record) {
                    Ok(()) => {
                        info!(key = %key, "Configuration applied");
                        self.set_state(key, RunState::Done);
                        (ResultCode::Success, status)
                    }
                    Err(e) => {
                        self.set_state(key, RunState::Failed);
                        (e.code(), e.message().to_string())
                    }
                }
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Configuration backend failed");
                let record = format!("FAILED {}: {}\n", e.code() as u32, e.message());
                let mut status = e.message().to_string();
                if let Err(write_err) = self.store.write(key, &record) {
                    warn!(key = %key, error = %write_err, "Could not record failure");
                    status = format!(
                        "{} (failure not recorded: {})",
                        status,
                        write_err.message()
                    );
                }
                self.set_state(key, RunState::Failed);
                (e.code(), status)
            }
        }
    }

    fn set_state(&self, key: &ConfigKey, state: RunState) {
        self.states.lock().insert(key.clone(), state);
    }

    /// State of the most recent `apply` for `key` in this process.
    pub fn state(&self, key: &str) -> Option<RunState> {
        let key = ConfigKey::parse(key).ok()?;
        self.states.lock().get(&key).copied()
    }

    /// Recorded status for `key`, or `"unknown"` when there is none.
    pub fn is_configured(&self, key: &str) -> Result<String, AgentError> {
        let key = ConfigKey::parse(key)?;
        Ok(self
            .store
            .read(&key)
            .unwrap_or_else(|| UNKNOWN_STATUS.to_string()))
    }

    /// Stamp `key` with `contents` without running a backend.
    pub fn set_configured(&self, key: &str, contents: &str) -> Result<(), AgentError> {
        let key = ConfigKey::parse(key)?;
        self.store.write(&key, contents)
    }

    pub async fn query(&self, text: &str, flags: u32, scheme: &str) -> Result<String, AgentError> {
        let backend = self.backends.get(scheme)?;
        Ok(backend
            .query(text, flags)
            .await?
            .unwrap_or_else(|| UNKNOWN_STATUS.to_string()))
    }
}
