//! Authorization Gate
//!
//! Every property read, property write and method call is checked against an
//! external policy backend using the action name `"<interface>.<member>"`.
//! The gate is stateless per call and fails closed.

pub mod policy;

pub use policy::{PolicyRule, PolicyTable};

use crate::error::AgentError;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// Identity of the remote caller as seen by the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerContext {
    /// Unique bus name or other sender identifier
    pub sender: String,
    pub uid: Option<u32>,
}

impl CallerContext {
    pub fn new(sender: &str) -> Self {
        Self {
            sender: sender.to_string(),
            uid: None,
        }
    }

    pub fn with_uid(mut self, uid: u32) -> Self {
        self.uid = Some(uid);
        self
    }
}

/// Policy backend consumed by the gate.
///
/// `Ok(true)` allows, `Ok(false)` denies, `Err` means the backend could not
/// be reached or evaluated.
#[async_trait]
pub trait AuthorizationBackend: Send + Sync {
    async fn check_authorization(
        &self,
        action: &str,
        caller: &CallerContext,
    ) -> Result<bool, AgentError>;
}

/// Build the authorization lookup key for a member of an interface.
pub fn action_name(interface: &str, member: &str) -> String {
    format!("{}.{}", interface, member)
}

#[derive(Clone)]
pub struct AuthorizationGate {
    backend: Arc<dyn AuthorizationBackend>,
}

impl AuthorizationGate {
    pub fn new(backend: Arc<dyn AuthorizationBackend>) -> Self {
        Self { backend }
    }

    /// Check `<interface>.<member>` for `caller`.
    ///
    /// Denial yields a generic `Authentication` error. A backend failure also
    /// denies and carries the backend's message.
    pub async fn check(
        &self,
        interface: &str,
        member: &str,
        caller: &CallerContext,
    ) -> Result<(), AgentError> {
        let action = action_name(interface, member);
        match self.backend.check_authorization(&action, caller).await {
            Ok(true) => {
                debug!(action = %action, caller = %caller.sender, "Authorized");
                Ok(())
            }
            Ok(false) => {
                warn!(action = %action, caller = %caller.sender, "Caller is not authorized");
                Err(AgentError::not_authorized())
            }
            Err(e) => {
                warn!(action = %action, error = %e, "Authorization backend failure");
                Err(AgentError::Authentication(e.message().to_string()))
            }
        }
    }
}
