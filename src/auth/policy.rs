//! Static policy table backend loaded from configuration.

use super::{AuthorizationBackend, CallerContext};
use crate::error::AgentError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One ordered policy rule.
///
/// `action` matches exactly, or by prefix when it ends in `*`. `callers`
/// lists sender names or `uid:<n>` entries; `*` matches any caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRule {
    pub action: String,
    #[serde(default = "default_callers")]
    pub callers: Vec<String>,
    #[serde(default = "default_allow")]
    pub allow: bool,
}

fn default_callers() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_allow() -> bool {
    true
}

impl PolicyRule {
    pub fn allow(action: &str) -> Self {
        Self {
            action: action.to_string(),
            callers: default_callers(),
            allow: true,
        }
    }

    pub fn deny(action: &str) -> Self {
        Self {
            allow: false,
            ..Self::allow(action)
        }
    }

    fn matches_action(&self, action: &str) -> bool {
        match self.action.strip_suffix('*') {
            Some(prefix) => action.starts_with(prefix),
            None => self.action == action,
        }
    }

    fn matches_caller(&self, caller: &CallerContext) -> bool {
        self.callers.iter().any(|c| {
            c == "*"
                || *c == caller.sender
                || caller
                    .uid
                    .map(|uid| *c == format!("uid:{}", uid))
                    .unwrap_or(false)
        })
    }
}

/// First matching rule decides; no match denies.
#[derive(Debug, Clone, Default)]
pub struct PolicyTable {
    rules: Vec<PolicyRule>,
}

impl PolicyTable {
    pub fn new(rules: Vec<PolicyRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[PolicyRule] {
        &self.rules
    }

    pub fn decide(&self, action: &str, caller: &CallerContext) -> bool {
        self.rules
            .iter()
            .find(|r| r.matches_action(action) && r.matches_caller(caller))
            .map(|r| r.allow)
            .unwrap_or(false)
    }
}

#[async_trait]
impl AuthorizationBackend for PolicyTable {
    async fn check_authorization(
        &self,
        action: &str,
        caller: &CallerContext,
    ) -> Result<bool, AgentError> {
        Ok(self.decide(action, caller))
    }
}
