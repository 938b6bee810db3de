//! Agent Configuration
//!
//! Settings are merged from compiled defaults, the system file, the user file
//! and `HOSTWARDEN__*` environment variables, in increasing precedence. See
//! [`ConfigLoader`].

pub mod loader;
pub mod paths;
pub mod sources;

pub use loader::ConfigLoader;

use crate::auth::PolicyRule;
use crate::error::AgentError;
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Root settings document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentSettings {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub heartbeat: HeartbeatSettings,
    #[serde(default)]
    pub host: HostSettings,
    #[serde(default)]
    pub sysconfig: SysconfigSettings,
    #[serde(default)]
    pub authorization: AuthorizationSettings,
    #[serde(default)]
    pub bus: BusSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatSettings {
    /// Seconds between heartbeats (must be > 0)
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

fn default_interval_secs() -> u64 {
    5
}

impl Default for HeartbeatSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
        }
    }
}

impl HeartbeatSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostSettings {
    /// Where the operator-assigned UUID is persisted
    #[serde(default = "default_custom_uuid_file")]
    pub custom_uuid_file: PathBuf,
}

fn default_custom_uuid_file() -> PathBuf {
    PathBuf::from("/var/lib/hostwarden/custom-uuid")
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            custom_uuid_file: default_custom_uuid_file(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SysconfigSettings {
    /// Directory holding one record file per config key
    #[serde(default = "default_keys_dir")]
    pub keys_dir: PathBuf,

    /// Scheme name → external program
    #[serde(default)]
    pub backends: HashMap<String, CommandBackendConfig>,
}

fn default_keys_dir() -> PathBuf {
    PathBuf::from("/var/lib/hostwarden/sysconfig-keys")
}

impl Default for SysconfigSettings {
    fn default() -> Self {
        Self {
            keys_dir: default_keys_dir(),
            backends: HashMap::new(),
        }
    }
}

/// External program used as a configuration backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandBackendConfig {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Arguments for queries; empty means the backend cannot answer queries
    #[serde(default)]
    pub query_args: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthorizationSettings {
    /// Ordered rules, first match wins; no match denies
    #[serde(default)]
    pub rules: Vec<PolicyRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusSettings {
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_channel_capacity() -> usize {
    64
}

impl Default for BusSettings {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl AgentSettings {
    /// Check values serde cannot express.
    pub fn validate(&self) -> Result<(), AgentError> {
        if self.heartbeat.interval_secs == 0 {
            return Err(invalid("heartbeat.interval_secs must be greater than zero"));
        }
        if self.sysconfig.keys_dir.as_os_str().is_empty() {
            return Err(invalid("sysconfig.keys_dir must not be empty"));
        }
        for (scheme, backend) in &self.sysconfig.backends {
            if backend.program.trim().is_empty() {
                return Err(invalid(&format!(
                    "sysconfig.backends.{}.program must not be empty",
                    scheme
                )));
            }
        }
        if let Some(i) = self
            .authorization
            .rules
            .iter()
            .position(|r| r.action.trim().is_empty())
        {
            return Err(invalid(&format!("authorization.rules[{}].action must not be empty", i)));
        }
        if self.bus.channel_capacity == 0 {
            return Err(invalid("bus.channel_capacity must be greater than zero"));
        }
        Ok(())
    }
}

fn invalid(message: &str) -> AgentError {
    AgentError::InvalidArguments(format!("configuration: {}", message))
}
