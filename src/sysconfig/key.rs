//! Configuration tracking keys.

use crate::error::AgentError;
use std::fmt;
use tracing::error;

/// A key that has passed sanitation and is safe to use as a file name.
///
/// Rules: non-empty, no leading `.`, and every character drawn from
/// `[0-9A-Za-z_.-]`. Anything else is rejected before storage is touched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConfigKey(String);

impl ConfigKey {
    pub fn parse(raw: &str) -> Result<Self, AgentError> {
        if raw.is_empty() {
            error!("Config key cannot be empty");
            return Err(AgentError::InvalidArguments("key cannot be empty".to_string()));
        }
        if raw.starts_with('.') {
            error!(key = raw, "Config key starts with '.'");
            return Err(invalid(raw));
        }
        let canonical = canonicalize(raw);
        if canonical.contains('!') {
            error!(key = %canonical, "Config key contains disallowed characters");
            return Err(invalid(raw));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the staging file used for atomic replacement.
    ///
    /// Starts with `.` so it can never collide with a valid key.
    pub fn staging_name(&self) -> String {
        format!(".{}.tmp", self.0)
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ConfigKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn is_allowed(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')
}

/// Replace every disallowed character with `!`.
fn canonicalize(raw: &str) -> String {
    raw.chars().map(|c| if is_allowed(c) { c } else { '!' }).collect()
}

fn invalid(raw: &str) -> AgentError {
    AgentError::InvalidArguments(format!("invalid key filename: {}", canonicalize(raw)))
}
