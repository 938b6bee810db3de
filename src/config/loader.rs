//! ConfigLoader: composes the sources and deserializes `AgentSettings`.

use super::sources;
use super::AgentSettings;
use crate::error::AgentError;
use config::Config;
use std::path::Path;
use tracing::info;

/// Configuration loader.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load settings from the standard locations.
    ///
    /// Precedence: defaults (lowest) → system file → user file → environment (highest).
    pub fn load() -> Result<AgentSettings, AgentError> {
        let builder = Config::builder();
        let builder = sources::add_system_file(builder);
        let builder = sources::add_user_file(builder);
        let builder = sources::add_environment(builder)?;
        Self::finish(builder.build()?)
    }

    /// Load settings from one explicit file plus the environment overlay.
    pub fn load_from_file(path: &Path) -> Result<AgentSettings, AgentError> {
        if !path.is_file() {
            return Err(AgentError::InvalidArguments(format!(
                "configuration file not found: {}",
                path.display()
            )));
        }
        let builder = sources::add_optional_file(Config::builder(), path);
        let builder = sources::add_environment(builder)?;
        Self::finish(builder.build()?)
    }

    fn finish(config: Config) -> Result<AgentSettings, AgentError> {
        let settings: AgentSettings = config.try_deserialize()?;
        settings.validate()?;
        info!(
            interval_secs = settings.heartbeat.interval_secs,
            keys_dir = %settings.sysconfig.keys_dir.display(),
            backends = settings.sysconfig.backends.len(),
            rules = settings.authorization.rules.len(),
            "Configuration loaded"
        );
        Ok(settings)
    }
}
