//! Builder sources, one function per layer.

use super::paths;
use config::builder::DefaultState;
use config::{ConfigBuilder, ConfigError, Environment, File, FileFormat};
use std::path::Path;
use tracing::debug;

pub const ENV_PREFIX: &str = "HOSTWARDEN";

/// Optional TOML file; a missing file is skipped.
pub fn add_optional_file(
    builder: ConfigBuilder<DefaultState>,
    path: &Path,
) -> ConfigBuilder<DefaultState> {
    debug!(path = %path.display(), exists = path.exists(), "Config file source");
    builder.add_source(
        File::from(path)
            .format(FileFormat::Toml)
            .required(false),
    )
}

/// `/etc/hostwarden/config.toml`
pub fn add_system_file(builder: ConfigBuilder<DefaultState>) -> ConfigBuilder<DefaultState> {
    add_optional_file(builder, &paths::system_config_path())
}

/// `$XDG_CONFIG_HOME/hostwarden/config.toml`, when a home directory is known.
pub fn add_user_file(builder: ConfigBuilder<DefaultState>) -> ConfigBuilder<DefaultState> {
    match paths::user_config_path() {
        Ok(path) => add_optional_file(builder, &path),
        Err(e) => {
            debug!(error = %e, "Skipping user config file");
            builder
        }
    }
}

/// Environment variable overlay.
/// Uses the HOSTWARDEN prefix and `__` as separator for nested keys.
pub fn add_environment(
    builder: ConfigBuilder<DefaultState>,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Ok(builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .try_parsing(true),
    ))
}
