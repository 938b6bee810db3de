//! Configuration file locations.

use crate::error::AgentError;
use std::path::PathBuf;

const APP_DIR: &str = "hostwarden";
const CONFIG_FILE: &str = "config.toml";

/// `/etc/hostwarden/config.toml`
pub fn system_config_path() -> PathBuf {
    PathBuf::from("/etc").join(APP_DIR).join(CONFIG_FILE)
}

/// Get XDG config home directory
///
/// Returns `$XDG_CONFIG_HOME` if set, otherwise `$HOME/.config`.
pub fn config_home() -> Result<PathBuf, AgentError> {
    if let Ok(xdg_config_home) = std::env::var("XDG_CONFIG_HOME") {
        if !xdg_config_home.is_empty() {
            return Ok(PathBuf::from(xdg_config_home));
        }
    }

    let home = std::env::var("HOME").map_err(|_| {
        AgentError::InvalidArguments(
            "could not determine XDG config home directory (HOME not set)".to_string(),
        )
    })?;
    Ok(PathBuf::from(home).join(".config"))
}

/// `$XDG_CONFIG_HOME/hostwarden/config.toml`
pub fn user_config_path() -> Result<PathBuf, AgentError> {
    Ok(config_home()?.join(APP_DIR).join(CONFIG_FILE))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_path() {
        assert_eq!(
            system_config_path(),
            PathBuf::from("/etc/hostwarden/config.toml")
        );
    }

    #[test]
    fn test_user_path_shape() {
        if let Ok(path) = user_config_path() {
            assert!(path.ends_with("hostwarden/config.toml"));
        }
    }
}
