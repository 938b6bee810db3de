//! Host and network control backends.
//!
//! Mutating OS operations. These shell out, so they are async and run on
//! tokio's process support.

use crate::error::AgentError;
use async_trait::async_trait;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::{debug, info};

#[async_trait]
pub trait HostControl: Send + Sync {
    async fn reboot(&self) -> Result<(), AgentError>;
    async fn shutdown(&self) -> Result<(), AgentError>;
    /// Make the machine physically identifiable (blink a LED, beep).
    async fn identify(&self) -> Result<(), AgentError>;

    async fn power_profile(&self) -> Result<String, AgentError>;
    async fn set_power_profile(&self, profile: &str) -> Result<(), AgentError>;
    async fn power_profiles(&self) -> Result<Vec<String>, AgentError>;

    /// Operator-assigned UUID, if one was set.
    fn custom_uuid(&self) -> Result<Option<String>, AgentError>;
    fn set_custom_uuid(&self, uuid: &str) -> Result<(), AgentError>;
}

#[async_trait]
pub trait NetworkControl: Send + Sync {
    async fn start_interface(&self, name: &str) -> Result<(), AgentError>;
    async fn stop_interface(&self, name: &str) -> Result<(), AgentError>;
}

/// Run a program to completion and return its trimmed stdout.
///
/// A spawn failure or non-zero exit is a `Backend` error carrying stderr.
pub(crate) async fn run_program(program: &str, args: &[&str]) -> Result<String, AgentError> {
    debug!(program, ?args, "Running command");
    let output = Command::new(program)
        .args(args)
        .output()
        .await
        .map_err(|e| AgentError::Backend(format!("failed to run {}: {}", program, e)))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(AgentError::Backend(format!(
            "{} exited with {}: {}",
            program,
            output.status,
            stderr.trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// systemd and tuned based host control.
pub struct LinuxHostControl {
    custom_uuid_file: PathBuf,
}

impl LinuxHostControl {
    pub fn new(custom_uuid_file: PathBuf) -> Self {
        Self { custom_uuid_file }
    }
}

#[async_trait]
impl HostControl for LinuxHostControl {
    async fn reboot(&self) -> Result<(), AgentError> {
        info!("Rebooting host");
        run_program("systemctl", &["reboot"]).await.map(|_| ())
    }

    async fn shutdown(&self) -> Result<(), AgentError> {
        info!("Shutting down host");
        run_program("systemctl", &["poweroff"]).await.map(|_| ())
    }

    async fn identify(&self) -> Result<(), AgentError> {
        Err(AgentError::NotImplemented(
            "identify is not supported on Linux".to_string(),
        ))
    }

    async fn power_profile(&self) -> Result<String, AgentError> {
        let output = run_program("tuned-adm", &["active"]).await?;
        parse_active_profile(&output).ok_or_else(|| {
            AgentError::Backend(format!("unexpected tuned-adm output: {}", output))
        })
    }

    async fn set_power_profile(&self, profile: &str) -> Result<(), AgentError> {
        if profile.is_empty() {
            return Err(AgentError::InvalidArguments(
                "power profile must not be empty".to_string(),
            ));
        }
        run_program("tuned-adm", &["profile", profile]).await.map(|_| ())
    }

    async fn power_profiles(&self) -> Result<Vec<String>, AgentError> {
        Ok(parse_profile_list(&run_program("tuned-adm", &["list"]).await?))
    }

    fn custom_uuid(&self) -> Result<Option<String>, AgentError> {
        match fs::read_to_string(&self.custom_uuid_file) {
            Ok(s) => Ok(Some(s.trim().to_string()).filter(|s| !s.is_empty())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AgentError::Backend(format!(
                "failed to read {}: {}",
                self.custom_uuid_file.display(),
                e
            ))),
        }
    }

    fn set_custom_uuid(&self, uuid: &str) -> Result<(), AgentError> {
        if let Some(parent) = self.custom_uuid_file.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.custom_uuid_file, format!("{}\n", uuid))?;
        Ok(())
    }
}

/// ifup/ifdown based interface control.
#[derive(Debug, Default)]
pub struct LinuxNetworkControl;

#[async_trait]
impl NetworkControl for LinuxNetworkControl {
    async fn start_interface(&self, name: &str) -> Result<(), AgentError> {
        info!(iface = name, "Bringing interface up");
        run_program("ifup", &[name]).await.map(|_| ())
    }

    async fn stop_interface(&self, name: &str) -> Result<(), AgentError> {
        info!(iface = name, "Bringing interface down");
        run_program("ifdown", &[name]).await.map(|_| ())
    }
}

fn parse_active_profile(output: &str) -> Option<String> {
    output
        .lines()
        .find_map(|line| line.strip_prefix("Current active profile:"))
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
}

fn parse_profile_list(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| line.trim().strip_prefix("- "))
        .map(|entry| {
            // "- balanced   - General non-specialized tuned profile"
            entry
                .split_whitespace()
                .next()
                .unwrap_or_default()
                .to_string()
        })
        .filter(|name| !name.is_empty())
        .collect()
}
