//! File-backed configuration records.
//!
//! One file per key under a single directory. Writes stage into a hidden
//! sibling and rename over the target, so readers never see a partial record.
//! Two processes writing the same key race and the last rename wins.

use super::key::ConfigKey;
use crate::error::AgentError;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

/// First-line marker of a successfully applied record.
pub const APPLIED_MARKER: &str = "OK";

#[derive(Debug, Clone)]
pub struct ConfigRecordStore {
    dir: PathBuf,
}

impl ConfigRecordStore {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn record_path(&self, key: &ConfigKey) -> PathBuf {
        self.dir.join(key.as_str())
    }

    /// Record contents, or `None` when no record exists.
    ///
    /// An unreadable record is treated as absent and logged.
    pub fn read(&self, key: &ConfigKey) -> Option<String> {
        let path = self.record_path(key);
        match fs::read_to_string(&path) {
            Ok(contents) => Some(contents),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Could not read config record");
                None
            }
        }
    }

    /// Replace the record for `key` with `contents`.
    pub fn write(&self, key: &ConfigKey, contents: &str) -> Result<(), AgentError> {
        if !self.dir.is_dir() {
            fs::create_dir_all(&self.dir).map_err(|e| {
                error!(dir = %self.dir.display(), error = %e, "Could not create keys directory");
                AgentError::Other(format!(
                    "could not create keys directory {}: {}",
                    self.dir.display(),
                    e
                ))
            })?;
        }

        let target = self.record_path(key);
        let staging = self.dir.join(key.staging_name());
        let result = fs::write(&staging, contents).and_then(|_| fs::rename(&staging, &target));
        if let Err(e) = result {
            let _ = fs::remove_file(&staging);
            error!(path = %target.display(), error = %e, "Could not write config record");
            return Err(AgentError::Other(format!(
                "could not set file {}: {}",
                target.display(),
                e
            )));
        }
        debug!(key = %key, bytes = contents.len(), "Config record written");
        Ok(())
    }

    /// Whether the record's first line is the applied marker (any case).
    pub fn is_applied(&self, key: &ConfigKey) -> bool {
        self.read(key)
            .and_then(|c| c.lines().next().map(|l| l.trim().eq_ignore_ascii_case(APPLIED_MARKER)))
            .unwrap_or(false)
    }
}
