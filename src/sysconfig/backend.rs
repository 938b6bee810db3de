//! Configuration backends.
//!
//! A backend turns a configuration source into an applied state. Backends are
//! selected by scheme name; an unregistered scheme is `NotImplemented`.

use super::key::ConfigKey;
use crate::config::CommandBackendConfig;
use crate::error::AgentError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::{debug, info};

/// Where the configuration text comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// `file://`, `http(s)://` or a bare local path
    Uri(String),
    /// Inline configuration text
    Text(String),
}

#[async_trait]
pub trait ConfigBackend: Send + Sync {
    /// Apply `source`. The returned string is the human-readable status.
    async fn run(&self, source: &ConfigSource, flags: u32, key: &ConfigKey)
        -> Result<String, AgentError>;

    /// Evaluate a query. `None` means the backend has no answer.
    async fn query(&self, text: &str, flags: u32) -> Result<Option<String>, AgentError>;
}

/// Resolves URIs to configuration text. Every failure is a `Download` error.
#[derive(Debug, Clone, Default)]
pub struct UriFetcher {
    client: reqwest::Client,
}

impl UriFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn fetch(&self, uri: &str) -> Result<String, AgentError> {
        if uri.starts_with("http://") || uri.starts_with("https://") {
            return self.fetch_http(uri).await;
        }
        let path = match uri.strip_prefix("file://") {
            Some(path) => path,
            None if uri.contains("://") => {
                return Err(AgentError::Download(format!("unsupported URI: {}", uri)));
            }
            None => uri,
        };
        debug!(path, "Reading configuration from file");
        tokio::fs::read_to_string(path)
            .await
            .map_err(|e| AgentError::Download(format!("could not read {}: {}", path, e)))
    }

    async fn fetch_http(&self, uri: &str) -> Result<String, AgentError> {
        debug!(uri, "Downloading configuration");
        let response = self
            .client
            .get(uri)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AgentError::Download(format!("could not download {}: {}", uri, e)))?;
        response
            .text()
            .await
            .map_err(|e| AgentError::Download(format!("could not read body of {}: {}", uri, e)))
    }
}

/// Backend that pipes configuration text into an external program.
///
/// stdout becomes the status. A non-zero exit is a `Backend` error carrying
/// stderr. The key and flags are passed as `HOSTWARDEN_CONFIG_KEY` and
/// `HOSTWARDEN_CONFIG_FLAGS`.
pub struct CommandBackend {
    scheme: String,
    config: CommandBackendConfig,
    fetcher: UriFetcher,
}

impl CommandBackend {
    pub fn new(scheme: &str, config: CommandBackendConfig) -> Self {
        Self {
            scheme: scheme.to_string(),
            config,
            fetcher: UriFetcher::new(),
        }
    }

    async fn pipe(
        &self,
        args: &[String],
        input: &str,
        envs: &[(&str, String)],
    ) -> Result<String, AgentError> {
        let mut child = Command::new(&self.config.program)
            .args(args)
            .envs(envs.iter().map(|(k, v)| (*k, v.as_str())))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                AgentError::Backend(format!(
                    "{}: failed to start {}: {}",
                    self.scheme, self.config.program, e
                ))
            })?;

        // stdin is fed from its own task while stdout/stderr drain alongside wait().
        let stdin = child.stdin.take();
        let input = input.as_bytes().to_vec();
        let writer = tokio::spawn(async move {
            match stdin {
                Some(mut stdin) => stdin.write_all(&input).await,
                None => Ok(()),
            }
        });

        let mut stdout = child.stdout.take();
        let mut stderr = child.stderr.take();
        let (status, stdout, stderr) =
            tokio::join!(child.wait(), drain(stdout.as_mut()), drain(stderr.as_mut()));
        let status = status.map_err(|e| AgentError::Backend(format!("{}: {}", self.scheme, e)))?;

        match writer.await {
            Ok(Ok(())) => {}
            // The program exited without reading its input; its status decides.
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                debug!(scheme = %self.scheme, "Backend closed stdin early");
            }
            Ok(Err(e)) => {
                return Err(AgentError::Backend(format!(
                    "{}: failed to write input: {}",
                    self.scheme, e
                )));
            }
            Err(e) => {
                return Err(AgentError::Backend(format!(
                    "{}: input writer failed: {}",
                    self.scheme, e
                )));
            }
        }

        let output = std::process::Output { status, stdout, stderr };
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AgentError::Backend(format!(
                "{} exited with {}: {}",
                self.config.program,
                output.status,
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl ConfigBackend for CommandBackend {
    async fn run(
        &self,
        source: &ConfigSource,
        flags: u32,
        key: &ConfigKey,
    ) -> Result<String, AgentError> {
        let text = match source {
            ConfigSource::Text(text) => text.clone(),
            ConfigSource::Uri(uri) => self.fetcher.fetch(uri).await?,
        };
        info!(scheme = %self.scheme, key = %key, bytes = text.len(), "Applying configuration");
        let envs = [
            ("HOSTWARDEN_CONFIG_KEY", key.to_string()),
            ("HOSTWARDEN_CONFIG_FLAGS", flags.to_string()),
        ];
        self.pipe(&self.config.args, &text, &envs).await
    }

    async fn query(&self, text: &str, flags: u32) -> Result<Option<String>, AgentError> {
        if self.config.query_args.is_empty() {
            return Ok(None);
        }
        let envs = [("HOSTWARDEN_CONFIG_FLAGS", flags.to_string())];
        let out = self.pipe(&self.config.query_args, text, &envs).await?;
        Ok(Some(out).filter(|s| !s.is_empty()))
    }
}

async fn drain<R: AsyncRead + Unpin>(pipe: Option<&mut R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(pipe) = pipe {
        if let Err(e) = pipe.read_to_end(&mut buf).await {
            debug!(error = %e, "Backend output pipe closed with error");
        }
    }
    buf
}

/// Scheme name → backend. Scheme lookup ignores case.
#[derive(Clone, Default)]
pub struct BackendRegistry {
    backends: HashMap<String, Arc<dyn ConfigBackend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// One `CommandBackend` per configured scheme.
    pub fn from_commands(commands: &HashMap<String, CommandBackendConfig>) -> Self {
        let mut registry = Self::new();
        for (scheme, config) in commands {
            registry.register(scheme, Arc::new(CommandBackend::new(scheme, config.clone())));
        }
        registry
    }

    pub fn register(&mut self, scheme: &str, backend: Arc<dyn ConfigBackend>) {
        self.backends.insert(scheme.to_ascii_lowercase(), backend);
    }

    pub fn get(&self, scheme: &str) -> Result<Arc<dyn ConfigBackend>, AgentError> {
        self.backends
            .get(&scheme.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| {
                AgentError::NotImplemented(format!("unsupported configuration scheme '{}'", scheme))
            })
    }

    pub fn schemes(&self) -> Vec<String> {
        let mut schemes: Vec<String> = self.backends.keys().cloned().collect();
        schemes.sort();
        schemes
    }
}
