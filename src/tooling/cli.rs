//! CLI Tooling
//!
//! Command-line front end for one-shot property and method requests, and for
//! running a module as a long-lived agent.

use crate::agent::{Agent, AgentTransport, BusMessage, BusTransport};
use crate::auth::{AuthorizationGate, CallerContext, PolicyTable};
use crate::config::{AgentSettings, ConfigLoader};
use crate::dispatch::{Dispatcher, MethodArgs, MethodReply};
use crate::error::{AgentError, ResultCode};
use crate::logging::LoggingConfig;
use crate::modules::{sysconfig, ModuleDeps, ModuleRegistry};
use crate::property::{Access, PropertyValue};
use crate::sysconfig::FLAG_FORCE;
use clap::{Parser, Subcommand};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, oneshot};
use tracing::{info, warn};

/// Sender name used for requests made from the command line.
pub const DEFAULT_CALLER: &str = "local";

/// Hostwarden - host management agent
#[derive(Parser)]
#[command(name = "hostwarden")]
#[command(about = "Host management agent exposing host, network and sysconfig modules")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file, file+stderr, both)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output includes "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Caller identity presented to the authorization policy
    #[arg(long, default_value = DEFAULT_CALLER)]
    pub caller: String,
}

impl Cli {
    /// Fold the logging flags over the configured logging table.
    pub fn logging_config(&self, base: &LoggingConfig) -> LoggingConfig {
        let mut config = base.clone();
        if let Some(level) = &self.log_level {
            config.level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.format = format.clone();
        }
        if let Some(output) = &self.log_output {
            config.output = output.clone();
        }
        if self.log_file.is_some() {
            config.file = self.log_file.clone();
        }
        config
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Attach a module to an agent and serve until Ctrl-C
    Run {
        #[arg(long)]
        module: String,
    },
    /// List available modules
    Modules,
    /// Show the property schema of a module
    Properties {
        #[arg(long)]
        module: String,
    },
    /// Read a property
    Get {
        #[arg(long)]
        module: String,
        #[arg(long)]
        property: String,
    },
    /// Write a property
    Set {
        #[arg(long)]
        module: String,
        #[arg(long)]
        property: String,
        #[arg(long)]
        value: String,
    },
    /// Invoke a module method with positional arguments
    Call {
        #[arg(long)]
        module: String,
        #[arg(long)]
        method: String,
        args: Vec<String>,
    },
    /// Apply a configuration under a key and wait for the result
    Apply {
        #[arg(long, conflicts_with = "text", required_unless_present = "text")]
        uri: Option<String>,
        #[arg(long)]
        text: Option<String>,
        #[arg(long)]
        scheme: String,
        #[arg(long)]
        key: String,
        /// Re-apply even if the key is already configured
        #[arg(long)]
        force: bool,
    },
    /// Show the recorded configuration status of a key
    IsConfigured {
        #[arg(long)]
        key: String,
    },
    /// Record configuration status for a key directly
    SetConfigured {
        #[arg(long)]
        key: String,
        #[arg(long)]
        contents: String,
    },
    /// Ask a configuration backend a question
    Query {
        #[arg(long)]
        scheme: String,
        #[arg(long)]
        text: String,
        #[arg(long, default_value_t = 0)]
        flags: u32,
    },
}

/// CLI execution context
pub struct CliContext {
    settings: AgentSettings,
    registry: ModuleRegistry,
    caller: CallerContext,
}

impl CliContext {
    /// Load settings and wire the Linux backends.
    pub fn new(config_path: Option<PathBuf>, caller: &str) -> Result<Self, AgentError> {
        let settings = match &config_path {
            Some(path) => ConfigLoader::load_from_file(path)?,
            None => ConfigLoader::load()?,
        };
        let registry = ModuleRegistry::builtin(ModuleDeps::linux(&settings));
        Ok(Self::from_parts(settings, registry, caller))
    }

    pub fn from_parts(settings: AgentSettings, registry: ModuleRegistry, caller: &str) -> Self {
        Self {
            settings,
            registry,
            caller: CallerContext::new(caller),
        }
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    /// Create `module` on a fresh agent that publishes on its own bus channel.
    fn attach(&self, module: &str) -> Result<(Dispatcher, Arc<BusTransport>), AgentError> {
        let module = self.registry.create(module)?;
        let transport = Arc::new(BusTransport::new(
            module.interface(),
            self.settings.bus.channel_capacity,
        ));
        let identity = self.registry.deps().identity()?;
        let agent = Arc::new(Agent::new(
            identity,
            transport.clone() as Arc<dyn AgentTransport>,
        ));
        let gate = AuthorizationGate::new(Arc::new(PolicyTable::new(
            self.settings.authorization.rules.clone(),
        )));
        Ok((Dispatcher::new(agent, module, gate)?, transport))
    }

    pub async fn execute(&self, command: &Commands) -> Result<String, AgentError> {
        match command {
            Commands::Run { module } => self.run(module).await,
            Commands::Modules => self.list_modules(),
            Commands::Properties { module } => {
                let (dispatcher, _) = self.attach(module)?;
                let output = format_schema(&dispatcher);
                dispatcher.shutdown().await;
                Ok(output)
            }
            Commands::Get { module, property } => {
                let (dispatcher, _) = self.attach(module)?;
                let interface = dispatcher.interface();
                let result = dispatcher.handle_get(interface, property, &self.caller).await;
                dispatcher.shutdown().await;
                Ok(result?.to_string())
            }
            Commands::Set {
                module,
                property,
                value,
            } => {
                let (dispatcher, _) = self.attach(module)?;
                let result = self.set(&dispatcher, property, value).await;
                dispatcher.shutdown().await;
                result
            }
            Commands::Call {
                module,
                method,
                args,
            } => {
                let (dispatcher, _) = self.attach(module)?;
                let interface = dispatcher.interface();
                let result = dispatcher
                    .handle_invoke(interface, method, MethodArgs::from_strings(args), &self.caller)
                    .await;
                dispatcher.shutdown().await;
                Ok(format_reply(&result?))
            }
            Commands::Apply {
                uri,
                text,
                scheme,
                key,
                force,
            } => {
                let (method, source) = match (uri, text) {
                    (Some(uri), _) => ("run_uri", uri.clone()),
                    (None, Some(text)) => ("run_string", text.clone()),
                    (None, None) => {
                        return Err(AgentError::InvalidArguments(
                            "one of --uri or --text is required".to_string(),
                        ))
                    }
                };
                let flags = if *force { FLAG_FORCE } else { 0 };
                let args = vec![source, flags.to_string(), scheme.clone(), key.clone()];
                self.apply(method, args).await
            }
            Commands::IsConfigured { key } => {
                self.sysconfig_call("is_configured", vec![key.clone()]).await
            }
            Commands::SetConfigured { key, contents } => {
                self.sysconfig_call("set_configured", vec![key.clone(), contents.clone()])
                    .await?;
                Ok(format!("{} recorded", key))
            }
            Commands::Query {
                scheme,
                text,
                flags,
            } => {
                self.sysconfig_call("query", vec![text.clone(), flags.to_string(), scheme.clone()])
                    .await
            }
        }
    }

    fn list_modules(&self) -> Result<String, AgentError> {
        let mut table = comfy_table::Table::new();
        table.load_preset(comfy_table::presets::UTF8_FULL);
        table.set_header(vec!["Module", "Interface", "Methods"]);
        for name in self.registry.names() {
            let module = self.registry.create(name)?;
            table.add_row(vec![
                name.to_string(),
                module.interface().to_string(),
                module.methods().join(", "),
            ]);
        }
        Ok(table.to_string())
    }

    async fn set(
        &self,
        dispatcher: &Dispatcher,
        property: &str,
        raw: &str,
    ) -> Result<String, AgentError> {
        // Unknown names pass through as text so the dispatcher reports them.
        let value = match dispatcher
            .schema()
            .into_iter()
            .find(|p| p.spec.name == property)
        {
            Some(registered) => registered.native.parse_value(raw)?,
            None => PropertyValue::Str(raw.to_string()),
        };
        let shown = value.to_string();
        dispatcher
            .handle_set(dispatcher.interface(), property, value, &self.caller)
            .await?;
        Ok(format!("{} = {}", property, shown))
    }

    async fn sysconfig_call(&self, method: &str, args: Vec<String>) -> Result<String, AgentError> {
        let (dispatcher, _) = self.attach(sysconfig::MODULE_NAME)?;
        let result = dispatcher
            .handle_invoke(
                sysconfig::INTERFACE,
                method,
                MethodArgs::from_strings(args),
                &self.caller,
            )
            .await;
        dispatcher.shutdown().await;
        Ok(format_reply(&result?))
    }

    /// Start a run and wait for its completion callback.
    async fn apply(&self, method: &str, args: Vec<String>) -> Result<String, AgentError> {
        let (dispatcher, _) = self.attach(sysconfig::MODULE_NAME)?;
        let (tx, rx) = oneshot::channel();
        let tx = Mutex::new(Some(tx));
        dispatcher
            .agent()
            .set_callback(Arc::new(move |code: ResultCode, status: String| {
                if let Some(tx) = tx.lock().take() {
                    let _ = tx.send((code, status));
                }
            }));

        let reply = dispatcher
            .handle_invoke(
                sysconfig::INTERFACE,
                method,
                MethodArgs::from_strings(args),
                &self.caller,
            )
            .await;
        let reply = match reply {
            Ok(reply) => reply,
            Err(e) => {
                dispatcher.shutdown().await;
                return Err(e);
            }
        };
        let started = reply
            .first()
            .and_then(|v| v.as_u32())
            .and_then(ResultCode::from_u32);
        let outcome = if started == Some(ResultCode::Async) {
            rx.await.map_err(|_| {
                AgentError::Other("configuration run ended without a result".to_string())
            })
        } else {
            Err(AgentError::Other(format!(
                "unexpected reply to {}: {}",
                method,
                format_reply(&reply)
            )))
        };
        dispatcher.shutdown().await;

        let (code, status) = outcome?;
        match AgentError::from_code(code, status.clone()) {
            Some(error) => Err(error),
            None => Ok(status),
        }
    }

    async fn run(&self, module: &str) -> Result<String, AgentError> {
        let (dispatcher, transport) = self.attach(module)?;
        let mut rx = transport.subscribe();
        dispatcher.start().await?;
        info!(
            module,
            interface = dispatcher.interface(),
            hostname = dispatcher.agent().hostname(),
            uuid = dispatcher.agent().uuid(),
            "Agent running"
        );

        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                signal = &mut shutdown => {
                    if let Err(e) = signal {
                        warn!(error = %e, "Signal handler failed, stopping");
                    }
                    break;
                }
                message = rx.recv() => match message {
                    Ok(BusMessage::Event(event)) => {
                        let args = serde_json::to_string(&event.args).unwrap_or_default();
                        info!(event = %event.name, args = %args, "Event");
                    }
                    Ok(BusMessage::PropertiesChanged { interface, names }) => {
                        info!(interface = %interface, properties = ?names, "Properties changed");
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Bus monitor lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }

        dispatcher.shutdown().await;
        Ok(format!("{} stopped", module))
    }
}

fn format_schema(dispatcher: &Dispatcher) -> String {
    let mut table = comfy_table::Table::new();
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.set_header(vec!["Property", "Type", "Access", "Description"]);
    for property in dispatcher.schema() {
        let access = match property.spec.access {
            Access::ReadOnly => "r",
            Access::ReadWrite => "rw",
        };
        table.add_row(vec![
            property.spec.name.clone(),
            format!("{} ({})", property.native, property.spec.type_tag),
            access.to_string(),
            property.spec.description.clone(),
        ]);
    }
    table.to_string()
}

fn format_reply(reply: &MethodReply) -> String {
    reply
        .values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}
