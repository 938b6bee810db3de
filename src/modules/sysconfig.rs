//! Sysconfig module (`org.hostwarden.Sysconfig`)
//!
//! Exposes the config runner over the bus. `run_uri` and `run_string` reply
//! with the `Async` result code; the outcome arrives through the agent's
//! completion callback.

use super::{unknown_method, unknown_property, Module};
use crate::agent::Agent;
use crate::dispatch::{MethodArgs, MethodReply};
use crate::error::AgentError;
use crate::property::{PropertySpec, PropertyValue};
use crate::sysconfig::{ConfigRunner, ConfigSource};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

pub const MODULE_NAME: &str = "sysconfig";
pub const INTERFACE: &str = "org.hostwarden.Sysconfig";

const METHODS: &[&str] = &["run_uri", "run_string", "query", "is_configured", "set_configured"];

#[derive(Default)]
struct SysconfigState {
    is_postboot_configured: AtomicU32,
}

pub struct SysconfigModule {
    runner: Arc<ConfigRunner>,
}

impl SysconfigModule {
    pub fn new(runner: Arc<ConfigRunner>) -> Self {
        Self { runner }
    }

    pub fn runner(&self) -> &Arc<ConfigRunner> {
        &self.runner
    }

    /// `(source, flags, scheme, key)` for `run_uri` / `run_string`.
    fn run(
        &self,
        agent: &Arc<Agent>,
        source: ConfigSource,
        args: &MethodArgs,
    ) -> Result<MethodReply, AgentError> {
        let flags = args.u32(1, "flags")?;
        let scheme = args.str(2, "scheme")?;
        let key = args.str(3, "key")?;
        let code = self.runner.apply(agent, source, flags, &scheme, &key)?;
        Ok(MethodReply::single(code as u32))
    }
}

#[async_trait]
impl Module for SysconfigModule {
    fn name(&self) -> &'static str {
        MODULE_NAME
    }

    fn interface(&self) -> &'static str {
        INTERFACE
    }

    fn properties(&self) -> Vec<PropertySpec> {
        vec![
            PropertySpec::read_only("uuid", "Host UUID", "sstr"),
            PropertySpec::read_only("hostname", "Host name", "sstr"),
            PropertySpec::read_write(
                "is_postboot_configured",
                "Post-boot configuration marker",
                "uint32",
            ),
        ]
    }

    fn methods(&self) -> &'static [&'static str] {
        METHODS
    }

    fn init(&self, agent: &Arc<Agent>) -> Result<(), AgentError> {
        agent.set_private(MODULE_NAME, Arc::new(SysconfigState::default()));
        Ok(())
    }

    fn get_property(&self, agent: &Agent, name: &str) -> Result<PropertyValue, AgentError> {
        match name {
            "uuid" => Ok(agent.uuid().into()),
            "hostname" => Ok(agent.hostname().into()),
            "is_postboot_configured" => {
                let state = agent.private::<SysconfigState>()?;
                Ok(PropertyValue::UInt(state.is_postboot_configured.load(Ordering::SeqCst)))
            }
            other => Err(unknown_property(INTERFACE, other)),
        }
    }

    fn set_property(&self, agent: &Agent, name: &str, value: PropertyValue) -> Result<(), AgentError> {
        match name {
            "is_postboot_configured" => {
                let flag = value.as_u32().ok_or_else(|| {
                    AgentError::InvalidArguments(
                        "is_postboot_configured must be a uint32".to_string(),
                    )
                })?;
                agent
                    .private::<SysconfigState>()?
                    .is_postboot_configured
                    .store(flag, Ordering::SeqCst);
                Ok(())
            }
            other => Err(AgentError::InvalidArguments(format!(
                "property '{}' is read-only",
                other
            ))),
        }
    }

    async fn invoke(
        &self,
        agent: &Arc<Agent>,
        method: &str,
        args: MethodArgs,
    ) -> Result<MethodReply, AgentError> {
        match method {
            "run_uri" => {
                let uri = args.str(0, "uri")?;
                self.run(agent, ConfigSource::Uri(uri), &args)
            }
            "run_string" => {
                let text = args.str(0, "text")?;
                self.run(agent, ConfigSource::Text(text), &args)
            }
            "query" => {
                let text = args.str(0, "text")?;
                let flags = args.u32(1, "flags")?;
                let scheme = args.str(2, "scheme")?;
                Ok(MethodReply::single(self.runner.query(&text, flags, &scheme).await?))
            }
            "is_configured" => {
                let key = args.str(0, "key")?;
                Ok(MethodReply::single(self.runner.is_configured(&key)?))
            }
            "set_configured" => {
                let key = args.str(0, "key")?;
                let contents = args.str(1, "contents")?;
                self.runner.set_configured(&key, &contents)?;
                Ok(MethodReply::empty())
            }
            other => Err(unknown_method(INTERFACE, other)),
        }
    }
}
