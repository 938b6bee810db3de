//! Dispatcher
//!
//! Entry point for remote Get, Set and method calls on one agent. Every request
//! is authorized as `<interface>.<member>` first, then resolved against the
//! property registry (or passed to the module's method table). Values cross the
//! boundary in their declared native type. Failures land in the agent's error
//! slot; successes clear it.

pub mod method;

pub use method::{MethodArgs, MethodReply};

use crate::agent::Agent;
use crate::auth::{AuthorizationGate, CallerContext};
use crate::error::AgentError;
use crate::modules::Module;
use crate::property::{PropertyRegistry, PropertyValue, RegisteredProperty};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct Dispatcher {
    agent: Arc<Agent>,
    module: Arc<dyn Module>,
    registry: PropertyRegistry,
    gate: AuthorizationGate,
}

impl Dispatcher {
    /// Initialise `module` on `agent` and register its property schema.
    ///
    /// Schema entries with an unknown type tag are skipped and logged; the rest
    /// of the surface stays available.
    pub fn new(
        agent: Arc<Agent>,
        module: Arc<dyn Module>,
        gate: AuthorizationGate,
    ) -> Result<Self, AgentError> {
        module.init(&agent)?;
        let mut registry = PropertyRegistry::new();
        let specs = module.properties();
        let declared = specs.len();
        let registered = registry.register_all(specs);
        info!(
            module = module.name(),
            interface = module.interface(),
            registered,
            skipped = declared - registered,
            "Module attached"
        );
        Ok(Self {
            agent,
            module,
            registry,
            gate,
        })
    }

    pub fn agent(&self) -> &Arc<Agent> {
        &self.agent
    }

    pub fn module(&self) -> &Arc<dyn Module> {
        &self.module
    }

    pub fn interface(&self) -> &'static str {
        self.module.interface()
    }

    /// Registered properties in declaration order.
    pub fn schema(&self) -> Vec<&RegisteredProperty> {
        self.registry.iter().collect()
    }

    pub async fn start(&self) -> Result<(), AgentError> {
        self.module.start(&self.agent).await
    }

    /// Stop the module and release the agent's module state.
    pub async fn shutdown(&self) {
        self.module.shutdown(&self.agent).await;
        self.agent.teardown();
        info!(module = self.module.name(), "Module detached");
    }

    pub async fn handle_get(
        &self,
        interface: &str,
        name: &str,
        caller: &CallerContext,
    ) -> Result<PropertyValue, AgentError> {
        let result = self.get(interface, name, caller).await;
        self.record(result)
    }

    pub async fn handle_set(
        &self,
        interface: &str,
        name: &str,
        value: PropertyValue,
        caller: &CallerContext,
    ) -> Result<(), AgentError> {
        let result = self.set(interface, name, value, caller).await;
        self.record(result)
    }

    pub async fn handle_invoke(
        &self,
        interface: &str,
        method: &str,
        args: MethodArgs,
        caller: &CallerContext,
    ) -> Result<MethodReply, AgentError> {
        let result = self.invoke(interface, method, args, caller).await;
        self.record(result)
    }

    async fn get(
        &self,
        interface: &str,
        name: &str,
        caller: &CallerContext,
    ) -> Result<PropertyValue, AgentError> {
        self.gate.check(interface, name, caller).await?;
        let property = self.resolve(name)?;
        let raw = self.module.get_property(&self.agent, name)?;
        let value = property.native.coerce(raw).map_err(|e| {
            AgentError::Other(format!(
                "property '{}' produced a value outside its declared type: {}",
                name,
                e.message()
            ))
        })?;
        debug!(interface, property = name, "Get");
        Ok(value)
    }

    async fn set(
        &self,
        interface: &str,
        name: &str,
        value: PropertyValue,
        caller: &CallerContext,
    ) -> Result<(), AgentError> {
        self.gate.check(interface, name, caller).await?;
        let property = self.resolve(name)?;
        if !property.spec.access.is_writable() {
            return Err(AgentError::InvalidArguments(format!(
                "property '{}' is read-only",
                name
            )));
        }
        let value = property.native.coerce(value)?;
        self.module.set_property(&self.agent, name, value)?;
        debug!(interface, property = name, "Set");
        self.module.properties_changed(&self.agent, &[name.to_string()]);
        Ok(())
    }

    async fn invoke(
        &self,
        interface: &str,
        method: &str,
        args: MethodArgs,
        caller: &CallerContext,
    ) -> Result<MethodReply, AgentError> {
        self.gate.check(interface, method, caller).await?;
        debug!(interface, method, args = args.len(), "Invoke");
        self.module.invoke(&self.agent, method, args).await
    }

    fn resolve(&self, name: &str) -> Result<&RegisteredProperty, AgentError> {
        self.registry.get(name).ok_or_else(|| {
            AgentError::InvalidArguments(format!(
                "no property '{}' on {}",
                name,
                self.module.interface()
            ))
        })
    }

    fn record<T>(&self, result: Result<T, AgentError>) -> Result<T, AgentError> {
        match &result {
            Ok(_) => self.agent.clear_error(),
            Err(e) => {
                warn!(code = %e.code(), error = %e, "Request failed");
                self.agent.set_error(e.clone());
            }
        }
        result
    }
}
