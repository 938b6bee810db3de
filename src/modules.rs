//! Feature Modules
//!
//! A module is the feature unit attached to an agent: it declares the property
//! schema and methods of one interface and answers for them. Modules reach the
//! OS only through the narrow backends in [`sensors`] and [`control`].

pub mod control;
pub mod host;
pub mod network;
pub mod sensors;
pub mod static_host;
pub mod sysconfig;

pub use control::{HostControl, LinuxHostControl, LinuxNetworkControl, NetworkControl};
pub use host::HostModule;
pub use network::NetworkModule;
pub use sensors::{
    CpuInfo, LinuxSensors, LoadAverage, MemoryInfo, NetworkInterface, ProcessStats, SensorBackend,
};
pub use static_host::StaticSensors;
pub use sysconfig::SysconfigModule;

use crate::agent::{Agent, AgentIdentity};
use crate::config::AgentSettings;
use crate::dispatch::{MethodArgs, MethodReply};
use crate::error::AgentError;
use crate::property::{PropertySpec, PropertyValue};
use crate::sysconfig::{BackendRegistry, ConfigRecordStore, ConfigRunner};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Bus namespace shared by every interface.
pub const INTERFACE_PREFIX: &str = "org.hostwarden";

#[async_trait]
pub trait Module: Send + Sync {
    /// Short registry name, e.g. `host`
    fn name(&self) -> &'static str;

    /// Interface name, e.g. `org.hostwarden.Host`
    fn interface(&self) -> &'static str;

    fn properties(&self) -> Vec<PropertySpec>;

    fn methods(&self) -> &'static [&'static str];

    /// Install the module's private state on `agent`.
    fn init(&self, agent: &Arc<Agent>) -> Result<(), AgentError>;

    /// Begin background work. Called once after `init`.
    async fn start(&self, _agent: &Arc<Agent>) -> Result<(), AgentError> {
        Ok(())
    }

    /// Stop background work.
    async fn shutdown(&self, _agent: &Agent) {}

    fn get_property(&self, agent: &Agent, name: &str) -> Result<PropertyValue, AgentError>;

    /// Write a property. `value` has already been coerced to the declared type.
    fn set_property(
        &self,
        _agent: &Agent,
        name: &str,
        _value: PropertyValue,
    ) -> Result<(), AgentError> {
        Err(AgentError::InvalidArguments(format!(
            "property '{}' is read-only",
            name
        )))
    }

    async fn invoke(
        &self,
        agent: &Arc<Agent>,
        method: &str,
        args: MethodArgs,
    ) -> Result<MethodReply, AgentError>;

    /// Called after a successful write. Re-broadcasts through the agent by default.
    fn properties_changed(&self, agent: &Agent, names: &[String]) {
        agent.update_properties(self.interface(), names);
    }
}

pub(crate) fn unknown_property(interface: &str, name: &str) -> AgentError {
    AgentError::InvalidArguments(format!("no property '{}' on {}", name, interface))
}

pub(crate) fn unknown_method(interface: &str, method: &str) -> AgentError {
    AgentError::NotImplemented(format!("no method '{}' on {}", method, interface))
}

/// Everything the built-in modules need from the outside world.
#[derive(Clone)]
pub struct ModuleDeps {
    pub sensors: Arc<dyn SensorBackend>,
    pub host_control: Arc<dyn HostControl>,
    pub network_control: Arc<dyn NetworkControl>,
    pub config_runner: Arc<ConfigRunner>,
    pub heartbeat_interval: Duration,
}

impl ModuleDeps {
    /// Linux backends configured from settings.
    pub fn linux(settings: &AgentSettings) -> Self {
        let store = ConfigRecordStore::new(settings.sysconfig.keys_dir.clone());
        let backends = BackendRegistry::from_commands(&settings.sysconfig.backends);
        Self {
            sensors: Arc::new(LinuxSensors::new()),
            host_control: Arc::new(LinuxHostControl::new(settings.host.custom_uuid_file.clone())),
            network_control: Arc::new(LinuxNetworkControl),
            config_runner: Arc::new(ConfigRunner::new(store, backends)),
            heartbeat_interval: settings.heartbeat.interval(),
        }
    }

    /// Every backend served by one in-memory host.
    pub fn in_memory(host: Arc<StaticSensors>, runner: Arc<ConfigRunner>) -> Self {
        Self {
            sensors: host.clone(),
            host_control: host.clone(),
            network_control: host,
            config_runner: runner,
            heartbeat_interval: crate::heartbeat::DEFAULT_INTERVAL,
        }
    }

    /// Identity for a new agent: the live hostname and the machine UUID.
    ///
    /// Falls back to a random UUID when the machine has none.
    pub fn identity(&self) -> Result<AgentIdentity, AgentError> {
        let hostname = self.sensors.hostname()?;
        let uuid = match self.sensors.machine_uuid() {
            Ok(Some(uuid)) => uuid,
            Ok(None) => uuid::Uuid::new_v4().to_string(),
            Err(e) => {
                warn!(error = %e, "Machine UUID unavailable, using a random one");
                uuid::Uuid::new_v4().to_string()
            }
        };
        Ok(AgentIdentity::new(&hostname, &uuid))
    }
}

type ModuleFactory = Box<dyn Fn(&ModuleDeps) -> Arc<dyn Module> + Send + Sync>;

/// Name → module factory.
pub struct ModuleRegistry {
    deps: ModuleDeps,
    factories: BTreeMap<&'static str, ModuleFactory>,
}

impl ModuleRegistry {
    pub fn new(deps: ModuleDeps) -> Self {
        Self {
            deps,
            factories: BTreeMap::new(),
        }
    }

    /// Registry with `host`, `network` and `sysconfig`.
    pub fn builtin(deps: ModuleDeps) -> Self {
        let mut registry = Self::new(deps);
        registry.register(host::MODULE_NAME, |deps: &ModuleDeps| -> Arc<dyn Module> {
            Arc::new(HostModule::new(
                deps.sensors.clone(),
                deps.host_control.clone(),
                deps.heartbeat_interval,
            ))
        });
        registry.register(network::MODULE_NAME, |deps: &ModuleDeps| -> Arc<dyn Module> {
            Arc::new(NetworkModule::new(
                deps.sensors.clone(),
                deps.network_control.clone(),
            ))
        });
        registry.register(sysconfig::MODULE_NAME, |deps: &ModuleDeps| -> Arc<dyn Module> {
            Arc::new(SysconfigModule::new(deps.config_runner.clone()))
        });
        registry
    }

    pub fn register<F>(&mut self, name: &'static str, factory: F)
    where
        F: Fn(&ModuleDeps) -> Arc<dyn Module> + Send + Sync + 'static,
    {
        self.factories.insert(name, Box::new(factory));
    }

    pub fn deps(&self) -> &ModuleDeps {
        &self.deps
    }

    pub fn create(&self, name: &str) -> Result<Arc<dyn Module>, AgentError> {
        let factory = self.factories.get(name).ok_or_else(|| {
            AgentError::InvalidArguments(format!(
                "unknown module '{}' (available: {})",
                name,
                self.names().join(", ")
            ))
        })?;
        Ok(factory(&self.deps))
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.factories.keys().copied().collect()
    }
}
