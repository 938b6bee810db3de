//! Network module (`org.hostwarden.Network`)

use super::{unknown_method, unknown_property, Module, NetworkControl, SensorBackend};
use crate::agent::Agent;
use crate::dispatch::{MethodArgs, MethodReply};
use crate::error::AgentError;
use crate::property::{PropertySpec, PropertyValue};
use async_trait::async_trait;
use std::net::Ipv4Addr;
use std::sync::Arc;

pub const MODULE_NAME: &str = "network";
pub const INTERFACE: &str = "org.hostwarden.Network";

/// Interface is up.
pub const STATUS_UP: u32 = 0;
/// Interface is down or unknown.
pub const STATUS_INACTIVE: u32 = 1;
/// No interface name was given.
pub const STATUS_NO_INTERFACE: u32 = 3;

const METHODS: &[&str] = &[
    "list",
    "start",
    "stop",
    "restart",
    "status",
    "get_ip_address",
    "get_mac_address",
];

/// Marker owning the agent's private slot; the module keeps no other state.
struct NetworkState;

pub struct NetworkModule {
    sensors: Arc<dyn SensorBackend>,
    control: Arc<dyn NetworkControl>,
}

impl NetworkModule {
    pub fn new(sensors: Arc<dyn SensorBackend>, control: Arc<dyn NetworkControl>) -> Self {
        Self { sensors, control }
    }

    /// Status code for `iface`; see the `STATUS_*` constants.
    pub fn interface_status(&self, iface: Option<&str>) -> Result<u32, AgentError> {
        let Some(name) = iface.filter(|n| !n.is_empty()) else {
            return Ok(STATUS_NO_INTERFACE);
        };
        Ok(match self.sensors.interface(name)? {
            Some(found) if found.up => STATUS_UP,
            _ => STATUS_INACTIVE,
        })
    }

    fn require(&self, iface: &str) -> Result<super::NetworkInterface, AgentError> {
        self.sensors.interface(iface)?.ok_or_else(|| {
            AgentError::InvalidArguments(format!("no such interface: {}", iface))
        })
    }
}

#[async_trait]
impl Module for NetworkModule {
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
        ]
    }

    fn methods(&self) -> &'static [&'static str] {
        METHODS
    }

    fn init(&self, agent: &Arc<Agent>) -> Result<(), AgentError> {
        agent.set_private(MODULE_NAME, Arc::new(NetworkState));
        Ok(())
    }

    fn get_property(&self, agent: &Agent, name: &str) -> Result<PropertyValue, AgentError> {
        match name {
            "uuid" => Ok(agent.uuid().into()),
            "hostname" => Ok(agent.hostname().into()),
            other => Err(unknown_property(INTERFACE, other)),
        }
    }

    async fn invoke(
        &self,
        _agent: &Arc<Agent>,
        method: &str,
        args: MethodArgs,
    ) -> Result<MethodReply, AgentError> {
        let iface = args.get(0).map(|v| v.to_string());
        match method {
            "list" => {
                let names: Vec<String> = self
                    .sensors
                    .network_interfaces()?
                    .into_iter()
                    .map(|i| i.name)
                    .collect();
                Ok(MethodReply::single(names))
            }
            "start" | "stop" => {
                let name = args.str(0, "iface")?;
                if method == "start" {
                    self.control.start_interface(&name).await?;
                } else {
                    self.control.stop_interface(&name).await?;
                }
                Ok(MethodReply::single(self.interface_status(Some(&name))?))
            }
            "restart" => {
                let name = args.str(0, "iface")?;
                self.control.stop_interface(&name).await?;
                self.control.start_interface(&name).await?;
                Ok(MethodReply::empty())
            }
            "status" => Ok(MethodReply::single(self.interface_status(iface.as_deref())?)),
            "get_ip_address" => {
                let found = self.require(&args.str(0, "iface")?)?;
                let ip = found.ipv4.unwrap_or(Ipv4Addr::UNSPECIFIED);
                Ok(MethodReply::single(ip.to_string()))
            }
            "get_mac_address" => {
                let found = self.require(&args.str(0, "iface")?)?;
                Ok(MethodReply::single(found.mac_string()))
            }
            other => Err(unknown_method(INTERFACE, other)),
        }
    }
}
