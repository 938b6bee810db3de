//! Host module (`org.hostwarden.Host`)
//!
//! Machine identity, CPU/memory/load figures, power control and the heartbeat.

use super::{unknown_method, unknown_property, HostControl, Module, SensorBackend};
use crate::agent::Agent;
use crate::dispatch::{MethodArgs, MethodReply};
use crate::error::AgentError;
use crate::heartbeat::{HeartbeatEmitter, HeartbeatHandle};
use crate::modules::sensors::CpuInfo;
use crate::property::{PropertySpec, PropertyValue};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub const MODULE_NAME: &str = "host";
pub const INTERFACE: &str = "org.hostwarden.Host";

pub const INVALID_LIFETIME: &str = "invalid-lifetime";
pub const NOT_AVAILABLE: &str = "not-available";

const METHODS: &[&str] = &[
    "identify",
    "reboot",
    "shutdown",
    "get_uuid",
    "set_uuid",
    "get_power_profile",
    "set_power_profile",
    "list_power_profiles",
];

/// How long a UUID stays stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UuidLifetime {
    /// Until the OS is reinstalled
    Filesystem,
    Hardware,
    /// Until the next boot
    Reboot,
    /// Until the agent restarts
    Agent,
    /// Operator assigned
    Custom,
}

impl UuidLifetime {
    /// Case-insensitive; empty means `Filesystem`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "" | "filesystem" => Some(UuidLifetime::Filesystem),
            "hardware" => Some(UuidLifetime::Hardware),
            "reboot" => Some(UuidLifetime::Reboot),
            "agent" => Some(UuidLifetime::Agent),
            "custom" => Some(UuidLifetime::Custom),
            _ => None,
        }
    }
}

/// Per-agent state owned by the host module.
struct HostState {
    heartbeat: Arc<HeartbeatEmitter>,
    heartbeat_task: Mutex<Option<HeartbeatHandle>>,
    cpu: Mutex<Option<CpuInfo>>,
    uuids: Mutex<HashMap<UuidLifetime, String>>,
}

pub struct HostModule {
    sensors: Arc<dyn SensorBackend>,
    control: Arc<dyn HostControl>,
    heartbeat_interval: Duration,
}

impl HostModule {
    pub fn new(
        sensors: Arc<dyn SensorBackend>,
        control: Arc<dyn HostControl>,
        heartbeat_interval: Duration,
    ) -> Self {
        Self {
            sensors,
            control,
            heartbeat_interval,
        }
    }

    fn state(agent: &Agent) -> Result<Arc<HostState>, AgentError> {
        agent.private::<HostState>()
    }

    /// CPU details are read once and cached.
    fn cpu(&self, state: &HostState) -> Result<CpuInfo, AgentError> {
        let mut cached = state.cpu.lock();
        if let Some(cpu) = cached.as_ref() {
            return Ok(cpu.clone());
        }
        let cpu = self.sensors.cpu_info()?;
        *cached = Some(cpu.clone());
        Ok(cpu)
    }

    /// UUID for `lifetime`, or one of the `invalid-lifetime` / `not-available` markers.
    fn uuid_for(&self, state: &HostState, lifetime: &str) -> String {
        let Some(lifetime) = UuidLifetime::parse(lifetime) else {
            return INVALID_LIFETIME.to_string();
        };
        if lifetime != UuidLifetime::Custom {
            if let Some(uuid) = state.uuids.lock().get(&lifetime) {
                return uuid.clone();
            }
        }

        let looked_up = match lifetime {
            UuidLifetime::Filesystem => self.sensors.machine_uuid(),
            UuidLifetime::Hardware => self.sensors.hardware_uuid(),
            UuidLifetime::Reboot => self.sensors.boot_uuid(),
            UuidLifetime::Agent => Ok(Some(uuid::Uuid::new_v4().to_string())),
            UuidLifetime::Custom => self.control.custom_uuid(),
        };
        match looked_up {
            Ok(Some(uuid)) => {
                if lifetime != UuidLifetime::Custom {
                    state.uuids.lock().insert(lifetime, uuid.clone());
                }
                uuid
            }
            Ok(None) => NOT_AVAILABLE.to_string(),
            Err(e) => {
                warn!(?lifetime, error = %e, "UUID lookup failed");
                NOT_AVAILABLE.to_string()
            }
        }
    }

    fn set_uuid(&self, agent: &Agent, lifetime: &str, uuid: &str) -> Result<(), AgentError> {
        if UuidLifetime::parse(lifetime) != Some(UuidLifetime::Custom) {
            let err = AgentError::Backend(format!(
                "Unable to set UUID for lifetime: '{}'",
                lifetime
            ));
            warn!(lifetime, "{}", err);
            agent.set_error(err.clone());
            return Err(err);
        }
        self.control.set_custom_uuid(uuid)?;
        info!(uuid, "Custom UUID updated");
        self.properties_changed(agent, &["custom_uuid".to_string()]);
        Ok(())
    }
}

#[async_trait]
impl Module for HostModule {
    fn name(&self) -> &'static str {
        MODULE_NAME
    }

    fn interface(&self) -> &'static str {
        INTERFACE
    }

    fn properties(&self) -> Vec<PropertySpec> {
        vec![
            PropertySpec::read_only("uuid", "Filesystem-lifetime UUID", "sstr"),
            PropertySpec::read_only("custom_uuid", "Operator-assigned UUID", "sstr"),
            PropertySpec::read_only("hostname", "Host name", "sstr"),
            PropertySpec::read_only("os", "Operating system", "sstr"),
            PropertySpec::read_only("arch", "Architecture", "sstr"),
            PropertySpec::read_only("wordsize", "Word size in bits", "uint8"),
            PropertySpec::read_only("cpu_model", "Processor model", "sstr"),
            PropertySpec::read_only("cpu_count", "Logical processors", "uint8"),
            PropertySpec::read_only("cpu_cores", "Cores per processor", "uint8"),
            PropertySpec::read_only("cpu_flags", "Processor feature flags", "sstr"),
            PropertySpec::read_only("memory", "Total memory in KiB", "uint64"),
            PropertySpec::read_only("free_mem", "Free memory in KiB", "uint64"),
            PropertySpec::read_only("swap", "Total swap in KiB", "uint64"),
            PropertySpec::read_only("free_swap", "Free swap in KiB", "uint64"),
            PropertySpec::read_only("load", "Load averages over 1, 5 and 15 minutes", "map"),
            PropertySpec::read_only("process_statistics", "Process counts by state", "map"),
            PropertySpec::read_only("sequence", "Next heartbeat sequence number", "uint32"),
            PropertySpec::read_write(
                "update_interval",
                "Seconds between heartbeats",
                "uint32",
            ),
            PropertySpec::read_only("last_updated", "Current time in nanoseconds", "absTime"),
        ]
    }

    fn methods(&self) -> &'static [&'static str] {
        METHODS
    }

    fn init(&self, agent: &Arc<Agent>) -> Result<(), AgentError> {
        let heartbeat = Arc::new(HeartbeatEmitter::new(
            Arc::clone(agent),
            self.heartbeat_interval,
        )?);
        agent.set_private(
            MODULE_NAME,
            Arc::new(HostState {
                heartbeat,
                heartbeat_task: Mutex::new(None),
                cpu: Mutex::new(None),
                uuids: Mutex::new(HashMap::new()),
            }),
        );
        Ok(())
    }

    async fn start(&self, agent: &Arc<Agent>) -> Result<(), AgentError> {
        let state = Self::state(agent)?;
        let mut task = state.heartbeat_task.lock();
        if task.is_none() {
            *task = Some(state.heartbeat.spawn());
        }
        Ok(())
    }

    async fn shutdown(&self, agent: &Agent) {
        let Ok(state) = Self::state(agent) else {
            return;
        };
        let handle = state.heartbeat_task.lock().take();
        if let Some(handle) = handle {
            handle.stop().await;
        }
    }

    fn get_property(&self, agent: &Agent, name: &str) -> Result<PropertyValue, AgentError> {
        let state = Self::state(agent)?;
        let value = match name {
            "uuid" => self.uuid_for(&state, "filesystem").into(),
            "custom_uuid" => self.uuid_for(&state, "custom").into(),
            "hostname" => self.sensors.hostname()?.into(),
            "os" => self.sensors.operating_system()?.into(),
            "arch" => self.sensors.architecture()?.into(),
            "wordsize" => PropertyValue::UInt(usize::BITS),
            "cpu_model" => self.cpu(&state)?.model.into(),
            "cpu_count" => PropertyValue::UInt(self.cpu(&state)?.count),
            "cpu_cores" => PropertyValue::UInt(self.cpu(&state)?.cores),
            "cpu_flags" => self.cpu(&state)?.flags.into(),
            "memory" => PropertyValue::UInt64(self.sensors.memory()?.total_kib),
            "free_mem" => PropertyValue::UInt64(self.sensors.memory()?.free_kib),
            "swap" => PropertyValue::UInt64(self.sensors.memory()?.swap_total_kib),
            "free_swap" => PropertyValue::UInt64(self.sensors.memory()?.swap_free_kib),
            "load" => {
                let load = self.sensors.load_average()?;
                let map: BTreeMap<String, String> = [
                    ("1", load.one),
                    ("5", load.five),
                    ("15", load.fifteen),
                ]
                .into_iter()
                .map(|(k, v)| (k.to_string(), format!("{:.6}", v)))
                .collect();
                map.into()
            }
            "process_statistics" => {
                let procs = self.sensors.process_stats()?;
                let map: BTreeMap<String, String> = [
                    ("total", procs.total),
                    ("idle", procs.idle),
                    ("zombie", procs.zombie),
                    ("running", procs.running),
                    ("stopped", procs.stopped),
                    ("sleeping", procs.sleeping),
                ]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
                map.into()
            }
            "sequence" => PropertyValue::UInt(state.heartbeat.sequence()),
            "update_interval" => {
                let secs = state.heartbeat.interval().as_secs();
                PropertyValue::UInt(u32::try_from(secs).unwrap_or(u32::MAX))
            }
            "last_updated" => {
                PropertyValue::Int64(Utc::now().timestamp_nanos_opt().unwrap_or_default())
            }
            other => return Err(unknown_property(INTERFACE, other)),
        };
        Ok(value)
    }

    fn set_property(&self, agent: &Agent, name: &str, value: PropertyValue) -> Result<(), AgentError> {
        match name {
            "update_interval" => {
                let secs = value.as_u32().ok_or_else(|| {
                    AgentError::InvalidArguments("update_interval must be a uint32".to_string())
                })?;
                Self::state(agent)?
                    .heartbeat
                    .set_interval(Duration::from_secs(u64::from(secs)))
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
            "identify" => self.control.identify().await.map(|_| MethodReply::empty()),
            "reboot" => self.control.reboot().await.map(|_| MethodReply::empty()),
            "shutdown" => self.control.shutdown().await.map(|_| MethodReply::empty()),
            "get_uuid" => {
                let state = Self::state(agent)?;
                Ok(MethodReply::single(self.uuid_for(&state, &args.str_or(0, ""))))
            }
            "set_uuid" => {
                let lifetime = args.str_or(0, "");
                let uuid = args.str(1, "uuid")?;
                self.set_uuid(agent, &lifetime, &uuid)?;
                Ok(MethodReply::empty())
            }
            "get_power_profile" => Ok(MethodReply::single(self.control.power_profile().await?)),
            "set_power_profile" => {
                let profile = args.str(0, "profile")?;
                self.control.set_power_profile(&profile).await?;
                Ok(MethodReply::single(0u32))
            }
            "list_power_profiles" => Ok(MethodReply::single(self.control.power_profiles().await?)),
            other => Err(unknown_method(INTERFACE, other)),
        }
    }
}
