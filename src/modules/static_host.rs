//! In-memory host used by tests and dry runs.
//!
//! `StaticSensors` answers every sensor query from fixed data and implements the
//! control traits by mutating that data, so a network `stop` is visible in the
//! next `status` call.

use super::control::{HostControl, NetworkControl};
use super::sensors::{
    CpuInfo, LoadAverage, MemoryInfo, NetworkInterface, ProcessStats, SensorBackend,
};
use crate::error::AgentError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::net::Ipv4Addr;

#[derive(Debug, Clone)]
struct HostData {
    hostname: String,
    os: String,
    arch: String,
    cpu: CpuInfo,
    memory: MemoryInfo,
    load: LoadAverage,
    processes: ProcessStats,
    interfaces: Vec<NetworkInterface>,
    machine_uuid: Option<String>,
    hardware_uuid: Option<String>,
    boot_uuid: Option<String>,
    custom_uuid: Option<String>,
    power_profile: String,
    power_profiles: Vec<String>,
}

pub struct StaticSensors {
    data: Mutex<HostData>,
    calls: Mutex<Vec<String>>,
    failing: Mutex<Option<String>>,
}

impl Default for StaticSensors {
    fn default() -> Self {
        Self::new("testhost")
    }
}

impl StaticSensors {
    pub fn new(hostname: &str) -> Self {
        let data = HostData {
            hostname: hostname.to_string(),
            os: "Linux (6.1)".to_string(),
            arch: "x86_64".to_string(),
            cpu: CpuInfo {
                model: "Virtual CPU".to_string(),
                count: 4,
                cores: 2,
                flags: "fpu vme de pse tsc msr pae sse sse2".to_string(),
            },
            memory: MemoryInfo {
                total_kib: 8_388_608,
                free_kib: 4_194_304,
                swap_total_kib: 2_097_152,
                swap_free_kib: 2_097_152,
            },
            load: LoadAverage {
                one: 0.5,
                five: 0.25,
                fifteen: 0.125,
            },
            processes: ProcessStats {
                total: 212,
                idle: 40,
                zombie: 1,
                running: 3,
                stopped: 0,
                sleeping: 168,
            },
            interfaces: vec![
                NetworkInterface {
                    name: "eth0".to_string(),
                    up: true,
                    ipv4: Some(Ipv4Addr::new(192, 168, 122, 10)),
                    mac: Some([0x52, 0x54, 0x00, 0xab, 0xcd, 0xef]),
                },
                NetworkInterface {
                    name: "lo".to_string(),
                    up: true,
                    ipv4: Some(Ipv4Addr::LOCALHOST),
                    mac: Some([0; 6]),
                },
            ],
            machine_uuid: Some("6b1f6c4e-3a0d-4f6e-9d59-4b0e3c2a8f11".to_string()),
            hardware_uuid: None,
            boot_uuid: Some("0d9c4f3e-8a54-4a52-b3a0-71c3f0b6e2d4".to_string()),
            custom_uuid: None,
            power_profile: "balanced".to_string(),
            power_profiles: vec!["balanced".to_string(), "powersave".to_string()],
        };
        Self {
            data: Mutex::new(data),
            calls: Mutex::new(Vec::new()),
            failing: Mutex::new(None),
        }
    }

    pub fn with_machine_uuid(self, uuid: Option<&str>) -> Self {
        self.data.lock().machine_uuid = uuid.map(str::to_string);
        self
    }

    pub fn with_hardware_uuid(self, uuid: Option<&str>) -> Self {
        self.data.lock().hardware_uuid = uuid.map(str::to_string);
        self
    }

    pub fn with_interface(self, iface: NetworkInterface) -> Self {
        {
            let mut data = self.data.lock();
            data.interfaces.retain(|i| i.name != iface.name);
            data.interfaces.push(iface);
        }
        self
    }

    /// Make every sensor read fail with a `Backend` error.
    pub fn fail_reads(&self, message: &str) {
        *self.failing.lock() = Some(message.to_string());
    }

    /// Control operations performed so far, e.g. `"reboot"`, `"stop eth0"`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn read<T>(&self, f: impl FnOnce(&HostData) -> T) -> Result<T, AgentError> {
        if let Some(message) = self.failing.lock().as_ref() {
            return Err(AgentError::Backend(message.clone()));
        }
        Ok(f(&self.data.lock()))
    }

    fn record(&self, call: String) {
        self.calls.lock().push(call);
    }

    fn set_link(&self, name: &str, up: bool) -> Result<(), AgentError> {
        let mut data = self.data.lock();
        let iface = data
            .interfaces
            .iter_mut()
            .find(|i| i.name == name)
            .ok_or_else(|| AgentError::Backend(format!("no such interface: {}", name)))?;
        iface.up = up;
        Ok(())
    }
}

impl SensorBackend for StaticSensors {
    fn hostname(&self) -> Result<String, AgentError> {
        self.read(|d| d.hostname.clone())
    }

    fn operating_system(&self) -> Result<String, AgentError> {
        self.read(|d| d.os.clone())
    }

    fn architecture(&self) -> Result<String, AgentError> {
        self.read(|d| d.arch.clone())
    }

    fn cpu_info(&self) -> Result<CpuInfo, AgentError> {
        self.read(|d| d.cpu.clone())
    }

    fn memory(&self) -> Result<MemoryInfo, AgentError> {
        self.read(|d| d.memory)
    }

    fn load_average(&self) -> Result<LoadAverage, AgentError> {
        self.read(|d| d.load)
    }

    fn process_stats(&self) -> Result<ProcessStats, AgentError> {
        self.read(|d| d.processes)
    }

    fn network_interfaces(&self) -> Result<Vec<NetworkInterface>, AgentError> {
        self.read(|d| d.interfaces.clone())
    }

    fn machine_uuid(&self) -> Result<Option<String>, AgentError> {
        self.read(|d| d.machine_uuid.clone())
    }

    fn hardware_uuid(&self) -> Result<Option<String>, AgentError> {
        self.read(|d| d.hardware_uuid.clone())
    }

    fn boot_uuid(&self) -> Result<Option<String>, AgentError> {
        self.read(|d| d.boot_uuid.clone())
    }
}

#[async_trait]
impl HostControl for StaticSensors {
    async fn reboot(&self) -> Result<(), AgentError> {
        self.record("reboot".to_string());
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), AgentError> {
        self.record("shutdown".to_string());
        Ok(())
    }

    async fn identify(&self) -> Result<(), AgentError> {
        self.record("identify".to_string());
        Ok(())
    }

    async fn power_profile(&self) -> Result<String, AgentError> {
        Ok(self.data.lock().power_profile.clone())
    }

    async fn set_power_profile(&self, profile: &str) -> Result<(), AgentError> {
        let mut data = self.data.lock();
        if !data.power_profiles.iter().any(|p| p == profile) {
            return Err(AgentError::Backend(format!("unknown power profile: {}", profile)));
        }
        data.power_profile = profile.to_string();
        Ok(())
    }

    async fn power_profiles(&self) -> Result<Vec<String>, AgentError> {
        Ok(self.data.lock().power_profiles.clone())
    }

    fn custom_uuid(&self) -> Result<Option<String>, AgentError> {
        Ok(self.data.lock().custom_uuid.clone())
    }

    fn set_custom_uuid(&self, uuid: &str) -> Result<(), AgentError> {
        self.data.lock().custom_uuid = Some(uuid.to_string());
        Ok(())
    }
}

#[async_trait]
impl NetworkControl for StaticSensors {
    async fn start_interface(&self, name: &str) -> Result<(), AgentError> {
        self.record(format!("start {}", name));
        self.set_link(name, true)
    }

    async fn stop_interface(&self, name: &str) -> Result<(), AgentError> {
        self.record(format!("stop {}", name));
        self.set_link(name, false)
    }
}
