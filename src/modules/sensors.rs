//! Sensor Backend
//!
//! Read-only access to host state. Reads are expected to be fast and bounded,
//! so the trait is synchronous. Failures surface as `AgentError::Backend`.

use crate::error::AgentError;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CpuInfo {
    pub model: String,
    /// Logical processors
    pub count: u32,
    /// Physical cores per package
    pub cores: u32,
    /// Space-separated feature flags of the first processor
    pub flags: String,
}

/// Process counts by scheduler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ProcessStats {
    pub total: u64,
    pub idle: u64,
    pub zombie: u64,
    pub running: u64,
    pub stopped: u64,
    pub sleeping: u64,
}

impl ProcessStats {
    /// Count one process in state `state` (the third field of `/proc/<pid>/stat`).
    pub fn record(&mut self, state: char) {
        self.total += 1;
        match state {
            'R' => self.running += 1,
            'S' => self.sleeping += 1,
            'D' | 'I' => self.idle += 1,
            'T' | 't' => self.stopped += 1,
            'Z' => self.zombie += 1,
            _ => {}
        }
    }
}

/// Memory figures in KiB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct MemoryInfo {
    pub total_kib: u64,
    pub free_kib: u64,
    pub swap_total_kib: u64,
    pub swap_free_kib: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct LoadAverage {
    pub one: f64,
    pub five: f64,
    pub fifteen: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkInterface {
    pub name: String,
    pub up: bool,
    pub ipv4: Option<Ipv4Addr>,
    pub mac: Option<[u8; 6]>,
}

impl NetworkInterface {
    /// `XX:XX:XX:XX:XX:XX`, upper-case; all zeros when the interface has no address.
    pub fn mac_string(&self) -> String {
        let mac = self.mac.unwrap_or_default();
        mac.iter()
            .map(|b| format!("{:02X}", b))
            .collect::<Vec<_>>()
            .join(":")
    }
}

pub trait SensorBackend: Send + Sync {
    fn hostname(&self) -> Result<String, AgentError>;
    fn operating_system(&self) -> Result<String, AgentError>;
    fn architecture(&self) -> Result<String, AgentError>;
    fn cpu_info(&self) -> Result<CpuInfo, AgentError>;
    fn memory(&self) -> Result<MemoryInfo, AgentError>;
    fn load_average(&self) -> Result<LoadAverage, AgentError>;
    fn process_stats(&self) -> Result<ProcessStats, AgentError>;
    fn network_interfaces(&self) -> Result<Vec<NetworkInterface>, AgentError>;

    /// Identifier that survives reboots but not reinstalls.
    fn machine_uuid(&self) -> Result<Option<String>, AgentError>;
    /// Identifier burned into the hardware, if readable.
    fn hardware_uuid(&self) -> Result<Option<String>, AgentError>;
    /// Identifier regenerated on every boot.
    fn boot_uuid(&self) -> Result<Option<String>, AgentError>;

    fn interface(&self, name: &str) -> Result<Option<NetworkInterface>, AgentError> {
        Ok(self
            .network_interfaces()?
            .into_iter()
            .find(|iface| iface.name == name))
    }
}

/// Linux sensors reading `/proc`, `/sys` and `/etc` below a root directory.
pub struct LinuxSensors {
    root: PathBuf,
}

impl Default for LinuxSensors {
    fn default() -> Self {
        Self::new()
    }
}

impl LinuxSensors {
    pub fn new() -> Self {
        Self::with_root("/")
    }

    /// Read from an alternate root, e.g. a container's filesystem.
    pub fn with_root<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn path(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    fn read(&self, relative: &str) -> Result<String, AgentError> {
        let path = self.path(relative);
        fs::read_to_string(&path)
            .map_err(|e| AgentError::Backend(format!("failed to read {}: {}", path.display(), e)))
    }

    fn read_optional(&self, relative: &str) -> Result<Option<String>, AgentError> {
        let path = self.path(relative);
        match fs::read_to_string(&path) {
            Ok(s) => Ok(Some(s.trim().to_string()).filter(|s| !s.is_empty())),
            Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::PermissionDenied) => {
                debug!(path = %path.display(), error = %e, "Optional sensor file unavailable");
                Ok(None)
            }
            Err(e) => Err(AgentError::Backend(format!(
                "failed to read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    fn ipv4_addresses(&self) -> HashMap<String, Ipv4Addr> {
        match Command::new("ip").args(["-4", "-o", "addr", "show"]).output() {
            Ok(output) if output.status.success() => {
                parse_ip_addr_output(&String::from_utf8_lossy(&output.stdout))
            }
            Ok(output) => {
                debug!(status = %output.status, "ip addr returned failure");
                HashMap::new()
            }
            Err(e) => {
                debug!(error = %e, "ip command unavailable");
                HashMap::new()
            }
        }
    }
}

impl SensorBackend for LinuxSensors {
    fn hostname(&self) -> Result<String, AgentError> {
        Ok(self.read("proc/sys/kernel/hostname")?.trim().to_string())
    }

    fn operating_system(&self) -> Result<String, AgentError> {
        if let Some(release) = self.read_optional("etc/os-release")? {
            if let Some(os) = parse_os_release(&release) {
                return Ok(os);
            }
        }
        let kind = self.read("proc/sys/kernel/ostype")?;
        let version = self.read("proc/sys/kernel/osrelease")?;
        Ok(format!("{} ({})", kind.trim(), version.trim()))
    }

    fn architecture(&self) -> Result<String, AgentError> {
        Ok(std::env::consts::ARCH.to_string())
    }

    fn cpu_info(&self) -> Result<CpuInfo, AgentError> {
        parse_cpuinfo(&self.read("proc/cpuinfo")?)
    }

    fn memory(&self) -> Result<MemoryInfo, AgentError> {
        parse_meminfo(&self.read("proc/meminfo")?)
    }

    fn load_average(&self) -> Result<LoadAverage, AgentError> {
        parse_loadavg(&self.read("proc/loadavg")?)
    }

    fn process_stats(&self) -> Result<ProcessStats, AgentError> {
        let proc_dir = self.path("proc");
        let entries = fs::read_dir(&proc_dir).map_err(|e| {
            AgentError::Backend(format!("failed to list {}: {}", proc_dir.display(), e))
        })?;
        let mut stats = ProcessStats::default();
        for entry in entries.flatten() {
            let name = entry.file_name();
            if !name.to_str().is_some_and(|n| n.bytes().all(|b| b.is_ascii_digit())) {
                continue;
            }
            // Processes may exit between listing and reading.
            let Ok(stat) = fs::read_to_string(entry.path().join("stat")) else {
                continue;
            };
            if let Some(state) = parse_stat_state(&stat) {
                stats.record(state);
            }
        }
        Ok(stats)
    }

    fn network_interfaces(&self) -> Result<Vec<NetworkInterface>, AgentError> {
        let dir = self.path("sys/class/net");
        let entries = fs::read_dir(&dir)
            .map_err(|e| AgentError::Backend(format!("failed to list {}: {}", dir.display(), e)))?;
        let addresses = self.ipv4_addresses();

        let mut interfaces = Vec::new();
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            let base = format!("sys/class/net/{}", name);
            let flags = self
                .read_optional(&format!("{}/flags", base))?
                .and_then(|f| u32::from_str_radix(f.trim_start_matches("0x"), 16).ok())
                .unwrap_or(0);
            let mac = self
                .read_optional(&format!("{}/address", base))?
                .and_then(|m| parse_mac(&m));
            interfaces.push(NetworkInterface {
                ipv4: addresses.get(&name).copied(),
                name,
                up: flags & 0x1 != 0,
                mac,
            });
        }
        interfaces.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(interfaces)
    }

    fn machine_uuid(&self) -> Result<Option<String>, AgentError> {
        Ok(self
            .read_optional("etc/machine-id")?
            .map(|id| normalize_uuid(&id)))
    }

    fn hardware_uuid(&self) -> Result<Option<String>, AgentError> {
        Ok(self
            .read_optional("sys/class/dmi/id/product_uuid")?
            .map(|id| normalize_uuid(&id)))
    }

    fn boot_uuid(&self) -> Result<Option<String>, AgentError> {
        self.read_optional("proc/sys/kernel/random/boot_id")
    }
}

/// Hyphenated lower-case form; input that is not a UUID is returned trimmed.
fn normalize_uuid(raw: &str) -> String {
    match uuid::Uuid::try_parse(raw.trim()) {
        Ok(id) => id.hyphenated().to_string(),
        Err(_) => raw.trim().to_string(),
    }
}

pub(crate) fn parse_os_release(content: &str) -> Option<String> {
    let fields: HashMap<&str, &str> = content
        .lines()
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| (k.trim(), v.trim().trim_matches('"')))
        .collect();
    match (fields.get("NAME"), fields.get("VERSION_ID")) {
        (Some(name), Some(version)) => Some(format!("{} ({})", name, version)),
        _ => fields.get("PRETTY_NAME").map(|s| s.to_string()),
    }
}

pub(crate) fn parse_cpuinfo(content: &str) -> Result<CpuInfo, AgentError> {
    let mut model = None;
    let mut count = 0u32;
    let mut cores = None;
    let mut flags = None;
    for line in content.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        match key.trim() {
            "processor" => count += 1,
            "model name" if model.is_none() => model = Some(value.trim().to_string()),
            "cpu cores" if cores.is_none() => cores = value.trim().parse::<u32>().ok(),
            "flags" | "Features" if flags.is_none() => {
                flags = Some(value.split_whitespace().collect::<Vec<_>>().join(" "))
            }
            _ => {}
        }
    }
    if count == 0 {
        return Err(AgentError::Backend("no processors listed in cpuinfo".to_string()));
    }
    Ok(CpuInfo {
        model: model.unwrap_or_else(|| "unknown".to_string()),
        count,
        cores: cores.unwrap_or(count),
        flags: flags.unwrap_or_default(),
    })
}

/// Scheduler state from a `/proc/<pid>/stat` line. The command name may
/// contain spaces and parentheses, so the state follows the last `)`.
pub(crate) fn parse_stat_state(stat: &str) -> Option<char> {
    let (_, rest) = stat.rsplit_once(')')?;
    rest.split_whitespace().next()?.chars().next()
}

pub(crate) fn parse_meminfo(content: &str) -> Result<MemoryInfo, AgentError> {
    let field = |name: &str| -> Result<u64, AgentError> {
        content
            .lines()
            .find_map(|line| {
                let (key, rest) = line.split_once(':')?;
                (key == name).then(|| rest.split_whitespace().next())?
            })
            .and_then(|v| v.parse::<u64>().ok())
            .ok_or_else(|| AgentError::Backend(format!("meminfo lacks {}", name)))
    };
    Ok(MemoryInfo {
        total_kib: field("MemTotal")?,
        free_kib: field("MemFree")?,
        swap_total_kib: field("SwapTotal")?,
        swap_free_kib: field("SwapFree")?,
    })
}

pub(crate) fn parse_loadavg(content: &str) -> Result<LoadAverage, AgentError> {
    let values: Vec<f64> = content
        .split_whitespace()
        .take(3)
        .filter_map(|v| v.parse().ok())
        .collect();
    match values.as_slice() {
        [one, five, fifteen] => Ok(LoadAverage {
            one: *one,
            five: *five,
            fifteen: *fifteen,
        }),
        _ => Err(AgentError::Backend(format!("malformed loadavg: {}", content.trim()))),
    }
}

pub(crate) fn parse_mac(raw: &str) -> Option<[u8; 6]> {
    let parts: Vec<u8> = raw
        .trim()
        .split(':')
        .map(|p| u8::from_str_radix(p, 16))
        .collect::<Result<_, _>>()
        .ok()?;
    parts.try_into().ok()
}

/// Parse `ip -4 -o addr show` into interface → first IPv4 address.
pub(crate) fn parse_ip_addr_output(output: &str) -> HashMap<String, Ipv4Addr> {
    let mut addresses = HashMap::new();
    for line in output.lines() {
        let mut fields = line.split_whitespace();
        let (Some(_index), Some(name), Some("inet"), Some(cidr)) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            continue;
        };
        let addr = cidr.split('/').next().and_then(|a| a.parse().ok());
        if let Some(addr) = addr {
            addresses.entry(name.to_string()).or_insert(addr);
        }
    }
    addresses
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_cpuinfo() {
        let content = "processor\t: 0\nmodel name\t: Test CPU @ 2.0GHz\ncpu cores\t: 2\n\
                       flags\t\t: fpu vme  sse2 \n\n\
                       processor\t: 1\nmodel name\t: Test CPU @ 2.0GHz\ncpu cores\t: 2\n\
                       flags\t\t: fpu\n";
        let info = parse_cpuinfo(content).unwrap();
        assert_eq!(info.model, "Test CPU @ 2.0GHz");
        assert_eq!(info.count, 2);
        assert_eq!(info.cores, 2);
        assert_eq!(info.flags, "fpu vme sse2");
        assert_eq!(parse_cpuinfo("processor : 0\n").unwrap().flags, "");
        assert!(parse_cpuinfo("").is_err());
    }

    #[test]
    fn test_parse_stat_state() {
        assert_eq!(parse_stat_state("1 (systemd) S 0 1 1 0 -1"), Some('S'));
        assert_eq!(parse_stat_state("42 (tmux: server (x)) R 1 42"), Some('R'));
        assert_eq!(parse_stat_state("garbage"), None);
    }

    #[test]
    fn test_parse_meminfo() {
        let content = "MemTotal:       16318480 kB\nMemFree:         1048576 kB\n\
                       SwapTotal:       2097148 kB\nSwapFree:        2097148 kB\n";
        let mem = parse_meminfo(content).unwrap();
        assert_eq!(mem.total_kib, 16318480);
        assert_eq!(mem.free_kib, 1048576);
        assert_eq!(mem.swap_free_kib, 2097148);
        assert!(parse_meminfo("MemTotal: 1 kB\n").is_err());
    }

    #[test]
    fn test_parse_loadavg() {
        let load = parse_loadavg("0.52 0.58 0.59 1/467 12345\n").unwrap();
        assert_eq!(load.one, 0.52);
        assert_eq!(load.fifteen, 0.59);
        assert!(parse_loadavg("garbage").is_err());
    }

    #[test]
    fn test_parse_mac_and_format() {
        let mac = parse_mac("52:54:00:ab:cd:0e\n").unwrap();
        let iface = NetworkInterface {
            name: "eth0".into(),
            up: true,
            ipv4: None,
            mac: Some(mac),
        };
        assert_eq!(iface.mac_string(), "52:54:00:AB:CD:0E");
        assert!(parse_mac("52:54:00").is_none());
    }

    #[test]
    fn test_parse_ip_addr_output() {
        let out = "1: lo    inet 127.0.0.1/8 scope host lo\\       valid_lft forever\n\
                   2: eth0    inet 192.168.1.20/24 brd 192.168.1.255 scope global eth0\n";
        let map = parse_ip_addr_output(out);
        assert_eq!(map.get("eth0"), Some(&Ipv4Addr::new(192, 168, 1, 20)));
        assert_eq!(map.get("lo"), Some(&Ipv4Addr::LOCALHOST));
    }

    #[test]
    fn test_parse_os_release() {
        let content = "NAME=\"Fedora Linux\"\nVERSION_ID=40\nPRETTY_NAME=\"Fedora Linux 40\"\n";
        assert_eq!(parse_os_release(content).as_deref(), Some("Fedora Linux (40)"));
        assert_eq!(
            parse_os_release("PRETTY_NAME=\"Something\"\n").as_deref(),
            Some("Something")
        );
    }

    #[test]
    fn test_linux_sensors_with_root() {
        let root = TempDir::new().unwrap();
        let write = |rel: &str, content: &str| {
            let path = root.path().join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        };
        write("proc/sys/kernel/hostname", "node7\n");
        write("etc/machine-id", "4c4c4544003510468035b8c04f4b3232\n");
        write("sys/class/net/eth0/flags", "0x1003\n");
        write("sys/class/net/eth0/address", "52:54:00:12:34:56\n");
        write("sys/class/net/eth1/flags", "0x1002\n");
        write("proc/1/stat", "1 (init) S 0 1 1\n");
        write("proc/7/stat", "7 (worker) R 1 7 7\n");
        write("proc/9/stat", "9 (gone) Z 1 9 9\n");
        write("proc/self/stat", "7 (worker) R 1 7 7\n");

        let sensors = LinuxSensors::with_root(root.path());
        assert_eq!(sensors.hostname().unwrap(), "node7");
        assert_eq!(
            sensors.machine_uuid().unwrap().as_deref(),
            Some("4c4c4544-0035-1046-8035-b8c04f4b3232")
        );
        assert_eq!(sensors.hardware_uuid().unwrap(), None);

        let ifaces = sensors.network_interfaces().unwrap();
        assert_eq!(ifaces.len(), 2);
        assert!(ifaces[0].up);
        assert!(!ifaces[1].up);
        assert_eq!(ifaces[1].mac, None);
        assert!(sensors.interface("wlan0").unwrap().is_none());

        let procs = sensors.process_stats().unwrap();
        assert_eq!(
            procs,
            ProcessStats {
                total: 3,
                sleeping: 1,
                running: 1,
                zombie: 1,
                ..ProcessStats::default()
            }
        );
    }
}
