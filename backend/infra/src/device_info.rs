//! Local device facts reported to the controller: network interfaces and uptime.

use screenlink_core::{InterfaceInfo, InterfaceKind};
use std::fs;
use std::net::{IpAddr, UdpSocket};
use std::path::{Path, PathBuf};
use tracing::debug;

const WIFI_PREFIXES: &[&str] = &["wlan", "wifi", "wlp", "wlo", "ath", "ra"];
const ETHERNET_PREFIXES: &[&str] = &["eth", "enp", "eno", "ens", "em", "p2p", "en"];

/// Enumerates local network interfaces.
pub trait InterfaceSource: Send + Sync {
    fn interfaces(&self) -> Vec<InterfaceInfo>;
}

/// Classify an interface by kernel name prefix.
pub fn classify_interface(name: &str) -> InterfaceKind {
    let name = name.to_ascii_lowercase();
    if WIFI_PREFIXES.iter().any(|p| name.starts_with(p)) {
        InterfaceKind::Wifi
    } else if ETHERNET_PREFIXES.iter().any(|p| name.starts_with(p)) {
        InterfaceKind::Ethernet
    } else {
        InterfaceKind::Other
    }
}

/// Wifi and ethernet interfaces only.
pub fn reportable(interfaces: Vec<InterfaceInfo>) -> Vec<InterfaceInfo> {
    interfaces.into_iter().filter(InterfaceInfo::is_reportable).collect()
}

/// Reads interface names, MACs and operstate from `/sys/class/net`.
///
/// Per-interface addresses are not exposed by sysfs; the address the OS
/// routes outbound traffic from is attached to the first up interface.
#[derive(Debug, Clone)]
pub struct SysfsInterfaces {
    root: PathBuf,
}

impl Default for SysfsInterfaces {
    fn default() -> Self {
        Self::new("/sys/class/net")
    }
}

impl SysfsInterfaces {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn read_attr(dir: &Path, attr: &str) -> String {
        fs::read_to_string(dir.join(attr))
            .map(|s| s.trim().to_string())
            .unwrap_or_default()
    }
}

impl InterfaceSource for SysfsInterfaces {
    fn interfaces(&self) -> Vec<InterfaceInfo> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(root = %self.root.display(), error = %e, "Cannot enumerate interfaces");
                return Vec::new();
            }
        };

        let mut names: Vec<String> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|name| name != "lo")
            .collect();
        names.sort();

        let mut outbound = outbound_ip().map(|ip| ip.to_string());
        names
            .into_iter()
            .map(|name| {
                let dir = self.root.join(&name);
                let is_up = Self::read_attr(&dir, "operstate") == "up";
                let ip_address = if is_up { outbound.take() } else { None };
                InterfaceInfo {
                    ip_address: ip_address.unwrap_or_default(),
                    mac_address: Self::read_attr(&dir, "address"),
                    kind: classify_interface(&name),
                    is_up,
                }
            })
            .collect()
    }
}

/// A fixed interface list.
#[derive(Debug, Clone, Default)]
pub struct StaticInterfaces(pub Vec<InterfaceInfo>);

impl InterfaceSource for StaticInterfaces {
    fn interfaces(&self) -> Vec<InterfaceInfo> {
        self.0.clone()
    }
}

/// The local address of a UDP socket "connected" to a public address.
/// No packets are sent.
fn outbound_ip() -> Option<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    socket.local_addr().ok().map(|a| a.ip())
}

/// Seconds since boot from `/proc/uptime`, 0 when unavailable.
pub fn uptime_secs() -> u64 {
    fs::read_to_string("/proc/uptime")
        .ok()
        .and_then(|s| parse_uptime(&s))
        .unwrap_or(0)
}

fn parse_uptime(raw: &str) -> Option<u64> {
    raw.split_whitespace()
        .next()?
        .parse::<f64>()
        .ok()
        .map(|secs| secs as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_by_prefix() {
        assert_eq!(classify_interface("wlan0"), InterfaceKind::Wifi);
        assert_eq!(classify_interface("wlp2s0"), InterfaceKind::Wifi);
        assert_eq!(classify_interface("eth0"), InterfaceKind::Ethernet);
        assert_eq!(classify_interface("enp3s0"), InterfaceKind::Ethernet);
        assert_eq!(classify_interface("docker0"), InterfaceKind::Other);
    }

    #[test]
    fn reportable_drops_other_interfaces() {
        let iface = |kind| InterfaceInfo {
            ip_address: String::new(),
            mac_address: String::new(),
            kind,
            is_up: true,
        };
        let kept = reportable(vec![
            iface(InterfaceKind::Wifi),
            iface(InterfaceKind::Other),
            iface(InterfaceKind::Ethernet),
        ]);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn reads_fake_sysfs_tree() {
        let dir = tempfile::tempdir().unwrap();
        for (name, mac, state) in [
            ("eth0", "aa:bb:cc:00:00:01", "up"),
            ("lo", "00:00:00:00:00:00", "unknown"),
            ("wlan0", "aa:bb:cc:00:00:02", "down"),
        ] {
            let iface = dir.path().join(name);
            std::fs::create_dir(&iface).unwrap();
            std::fs::write(iface.join("address"), format!("{mac}\n")).unwrap();
            std::fs::write(iface.join("operstate"), format!("{state}\n")).unwrap();
        }

        let found = SysfsInterfaces::new(dir.path()).interfaces();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].mac_address, "aa:bb:cc:00:00:01");
        assert!(found[0].is_up);
        assert_eq!(found[1].kind, InterfaceKind::Wifi);
        assert!(!found[1].is_up);
        assert!(found[1].ip_address.is_empty());
    }

    #[test]
    fn parses_proc_uptime() {
        assert_eq!(parse_uptime("12345.67 54321.00\n"), Some(12345));
        assert_eq!(parse_uptime(""), None);
    }
}
