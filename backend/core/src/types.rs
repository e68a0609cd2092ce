use serde::{Deserialize, Serialize};

/// Interface category derived from the kernel interface name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceKind {
    Wifi,
    Ethernet,
    Other,
}

/// A local network interface as reported to the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceInfo {
    pub ip_address: String,
    pub mac_address: String,
    #[serde(rename = "type")]
    pub kind: InterfaceKind,
    pub is_up: bool,
}

impl InterfaceInfo {
    /// Only wifi and ethernet interfaces are reported upstream.
    pub fn is_reportable(&self) -> bool {
        matches!(self.kind, InterfaceKind::Wifi | InterfaceKind::Ethernet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interface_serializes_type_field() {
        let iface = InterfaceInfo {
            ip_address: "192.168.1.20".into(),
            mac_address: "aa:bb:cc:dd:ee:ff".into(),
            kind: InterfaceKind::Wifi,
            is_up: true,
        };
        let json = serde_json::to_value(&iface).unwrap();
        assert_eq!(json["type"], "wifi");
        assert_eq!(json["is_up"], true);
        assert!(iface.is_reportable());
    }
}
