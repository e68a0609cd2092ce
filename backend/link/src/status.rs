use std::sync::Arc;

use screenlink_core::InterfaceInfo;
use screenlink_infra::{reportable, uptime_secs, InterfaceSource};
use serde::Serialize;
use serde_json::{json, Value};

use crate::protocol::{now_ts, STATUS};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusPayload {
    pub client_id: String,
    pub uptime: u64,
    pub interfaces: Vec<InterfaceInfo>,
    pub timestamp: i64,
}

/// Builds the periodic `status` heartbeat.
#[derive(Clone)]
pub struct StatusReporter {
    client_id: String,
    interfaces: Arc<dyn InterfaceSource>,
    uptime: fn() -> u64,
}

impl StatusReporter {
    pub fn new(client_id: impl Into<String>, interfaces: Arc<dyn InterfaceSource>) -> Self {
        Self {
            client_id: client_id.into(),
            interfaces,
            uptime: uptime_secs,
        }
    }

    pub fn with_uptime(mut self, uptime: fn() -> u64) -> Self {
        self.uptime = uptime;
        self
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn payload(&self) -> StatusPayload {
        StatusPayload {
            client_id: self.client_id.clone(),
            uptime: (self.uptime)(),
            interfaces: reportable(self.interfaces.interfaces()),
            timestamp: now_ts(),
        }
    }

    pub fn message(&self) -> Value {
        let mut message = serde_json::to_value(self.payload()).unwrap_or_else(|_| json!({}));
        if let Some(obj) = message.as_object_mut() {
            obj.insert("type".into(), json!(STATUS));
        }
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use screenlink_core::InterfaceKind;
    use screenlink_infra::StaticInterfaces;

    fn iface(ip: &str, kind: InterfaceKind) -> InterfaceInfo {
        InterfaceInfo {
            ip_address: ip.into(),
            mac_address: "aa:bb:cc:dd:ee:ff".into(),
            kind,
            is_up: true,
        }
    }

    #[test]
    fn status_message_reports_only_wifi_and_ethernet() {
        let source = StaticInterfaces(vec![
            iface("192.168.1.20", InterfaceKind::Ethernet),
            iface("10.8.0.2", InterfaceKind::Other),
        ]);
        let reporter = StatusReporter::new("client-1", Arc::new(source)).with_uptime(|| 42);

        let msg = reporter.message();
        assert_eq!(msg["type"], "status");
        assert_eq!(msg["clientId"], "client-1");
        assert_eq!(msg["uptime"], 42);
        assert_eq!(msg["interfaces"].as_array().unwrap().len(), 1);
        assert_eq!(msg["interfaces"][0]["type"], "ethernet");
        assert!(msg["timestamp"].as_i64().unwrap() > 0);
    }
}
