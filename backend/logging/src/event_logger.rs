//! Lifecycle Event Logger
//!
//! An `EventSink` that writes pairing and connection lifecycle events to the
//! `lifecycle` tracing target with endpoints redacted.

use chrono::{DateTime, Utc};
use screenlink_core::{EventSink, LifecycleEvent};
use serde::Serialize;
use tracing::info;

use crate::redact::redact_secrets;

#[derive(Debug, Serialize)]
pub struct LifecycleLogEntry {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: LifecycleEvent,
}

impl LifecycleLogEntry {
    pub fn new(event: &LifecycleEvent) -> Self {
        let event = match event.clone() {
            LifecycleEvent::PairingSucceeded { server_ws, encrypted } => {
                LifecycleEvent::PairingSucceeded {
                    server_ws: redact_secrets(&server_ws),
                    encrypted,
                }
            }
            LifecycleEvent::ConnectionStarted { endpoint } => LifecycleEvent::ConnectionStarted {
                endpoint: redact_secrets(&endpoint),
            },
            LifecycleEvent::ConnectionStopped { endpoint, reason } => {
                LifecycleEvent::ConnectionStopped {
                    endpoint: redact_secrets(&endpoint),
                    reason,
                }
            }
            other => other,
        };
        Self {
            timestamp: Utc::now(),
            event,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LifecycleLogger;

impl EventSink for LifecycleLogger {
    fn on_event(&self, event: &LifecycleEvent) {
        let entry = LifecycleLogEntry::new(event);
        let json = serde_json::to_string(&entry).unwrap_or_default();
        info!(target: "lifecycle", kind = event.kind(), entry = %json, "Lifecycle event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_redacts_endpoint_credentials() {
        let entry = LifecycleLogEntry::new(&LifecycleEvent::ConnectionStarted {
            endpoint: "wss://controller/ws?token=secret".into(),
        });
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["event"], "connection_started");
        assert!(!json["endpoint"].as_str().unwrap().contains("secret"));
    }
}
