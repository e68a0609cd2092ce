use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Pairing and connection lifecycle notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LifecycleEvent {
    PairingStarted { expires_at: DateTime<Utc> },
    PairingSucceeded { server_ws: String, encrypted: bool },
    PairingFailed { reason: String, fail_count: u32 },
    ServerStarted { addr: String },
    ServerStopped,
    ConnectionStarted { endpoint: String },
    ConnectionStopped { endpoint: String, reason: String },
}

impl LifecycleEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            LifecycleEvent::PairingStarted { .. } => "pairing_started",
            LifecycleEvent::PairingSucceeded { .. } => "pairing_succeeded",
            LifecycleEvent::PairingFailed { .. } => "pairing_failed",
            LifecycleEvent::ServerStarted { .. } => "server_started",
            LifecycleEvent::ServerStopped => "server_stopped",
            LifecycleEvent::ConnectionStarted { .. } => "connection_started",
            LifecycleEvent::ConnectionStopped { .. } => "connection_stopped",
        }
    }
}

/// Receives lifecycle events. Called synchronously on the emitting task, so
/// implementations must not block.
pub trait EventSink: Send + Sync {
    fn on_event(&self, event: &LifecycleEvent);
}

impl<F> EventSink for F
where
    F: Fn(&LifecycleEvent) + Send + Sync,
{
    fn on_event(&self, event: &LifecycleEvent) {
        self(event)
    }
}

/// Thread-safe registry of event sinks shared by the coordinator, the pairing
/// server and the session manager.
#[derive(Clone, Default)]
pub struct Observers {
    sinks: Arc<RwLock<Vec<Arc<dyn EventSink>>>>,
}

impl Observers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, sink: Arc<dyn EventSink>) {
        self.sinks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sink);
    }

    /// Drops every registered sink in one step.
    pub fn clear(&self) {
        self.sinks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.sinks.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn emit(&self, event: LifecycleEvent) {
        // Snapshot so a sink may register or clear without deadlocking.
        let sinks: Vec<Arc<dyn EventSink>> = self
            .sinks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        tracing::debug!(event = event.kind(), sinks = sinks.len(), "Emitting lifecycle event");
        for sink in sinks {
            sink.on_event(&event);
        }
    }
}

impl fmt::Debug for Observers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observers").field("sinks", &self.len()).finish()
    }
}
