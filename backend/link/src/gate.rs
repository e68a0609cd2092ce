//! Close-once signal shared by the tasks of one connection.

use std::fmt;
use std::sync::{Arc, OnceLock};
use tokio_util::sync::CancellationToken;

/// Why a connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Closed locally through `disconnect`/`shutdown`.
    LocalDisconnect,
    /// The paired descriptor disappeared (operator reset).
    DescriptorRemoved,
    /// The controller deactivated this device.
    Deactivated,
    /// Plaintext, malformed or undecryptable inbound message.
    ProtocolViolation,
    /// Peer closed the socket or a read failed.
    TransportClosed,
    WriteFailed,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::LocalDisconnect => "local_disconnect",
            StopReason::DescriptorRemoved => "descriptor_removed",
            StopReason::Deactivated => "deactivated",
            StopReason::ProtocolViolation => "protocol_violation",
            StopReason::TransportClosed => "transport_closed",
            StopReason::WriteFailed => "write_failed",
        }
    }

    /// The pairing must be discarded and the device re-paired.
    pub fn invalidates_pairing(&self) -> bool {
        matches!(self, StopReason::Deactivated | StopReason::ProtocolViolation)
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The first `close` wins and records its reason; later calls are no-ops.
#[derive(Debug, Clone, Default)]
pub struct DoneGate {
    token: CancellationToken,
    reason: Arc<OnceLock<StopReason>>,
}

impl DoneGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if this call closed the gate.
    pub fn close(&self, reason: StopReason) -> bool {
        let first = self.reason.set(reason).is_ok();
        if first {
            self.token.cancel();
        }
        first
    }

    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn reason(&self) -> Option<StopReason> {
        self.reason.get().copied()
    }

    pub async fn closed(&self) {
        self.token.cancelled().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_close_wins() {
        let gate = DoneGate::new();
        assert!(gate.close(StopReason::Deactivated));
        assert!(!gate.close(StopReason::TransportClosed));
        assert_eq!(gate.reason(), Some(StopReason::Deactivated));
        assert!(gate.is_closed());
    }

    #[tokio::test]
    async fn concurrent_closers_close_once() {
        let gate = DoneGate::new();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let gate = gate.clone();
                tokio::spawn(async move {
                    let reason = if i % 2 == 0 {
                        StopReason::WriteFailed
                    } else {
                        StopReason::DescriptorRemoved
                    };
                    gate.close(reason)
                })
            })
            .collect();

        let mut winners = 0;
        for h in handles {
            if h.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        gate.closed().await;
        assert!(gate.reason().is_some());
    }
}
