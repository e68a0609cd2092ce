use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Why a pairing request was refused outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    Blacklisted,
    IpMismatch,
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::Blacklisted => "blacklisted",
            DenyReason::IpMismatch => "ip_mismatch",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcomes of the pairing state machine that are surfaced to the requester.
#[derive(Debug, Error)]
pub enum PairingError {
    #[error("access denied: {0}")]
    AccessDenied(DenyReason),

    #[error("pairing code expired or exhausted")]
    CodeExpired,

    #[error("incorrect pairing code")]
    IncorrectCode,

    #[error("key exchange failed: {0}")]
    KeyExchangeFailed(#[from] KeyExchangeError),

    #[error("a server public key is required to pair")]
    MissingPeerKey,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

impl PairingError {
    /// Stable machine-readable code used in HTTP bodies and failure events.
    pub fn code(&self) -> &'static str {
        match self {
            PairingError::AccessDenied(reason) => reason.as_str(),
            PairingError::CodeExpired => "code_expired",
            PairingError::IncorrectCode => "incorrect_code",
            PairingError::KeyExchangeFailed(_) => "key_exchange_failed",
            PairingError::MissingPeerKey => "missing_peer_key",
            PairingError::InvalidRequest(_) => "invalid_request",
            PairingError::Storage(_) => "storage_error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyExchangeError {
    #[error("invalid peer public key: {0}")]
    InvalidPeerKey(String),

    #[error("no local key pair has been generated")]
    NoLocalKey,

    #[error("no shared secret has been derived")]
    NoSharedSecret,

    #[error("session key derivation failed: {0}")]
    Derivation(String),
}

/// Integrity and format failures of the message cipher.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CipherError {
    #[error("session key must decode to exactly 32 bytes")]
    InvalidKey,

    #[error("payload is shorter than one cipher block")]
    TooShort,

    #[error("payload length is not a multiple of the block size")]
    Misaligned,

    #[error("invalid PKCS7 padding")]
    InvalidPadding,

    #[error("message is not an encrypted envelope")]
    NotEncrypted,

    #[error("encrypted envelope has no payload")]
    MissingPayload,

    #[error("base64 decoding failed: {0}")]
    Encoding(String),

    #[error("message serialization failed: {0}")]
    Serialization(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt state file {path}: {message}")]
    Corrupt { path: PathBuf, message: String },
}

impl StoreError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Failures of the duplex link. Cipher and protocol failures invalidate the
/// pairing; transport failures are retried by the reconnect loop.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("dial failed: {0}")]
    Dial(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error(transparent)]
    Cipher(#[from] CipherError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("no active connection")]
    NotConnected,
}

impl LinkError {
    /// True when the error means the pairing itself is no longer trustworthy.
    pub fn invalidates_pairing(&self) -> bool {
        matches!(self, LinkError::Protocol(_) | LinkError::Cipher(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairing_error_codes_are_stable() {
        assert_eq!(
            PairingError::AccessDenied(DenyReason::IpMismatch).code(),
            "ip_mismatch"
        );
        assert_eq!(PairingError::CodeExpired.code(), "code_expired");
        assert_eq!(
            PairingError::from(KeyExchangeError::NoLocalKey).code(),
            "key_exchange_failed"
        );
    }

    #[test]
    fn cipher_failures_invalidate_pairing() {
        assert!(LinkError::from(CipherError::InvalidPadding).invalidates_pairing());
        assert!(!LinkError::Transport("reset".into()).invalidates_pairing());
    }
}
