//! Pairing coordinator: code issuance, confirmation and the periodic sweep.
//!
//! Holds the single live pairing session. The session lock is never held
//! across disk I/O: state transitions happen under the lock, persistence
//! happens after it is released.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use screenlink_config::{ClientConfig, IpValidationMode};
use screenlink_core::{
    DenyReason, InterfaceInfo, LifecycleEvent, Observers, PairingError,
};
use screenlink_infra::{
    InterfaceSource, PairedDescriptor, PairedSessionStore, PairingCodeStore, reportable,
};
use screenlink_logging::redact_code;
use serde::Serialize;
use std::net::IpAddr;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::address::addresses_match;
use crate::code::{codes_match, generate_code, normalize_code};
use crate::ip_reputation::IpReputationTracker;
use crate::key_exchange::KeyExchange;

/// Interval of the background sweep that expires stale sessions.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5);

/// Prefix of the HKDF context string; the pairing code is appended.
pub const SESSION_KEY_CONTEXT: &str = "screenlink-session:";

#[derive(Debug, Clone)]
pub struct PairingSettings {
    pub client_id: String,
    pub code_length: usize,
    pub max_attempts: u32,
    pub code_ttl: Duration,
    pub ip_validation: IpValidationMode,
    pub require_key_exchange: bool,
    pub sweep_interval: Duration,
}

impl PairingSettings {
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            client_id: config.client_id.clone(),
            code_length: config.verification_code_length,
            max_attempts: config.verification_code_attempts,
            code_ttl: config.pairing_code_expiration,
            ip_validation: config.ip_validation,
            require_key_exchange: config.require_key_exchange,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

#[derive(Debug, Clone)]
struct PairingSession {
    code: String,
    bound_addr: IpAddr,
    expires_at: DateTime<Utc>,
    fail_count: u32,
}

impl PairingSession {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    fn is_usable(&self, now: DateTime<Utc>, max_attempts: u32) -> bool {
        !self.is_expired(now) && self.fail_count < max_attempts
    }
}

/// Result of a successful `issue_code`.
#[derive(Debug, Clone)]
pub struct IssuedCode {
    pub code: String,
    pub expires_at: DateTime<Utc>,
    /// True when an existing usable session was returned unchanged.
    pub already_active: bool,
    /// Device public key for this session (base64 SEC1).
    pub public_key: String,
}

#[derive(Debug, Clone, Default)]
pub struct ConfirmRequest {
    pub code: String,
    pub server_ws: String,
    pub peer_public_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ConfirmOutcome {
    pub client_id: String,
    pub interfaces: Vec<InterfaceInfo>,
    /// Local public key, returned only when no exchange happened.
    pub ecdh_public_key: Option<String>,
    pub session_key_derived: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PairingState {
    Active,
    /// Expired or out of attempts, awaiting the sweep.
    Expired,
    Absent,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingStatus {
    pub state: PairingState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
    pub fail_count: u32,
}

pub struct PairingCoordinator {
    settings: PairingSettings,
    session: Mutex<Option<PairingSession>>,
    keys: KeyExchange,
    tracker: Arc<IpReputationTracker>,
    code_store: PairingCodeStore,
    paired_store: PairedSessionStore,
    interfaces: Arc<dyn InterfaceSource>,
    observers: Observers,
    sweep_cancel: StdMutex<Option<CancellationToken>>,
}

impl PairingCoordinator {
    pub fn new(
        settings: PairingSettings,
        tracker: Arc<IpReputationTracker>,
        code_store: PairingCodeStore,
        paired_store: PairedSessionStore,
        interfaces: Arc<dyn InterfaceSource>,
        observers: Observers,
    ) -> Self {
        Self {
            settings,
            session: Mutex::new(None),
            keys: KeyExchange::new(),
            tracker,
            code_store,
            paired_store,
            interfaces,
            observers,
            sweep_cancel: StdMutex::new(None),
        }
    }

    pub fn settings(&self) -> &PairingSettings {
        &self.settings
    }

    pub fn tracker(&self) -> &Arc<IpReputationTracker> {
        &self.tracker
    }

    pub fn observers(&self) -> &Observers {
        &self.observers
    }

    fn code_ttl(&self) -> ChronoDuration {
        ChronoDuration::from_std(self.settings.code_ttl)
            .unwrap_or_else(|_| ChronoDuration::minutes(2))
    }

    fn emit_failure(&self, reason: &str, fail_count: u32) {
        self.observers.emit(LifecycleEvent::PairingFailed {
            reason: reason.to_string(),
            fail_count,
        });
    }

    /// Issue a pairing code to `requester`, or return the active one.
    pub async fn issue_code(&self, requester: IpAddr) -> Result<IssuedCode, PairingError> {
        if self.tracker.is_blacklisted(requester) {
            warn!(%requester, "Pairing request from blacklisted address");
            return Err(PairingError::AccessDenied(DenyReason::Blacklisted));
        }

        let now = Utc::now();
        let session = {
            let mut guard = self.session.lock().await;
            if let Some(active) = guard
                .as_ref()
                .filter(|s| s.is_usable(now, self.settings.max_attempts))
            {
                debug!(code = %redact_code(&active.code), "Returning active pairing code");
                return Ok(IssuedCode {
                    code: active.code.clone(),
                    expires_at: active.expires_at,
                    already_active: true,
                    public_key: self.keys.public_key_base64(),
                });
            }

            let session = PairingSession {
                code: generate_code(self.settings.code_length),
                bound_addr: requester,
                expires_at: now + self.code_ttl(),
                fail_count: 0,
            };
            self.keys.generate_key_pair();
            *guard = Some(session.clone());
            session
        };

        if let Err(e) = self.code_store.save(&session.code).await {
            warn!(error = %e, "Failed to persist pairing code; discarding session");
            let mut guard = self.session.lock().await;
            if guard.as_ref().is_some_and(|s| s.code == session.code) {
                *guard = None;
                self.keys.clear();
            }
            return Err(PairingError::Storage(e));
        }

        info!(
            code = %redact_code(&session.code),
            %requester,
            expires_at = %session.expires_at,
            "Pairing code issued"
        );
        self.observers.emit(LifecycleEvent::PairingStarted {
            expires_at: session.expires_at,
        });

        Ok(IssuedCode {
            code: session.code,
            expires_at: session.expires_at,
            already_active: false,
            public_key: self.keys.public_key_base64(),
        })
    }

    /// Confirm the active code. On success the descriptor is persisted and
    /// the session, code file and key material are discarded.
    pub async fn confirm_code(
        &self,
        requester: IpAddr,
        request: ConfirmRequest,
    ) -> Result<ConfirmOutcome, PairingError> {
        if self.tracker.is_blacklisted(requester) {
            warn!(%requester, "Confirmation from blacklisted address");
            return Err(PairingError::AccessDenied(DenyReason::Blacklisted));
        }

        let now = Utc::now();
        let supplied = normalize_code(&request.code);

        let (code, session_key, ecdh_public_key) = {
            let mut guard = self.session.lock().await;
            let Some(session) = guard.as_mut() else {
                return Err(PairingError::CodeExpired);
            };

            if !addresses_match(self.settings.ip_validation, session.bound_addr, requester) {
                let fail_count = session.fail_count;
                let bound = session.bound_addr;
                drop(guard);
                let blacklisted = self.tracker.record_violation(requester);
                warn!(%requester, %bound, blacklisted, "Pairing confirmation from mismatched address");
                self.emit_failure(DenyReason::IpMismatch.as_str(), fail_count);
                return Err(PairingError::AccessDenied(DenyReason::IpMismatch));
            }

            if !session.is_usable(now, self.settings.max_attempts) {
                let fail_count = session.fail_count;
                drop(guard);
                debug!(fail_count, "Confirmation against unusable session");
                self.emit_failure("expired_or_max_attempts", fail_count);
                return Err(PairingError::CodeExpired);
            }

            if !codes_match(&session.code, &supplied) {
                session.fail_count += 1;
                let fail_count = session.fail_count;
                drop(guard);
                info!(%requester, fail_count, "Incorrect pairing code");
                self.emit_failure("incorrect_code", fail_count);
                return Err(PairingError::IncorrectCode);
            }

            let server_ws = request.server_ws.trim();
            let invalid = if server_ws.is_empty() {
                Some("serverWs is required")
            } else if !(server_ws.starts_with("ws://") || server_ws.starts_with("wss://")) {
                Some("serverWs must be a ws:// or wss:// URI")
            } else {
                None
            };
            if let Some(message) = invalid {
                let fail_count = session.fail_count;
                drop(guard);
                self.emit_failure("invalid_request", fail_count);
                return Err(PairingError::InvalidRequest(message.into()));
            }

            let peer_key = request
                .peer_public_key
                .as_deref()
                .map(str::trim)
                .filter(|k| !k.is_empty());
            let (session_key, ecdh_public_key) = match peer_key {
                Some(peer_key) => {
                    self.keys.derive_shared_secret(peer_key)?;
                    self.keys
                        .derive_session_key(&format!("{SESSION_KEY_CONTEXT}{}", session.code))?;
                    let key = self.keys.session_key_base64().unwrap_or_default();
                    (key, None)
                }
                None if self.settings.require_key_exchange => {
                    return Err(PairingError::MissingPeerKey);
                }
                None => {
                    warn!("Pairing without key exchange; session will be unencrypted");
                    (String::new(), Some(self.keys.public_key_base64()))
                }
            };

            let code = session.code.clone();
            *guard = None;
            self.keys.clear();
            (code, session_key, ecdh_public_key)
        };

        let descriptor = PairedDescriptor::new(request.server_ws.trim(), session_key);
        self.paired_store.save(&descriptor).await?;
        if let Err(e) = self.code_store.delete().await {
            warn!(error = %e, "Failed to delete pairing code file");
        }
        self.stop_sweeper();

        info!(
            code = %redact_code(&code),
            %requester,
            encrypted = descriptor.is_encrypted(),
            "Pairing succeeded"
        );
        self.observers.emit(LifecycleEvent::PairingSucceeded {
            server_ws: descriptor.server_ws.clone(),
            encrypted: descriptor.is_encrypted(),
        });

        Ok(ConfirmOutcome {
            client_id: self.settings.client_id.clone(),
            interfaces: reportable(self.interfaces.interfaces()),
            session_key_derived: descriptor.is_encrypted(),
            ecdh_public_key,
        })
    }

    /// Destroy an expired or exhausted session and prune the IP tracker.
    pub async fn sweep(&self) {
        let now = Utc::now();
        let destroyed = {
            let mut guard = self.session.lock().await;
            match guard.as_ref() {
                Some(s) if !s.is_usable(now, self.settings.max_attempts) => {
                    let code = s.code.clone();
                    *guard = None;
                    self.keys.clear();
                    Some(code)
                }
                _ => None,
            }
        };

        if let Some(code) = destroyed {
            info!(code = %redact_code(&code), "Pairing session expired");
            self.delete_code_file_if(&code).await;
        }
        self.tracker.sweep();
    }

    /// Removes the code file only while it still holds `code`; a newer
    /// session may have replaced it since the lock was released.
    async fn delete_code_file_if(&self, code: &str) {
        match self.code_store.load().await {
            Ok(Some(on_disk)) if on_disk == code => {
                if let Err(e) = self.code_store.delete().await {
                    warn!(error = %e, "Failed to delete pairing code file");
                }
            }
            Ok(_) => debug!("Pairing code file already replaced"),
            Err(e) => warn!(error = %e, "Failed to read pairing code file"),
        }
    }

    /// Reports a confirmation whose body could not be parsed.
    pub async fn record_invalid_request(&self) {
        let fail_count = self.session.lock().await.as_ref().map_or(0, |s| s.fail_count);
        self.emit_failure("invalid_request", fail_count);
    }

    /// Spawn the periodic sweep, replacing any running one.
    pub fn start_sweeper(self: &Arc<Self>) -> CancellationToken {
        let token = CancellationToken::new();
        if let Some(previous) = self
            .sweep_cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(token.clone())
        {
            previous.cancel();
        }

        let coordinator = Arc::clone(self);
        let cancel = token.clone();
        let period = self.settings.sweep_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => coordinator.sweep().await,
                }
            }
            debug!("Pairing sweeper stopped");
        });
        token
    }

    pub fn stop_sweeper(&self) {
        if let Some(token) = self
            .sweep_cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            token.cancel();
        }
    }

    /// Discard the active session, its code file and key material.
    /// Returns whether a session existed.
    pub async fn reset(&self) -> bool {
        let existed = {
            let mut guard = self.session.lock().await;
            self.keys.clear();
            guard.take().is_some()
        };
        if let Err(e) = self.code_store.delete().await {
            warn!(error = %e, "Failed to delete pairing code file");
        }
        if existed {
            info!("Pairing session reset");
        }
        existed
    }

    pub async fn status(&self) -> PairingStatus {
        let now = Utc::now();
        let guard = self.session.lock().await;
        match guard.as_ref() {
            None => PairingStatus {
                state: PairingState::Absent,
                expiry: None,
                fail_count: 0,
            },
            Some(s) => PairingStatus {
                state: if s.is_usable(now, self.settings.max_attempts) {
                    PairingState::Active
                } else {
                    PairingState::Expired
                },
                expiry: Some(s.expires_at),
                fail_count: s.fail_count,
            },
        }
    }
}
