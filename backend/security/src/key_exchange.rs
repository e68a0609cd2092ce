//! Ephemeral P-256 key agreement and HKDF-SHA256 session key derivation.
//!
//! One engine instance lives for the whole process; its state is replaced on
//! every new pairing session and wiped when the session ends.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hkdf::Hkdf;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::{PublicKey, SecretKey, ecdh};
use rand::rngs::OsRng;
use screenlink_core::KeyExchangeError;
use sha2::Sha256;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;
use zeroize::Zeroizing;

pub const SESSION_KEY_LEN: usize = 32;

#[derive(Default)]
struct KeyState {
    // `SecretKey` zeroizes itself on drop.
    secret: Option<SecretKey>,
    public: Option<Vec<u8>>,
    shared: Option<Zeroizing<[u8; 32]>>,
    session_key: Option<Zeroizing<[u8; SESSION_KEY_LEN]>>,
}

#[derive(Default)]
pub struct KeyExchange {
    state: Mutex<KeyState>,
}

impl KeyExchange {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, KeyState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replaces any previous key material with a fresh key pair.
    pub fn generate_key_pair(&self) {
        let secret = SecretKey::random(&mut OsRng);
        let public = secret.public_key().to_encoded_point(false).as_bytes().to_vec();
        *self.state() = KeyState {
            secret: Some(secret),
            public: Some(public),
            shared: None,
            session_key: None,
        };
        debug!("Generated ephemeral P-256 key pair");
    }

    pub fn has_key_pair(&self) -> bool {
        self.state().secret.is_some()
    }

    /// Base64 of the uncompressed SEC1 public point, or empty if none exists.
    pub fn public_key_base64(&self) -> String {
        self.state()
            .public
            .as_ref()
            .map(|p| STANDARD.encode(p))
            .unwrap_or_default()
    }

    pub fn derive_shared_secret(&self, peer_public_key_b64: &str) -> Result<(), KeyExchangeError> {
        let peer_bytes = STANDARD
            .decode(peer_public_key_b64.trim())
            .map_err(|e| KeyExchangeError::InvalidPeerKey(e.to_string()))?;
        let peer = PublicKey::from_sec1_bytes(&peer_bytes)
            .map_err(|_| KeyExchangeError::InvalidPeerKey("not a valid P-256 point".into()))?;

        let mut state = self.state();
        let secret = state.secret.as_ref().ok_or(KeyExchangeError::NoLocalKey)?;

        let shared = ecdh::diffie_hellman(secret.to_nonzero_scalar(), peer.as_affine());
        let mut bytes = Zeroizing::new([0u8; 32]);
        bytes.copy_from_slice(shared.raw_secret_bytes().as_slice());
        state.shared = Some(bytes);
        state.session_key = None;
        debug!("Derived ECDH shared secret");
        Ok(())
    }

    /// HKDF-SHA256 over the shared secret, no salt, `info` as context.
    pub fn derive_session_key(&self, info: &str) -> Result<(), KeyExchangeError> {
        let mut state = self.state();
        let shared = state.shared.as_ref().ok_or(KeyExchangeError::NoSharedSecret)?;

        let hk = Hkdf::<Sha256>::new(None, shared.as_slice());
        let mut okm = Zeroizing::new([0u8; SESSION_KEY_LEN]);
        hk.expand(info.as_bytes(), okm.as_mut_slice())
            .map_err(|e| KeyExchangeError::Derivation(e.to_string()))?;
        state.session_key = Some(okm);
        debug!("Derived session key");
        Ok(())
    }

    pub fn shared_secret(&self) -> Option<Zeroizing<[u8; 32]>> {
        self.state().shared.clone()
    }

    pub fn session_key(&self) -> Option<Zeroizing<[u8; SESSION_KEY_LEN]>> {
        self.state().session_key.clone()
    }

    pub fn session_key_base64(&self) -> Option<String> {
        self.state()
            .session_key
            .as_ref()
            .map(|k| STANDARD.encode(k.as_slice()))
    }

    /// Discards all key material.
    pub fn clear(&self) {
        *self.state() = KeyState::default();
        debug!("Key exchange state cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_engines_agree_on_session_key() {
        let device = KeyExchange::new();
        let controller = KeyExchange::new();
        device.generate_key_pair();
        controller.generate_key_pair();

        device
            .derive_shared_secret(&controller.public_key_base64())
            .unwrap();
        controller
            .derive_shared_secret(&device.public_key_base64())
            .unwrap();
        assert_eq!(device.shared_secret(), controller.shared_secret());

        device.derive_session_key("screenlink-session:ABC123").unwrap();
        controller.derive_session_key("screenlink-session:ABC123").unwrap();
        let key = device.session_key().unwrap();
        assert_eq!(Some(key), controller.session_key());
    }

    #[test]
    fn context_changes_session_key() {
        let a = KeyExchange::new();
        let b = KeyExchange::new();
        a.generate_key_pair();
        b.generate_key_pair();
        a.derive_shared_secret(&b.public_key_base64()).unwrap();

        a.derive_session_key("screenlink-session:AAAAAA").unwrap();
        let first = a.session_key_base64();
        a.derive_session_key("screenlink-session:BBBBBB").unwrap();
        assert_ne!(first, a.session_key_base64());
    }

    #[test]
    fn public_key_is_uncompressed_sec1() {
        let kx = KeyExchange::new();
        assert_eq!(kx.public_key_base64(), "");
        kx.generate_key_pair();
        let raw = STANDARD.decode(kx.public_key_base64()).unwrap();
        assert_eq!(raw.len(), 65);
        assert_eq!(raw[0], 0x04);
    }

    #[test]
    fn rejects_bad_peer_keys() {
        let kx = KeyExchange::new();
        kx.generate_key_pair();
        assert!(matches!(
            kx.derive_shared_secret("not base64!"),
            Err(KeyExchangeError::InvalidPeerKey(_))
        ));
        let junk = STANDARD.encode([0x04u8; 65]);
        assert!(matches!(
            kx.derive_shared_secret(&junk),
            Err(KeyExchangeError::InvalidPeerKey(_))
        ));
    }

    #[test]
    fn preconditions_are_enforced() {
        let peer = KeyExchange::new();
        peer.generate_key_pair();

        let kx = KeyExchange::new();
        assert_eq!(
            kx.derive_shared_secret(&peer.public_key_base64()),
            Err(KeyExchangeError::NoLocalKey)
        );
        assert_eq!(
            kx.derive_session_key("ctx"),
            Err(KeyExchangeError::NoSharedSecret)
        );
    }

    #[test]
    fn clear_discards_everything() {
        let a = KeyExchange::new();
        let b = KeyExchange::new();
        a.generate_key_pair();
        b.generate_key_pair();
        a.derive_shared_secret(&b.public_key_base64()).unwrap();
        a.derive_session_key("ctx").unwrap();

        a.clear();
        assert!(!a.has_key_pair());
        assert!(a.shared_secret().is_none());
        assert!(a.session_key_base64().is_none());
        assert_eq!(a.public_key_base64(), "");
    }
}
