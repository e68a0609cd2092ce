pub mod address;
pub mod code;
pub mod ip_reputation;
pub mod key_exchange;
pub mod message_cipher;
pub mod pairing;

pub use address::addresses_match;
pub use code::{codes_match, generate_code};
pub use ip_reputation::{BlacklistEntry, IpReputationTracker};
pub use key_exchange::KeyExchange;
pub use message_cipher::{
    EncryptedEnvelope, decrypt, encrypt, is_encrypted_envelope, unwrap_envelope, wrap_envelope,
};
pub use pairing::{
    ConfirmOutcome, ConfirmRequest, IssuedCode, PairingCoordinator, PairingSettings, PairingState,
    PairingStatus,
};
