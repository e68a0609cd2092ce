//! AES-256-CBC message encryption and the encrypted envelope wire format.
//!
//! Payloads are `base64(IV || ciphertext)` with a fresh random IV per message
//! and PKCS7 padding. The `timestamp` field travels in the clear on the
//! envelope so liveness can be judged without decrypting.

use aes::Aes256;
use aes::cipher::block_padding::NoPadding;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rand::RngCore;
use rand::rngs::OsRng;
use screenlink_core::CipherError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use zeroize::Zeroizing;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

pub const BLOCK_SIZE: usize = 16;
pub const ENVELOPE_TYPE: &str = "encrypted";

/// Wire wrapper around an encrypted message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncryptedEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub encrypted: bool,
    pub payload: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Value>,
}

impl EncryptedEnvelope {
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

fn decode_key(key_b64: &str) -> Result<Zeroizing<Vec<u8>>, CipherError> {
    let key = Zeroizing::new(
        STANDARD
            .decode(key_b64.trim())
            .map_err(|_| CipherError::InvalidKey)?,
    );
    if key.len() != 32 {
        return Err(CipherError::InvalidKey);
    }
    Ok(key)
}

fn pkcs7_pad(mut data: Vec<u8>) -> Vec<u8> {
    let pad = BLOCK_SIZE - data.len() % BLOCK_SIZE;
    data.extend(std::iter::repeat(pad as u8).take(pad));
    data
}

fn pkcs7_unpad(mut data: Vec<u8>) -> Result<Vec<u8>, CipherError> {
    let pad = *data.last().ok_or(CipherError::InvalidPadding)? as usize;
    if pad == 0 || pad > BLOCK_SIZE || pad > data.len() {
        return Err(CipherError::InvalidPadding);
    }
    if !data[data.len() - pad..].iter().all(|&b| b as usize == pad) {
        return Err(CipherError::InvalidPadding);
    }
    data.truncate(data.len() - pad);
    Ok(data)
}

/// Serialize, pad and encrypt `message`. Returns `base64(IV || ciphertext)`.
pub fn encrypt(message: &Value, key_b64: &str) -> Result<String, CipherError> {
    let key = decode_key(key_b64)?;
    let plaintext =
        serde_json::to_vec(message).map_err(|e| CipherError::Serialization(e.to_string()))?;

    let mut iv = [0u8; BLOCK_SIZE];
    OsRng.fill_bytes(&mut iv);

    let ciphertext = Aes256CbcEnc::new_from_slices(&key, &iv)
        .map_err(|_| CipherError::InvalidKey)?
        .encrypt_padded_vec_mut::<NoPadding>(&pkcs7_pad(plaintext));

    let mut out = Vec::with_capacity(BLOCK_SIZE + ciphertext.len());
    out.extend_from_slice(&iv);
    out.extend_from_slice(&ciphertext);
    Ok(STANDARD.encode(out))
}

pub fn decrypt(payload_b64: &str, key_b64: &str) -> Result<Value, CipherError> {
    let key = decode_key(key_b64)?;
    let data = STANDARD
        .decode(payload_b64.trim())
        .map_err(|e| CipherError::Encoding(e.to_string()))?;

    // IV plus at least one ciphertext block.
    if data.len() < 2 * BLOCK_SIZE {
        return Err(CipherError::TooShort);
    }
    let (iv, ciphertext) = data.split_at(BLOCK_SIZE);
    if ciphertext.len() % BLOCK_SIZE != 0 {
        return Err(CipherError::Misaligned);
    }

    let padded = Aes256CbcDec::new_from_slices(&key, iv)
        .map_err(|_| CipherError::InvalidKey)?
        .decrypt_padded_vec_mut::<NoPadding>(ciphertext)
        .map_err(|_| CipherError::InvalidPadding)?;
    let plaintext = pkcs7_unpad(padded)?;

    serde_json::from_slice(&plaintext).map_err(|e| CipherError::Serialization(e.to_string()))
}

/// Encrypt `message` into an envelope, copying its `timestamp` in the clear.
pub fn wrap_envelope(message: &Value, key_b64: &str) -> Result<EncryptedEnvelope, CipherError> {
    Ok(EncryptedEnvelope {
        kind: ENVELOPE_TYPE.to_string(),
        encrypted: true,
        payload: encrypt(message, key_b64)?,
        timestamp: message.get("timestamp").cloned(),
    })
}

pub fn unwrap_envelope(envelope: &Value, key_b64: &str) -> Result<Value, CipherError> {
    if envelope.get("encrypted").and_then(Value::as_bool) != Some(true) {
        return Err(CipherError::NotEncrypted);
    }
    let payload = envelope
        .get("payload")
        .and_then(Value::as_str)
        .filter(|p| !p.is_empty())
        .ok_or(CipherError::MissingPayload)?;
    decrypt(payload, key_b64)
}

/// True for an object with `type: "encrypted"`, `encrypted: true` and a string payload.
pub fn is_encrypted_envelope(message: &Value) -> bool {
    message.get("type").and_then(Value::as_str) == Some(ENVELOPE_TYPE)
        && message.get("encrypted").and_then(Value::as_bool) == Some(true)
        && message.get("payload").is_some_and(Value::is_string)
}
