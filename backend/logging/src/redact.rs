//! Log Redaction
//!
//! Masks pairing codes, session keys and endpoint credentials before they reach a log line.

use once_cell::sync::Lazy;
use regex::Regex;

// 32-byte keys are 44 base64 chars; SEC1 public keys are 88.
static BASE64_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z0-9+/]{43}=|[A-Za-z0-9+/]{86}==").unwrap());
static QUERY_SECRET_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)([?&](?:token|key|secret)=)[^&\s]+").unwrap());

/// Keeps the first two characters of a pairing code.
pub fn redact_code(code: &str) -> String {
    let visible: String = code.chars().take(2).collect();
    let hidden = code.chars().count().saturating_sub(2);
    format!("{visible}{}", "*".repeat(hidden))
}

/// Redacts base64 key material and credential query parameters in a string.
pub fn redact_secrets(input: &str) -> String {
    let redacted = BASE64_KEY_RE.replace_all(input, "[REDACTED_KEY]");
    QUERY_SECRET_RE
        .replace_all(&redacted, "${1}[REDACTED]")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_code_tail() {
        assert_eq!(redact_code("ABC123"), "AB****");
        assert_eq!(redact_code("A"), "A");
    }

    #[test]
    fn redacts_session_key_and_token() {
        let key = "q83vEjRWeJq83vEjRWeJq83vEjRWeJq83vEjRWeJq80=";
        let raw = format!("session key {key} for wss://host/ws?token=abc123&x=1");
        let clean = redact_secrets(&raw);
        assert!(!clean.contains(key));
        assert!(!clean.contains("abc123"));
        assert!(clean.contains("x=1"));
    }

    #[test]
    fn redacts_public_key_from_shared_pattern() {
        let public_key = format!("BP{}==", "a".repeat(84));
        let first = redact_secrets(&format!("device key {public_key}"));
        let second = redact_secrets(&format!("controller key {public_key}"));
        assert_eq!(first, "device key [REDACTED_KEY]");
        assert_eq!(second, "controller key [REDACTED_KEY]");
    }
}
