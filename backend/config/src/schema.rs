//! Device agent configuration schema.

use crate::defaults::*;
use crate::duration::serde_str;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// How the address confirming a pairing code is compared with the address
/// that requested it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IpValidationMode {
    /// Addresses must be identical.
    Strict,
    /// Same /24 for IPv4, same /64 for IPv6.
    #[default]
    Subnet,
    /// Identical, or both on private, loopback or link-local ranges.
    Permissive,
    /// Never reports a mismatch.
    Disabled,
}

impl FromStr for IpValidationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "subnet" => Ok(Self::Subnet),
            "permissive" => Ok(Self::Permissive),
            "disabled" | "off" | "none" => Ok(Self::Disabled),
            other => Err(format!("unknown ip validation mode: {other}")),
        }
    }
}

impl fmt::Display for IpValidationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Strict => "strict",
            Self::Subnet => "subnet",
            Self::Permissive => "permissive",
            Self::Disabled => "disabled",
        };
        f.write_str(s)
    }
}

/// Root configuration for the device agent, stored as `config.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Stable device identity reported to the controller (UUID v4).
    pub client_id: String,

    pub device_name: String,

    #[serde(with = "serde_str")]
    pub status_update_interval: Duration,

    /// How often the link checks that the paired descriptor still exists.
    #[serde(with = "serde_str")]
    pub liveness_interval: Duration,

    /// Reject every remote command without side effects.
    pub disable_commands: bool,

    pub verification_code_length: usize,
    pub verification_code_attempts: u32,

    #[serde(with = "serde_str")]
    pub pairing_code_expiration: Duration,

    /// External utility driving screen list/switch/reload.
    pub screen_switch_path: String,

    pub ip_validation: IpValidationMode,
    pub max_ip_violations: u32,

    #[serde(with = "serde_str")]
    pub ip_blacklist_duration: Duration,

    /// Reject confirmations that omit the server public key.
    pub require_key_exchange: bool,

    pub listen_port: u16,

    /// Grace period for the close handshake on graceful disconnect.
    #[serde(with = "serde_str")]
    pub disconnect_grace: Duration,

    pub log_level: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            device_name: String::new(),
            status_update_interval: DEFAULT_STATUS_UPDATE_INTERVAL,
            liveness_interval: DEFAULT_LIVENESS_INTERVAL,
            disable_commands: false,
            verification_code_length: DEFAULT_CODE_LENGTH,
            verification_code_attempts: DEFAULT_CODE_ATTEMPTS,
            pairing_code_expiration: DEFAULT_CODE_TTL,
            screen_switch_path: DEFAULT_SCREEN_SWITCH_PATH.to_string(),
            ip_validation: IpValidationMode::default(),
            max_ip_violations: DEFAULT_MAX_IP_VIOLATIONS,
            ip_blacklist_duration: DEFAULT_BLACKLIST_DURATION,
            require_key_exchange: true,
            listen_port: DEFAULT_LISTEN_PORT,
            disconnect_grace: DEFAULT_DISCONNECT_GRACE,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            log_dir: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_round_trip_as_strings() {
        let config = ClientConfig::default();
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["status_update_interval"], "30s");
        assert_eq!(json["pairing_code_expiration"], "2m");
        assert_eq!(json["ip_validation"], "subnet");

        let back: ClientConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"disable_commands": true, "ip_validation": "strict"}"#)
                .unwrap();
        assert!(config.disable_commands);
        assert_eq!(config.ip_validation, IpValidationMode::Strict);
        assert_eq!(config.verification_code_length, 6);
        assert!(config.require_key_exchange);
    }

    #[test]
    fn validation_mode_parses_aliases() {
        assert_eq!("OFF".parse::<IpValidationMode>().unwrap(), IpValidationMode::Disabled);
        assert!("loose".parse::<IpValidationMode>().is_err());
    }
}
