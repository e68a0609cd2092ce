//! Config defaults: fills missing values and auto-corrects invalid ones.

use crate::schema::ClientConfig;
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

pub const DEFAULT_STATUS_UPDATE_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_LIVENESS_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_CODE_LENGTH: usize = 6;
pub const DEFAULT_CODE_ATTEMPTS: u32 = 3;
pub const DEFAULT_CODE_TTL: Duration = Duration::from_secs(120);
pub const DEFAULT_SCREEN_SWITCH_PATH: &str = "/usr/local/bin/screen-switch";
pub const DEFAULT_MAX_IP_VIOLATIONS: u32 = 3;
pub const DEFAULT_BLACKLIST_DURATION: Duration = Duration::from_secs(3600);
pub const DEFAULT_LISTEN_PORT: u16 = 49174;
pub const DEFAULT_DISCONNECT_GRACE: Duration = Duration::from_secs(1);
pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_DEVICE_NAME: &str = "screenlink";

/// Accepted pairing code lengths.
pub const CODE_LENGTH_RANGE: std::ops::RangeInclusive<usize> = 4..=12;

/// Apply all defaults to a freshly loaded config.
pub fn apply_defaults(config: ClientConfig) -> ClientConfig {
    let config = apply_identity_defaults(config);
    let config = apply_interval_defaults(config);
    let config = apply_pairing_defaults(config);
    apply_runtime_defaults(config)
}

/// Regenerate a missing or malformed client id and fill the device name.
fn apply_identity_defaults(mut config: ClientConfig) -> ClientConfig {
    if Uuid::parse_str(&config.client_id).is_err() {
        if !config.client_id.is_empty() {
            warn!(client_id = %config.client_id, "Invalid client_id; generating a new one");
        }
        config.client_id = Uuid::new_v4().to_string();
    }
    if config.device_name.trim().is_empty() {
        config.device_name = local_hostname().unwrap_or_else(|| DEFAULT_DEVICE_NAME.to_string());
    }
    config
}

fn apply_interval_defaults(mut config: ClientConfig) -> ClientConfig {
    if config.status_update_interval < Duration::from_secs(1) {
        warn!(
            value = ?config.status_update_interval,
            "status_update_interval below 1s; using default"
        );
        config.status_update_interval = DEFAULT_STATUS_UPDATE_INTERVAL;
    }
    if config.liveness_interval.is_zero() {
        config.liveness_interval = DEFAULT_LIVENESS_INTERVAL;
    }
    if config.disconnect_grace.is_zero() {
        config.disconnect_grace = DEFAULT_DISCONNECT_GRACE;
    }
    config
}

fn apply_pairing_defaults(mut config: ClientConfig) -> ClientConfig {
    if !CODE_LENGTH_RANGE.contains(&config.verification_code_length) {
        warn!(
            value = config.verification_code_length,
            "verification_code_length out of range; using default"
        );
        config.verification_code_length = DEFAULT_CODE_LENGTH;
    }
    if config.verification_code_attempts == 0 {
        warn!("verification_code_attempts is 0; using default");
        config.verification_code_attempts = DEFAULT_CODE_ATTEMPTS;
    }
    if config.pairing_code_expiration.is_zero() {
        warn!("pairing_code_expiration is 0; using default");
        config.pairing_code_expiration = DEFAULT_CODE_TTL;
    }
    if config.max_ip_violations == 0 {
        warn!("max_ip_violations is 0; using default");
        config.max_ip_violations = DEFAULT_MAX_IP_VIOLATIONS;
    }
    if config.ip_blacklist_duration.is_zero() {
        warn!("ip_blacklist_duration is 0; using default");
        config.ip_blacklist_duration = DEFAULT_BLACKLIST_DURATION;
    }
    config
}

fn apply_runtime_defaults(mut config: ClientConfig) -> ClientConfig {
    if config.screen_switch_path.trim().is_empty() {
        config.screen_switch_path = DEFAULT_SCREEN_SWITCH_PATH.to_string();
    }
    if config.listen_port == 0 {
        config.listen_port = DEFAULT_LISTEN_PORT;
    }
    if config.log_level.trim().is_empty() {
        config.log_level = DEFAULT_LOG_LEVEL.to_string();
    }
    config
}

fn local_hostname() -> Option<String> {
    std::fs::read_to_string("/etc/hostname")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
