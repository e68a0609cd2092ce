//! `SCREENLINK_*` environment overrides.
//!
//! Each variable replaces one config field. Values that fail to parse are
//! logged and ignored so a typo never prevents the agent from starting.

use crate::duration::parse_duration;
use crate::schema::ClientConfig;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

pub const ENV_PREFIX: &str = "SCREENLINK_";

/// Apply overrides from the process environment.
pub fn apply_env_overrides(config: ClientConfig) -> ClientConfig {
    apply_env_overrides_with(config, &std::env::vars().collect())
}

/// Apply overrides from a provided map (useful for testing).
pub fn apply_env_overrides_with(
    mut config: ClientConfig,
    env: &HashMap<String, String>,
) -> ClientConfig {
    let lookup = |name: &str| {
        env.get(&format!("{ENV_PREFIX}{name}"))
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    };

    override_duration(lookup("STATUS_UPDATE_INTERVAL"), "STATUS_UPDATE_INTERVAL", &mut config.status_update_interval);
    override_duration(lookup("LIVENESS_INTERVAL"), "LIVENESS_INTERVAL", &mut config.liveness_interval);
    override_duration(lookup("PAIRING_CODE_EXPIRATION"), "PAIRING_CODE_EXPIRATION", &mut config.pairing_code_expiration);
    override_duration(lookup("IP_BLACKLIST_DURATION"), "IP_BLACKLIST_DURATION", &mut config.ip_blacklist_duration);

    override_bool(lookup("DISABLE_COMMANDS"), "DISABLE_COMMANDS", &mut config.disable_commands);
    override_bool(lookup("REQUIRE_KEY_EXCHANGE"), "REQUIRE_KEY_EXCHANGE", &mut config.require_key_exchange);

    override_parsed(lookup("VERIFICATION_CODE_LENGTH"), "VERIFICATION_CODE_LENGTH", &mut config.verification_code_length);
    override_parsed(lookup("VERIFICATION_CODE_ATTEMPTS"), "VERIFICATION_CODE_ATTEMPTS", &mut config.verification_code_attempts);
    override_parsed(lookup("MAX_IP_VIOLATIONS"), "MAX_IP_VIOLATIONS", &mut config.max_ip_violations);
    override_parsed(lookup("LISTEN_PORT"), "LISTEN_PORT", &mut config.listen_port);
    override_parsed(lookup("IP_VALIDATION"), "IP_VALIDATION", &mut config.ip_validation);

    if let Some(path) = lookup("SCREEN_SWITCH_PATH") {
        config.screen_switch_path = path.to_string();
    }
    if let Some(level) = lookup("LOG_LEVEL") {
        config.log_level = level.to_string();
    }
    if let Some(dir) = lookup("LOG_DIR") {
        config.log_dir = Some(dir.into());
    }

    config
}

fn override_duration(raw: Option<&str>, name: &str, field: &mut Duration) {
    let Some(raw) = raw else { return };
    match parse_duration(raw) {
        Ok(d) => {
            debug!(var = %format!("{ENV_PREFIX}{name}"), value = ?d, "Env override");
            *field = d;
        }
        Err(e) => warn!(var = %format!("{ENV_PREFIX}{name}"), error = %e, "Ignoring env override"),
    }
}

fn override_bool(raw: Option<&str>, name: &str, field: &mut bool) {
    let Some(raw) = raw else { return };
    match parse_bool(raw) {
        Some(b) => *field = b,
        None => warn!(var = %format!("{ENV_PREFIX}{name}"), value = raw, "Ignoring non-boolean env override"),
    }
}

fn override_parsed<T>(raw: Option<&str>, name: &str, field: &mut T)
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some(raw) = raw else { return };
    match raw.parse::<T>() {
        Ok(v) => *field = v,
        Err(e) => warn!(var = %format!("{ENV_PREFIX}{name}"), error = %e, "Ignoring env override"),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::IpValidationMode;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn overrides_typed_fields() {
        let config = apply_env_overrides_with(
            ClientConfig::default(),
            &env(&[
                ("SCREENLINK_STATUS_UPDATE_INTERVAL", "10s"),
                ("SCREENLINK_IP_VALIDATION", "strict"),
                ("SCREENLINK_DISABLE_COMMANDS", "yes"),
                ("SCREENLINK_VERIFICATION_CODE_LENGTH", "8"),
                ("SCREENLINK_SCREEN_SWITCH_PATH", "/opt/bin/switch"),
            ]),
        );
        assert_eq!(config.status_update_interval, Duration::from_secs(10));
        assert_eq!(config.ip_validation, IpValidationMode::Strict);
        assert!(config.disable_commands);
        assert_eq!(config.verification_code_length, 8);
        assert_eq!(config.screen_switch_path, "/opt/bin/switch");
    }

    #[test]
    fn ignores_invalid_values() {
        let config = apply_env_overrides_with(
            ClientConfig::default(),
            &env(&[
                ("SCREENLINK_MAX_IP_VIOLATIONS", "many"),
                ("SCREENLINK_IP_BLACKLIST_DURATION", "forever"),
                ("SCREENLINK_REQUIRE_KEY_EXCHANGE", "maybe"),
            ]),
        );
        assert_eq!(config.max_ip_violations, 3);
        assert_eq!(config.ip_blacklist_duration, Duration::from_secs(3600));
        assert!(config.require_key_exchange);
    }

    #[test]
    fn unprefixed_vars_are_ignored() {
        let config = apply_env_overrides_with(
            ClientConfig::default(),
            &env(&[("DISABLE_COMMANDS", "true")]),
        );
        assert!(!config.disable_commands);
    }
}
