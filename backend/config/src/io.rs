//! Config file read/write.

use crate::schema::ClientConfig;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Default config file name within the config directory.
const CONFIG_FILE_NAME: &str = "config.json";

const DEFAULT_CONFIG_DIR: &str = "/etc/screenlink";

/// Resolve the config directory.
/// Priority: `SCREENLINK_CONFIG_PATH` env > `/etc/screenlink`
pub fn config_dir() -> PathBuf {
    match std::env::var("SCREENLINK_CONFIG_PATH") {
        Ok(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
        _ => PathBuf::from(DEFAULT_CONFIG_DIR),
    }
}

/// Resolve the full path to the config file.
pub fn config_file_path(config_dir: &Path) -> PathBuf {
    config_dir.join(CONFIG_FILE_NAME)
}

/// Load variables from a `.env` file in the working directory, if any.
/// Existing process variables win.
pub fn load_dotenv() -> Option<PathBuf> {
    match dotenvy::dotenv() {
        Ok(path) => {
            debug!(path = %path.display(), "Loaded .env");
            Some(path)
        }
        Err(_) => None,
    }
}

/// Load and parse the config from disk.
///
/// Returns `Ok(Default::default())` if the file doesn't exist (first run).
pub async fn load_config(path: &Path) -> Result<ClientConfig> {
    if !fs::try_exists(path).await.unwrap_or(false) {
        debug!(path = %path.display(), "Config file does not exist; using defaults");
        return Ok(ClientConfig::default());
    }

    let raw = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: ClientConfig = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse config JSON at: {}", path.display()))?;

    info!(path = %path.display(), "Loaded config");
    Ok(config)
}

/// Write config to disk atomically (write to temp file, rename).
pub async fn write_config(config: &ClientConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await.with_context(|| {
            format!("Failed to create config directory: {}", parent.display())
        })?;
    }

    let json = serde_json::to_string_pretty(config).context("Failed to serialize config")?;

    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, json.as_bytes())
        .await
        .with_context(|| format!("Failed to write temp config: {}", tmp_path.display()))?;

    fs::rename(&tmp_path, path).await.with_context(|| {
        format!("Failed to rename temp config to: {}", path.display())
    })?;

    debug!(path = %path.display(), "Wrote config");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_or_create;
    use uuid::Uuid;

    #[tokio::test]
    async fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("config.json")).await.unwrap();
        assert_eq!(config, ClientConfig::default());
    }

    #[tokio::test]
    async fn load_or_create_persists_corrected_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = config_file_path(dir.path());
        tokio::fs::write(&path, r#"{"client_id":"bogus","verification_code_attempts":0}"#)
            .await
            .unwrap();

        let config = load_or_create(&path).await.unwrap();
        assert!(Uuid::parse_str(&config.client_id).is_ok());
        assert_eq!(config.verification_code_attempts, 3);

        let reread = load_config(&path).await.unwrap();
        assert_eq!(reread.client_id, config.client_id);
    }

    #[tokio::test]
    async fn rejects_malformed_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = config_file_path(dir.path());
        tokio::fs::write(&path, "{not json").await.unwrap();
        let err = load_config(&path).await.unwrap_err();
        assert!(err.to_string().contains("Failed to parse config JSON"));
    }
}
