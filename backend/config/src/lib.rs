//! `screenlink-config`: device agent configuration.
//!
//! Provides:
//! - Typed `ClientConfig` schema persisted as JSON
//! - Duration strings (`500ms`, `30s`, `1h30m`)
//! - `SCREENLINK_*` environment overrides and `.env` loading
//! - Default application with auto-correction of invalid values

pub mod defaults;
pub mod duration;
pub mod env;
pub mod io;
pub mod schema;

pub use defaults::apply_defaults;
pub use duration::{format_duration, parse_duration, DurationParseError};
pub use env::{apply_env_overrides, apply_env_overrides_with};
pub use io::{config_dir, config_file_path, load_config, load_dotenv, write_config};
pub use schema::{ClientConfig, IpValidationMode};

use anyhow::Result;
use std::path::Path;
use tracing::warn;

/// Load the config file, apply environment overrides and defaults, and write
/// the corrected result back so the file always reflects the effective values.
///
/// This is the main entry point for loading a config at runtime.
pub async fn load_or_create(path: &Path) -> Result<ClientConfig> {
    let config = load_config(path).await?;
    let config = apply_env_overrides(config);
    let config = apply_defaults(config);

    if let Err(e) = write_config(&config, path).await {
        // A read-only config dir is not fatal; the effective config is still valid.
        warn!(path = %path.display(), error = %e, "Could not persist config");
    }

    Ok(config)
}
