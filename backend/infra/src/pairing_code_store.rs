//! Pairing Code Store
//!
//! Single-value persistence of the active pairing code (`pairing_code.txt`),
//! read by the local display and the `pairing get` command.

use screenlink_core::StoreError;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::private_file::{read_optional, remove_optional, write_private};

const CODE_FILE_NAME: &str = "pairing_code.txt";

#[derive(Debug, Clone)]
pub struct PairingCodeStore {
    path: PathBuf,
}

impl PairingCodeStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(CODE_FILE_NAME),
        }
    }

    /// Directory from `SCREENLINK_PAIRING_PATH`, default `/var/lib/screenlink`.
    pub fn from_env() -> Self {
        Self::new(crate::state_dir_from_env("SCREENLINK_PAIRING_PATH"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn save(&self, code: &str) -> Result<(), StoreError> {
        write_private(&self.path, code.as_bytes()).await?;
        debug!(path = %self.path.display(), "Saved pairing code");
        Ok(())
    }

    /// The stored code, or `None` when absent or blank.
    pub async fn load(&self) -> Result<Option<String>, StoreError> {
        Ok(read_optional(&self.path)
            .await?
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()))
    }

    pub async fn delete(&self) -> Result<bool, StoreError> {
        remove_optional(&self.path).await
    }
}
