//! Paired Session Store
//!
//! Persists the post-pairing descriptor (`paired.json`). Its presence is what
//! keeps the agent in session mode; deleting it forces re-pairing.

use screenlink_core::StoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::private_file::{exists, read_optional, remove_optional, write_private};

const PAIRED_FILE_NAME: &str = "paired.json";

/// The durable record of a completed pairing.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairedDescriptor {
    pub server_ws: String,
    /// Base64 session key. Empty on the legacy unencrypted path.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub session_key: String,
}

impl PairedDescriptor {
    pub fn new(server_ws: impl Into<String>, session_key: impl Into<String>) -> Self {
        Self {
            server_ws: server_ws.into(),
            session_key: session_key.into(),
        }
    }

    pub fn is_encrypted(&self) -> bool {
        !self.session_key.is_empty()
    }
}

impl fmt::Debug for PairedDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PairedDescriptor")
            .field("server_ws", &self.server_ws)
            .field("session_key", &if self.is_encrypted() { "<set>" } else { "<none>" })
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct PairedSessionStore {
    path: PathBuf,
}

impl PairedSessionStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(PAIRED_FILE_NAME),
        }
    }

    /// Directory from `SCREENLINK_STATE_PATH`, default `/var/lib/screenlink`.
    pub fn from_env() -> Self {
        Self::new(crate::state_dir_from_env("SCREENLINK_STATE_PATH"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn save(&self, descriptor: &PairedDescriptor) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(descriptor).map_err(|e| StoreError::Corrupt {
            path: self.path.clone(),
            message: e.to_string(),
        })?;
        write_private(&self.path, &json).await?;
        info!(
            path = %self.path.display(),
            encrypted = descriptor.is_encrypted(),
            "Saved paired session descriptor"
        );
        Ok(())
    }

    /// `Ok(None)` when no pairing exists.
    pub async fn load(&self) -> Result<Option<PairedDescriptor>, StoreError> {
        let Some(raw) = read_optional(&self.path).await? else {
            return Ok(None);
        };
        let descriptor: PairedDescriptor =
            serde_json::from_str(&raw).map_err(|e| StoreError::Corrupt {
                path: self.path.clone(),
                message: e.to_string(),
            })?;
        if descriptor.server_ws.trim().is_empty() {
            return Err(StoreError::Corrupt {
                path: self.path.clone(),
                message: "server_ws is empty".into(),
            });
        }
        Ok(Some(descriptor))
    }

    pub async fn exists(&self) -> bool {
        exists(&self.path).await
    }

    /// Removes the descriptor. A missing file is not an error.
    pub async fn delete(&self) -> Result<bool, StoreError> {
        let removed = remove_optional(&self.path).await?;
        if removed {
            info!(path = %self.path.display(), "Deleted paired session descriptor");
        } else {
            debug!(path = %self.path.display(), "No paired session descriptor to delete");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_load_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = PairedSessionStore::new(dir.path());
        assert!(store.load().await.unwrap().is_none());

        let descriptor = PairedDescriptor::new("ws://host/ws", "c2Vzc2lvbi1rZXk=");
        store.save(&descriptor).await.unwrap();
        assert!(store.exists().await);
        assert_eq!(store.load().await.unwrap(), Some(descriptor));

        assert!(store.delete().await.unwrap());
        assert!(!store.exists().await);
        assert!(!store.delete().await.unwrap());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn descriptor_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = PairedSessionStore::new(dir.path());
        store
            .save(&PairedDescriptor::new("ws://host/ws", ""))
            .await
            .unwrap();
        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn legacy_descriptor_omits_session_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = PairedSessionStore::new(dir.path());
        store
            .save(&PairedDescriptor::new("ws://host/ws", ""))
            .await
            .unwrap();

        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert!(!raw.contains("session_key"));
        let loaded = store.load().await.unwrap().unwrap();
        assert!(!loaded.is_encrypted());
    }

    #[tokio::test]
    async fn corrupt_descriptor_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = PairedSessionStore::new(dir.path());
        std::fs::write(store.path(), r#"{"server_ws":""}"#).unwrap();
        assert!(matches!(store.load().await, Err(StoreError::Corrupt { .. })));
    }

    #[test]
    fn debug_hides_session_key() {
        let descriptor = PairedDescriptor::new("ws://host/ws", "c2VjcmV0");
        assert!(!format!("{descriptor:?}").contains("c2VjcmV0"));
    }
}
