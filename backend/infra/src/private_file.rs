use screenlink_core::StoreError;
use std::io::ErrorKind;
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Owner read/write only.
const PRIVATE_MODE: u32 = 0o600;

/// Write `contents` atomically (temp file, then rename) with mode 0600.
pub(crate) async fn write_private(path: &Path, contents: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| StoreError::io(parent, e))?;
    }

    let tmp_path = path.with_extension("tmp");
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(PRIVATE_MODE);

    let mut file = options
        .open(&tmp_path)
        .await
        .map_err(|e| StoreError::io(&tmp_path, e))?;
    file.write_all(contents)
        .await
        .map_err(|e| StoreError::io(&tmp_path, e))?;
    file.sync_all()
        .await
        .map_err(|e| StoreError::io(&tmp_path, e))?;
    drop(file);

    fs::rename(&tmp_path, path)
        .await
        .map_err(|e| StoreError::io(path, e))
}

/// Read a file, mapping "not found" to `None`.
pub(crate) async fn read_optional(path: &Path) -> Result<Option<String>, StoreError> {
    match fs::read_to_string(path).await {
        Ok(s) => Ok(Some(s)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StoreError::io(path, e)),
    }
}

/// Remove a file. Returns whether it existed.
pub(crate) async fn remove_optional(path: &Path) -> Result<bool, StoreError> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(StoreError::io(path, e)),
    }
}

pub(crate) async fn exists(path: &Path) -> bool {
    fs::try_exists(path).await.unwrap_or(false)
}
