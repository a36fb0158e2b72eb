//! Atomic file replacement.
//!
//! ```text
//! write_atomic("/etc/boxvps/data/users.json", bytes)
//!   1. create_dir_all("/etc/boxvps/data")
//!   2. write  "/etc/boxvps/data/.users.json.tmp"
//!   3. fsync  the temp file
//!   4. rename temp → users.json     (atomic on the same filesystem)
//! ```

use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::{StoreError, StoreResult};

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.tmp"))
}

/// Replaces `path` with `bytes`, creating parent directories as needed.
///
/// Readers observe either the previous contents or the new contents.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> StoreResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| StoreError::io(parent, e))?;
    }

    let tmp = temp_path(path);
    let result = async {
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp, path).await
    }
    .await;

    if let Err(e) = result {
        // Best effort: a stale temp file is harmless but untidy
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(StoreError::io(path, e));
    }

    debug!(path = %path.display(), bytes = bytes.len(), "File replaced");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_creates_parents_and_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/file.json");

        write_atomic(&path, b"first").await.unwrap();
        write_atomic(&path, b"second").await.unwrap();

        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"second");
        assert!(!temp_path(&path).exists());
    }

    #[tokio::test]
    async fn test_failed_write_leaves_target_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("users.json");
        write_atomic(&target, b"original").await.unwrap();

        // A directory at the temp path makes File::create fail
        tokio::fs::create_dir(temp_path(&target)).await.unwrap();
        assert!(write_atomic(&target, b"new").await.is_err());

        assert_eq!(tokio::fs::read(&target).await.unwrap(), b"original");
    }

    #[test]
    fn test_temp_path_is_sibling() {
        let tmp = temp_path(Path::new("/etc/boxvps/data/users.json"));
        assert_eq!(tmp, PathBuf::from("/etc/boxvps/data/.users.json.tmp"));
    }
}
