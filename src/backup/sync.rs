//! Durability sync
//!
//! A backup is only reported as done once its bytes are on disk.

use crate::error::{Error, Result};
use std::path::Path;
use walkdir::WalkDir;

/// Flush filesystem buffers for the whole system
///
/// Falls back to `fsync` of every file under `root` when the system `sync`
/// cannot be run.
pub async fn durability_sync(root: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        match tokio::process::Command::new("sync").status().await {
            Ok(status) if status.success() => return Ok(()),
            Ok(status) => tracing::warn!("sync exited with {}, syncing backup files", status),
            Err(e) => tracing::warn!("Failed to run sync ({}), syncing backup files", e),
        }
    }

    let root = root.to_path_buf();
    let target = root.clone();
    tokio::task::spawn_blocking(move || sync_tree(&target))
        .await
        .map_err(|e| Error::filesystem(&root, format!("sync task failed: {}", e)))?
}

/// fsync every regular file under `root`
pub fn sync_tree(root: &Path) -> Result<()> {
    for entry in WalkDir::new(root) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            Error::filesystem(path, format!("Failed to read directory: {}", e))
        })?;

        if entry.file_type().is_file() {
            std::fs::File::open(entry.path())
                .and_then(|f| f.sync_all())
                .map_err(|e| Error::filesystem(entry.path(), format!("Failed to sync: {}", e)))?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_sync_tree() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("data/t")).unwrap();
        std::fs::write(dir.path().join("data/t/t.spa"), b"1234").unwrap();
        std::fs::write(dir.path().join("versions.json"), b"{}").unwrap();

        sync_tree(dir.path()).unwrap();
    }

    #[test]
    fn test_sync_tree_missing_root() {
        let dir = tempdir().unwrap();
        let err = sync_tree(&dir.path().join("missing")).unwrap_err();
        assert!(matches!(err, Error::Filesystem { .. }));
    }

    #[tokio::test]
    async fn test_durability_sync() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("file"), b"x").unwrap();
        durability_sync(dir.path()).await.unwrap();
    }
}
