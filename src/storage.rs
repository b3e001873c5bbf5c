//! File storage
//!
//! Copy primitives used by the backup. Copy failures are logged per path and
//! reported as a single `false` so the caller can decide whether to go on.

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;
use walkdir::WalkDir;

/// Filesystem side of a backup
#[async_trait]
pub trait Storage: Send + Sync {
    /// Directory that receives `backup-*` folders
    fn target_dir(&self) -> &Path;

    /// Copy files and directories into `dest`
    ///
    /// With `preserve_path` each source lands under `dest` at its full
    /// absolute path, otherwise under its file name. Every path is attempted;
    /// the result is `false` if any of them failed.
    async fn copy_paths(&self, paths: &[PathBuf], dest: &Path, preserve_path: bool) -> bool;

    /// Total size of the given files in bytes
    async fn files_size(&self, paths: &[PathBuf]) -> u64;

    /// Remember the backup being written so `clean_up` can remove it
    fn track(&self, root: &Path);

    /// Forget the tracked backup; it is complete or must be kept
    fn release(&self);

    /// Remove the tracked, partially written backup
    async fn clean_up(&self);
}

/// Local filesystem storage
#[derive(Debug)]
pub struct FileStorage {
    target_dir: PathBuf,
    in_progress: Mutex<Option<PathBuf>>,
}

impl FileStorage {
    /// Storage writing into `target_dir`, which must be an existing directory
    pub fn new(target_dir: impl Into<PathBuf>) -> Result<Self> {
        let target_dir = target_dir.into();
        if !target_dir.is_dir() {
            return Err(Error::filesystem(
                &target_dir,
                "backup directory does not exist or is not a directory",
            ));
        }
        let target_dir = std::fs::canonicalize(&target_dir)?;

        Ok(Self {
            target_dir,
            in_progress: Mutex::new(None),
        })
    }

    /// Path the tracked backup would be removed from
    pub fn in_progress(&self) -> Option<PathBuf> {
        self.in_progress.lock().ok().and_then(|p| p.clone())
    }

    async fn copy_one(&self, src: &Path, dest: &Path, preserve_path: bool) -> std::io::Result<()> {
        let target = if preserve_path {
            dest.join(strip_root(src))
        } else {
            let name = src.file_name().ok_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no file name")
            })?;
            dest.join(name)
        };

        let meta = tokio::fs::metadata(src).await?;
        if meta.is_dir() {
            let src = src.to_path_buf();
            tokio::task::spawn_blocking(move || copy_dir(&src, &target))
                .await
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?
        } else {
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::copy(src, &target).await.map(|_| ())
        }
    }
}

#[async_trait]
impl Storage for FileStorage {
    fn target_dir(&self) -> &Path {
        &self.target_dir
    }

    async fn copy_paths(&self, paths: &[PathBuf], dest: &Path, preserve_path: bool) -> bool {
        let mut all_ok = true;

        for src in paths {
            if let Err(e) = self.copy_one(src, dest, preserve_path).await {
                tracing::warn!("Failed to copy {:?} to {:?}: {}", src, dest, e);
                all_ok = false;
            }
        }

        all_ok
    }

    async fn files_size(&self, paths: &[PathBuf]) -> u64 {
        let mut total = 0u64;
        for path in paths {
            if let Ok(meta) = tokio::fs::metadata(path).await {
                total += meta.len();
            }
        }
        total
    }

    fn track(&self, root: &Path) {
        if let Ok(mut guard) = self.in_progress.lock() {
            *guard = Some(root.to_path_buf());
        }
    }

    fn release(&self) {
        if let Ok(mut guard) = self.in_progress.lock() {
            *guard = None;
        }
    }

    async fn clean_up(&self) {
        let root = match self.in_progress.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        let Some(root) = root else {
            return;
        };

        tracing::info!("Removing partial backup {:?}", root);
        match tokio::fs::remove_dir_all(&root).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to remove {:?}: {}", root, e),
        }
    }
}

/// Copy the tree under `src` into `dest`
fn copy_dir(src: &Path, dest: &Path) -> std::io::Result<()> {
    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
        let target = dest.join(relative);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }

    Ok(())
}

/// `/usr/share/a.txt` -> `usr/share/a.txt`
fn strip_root(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .collect()
}

/// Human readable size
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;

    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{}B", bytes)
    } else {
        format!("{:.2}{}", value, UNITS[unit])
    }
}
