//! Backup directory layout
//!
//! ```text
//! <target>/backup-<YYYYMMDDHHMMSS>/
//!   versions.json
//!   data/<table>/...   table files
//!   config/...         searchd config and schema
//!   external/...       files referenced by table settings
//!   state/...          global state files
//! ```

use crate::error::{Error, Result};
use crate::searchd::VersionInfo;
use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::DirBuilder;

/// File with daemon versions in the backup root
pub const VERSIONS_FILE: &str = "versions.json";

/// Directory names under the backup root
pub const SUBDIRS: [&str; 4] = ["data", "config", "external", "state"];

/// Paths of one backup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub root: PathBuf,
    pub data: PathBuf,
    pub config: PathBuf,
    pub external: PathBuf,
    pub state: PathBuf,
}

fn dir_builder() -> DirBuilder {
    let mut builder = DirBuilder::new();
    #[cfg(unix)]
    builder.mode(0o755);
    builder
}

impl Destination {
    /// Folder name for a backup started at `now`
    pub fn name_for(now: DateTime<Utc>) -> String {
        format!("backup-{}", now.format("%Y%m%d%H%M%S"))
    }

    /// Paths under `target` without touching the disk
    pub fn new(target: &Path, now: DateTime<Utc>) -> Self {
        let root = target.join(Self::name_for(now));
        Self {
            data: root.join("data"),
            config: root.join("config"),
            external: root.join("external"),
            state: root.join("state"),
            root,
        }
    }

    /// Create the root and its subdirectories
    ///
    /// An existing root is never reused.
    pub async fn create(target: &Path, now: DateTime<Utc>) -> Result<Self> {
        let destination = Self::new(target, now);

        if tokio::fs::try_exists(&destination.root).await.unwrap_or(false) {
            return Err(Error::DestinationExists(destination.root));
        }

        dir_builder()
            .create(&destination.root)
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => Error::DestinationExists(destination.root.clone()),
                _ => Error::filesystem(&destination.root, format!("Failed to create directory: {}", e)),
            })?;

        for dir in destination.subdirs() {
            dir_builder()
                .create(dir)
                .await
                .map_err(|e| Error::filesystem(dir, format!("Failed to create directory: {}", e)))?;
        }

        Ok(destination)
    }

    pub fn subdirs(&self) -> [&PathBuf; 4] {
        [&self.data, &self.config, &self.external, &self.state]
    }

    /// `data/<table>`
    pub fn table_dir(&self, table: &str) -> PathBuf {
        self.data.join(table)
    }

    /// `external/<table>`
    pub fn external_dir(&self, table: &str) -> PathBuf {
        self.external.join(table)
    }

    /// Create the directory a table's files are copied into
    pub async fn create_table_dir(&self, table: &str) -> Result<PathBuf> {
        let path = self.table_dir(table);
        dir_builder().create(&path).await.map_err(|e| {
            Error::filesystem(
                &path,
                format!("Failed to create target directory for table: {}", e),
            )
        })?;
        Ok(path)
    }

    /// Write versions.json into the root
    pub async fn write_versions(&self, versions: &VersionInfo) -> Result<PathBuf> {
        let path = self.root.join(VERSIONS_FILE);
        let json = serde_json::to_vec(versions)?;
        tokio::fs::write(&path, json).await.map_err(|e| {
            Error::filesystem(&path, format!("Failed to store versions: {}", e))
        })?;
        Ok(path)
    }
}
