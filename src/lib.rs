//! # manticore-backup
//!
//! Consistent, point-in-time file-level backups of a running Manticore Search
//! daemon. Tables are locked with `FREEZE` while their files are copied and
//! released with `UNFREEZE` afterwards, so the daemon keeps serving reads the
//! whole time.
//!
//! ## Modules
//!
//! - [`searchd`]: config parser, version checks and the control client
//! - [`backup`]: the backup run and its directory layout
//! - [`storage`]: file copy primitives
//! - [`interrupt`]: cancellation and signal cleanup
//! - [`settings`]: settings of the tool itself and logging setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use manticore_backup::backup::{BackupOrchestrator, TracingReporter};
//! use manticore_backup::searchd::{ClientConfig, ControlClient, SearchdConfig};
//! use manticore_backup::storage::FileStorage;
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SearchdConfig::from_file(Path::new("/etc/manticoresearch/manticore.conf"))?;
//!     let client = Arc::new(ControlClient::connect(config, ClientConfig::default()).await?);
//!     let storage = Arc::new(FileStorage::new("/var/backups/manticore")?);
//!
//!     let orchestrator = BackupOrchestrator::new(client, storage, Arc::new(TracingReporter));
//!     let summary = orchestrator.store(&[]).await?;
//!
//!     println!("Backup stored in {}", summary.destination.display());
//!     Ok(())
//! }
//! ```

pub mod backup;
pub mod error;
pub mod interrupt;
pub mod searchd;
pub mod settings;
pub mod storage;

pub use backup::{BackupOrchestrator, BackupSummary, Destination, Reporter, TracingReporter};
pub use error::{Error, FailurePolicy, Result};
pub use interrupt::{Interrupt, SignalHandler};
pub use searchd::{ClientConfig, ControlClient, SearchdConfig, VersionInfo};
pub use settings::{LoggingConfig, Settings, SettingsError};
pub use storage::{FileStorage, Storage};
