//! Backup of a running searchd
//!
//! - **orchestrator**: the freeze/copy/unfreeze run
//! - **layout**: `backup-<timestamp>` directory structure
//! - **report**: progress observer
//! - **sync**: durability sync before a run is declared done

mod layout;
mod orchestrator;
mod report;
mod sync;

pub use layout::{Destination, SUBDIRS, VERSIONS_FILE};
pub use orchestrator::{BackupOrchestrator, Clock};
pub use report::{BackupSummary, Reporter, Stage, Step, StepOutcome, TracingReporter};
pub use sync::{durability_sync, sync_tree};
