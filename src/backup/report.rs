//! Backup progress reporting
//!
//! The orchestrator emits lifecycle events; what is done with them (log lines,
//! a progress bar, assertions in tests) is up to the `Reporter`.

use crate::error::FailurePolicy;
use crate::searchd::op_result;
use crate::storage::format_bytes;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Stages of a backup run, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ResolveTables,
    Layout,
    Versions,
    ConfigFiles,
    Freeze,
    TableData,
    ExternalFiles,
    StateFiles,
    Sync,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::ResolveTables => "Resolving tables",
            Stage::Layout => "Creating backup directories",
            Stage::Versions => "Storing versions",
            Stage::ConfigFiles => "Backing up config files",
            Stage::Freeze => "Freezing tables and flushing attributes",
            Stage::TableData => "Backing up tables",
            Stage::ExternalFiles => "Backing up external table files",
            Stage::StateFiles => "Backing up global state files",
            Stage::Sync => "Syncing backup to disk",
        };
        f.write_str(s)
    }
}

/// A unit of work whose outcome is recorded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Root and fixed subdirectories
    Layout,
    /// versions.json
    Versions,
    /// `data/<table>` directory
    TableDirectory(String),
    /// Config and schema files
    ConfigFiles,
    /// Files of one table
    TableData(String),
    /// Files referenced by the settings of one table
    ExternalFiles(String),
    /// Global state files
    StateFiles,
}

impl Step {
    /// Structural steps stop the run, copy steps are reported at the end
    pub fn policy(&self) -> FailurePolicy {
        match self {
            Step::Layout | Step::Versions | Step::TableDirectory(_) => FailurePolicy::Abort,
            Step::ConfigFiles
            | Step::TableData(_)
            | Step::ExternalFiles(_)
            | Step::StateFiles => FailurePolicy::Defer,
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Layout => write!(f, "backup directories"),
            Step::Versions => write!(f, "versions file"),
            Step::TableDirectory(t) => write!(f, "directory of table {}", t),
            Step::ConfigFiles => write!(f, "config files"),
            Step::TableData(t) => write!(f, "table {}", t),
            Step::ExternalFiles(t) => write!(f, "external files of table {}", t),
            Step::StateFiles => write!(f, "global state files"),
        }
    }
}

/// Result of one step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    pub step: Step,
    pub ok: bool,
}

/// What a successful run produced
#[derive(Debug, Clone)]
pub struct BackupSummary {
    pub destination: PathBuf,
    pub tables: Vec<String>,
    pub is_all: bool,
    pub elapsed: Duration,
}

/// Observer of a backup run
pub trait Reporter: Send + Sync {
    fn stage_started(&self, _stage: Stage) {}

    /// A table was frozen; `bytes` is the size of its files
    fn table_frozen(&self, _table: &str, _bytes: u64) {}

    fn step_finished(&self, _outcome: &StepOutcome) {}

    fn run_complete(&self, _summary: &BackupSummary) {}
}

/// Reporter writing progress to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn stage_started(&self, stage: Stage) {
        tracing::info!("{}...", stage);
    }

    fn table_frozen(&self, table: &str, bytes: u64) {
        tracing::info!("  {} [{}]", table, format_bytes(bytes));
    }

    fn step_finished(&self, outcome: &StepOutcome) {
        if outcome.ok {
            tracing::info!("  {} - {}", outcome.step, op_result(true));
        } else {
            tracing::warn!("  {} - {}", outcome.step, op_result(false));
        }
    }

    fn run_complete(&self, summary: &BackupSummary) {
        tracing::info!(
            "You can find backup here: {}",
            summary.destination.display()
        );
        tracing::info!("Elapsed time: {:.2}s", summary.elapsed.as_secs_f64());
    }
}
