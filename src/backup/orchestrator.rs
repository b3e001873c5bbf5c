//! Backup orchestrator
//!
//! Drives one backup run:
//!
//! 1. resolve the requested tables against the daemon's catalog
//! 2. create `backup-<timestamp>` with its fixed subdirectories
//! 3. store versions.json
//! 4. copy the searchd config and schema
//! 5. freeze every table at once and flush attributes
//! 6. per table: freeze, copy its files into `data/<table>`, unfreeze
//! 7. full backups only: external files and global state files
//! 8. fail if any copy step failed
//! 9. sync to disk
//!
//! Structural failures stop the run immediately; copy failures are collected
//! and reported after everything else was attempted. Tables already copied
//! stay on disk either way.

use super::layout::Destination;
use super::report::{BackupSummary, Reporter, Stage, Step, StepOutcome};
use super::sync::durability_sync;
use crate::error::{Error, FailurePolicy, Result};
use crate::searchd::ControlClient;
use crate::storage::Storage;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

/// Source of the backup timestamp
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Runs backups against one daemon
pub struct BackupOrchestrator {
    client: Arc<ControlClient>,
    storage: Arc<dyn Storage>,
    reporter: Arc<dyn Reporter>,
    clock: Clock,
}

/// Failed deferred steps of a run
#[derive(Debug, Default)]
struct Failures(Vec<Step>);

impl BackupOrchestrator {
    pub fn new(
        client: Arc<ControlClient>,
        storage: Arc<dyn Storage>,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        Self {
            client,
            storage,
            reporter,
            clock: Arc::new(Utc::now),
        }
    }

    /// Use a custom clock for destination names
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Back up `tables`, or everything the daemon has if `tables` is empty
    pub async fn store(&self, tables: &[String]) -> Result<BackupSummary> {
        tracing::info!("Starting the backup...");
        let started = Instant::now();

        self.reporter.stage_started(Stage::ResolveTables);
        let (is_all, tables) = self.resolve_tables(tables).await?;

        self.reporter.stage_started(Stage::Layout);
        let destination = Destination::create(self.storage.target_dir(), (self.clock)()).await?;
        self.storage.track(&destination.root);

        let result = self.run(&destination, is_all, &tables).await;

        match result {
            Ok(()) => {
                self.storage.release();
                let summary = BackupSummary {
                    destination: destination.root,
                    tables,
                    is_all,
                    elapsed: started.elapsed(),
                };
                self.reporter.run_complete(&summary);
                Ok(summary)
            }
            Err(Error::Interrupted) => {
                // Lock release belongs to the signal handler. Copies still in
                // flight may have recreated parts of the root after its cleanup.
                self.storage.track(&destination.root);
                self.storage.clean_up().await;
                Err(Error::Interrupted)
            }
            Err(e) => {
                if !self.client.unfreeze_held().await {
                    tracing::warn!("Some tables could not be unfrozen after a failed backup");
                }
                self.storage.release();
                Err(e)
            }
        }
    }

    async fn run(&self, destination: &Destination, is_all: bool, tables: &[String]) -> Result<()> {
        let mut failures = Failures::default();

        self.reporter.stage_started(Stage::Versions);
        let versions = self.client.versions().await?;
        let written = destination.write_versions(&versions).await.map(|_| ());
        self.settle(Step::Versions, written, &mut failures)?;

        self.reporter.stage_started(Stage::ConfigFiles);
        let config = self.client.config();
        let ok = self
            .storage
            .copy_paths(
                &[config.path.clone(), config.schema_path.clone()],
                &destination.config,
                false,
            )
            .await;
        self.settle_copy(Step::ConfigFiles, ok, &mut failures)?;

        if !tables.is_empty() {
            self.checkpoint()?;
            self.reporter.stage_started(Stage::Freeze);
            // Locking the whole set first makes the flush consistent across
            // tables even though they are copied one at a time
            self.client.freeze(tables).await?;
            self.client.flush_attributes().await;
        }

        self.reporter.stage_started(Stage::TableData);
        for table in tables {
            self.checkpoint()?;
            self.backup_table(destination, table, &mut failures).await?;
        }

        if is_all {
            self.checkpoint()?;
            self.reporter.stage_started(Stage::ExternalFiles);
            for table in tables {
                let ok = self.backup_external_files(destination, table).await;
                self.settle_copy(Step::ExternalFiles(table.clone()), ok, &mut failures)?;
            }

            self.reporter.stage_started(Stage::StateFiles);
            let files = config.state_paths();
            let ok = self.storage.copy_paths(&files, &destination.state, false).await;
            self.settle_copy(Step::StateFiles, ok, &mut failures)?;
        }

        self.checkpoint()?;
        if !failures.0.is_empty() {
            return Err(Error::BackupFailed {
                failed_steps: failures.0.iter().map(ToString::to_string).collect(),
            });
        }

        self.reporter.stage_started(Stage::Sync);
        durability_sync(&destination.root).await
    }

    /// Freeze one table, copy its files and release it again
    async fn backup_table(
        &self,
        destination: &Destination,
        table: &str,
        failures: &mut Failures,
    ) -> Result<()> {
        let files = self.client.freeze(table).await?;
        let bytes = self.storage.files_size(&files).await;
        self.reporter.table_frozen(table, bytes);

        let backup_path = match destination.create_table_dir(table).await {
            Ok(path) => path,
            Err(e) => {
                self.client.unfreeze(table).await;
                return self.settle(Step::TableDirectory(table.to_string()), Err(e), failures);
            }
        };

        let ok = self.storage.copy_paths(&files, &backup_path, false).await;
        if !self.client.unfreeze(table).await {
            tracing::warn!("Failed to unfreeze table {}", table);
        }

        self.settle_copy(Step::TableData(table.to_string()), ok, failures)
    }

    /// Copy the files a table's settings point to into `external/<table>`
    async fn backup_external_files(&self, destination: &Destination, table: &str) -> bool {
        let dir = destination.external_dir(table);
        if let Err(e) = tokio::fs::create_dir(&dir).await {
            tracing::warn!("Failed to create {:?}: {}", dir, e);
            return false;
        }

        match self.client.table_external_files(table).await {
            Ok(files) => self.storage.copy_paths(&files, &dir, true).await,
            Err(e) => {
                tracing::warn!("Failed to list external files of table {}: {}", table, e);
                false
            }
        }
    }

    /// Empty request means all tables; otherwise every name must exist
    async fn resolve_tables(&self, requested: &[String]) -> Result<(bool, Vec<String>)> {
        let catalog = self.client.tables().await?;

        if requested.is_empty() {
            return Ok((true, catalog.into_keys().collect()));
        }

        let mut seen = HashSet::new();
        let mut tables = Vec::new();
        let mut unknown = Vec::new();

        for name in requested {
            if !seen.insert(name.as_str()) {
                continue;
            }
            if catalog.contains_key(name) {
                tables.push(name.clone());
            } else {
                unknown.push(name.clone());
            }
        }

        if !unknown.is_empty() {
            return Err(Error::InvalidArgument { unknown });
        }

        Ok((false, tables))
    }

    /// Report a step and apply its failure policy
    fn settle(&self, step: Step, result: Result<()>, failures: &mut Failures) -> Result<()> {
        self.reporter.step_finished(&StepOutcome {
            step: step.clone(),
            ok: result.is_ok(),
        });

        match result {
            Ok(()) => Ok(()),
            Err(e) => match step.policy() {
                FailurePolicy::Abort => Err(e),
                FailurePolicy::Defer => {
                    tracing::warn!("{} failed: {}", step, e);
                    failures.0.push(step);
                    Ok(())
                }
            },
        }
    }

    fn settle_copy(&self, step: Step, ok: bool, failures: &mut Failures) -> Result<()> {
        let result = if ok {
            Ok(())
        } else {
            Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "copy failed",
            )))
        };
        self.settle(step, result, failures)
    }

    fn checkpoint(&self) -> Result<()> {
        if self.client.interrupt().is_cancelled() {
            return Err(Error::Interrupted);
        }
        Ok(())
    }
}
