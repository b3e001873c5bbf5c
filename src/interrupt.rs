//! Interruption handling
//!
//! A signal can arrive at any point of a backup. The handler runs on its own
//! task, so it shares two things with the main flow:
//!
//! - a cancellation token, checked by the orchestrator between stages and by
//!   `freeze` before taking a new lock;
//! - the registry of tables this process currently holds frozen. Freezing and
//!   the bulk release both hold its mutex, so they never interleave.

use crate::searchd::ControlClient;
use crate::storage::Storage;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

/// Shared cancellation state of one backup process
#[derive(Debug, Default)]
pub struct Interrupt {
    token: CancellationToken,
    held: Mutex<BTreeSet<String>>,
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop taking new locks and make checkpoints fail
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once `cancel` was called
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// Exclusive access to the set of frozen table names
    pub async fn held_locks(&self) -> MutexGuard<'_, BTreeSet<String>> {
        self.held.lock().await
    }

    /// Snapshot of the frozen table names
    pub async fn held_tables(&self) -> Vec<String> {
        self.held.lock().await.iter().cloned().collect()
    }
}

/// Cleanup callback run when the process receives SIGINT or SIGTERM
#[derive(Clone)]
pub struct SignalHandler {
    client: Arc<ControlClient>,
    storage: Arc<dyn Storage>,
}

impl SignalHandler {
    pub fn new(client: Arc<ControlClient>, storage: Arc<dyn Storage>) -> Self {
        Self { client, storage }
    }

    /// Cancel the run, drop the partial backup and release every table
    ///
    /// Returns whether all tables were unfrozen.
    pub async fn handle(&self, signal: &str) -> bool {
        tracing::warn!("Caught signal {}", signal);

        self.client.interrupt().cancel();
        self.storage.clean_up().await;
        self.client.unfreeze_all().await
    }
}

/// Wait for Ctrl+C or SIGTERM and return the signal name
pub async fn wait_for_signal() -> std::io::Result<&'static str> {
    #[cfg(unix)]
    {
        let mut terminate =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

        tokio::select! {
            res = tokio::signal::ctrl_c() => res.map(|_| "SIGINT"),
            _ = terminate.recv() => Ok("SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.map(|_| "CTRL_C")
    }
}
