//! searchd control client
//!
//! Talks to the daemon through the HTTP SQL endpoint in raw mode. Every call is
//! a single POST with a short timeout; there are no retries.

use super::config::SearchdConfig;
use super::version::VersionInfo;
use crate::error::{Error, Result};
use crate::interrupt::{Interrupt, SignalHandler};
use crate::storage::Storage;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// SQL endpoint of the HTTP listener
pub const API_PATH: &str = "/sql?mode=raw";

/// Table settings that point to files outside the data directory
const EXTERNAL_FILE_SETTINGS: &[&str] = &["stopwords", "wordforms", "exceptions", "hitless_words"];

/// Configuration for the control client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Request timeout in milliseconds
    pub request_timeout_ms: u64,
}

impl ClientConfig {
    /// Timeout given in whole seconds
    pub fn from_secs(secs: u64) -> Self {
        Self {
            request_timeout_ms: secs.saturating_mul(1000),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 3000,
        }
    }
}

/// One result set of the raw SQL endpoint
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryResult {
    #[serde(default)]
    pub data: Vec<Map<String, Value>>,
    #[serde(default)]
    pub error: Option<String>,
}

impl QueryResult {
    /// The error reported by the daemon, if any
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref().filter(|e| !e.is_empty())
    }

    pub fn is_ok(&self) -> bool {
        self.error().is_none()
    }

    /// Values of one column, rendered as strings
    pub fn column(&self, name: &str) -> Vec<String> {
        self.data
            .iter()
            .filter_map(|row| row.get(name))
            .map(value_to_string)
            .collect()
    }

    /// Column value of the first row
    pub fn first(&self, name: &str) -> Option<String> {
        self.data.first()?.get(name).map(value_to_string)
    }
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Table names passed to FREEZE/UNFREEZE
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableList(Vec<String>);

impl TableList {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.0
    }

    fn joined(&self) -> String {
        self.0.join(", ")
    }
}

impl From<&str> for TableList {
    fn from(name: &str) -> Self {
        Self(vec![name.to_string()])
    }
}

impl From<String> for TableList {
    fn from(name: String) -> Self {
        Self(vec![name])
    }
}

impl From<&String> for TableList {
    fn from(name: &String) -> Self {
        Self(vec![name.clone()])
    }
}

impl From<Vec<String>> for TableList {
    fn from(names: Vec<String>) -> Self {
        Self(names)
    }
}

impl From<&[String]> for TableList {
    fn from(names: &[String]) -> Self {
        Self(names.to_vec())
    }
}

impl From<&Vec<String>> for TableList {
    fn from(names: &Vec<String>) -> Self {
        Self(names.clone())
    }
}

/// Client for the searchd control channel
pub struct ControlClient {
    http: reqwest::Client,
    url: String,
    config: SearchdConfig,
    interrupt: Arc<Interrupt>,
}

impl ControlClient {
    /// Build a client without talking to the daemon
    pub fn new(config: SearchdConfig, client_config: ClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(client_config.request_timeout_ms))
            .build()
            .map_err(|e| Error::Protocol(format!("Failed to create HTTP client: {}", e)))?;
        let url = format!("{}{}", config.endpoint(), API_PATH);

        Ok(Self {
            http,
            url,
            config,
            interrupt: Arc::new(Interrupt::new()),
        })
    }

    /// Build a client and verify that the daemon is supported and is the one
    /// described by `config`
    pub async fn connect(config: SearchdConfig, client_config: ClientConfig) -> Result<Self> {
        let client = Self::new(config, client_config)?;

        let versions = client.versions().await?;
        versions.ensure_supported()?;

        let config_path = client.daemon_config_path().await?;
        if config_path != client.config.path {
            return Err(Error::IdentityMismatch {
                expected: client.config.path.clone(),
                actual: config_path,
            });
        }

        tracing::info!(
            "Manticore versions:\n  manticore: {}\n  columnar: {}\n  secondary: {}",
            versions.manticore,
            versions.columnar,
            versions.secondary
        );

        Ok(client)
    }

    /// The parsed searchd config this client was built from
    pub fn config(&self) -> &SearchdConfig {
        &self.config
    }

    /// Cancellation state shared with the signal handler
    pub fn interrupt(&self) -> &Arc<Interrupt> {
        &self.interrupt
    }

    /// Freeze tables and return the files backing them
    ///
    /// Freezing an already frozen table is allowed and returns its current
    /// file list again.
    pub async fn freeze(&self, tables: impl Into<TableList>) -> Result<Vec<PathBuf>> {
        let tables = tables.into();
        if tables.is_empty() {
            return Err(Error::Protocol("No tables passed to freeze".to_string()));
        }

        let mut held = self.interrupt.held_locks().await;
        if self.interrupt.is_cancelled() {
            return Err(Error::Interrupted);
        }

        let joined = tables.joined();
        let result = self.execute(&format!("FREEZE {}", joined)).await?;
        if let Some(error) = result.error() {
            tracing::debug!("FREEZE {} rejected: {}", joined, error);
            return Err(Error::Protocol(format!(
                "Failed to get lock for tables - {}",
                joined
            )));
        }
        held.extend(tables.names().iter().cloned());

        Ok(result.column("file").into_iter().map(PathBuf::from).collect())
    }

    /// Release tables frozen before; `false` if the daemon reported an error
    pub async fn unfreeze(&self, tables: impl Into<TableList>) -> bool {
        let tables = tables.into();
        let mut held = self.interrupt.held_locks().await;
        self.unfreeze_locked(&mut held, &tables).await
    }

    async fn unfreeze_locked(&self, held: &mut BTreeSet<String>, tables: &TableList) -> bool {
        let joined = tables.joined();
        match self.execute(&format!("UNFREEZE {}", joined)).await {
            Ok(result) => match result.error() {
                None => {
                    for name in tables.names() {
                        held.remove(name);
                    }
                    true
                }
                Some(error) => {
                    tracing::warn!("Failed to unfreeze {}: {}", joined, error);
                    false
                }
            },
            Err(e) => {
                tracing::warn!("Failed to unfreeze {}: {}", joined, e);
                false
            }
        }
    }

    /// Unfreeze every table of the daemon, one by one
    ///
    /// Every table is attempted even after a failure. If the table list
    /// cannot be fetched, the tables this process froze are released instead.
    pub async fn unfreeze_all(&self) -> bool {
        tracing::info!("Unfreezing all tables...");

        let mut held = self.interrupt.held_locks().await;
        let names: Vec<String> = match self.tables().await {
            Ok(tables) => tables.into_keys().collect(),
            Err(e) => {
                tracing::warn!(
                    "Failed to list tables ({}), releasing {} locally held lock(s)",
                    e,
                    held.len()
                );
                held.iter().cloned().collect()
            }
        };

        let mut all_ok = true;
        for name in names {
            let is_ok = self.unfreeze_locked(&mut held, &TableList::from(name.as_str())).await;
            tracing::info!("  {} - {}", name, op_result(is_ok));
            all_ok = all_ok && is_ok;
        }

        all_ok
    }

    /// Release whatever this process still holds frozen
    pub async fn unfreeze_held(&self) -> bool {
        let mut held = self.interrupt.held_locks().await;
        let names: Vec<String> = held.iter().cloned().collect();

        let mut all_ok = true;
        for name in names {
            let is_ok = self.unfreeze_locked(&mut held, &TableList::from(name.as_str())).await;
            all_ok = all_ok && is_ok;
        }
        all_ok
    }

    /// All tables of the daemon: name -> type
    pub async fn tables(&self) -> Result<BTreeMap<String, String>> {
        let result = self.execute("SHOW TABLES").await?;
        if let Some(error) = result.error() {
            return Err(Error::Protocol(format!("SHOW TABLES failed: {}", error)));
        }

        let tables = result
            .data
            .iter()
            .filter_map(|row| {
                let name = row.get("Index").map(value_to_string)?;
                let kind = row.get("Type").map(value_to_string).unwrap_or_default();
                Some((name, kind))
            })
            .collect();

        Ok(tables)
    }

    /// Versions of the daemon and its libraries
    pub async fn versions(&self) -> Result<VersionInfo> {
        let result = self.execute("SHOW STATUS LIKE 'version'").await?;
        let status = result.first("Value").unwrap_or_default();

        Ok(VersionInfo::parse(&status))
    }

    /// Ask the daemon to write mutable attributes to disk
    pub async fn flush_attributes(&self) {
        match self.execute("FLUSH ATTRIBUTES").await {
            Ok(result) => {
                if let Some(error) = result.error() {
                    tracing::warn!("FLUSH ATTRIBUTES failed: {}", error);
                }
            }
            Err(e) => tracing::warn!("FLUSH ATTRIBUTES failed: {}", e),
        }
    }

    /// Config file the running daemon was started with
    pub async fn daemon_config_path(&self) -> Result<PathBuf> {
        let result = self.execute("SHOW SETTINGS").await?;
        let value = result.first("Value").ok_or_else(|| {
            Error::Protocol("Unable to get config path from SHOW SETTINGS".to_string())
        })?;

        tokio::fs::canonicalize(&value).await.map_err(|e| {
            Error::Protocol(format!(
                "Unable to resolve config path '{}' from SHOW SETTINGS: {}",
                value, e
            ))
        })
    }

    /// Files referenced by table settings (stopwords, wordforms, ...)
    pub async fn table_external_files(&self, table: &str) -> Result<Vec<PathBuf>> {
        let result = self
            .execute(&format!("SHOW TABLE {} SETTINGS", table))
            .await?;
        if let Some(error) = result.error() {
            return Err(Error::Protocol(format!(
                "Failed to get settings of table {}: {}",
                table, error
            )));
        }

        Ok(result
            .first("Value")
            .map(|settings| parse_external_files(&settings))
            .unwrap_or_default())
    }

    /// Send one command and return its first result set
    pub async fn execute(&self, query: &str) -> Result<QueryResult> {
        tracing::debug!("searchd <- {}", query);

        let response = self.http.post(&self.url).form(&[("query", query)]).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if body.trim().is_empty() {
            return Err(Error::Protocol(format!(
                "Failed to execute query: \"{}\" (HTTP {}, empty response)",
                query, status
            )));
        }

        let mut results: Vec<QueryResult> = serde_json::from_str(&body).map_err(|e| {
            Error::Protocol(format!(
                "Failed to execute query: \"{}\" (HTTP {}, malformed response: {})",
                query, status, e
            ))
        })?;

        if results.is_empty() {
            return Err(Error::Protocol(format!(
                "Failed to execute query: \"{}\" (no result set)",
                query
            )));
        }

        Ok(results.swap_remove(0))
    }

    /// Cleanup callback for SIGINT/SIGTERM bound to this client and `storage`
    pub fn signal_handler(self: &Arc<Self>, storage: Arc<dyn Storage>) -> SignalHandler {
        SignalHandler::new(Arc::clone(self), storage)
    }
}

/// Paths out of a `SHOW TABLE ... SETTINGS` value
fn parse_external_files(settings: &str) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for line in settings.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        if !EXTERNAL_FILE_SETTINGS.contains(&key.trim()) {
            continue;
        }

        for path in value.split_whitespace() {
            // hitless_words also takes keywords
            if matches!(path, "all" | "none") {
                continue;
            }
            files.push(PathBuf::from(path));
        }
    }

    files
}

pub(crate) fn op_result(is_ok: bool) -> &'static str {
    if is_ok {
        "OK"
    } else {
        "FAIL"
    }
}
