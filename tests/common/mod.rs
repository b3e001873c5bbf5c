//! In-process fake of the searchd HTTP SQL endpoint
//!
//! Understands the handful of commands the backup sends and keeps track of
//! which tables are frozen and of every query received.

#![allow(dead_code)]

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Form, Json, Router};
use manticore_backup::searchd::{ClientConfig, ControlClient, SearchdConfig};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub const VERSION: &str =
    "6.0.4 1a3a4ea82@230314 (columnar 2.0.4 5a49bd7@230306) (secondary 2.0.4 5a49bd7@230306)";

#[derive(Debug, Clone, Default)]
pub struct FakeTable {
    pub kind: String,
    pub files: Vec<PathBuf>,
    pub external: Vec<PathBuf>,
}

#[derive(Debug, Default)]
pub struct DaemonState {
    pub version: String,
    pub config_path: PathBuf,
    pub tables: BTreeMap<String, FakeTable>,
    pub frozen: BTreeSet<String>,
    pub queries: Vec<String>,
    pub fail_unfreeze: BTreeSet<String>,
    pub fail_settings: BTreeSet<String>,
    pub fail_show_tables: bool,
    pub empty_body: bool,
}

impl DaemonState {
    pub fn count(&self, prefix: &str) -> usize {
        self.queries.iter().filter(|q| q.starts_with(prefix)).count()
    }
}

#[derive(Deserialize)]
struct SqlForm {
    query: String,
}

fn ok(data: Value) -> Response {
    Json(json!([{ "data": data, "total": 0, "error": "", "warning": "" }])).into_response()
}

fn error(message: String) -> Response {
    Json(json!([{ "error": message }])).into_response()
}

fn split_names(list: &str) -> Vec<String> {
    list.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

async fn sql(State(state): State<Arc<Mutex<DaemonState>>>, Form(form): Form<SqlForm>) -> Response {
    let mut state = state.lock().unwrap();
    let query = form.query.trim().to_string();
    state.queries.push(query.clone());

    if state.empty_body {
        return String::new().into_response();
    }

    let upper = query.to_uppercase();
    if upper == "SHOW STATUS LIKE 'VERSION'" {
        return ok(json!([{ "Counter": "version", "Value": state.version }]));
    }
    if upper == "SHOW SETTINGS" {
        return ok(json!([{
            "Setting_name": "configuration_file",
            "Value": state.config_path.display().to_string()
        }]));
    }
    if upper == "SHOW TABLES" {
        if state.fail_show_tables {
            return error("catalog unavailable".to_string());
        }
        let rows: Vec<Value> = state
            .tables
            .iter()
            .map(|(name, t)| json!({ "Index": name, "Type": t.kind }))
            .collect();
        return ok(Value::Array(rows));
    }
    if upper == "FLUSH ATTRIBUTES" {
        return ok(json!([{ "tag": 1 }]));
    }
    if let Some(list) = upper.strip_prefix("FREEZE ").map(|_| &query[7..]) {
        let names = split_names(list);
        if names.is_empty() {
            return error("syntax error".to_string());
        }
        let mut rows = Vec::new();
        for name in &names {
            let Some(table) = state.tables.get(name) else {
                return error(format!("unknown table '{}'", name));
            };
            for file in &table.files {
                let f = file.display().to_string();
                rows.push(json!({ "file": f, "normalized": f }));
            }
        }
        state.frozen.extend(names);
        return ok(Value::Array(rows));
    }
    if let Some(list) = upper.strip_prefix("UNFREEZE ").map(|_| &query[9..]) {
        let names = split_names(list);
        for name in &names {
            if !state.tables.contains_key(name) || state.fail_unfreeze.contains(name) {
                return error(format!("unable to unfreeze '{}'", name));
            }
        }
        for name in &names {
            state.frozen.remove(name);
        }
        return ok(json!([]));
    }
    if upper.starts_with("SHOW TABLE ") && upper.ends_with(" SETTINGS") {
        let name = query[11..query.len() - 9].trim();
        if state.fail_settings.contains(name) {
            return error(format!("settings unavailable for '{}'", name));
        }
        let Some(table) = state.tables.get(name) else {
            return error(format!("unknown table '{}'", name));
        };
        let mut settings = String::from("min_infix_len = 2");
        if !table.external.is_empty() {
            let files: Vec<String> = table
                .external
                .iter()
                .map(|p| p.display().to_string())
                .collect();
            settings.push_str(&format!("\nstopwords = {}", files.join(" ")));
        }
        return ok(json!([{ "Variable_name": "settings", "Value": settings }]));
    }

    error(format!("unsupported query '{}'", query))
}

/// Running fake daemon
pub struct FakeDaemon {
    pub addr: SocketAddr,
    pub state: Arc<Mutex<DaemonState>>,
}

impl FakeDaemon {
    pub async fn start() -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(Mutex::new(DaemonState {
            version: VERSION.to_string(),
            ..Default::default()
        }));

        let app = Router::new()
            .route("/sql", post(sql))
            .with_state(Arc::clone(&state));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    pub fn state(&self) -> std::sync::MutexGuard<'_, DaemonState> {
        self.state.lock().unwrap()
    }
}

fn write(path: &Path, content: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

/// A daemon with files on disk, a config file and a backup target
pub struct Fixture {
    pub dir: TempDir,
    pub daemon: FakeDaemon,
    pub config_path: PathBuf,
    pub data_dir: PathBuf,
    pub target_dir: PathBuf,
    pub state_file: PathBuf,
}

impl Fixture {
    /// Daemon serving `tables`, each backed by two files and one stopwords file
    pub async fn new(tables: &[&str]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = std::fs::canonicalize(dir.path()).unwrap();
        let daemon = FakeDaemon::start().await;

        let data_dir = root.join("data");
        let target_dir = root.join("backups");
        let state_file = data_dir.join("state.sql");
        std::fs::create_dir_all(&target_dir).unwrap();
        write(&data_dir.join("manticore.json"), "{\"indexes\":{}}");
        write(&state_file, "SET GLOBAL x = 1;");

        let config_path = root.join("manticore.conf");
        write(
            &config_path,
            &format!(
                "searchd {{\n    listen = {}:{}:http\n    listen = 9306:mysql41\n    data_dir = {}\n    sphinxql_state = {}\n}}\n",
                daemon.addr.ip(),
                daemon.addr.port(),
                data_dir.display(),
                state_file.display()
            ),
        );

        {
            let mut state = daemon.state();
            state.config_path = config_path.clone();
            for name in tables {
                let files = vec![
                    data_dir.join(name).join(format!("{}.0.spa", name)),
                    data_dir.join(name).join(format!("{}.meta", name)),
                ];
                for file in &files {
                    write(file, &format!("contents of {}", file.display()));
                }
                let stopwords = root.join("dict").join(format!("{}-stop.txt", name));
                write(&stopwords, "a\nthe\n");

                state.tables.insert(
                    name.to_string(),
                    FakeTable {
                        kind: "rt".to_string(),
                        files,
                        external: vec![stopwords],
                    },
                );
            }
        }

        Self {
            dir,
            daemon,
            config_path,
            data_dir,
            target_dir,
            state_file,
        }
    }

    pub fn searchd_config(&self) -> SearchdConfig {
        SearchdConfig::from_file(&self.config_path).unwrap()
    }

    pub async fn client(&self) -> Arc<ControlClient> {
        Arc::new(
            ControlClient::connect(self.searchd_config(), ClientConfig::default())
                .await
                .unwrap(),
        )
    }

    /// `backup-*` folders in the target directory
    pub fn backups(&self) -> Vec<PathBuf> {
        let mut found: Vec<PathBuf> = std::fs::read_dir(&self.target_dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        found.sort();
        found
    }
}
