//! searchd Config Parser
//!
//! Recovers the connection and filesystem parameters the backup needs from the
//! daemon's own configuration file. Only a handful of directives matter; the
//! rest of the file is ignored.

use crate::error::{Error, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Host used when no HTTP listener carries one
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Port used when no HTTP listener is configured
pub const DEFAULT_PORT: u16 = 9308;

/// Schema file kept by searchd inside its data directory
pub const SCHEMA_FILE: &str = "manticore.json";

/// Locations probed when no config file is given on the command line
const DEFAULT_CONFIG_PATHS: &[&str] = &[
    "/etc/manticoresearch/manticore.conf",
    "/etc/sphinxsearch/sphinx.conf",
    "/etc/manticore/manticore.conf",
];

/// Directives the backup reads from the config file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    Listen,
    DataDir,
    LemmatizerBase,
    SphinxqlState,
    PluginDir,
}

impl Directive {
    pub const ALL: [Directive; 5] = [
        Directive::Listen,
        Directive::DataDir,
        Directive::LemmatizerBase,
        Directive::SphinxqlState,
        Directive::PluginDir,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Directive::Listen => "listen",
            Directive::DataDir => "data_dir",
            Directive::LemmatizerBase => "lemmatizer_base",
            Directive::SphinxqlState => "sphinxql_state",
            Directive::PluginDir => "plugin_dir",
        }
    }

    /// Case-insensitive lookup
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|d| d.name().eq_ignore_ascii_case(name))
    }
}

/// Parsed searchd configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchdConfig {
    /// Absolute path of the config file this was parsed from
    pub path: PathBuf,
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub sphinxql_state: Option<PathBuf>,
    pub lemmatizer_base: Option<PathBuf>,
    pub plugin_dir: Option<PathBuf>,
    /// `data_dir` + "/manticore.json"
    pub schema_path: PathBuf,
}

fn directive_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?im)^\s*(listen|data_dir|lemmatizer_base|sphinxql_state|plugin_dir)\s*=\s*(.*)$",
        )
        .expect("directive pattern is valid")
    })
}

fn windows_path_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^[a-z]:\\").expect("drive pattern is valid"))
}

impl SearchdConfig {
    /// Read and parse the config file at `path`
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        let path = std::fs::canonicalize(path).map_err(|e| {
            Error::Config(format!("Failed to resolve config path {}: {}", path.display(), e))
        })?;

        Self::parse(&path, &content)
    }

    /// Parse config text; `path` is recorded as-is
    pub fn parse(path: &Path, content: &str) -> Result<Self> {
        let mut host = DEFAULT_HOST.to_string();
        let mut port = DEFAULT_PORT;
        let mut data_dir: Option<String> = None;
        let mut sphinxql_state = None;
        let mut lemmatizer_base = None;
        let mut plugin_dir = None;

        for caps in directive_regex().captures_iter(content) {
            let Some(directive) = Directive::parse(&caps[1]) else {
                continue;
            };
            let value = caps[2].trim().to_string();

            match directive {
                Directive::Listen => {
                    if let Some((h, p)) = parse_http_listen(&value)? {
                        if let Some(h) = h {
                            host = h;
                        }
                        port = p;
                    }
                }
                Directive::DataDir => data_dir = Some(value),
                Directive::LemmatizerBase => lemmatizer_base = Some(PathBuf::from(value)),
                Directive::SphinxqlState => sphinxql_state = Some(PathBuf::from(value)),
                Directive::PluginDir => plugin_dir = Some(PathBuf::from(value)),
            }
        }

        let data_dir = data_dir
            .ok_or_else(|| Error::Config("Failed to detect data_dir from config file".to_string()))?;

        if !is_data_dir_valid(&data_dir) {
            return Err(Error::Config(
                "The data_dir parameter in searchd config should contain absolute path".to_string(),
            ));
        }

        let schema_path = PathBuf::from(format!("{}/{}", data_dir, SCHEMA_FILE));

        tracing::info!("Manticore config endpoint = {}:{}", host, port);

        Ok(Self {
            path: path.to_path_buf(),
            host,
            port,
            data_dir: PathBuf::from(data_dir),
            sphinxql_state,
            lemmatizer_base,
            plugin_dir,
            schema_path,
        })
    }

    /// Base URL of the HTTP endpoint
    pub fn endpoint(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// Global state files that exist for this daemon
    ///
    /// The plugin directory is checked on disk at call time and skipped if it
    /// is not a directory.
    pub fn state_paths(&self) -> Vec<PathBuf> {
        let mut result = Vec::new();

        if let Some(path) = &self.sphinxql_state {
            result.push(path.clone());
        }
        if let Some(path) = &self.lemmatizer_base {
            result.push(path.clone());
        }
        if let Some(path) = &self.plugin_dir {
            if path.is_dir() {
                result.push(path.clone());
            }
        }

        result
    }
}

/// Host/port of an HTTP listener, `None` for other protocols
///
/// Accepts `host:port:http...` and `port:http...`.
fn parse_http_listen(value: &str) -> Result<Option<(Option<String>, u16)>> {
    let Some(pos) = value.find(":http") else {
        return Ok(None);
    };
    let listen = &value[..pos];

    let (host, port) = match listen.split_once(':') {
        Some((h, p)) => (Some(h.to_string()), p),
        None => (None, listen),
    };
    let port = port
        .trim()
        .parse::<u16>()
        .map_err(|_| Error::Config(format!("Invalid port in listen directive: {}", value)))?;

    Ok(Some((host, port)))
}

/// `data_dir` must be absolute for the platform we run on
pub fn is_data_dir_valid(data_dir: &str) -> bool {
    if cfg!(windows) {
        windows_path_regex().is_match(data_dir)
    } else {
        data_dir.starts_with('/')
    }
}

/// First platform default config file that exists
pub fn default_config_path() -> Option<PathBuf> {
    DEFAULT_CONFIG_PATHS
        .iter()
        .map(PathBuf::from)
        .find(|p| p.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn parse(content: &str) -> Result<SearchdConfig> {
        SearchdConfig::parse(Path::new("/etc/manticoresearch/manticore.conf"), content)
    }

    #[test]
    fn test_parse_full_config() {
        let config = parse(
            r#"
searchd {
    listen = 127.0.0.1:9312
    listen = 127.0.0.1:9306:mysql
    listen = 10.0.0.5:9400:http
    data_dir = /var/lib/manticore
    sphinxql_state = /var/lib/manticore/state.sql
    lemmatizer_base = /usr/share/manticore/morph
}
"#,
        )
        .unwrap();

        assert_eq!(config.host, "10.0.0.5");
        assert_eq!(config.port, 9400);
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/manticore"));
        assert_eq!(
            config.schema_path,
            PathBuf::from("/var/lib/manticore/manticore.json")
        );
        assert_eq!(
            config.sphinxql_state,
            Some(PathBuf::from("/var/lib/manticore/state.sql"))
        );
        assert!(config.plugin_dir.is_none());
    }

    #[test]
    fn test_listen_port_only_keeps_default_host() {
        let config = parse("listen = 9380:http\ndata_dir = /data\n").unwrap();
        assert_eq!(config.host, DEFAULT_HOST);
        assert_eq!(config.port, 9380);
    }

    #[test]
    fn test_listen_defaults_without_http() {
        let config = parse("listen = 9306:mysql41\ndata_dir = /data\n").unwrap();
        assert_eq!(config.host, DEFAULT_HOST);
        assert_eq!(config.port, DEFAULT_PORT);
    }

    #[test]
    fn test_directives_are_case_insensitive() {
        let config = parse("DATA_DIR = /data\nListen = localhost:9999:http\n").unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/data"));
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 9999);
    }

    #[test]
    fn test_last_directive_wins() {
        let config = parse("data_dir = /first\ndata_dir = /second\n").unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/second"));
    }

    #[test]
    fn test_missing_data_dir() {
        let err = parse("listen = 9308:http\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_relative_data_dir() {
        let err = parse("data_dir = var/lib/manticore\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(!is_data_dir_valid("C:\\data"));
    }

    #[test]
    fn test_invalid_port() {
        let err = parse("listen = host:abc:http\ndata_dir = /data\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_directive_lookup() {
        assert_eq!(Directive::parse("Plugin_Dir"), Some(Directive::PluginDir));
        assert_eq!(Directive::parse("binlog_path"), None);
    }

    #[test]
    fn test_state_paths_checks_plugin_dir_on_disk() {
        let dir = tempdir().unwrap();
        let plugins = dir.path().join("plugins");

        let content = format!(
            "data_dir = /data\nsphinxql_state = /data/state.sql\nplugin_dir = {}\n",
            plugins.display()
        );
        let config = parse(&content).unwrap();

        // Not created yet
        assert_eq!(config.state_paths(), vec![PathBuf::from("/data/state.sql")]);

        std::fs::create_dir(&plugins).unwrap();
        assert_eq!(
            config.state_paths(),
            vec![PathBuf::from("/data/state.sql"), plugins]
        );
    }

    #[test]
    fn test_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("manticore.conf");
        std::fs::write(&path, "searchd {\n  data_dir = /var/lib/manticore\n}\n").unwrap();

        let config = SearchdConfig::from_file(&path).unwrap();
        assert_eq!(config.path, std::fs::canonicalize(&path).unwrap());
        assert_eq!(config.endpoint(), "http://127.0.0.1:9308");

        let err = SearchdConfig::from_file(&dir.path().join("missing.conf")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
