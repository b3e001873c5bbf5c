//! Tool Settings
//!
//! Settings of the backup tool itself (not of searchd). Loaded from an
//! optional TOML file, then overridden by environment variables, then by
//! command-line flags.

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main settings structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub backup: BackupSettings,

    #[serde(default)]
    pub searchd: SearchdSettings,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where backups go
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BackupSettings {
    /// Directory receiving `backup-*` folders
    pub target_dir: Option<PathBuf>,
}

/// How to reach searchd
#[derive(Debug, Clone, Deserialize)]
pub struct SearchdSettings {
    /// searchd config file; platform defaults are probed when unset
    pub config: Option<PathBuf>,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout() -> u64 {
    3
}

impl Default for SearchdSettings {
    fn default() -> Self {
        Self {
            config: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Settings {
    /// Load settings from a file
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path).map_err(|e| SettingsError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::parse(path, &content)
    }

    fn parse(path: &Path, content: &str) -> Result<Self, SettingsError> {
        toml::from_str(content).map_err(|e| SettingsError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
    }

    /// Load settings with environment variable overrides
    pub fn load_with_env(path: Option<&Path>) -> Result<Self, SettingsError> {
        let mut settings = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        settings.apply_env_overrides();
        Ok(settings)
    }

    /// Apply environment variable overrides to existing settings
    fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("MANTICORE_BACKUP_TARGET_DIR") {
            self.backup.target_dir = Some(PathBuf::from(dir));
        }

        if let Ok(config) = std::env::var("MANTICORE_BACKUP_CONFIG") {
            self.searchd.config = Some(PathBuf::from(config));
        }
        if let Ok(timeout) = std::env::var("MANTICORE_BACKUP_TIMEOUT_SECS") {
            if let Ok(t) = timeout.parse() {
                self.searchd.request_timeout_secs = t;
            }
        }

        if let Ok(level) = std::env::var("MANTICORE_BACKUP_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("MANTICORE_BACKUP_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Settings errors
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Failed to read settings file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse settings file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Install the global tracing subscriber
///
/// `RUST_LOG` wins over the configured level.
pub fn init_logging(config: &LoggingConfig) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("manticore_backup={}", config.level).into());

    let registry = tracing_subscriber::registry().with(filter);
    if config.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .init();
    }
}

/// Generate a default settings file content
pub fn generate_default_settings() -> String {
    r#"# manticore-backup settings
#
# Environment variables override these settings:
# - MANTICORE_BACKUP_TARGET_DIR
# - MANTICORE_BACKUP_CONFIG
# - MANTICORE_BACKUP_TIMEOUT_SECS
# - MANTICORE_BACKUP_LOG_LEVEL
# - MANTICORE_BACKUP_LOG_FORMAT

[backup]
# Directory that receives backup-<timestamp> folders
# target_dir = "/var/backups/manticore"

[searchd]
# Config file of the daemon to back up
# config = "/etc/manticoresearch/manticore.conf"

# Timeout of a single control request (seconds)
request_timeout_secs = 3

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty or json
format = "pretty"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert!(settings.backup.target_dir.is_none());
        assert_eq!(settings.searchd.request_timeout_secs, 3);
        assert_eq!(settings.logging.level, "info");
        assert_eq!(settings.logging.format, "pretty");
    }

    #[test]
    fn test_default_template_parses() {
        let settings =
            Settings::parse(Path::new("default.toml"), &generate_default_settings()).unwrap();
        assert_eq!(settings.searchd.request_timeout_secs, 3);
        assert!(settings.searchd.config.is_none());
    }

    #[test]
    fn test_load_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("backup.toml");
        std::fs::write(
            &path,
            "[backup]\ntarget_dir = \"/srv/backups\"\n[searchd]\nrequest_timeout_secs = 10\n",
        )
        .unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.backup.target_dir, Some(PathBuf::from("/srv/backups")));
        assert_eq!(settings.searchd.request_timeout_secs, 10);
        assert_eq!(settings.logging.format, "pretty");
    }

    #[test]
    fn test_load_errors() {
        let dir = tempdir().unwrap();
        let err = Settings::load(&dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, SettingsError::Io { .. }));

        let err = Settings::parse(Path::new("bad.toml"), "[searchd\n").unwrap_err();
        assert!(matches!(err, SettingsError::Parse { .. }));
    }

    #[test]
    fn test_env_overrides() {
        std::env::set_var("MANTICORE_BACKUP_TIMEOUT_SECS", "7");
        std::env::set_var("MANTICORE_BACKUP_LOG_FORMAT", "json");

        let settings = Settings::load_with_env(None).unwrap();
        assert_eq!(settings.searchd.request_timeout_secs, 7);
        assert_eq!(settings.logging.format, "json");

        std::env::remove_var("MANTICORE_BACKUP_TIMEOUT_SECS");
        std::env::remove_var("MANTICORE_BACKUP_LOG_FORMAT");
    }
}
