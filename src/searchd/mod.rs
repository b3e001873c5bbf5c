//! Manticore searchd integration
//!
//! - **config**: parses the daemon's config file (endpoint, data_dir, state files)
//! - **version**: parses the composite version string and checks support
//! - **client**: control channel client (FREEZE, UNFREEZE, SHOW ...)
//!
//! The client is always built from a parsed config and refuses to work with a
//! daemon that is too old or that runs with a different config file.

mod client;
mod config;
mod version;

pub use client::{ClientConfig, ControlClient, QueryResult, TableList, API_PATH};
pub(crate) use client::op_result;
pub use config::{
    default_config_path, is_data_dir_valid, Directive, SearchdConfig, DEFAULT_HOST, DEFAULT_PORT,
    SCHEMA_FILE,
};
pub use version::{VersionInfo, MIN_DATE, MIN_VERSION, UNKNOWN_VERSION};
