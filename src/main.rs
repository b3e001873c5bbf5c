//! manticore-backup CLI
//!
//! Backs up the tables of a running searchd into `<backup-dir>/backup-<timestamp>`.

use anyhow::{bail, Context};
use clap::Parser;
use manticore_backup::backup::{BackupOrchestrator, BackupSummary, TracingReporter};
use manticore_backup::interrupt::wait_for_signal;
use manticore_backup::searchd::{default_config_path, ClientConfig, ControlClient, SearchdConfig};
use manticore_backup::settings::{generate_default_settings, init_logging, Settings};
use manticore_backup::storage::{FileStorage, Storage};
use manticore_backup::Error;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

/// Exit code for a run stopped by SIGINT/SIGTERM
const EXIT_INTERRUPTED: u8 = 130;

#[derive(Parser)]
#[command(name = "manticore-backup")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Backup tool for a running Manticore Search daemon")]
pub struct Cli {
    /// searchd config file (default: platform location)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Directory to store backups in; must exist
    #[arg(long)]
    pub backup_dir: Option<PathBuf>,

    /// Tables to back up, comma separated (default: all)
    #[arg(long, value_delimiter = ',')]
    pub tables: Vec<String>,

    /// Unfreeze all tables and exit
    #[arg(long)]
    pub unlock: bool,

    /// Settings file of this tool
    #[arg(long)]
    pub settings: Option<PathBuf>,

    /// Log format (pretty, json)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Print a default settings file and exit
    #[arg(long)]
    pub print_settings: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.print_settings {
        print!("{}", generate_default_settings());
        return ExitCode::SUCCESS;
    }

    let mut settings = match Settings::load_with_env(cli.settings.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Some(format) = &cli.log_format {
        settings.logging.format = format.clone();
    }
    init_logging(&settings.logging);

    tracing::info!("manticore-backup v{}", env!("CARGO_PKG_VERSION"));

    match run(cli, settings).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if matches!(e.downcast_ref::<Error>(), Some(Error::Interrupted)) {
                tracing::warn!("Backup interrupted");
                return ExitCode::from(EXIT_INTERRUPTED);
            }
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, settings: Settings) -> anyhow::Result<()> {
    let config_path = cli
        .config
        .or(settings.searchd.config)
        .or_else(default_config_path)
        .context("Failed to find searchd config, pass it with --config")?;

    let config = SearchdConfig::from_file(&config_path)?;
    let client_config = ClientConfig::from_secs(settings.searchd.request_timeout_secs);
    let client = Arc::new(ControlClient::connect(config, client_config).await?);

    if cli.unlock {
        if !client.unfreeze_all().await {
            bail!("Failed to unfreeze some tables");
        }
        return Ok(());
    }

    let target_dir = cli
        .backup_dir
        .or(settings.backup.target_dir)
        .context("--backup-dir is required")?;
    let storage: Arc<dyn Storage> = Arc::new(FileStorage::new(target_dir)?);

    let handler = client.signal_handler(Arc::clone(&storage));
    let signal_task = tokio::spawn(async move {
        match wait_for_signal().await {
            Ok(signal) => {
                if !handler.handle(signal).await {
                    tracing::warn!("Some tables could not be unfrozen, run with --unlock");
                }
            }
            Err(e) => tracing::warn!("Failed to install signal handler: {}", e),
        }
    });

    let orchestrator = BackupOrchestrator::new(
        Arc::clone(&client),
        storage,
        Arc::new(TracingReporter),
    );
    let result = orchestrator.store(&requested_tables(&cli.tables)).await;

    let cancelled = client.interrupt().is_cancelled();
    if cancelled {
        // Let the handler finish unlocking before the process exits
        let _ = signal_task.await;
    } else {
        signal_task.abort();
    }

    finish(result, cancelled)
}

/// Table names from `--tables a, b`
fn requested_tables(raw: &[String]) -> Vec<String> {
    raw.iter()
        .map(|name| name.trim())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

/// A run that completed before the signal arrived keeps its backup
fn finish(result: manticore_backup::Result<BackupSummary>, cancelled: bool) -> anyhow::Result<()> {
    match result {
        Ok(summary) => {
            if cancelled {
                tracing::warn!(
                    "Signal received after the backup completed, keeping {}",
                    summary.destination.display()
                );
            }
            Ok(())
        }
        Err(_) if cancelled => Err(Error::Interrupted.into()),
        Err(e) => Err(e.into()),
    }
}
