//! Backup Runner - Main entry point
//!
//! Archives every catalog target into the destination root and rebuilds the
//! checksum manifest there.

use anyhow::Result;
use backup_runner::config::Config;
use backup_runner::daemon::shutdown::ShutdownCoordinator;
use backup_runner::executor::archiver::Archiver;
use backup_runner::executor::manifest::{ManifestBuilder, VerifyStatus};
use backup_runner::executor::naming::SystemClock;
use backup_runner::executor::resolve::PathResolver;
use backup_runner::tools::{Sha512Digester, TarCompressor};
use backup_runner::utils::{self, RunError};
use backup_runner::{BackupRun, Catalog, Setup};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

const EXIT_FAILURE: u8 = 1;
const EXIT_CONFIG: u8 = 2;
const EXIT_INTERRUPTED: u8 = 130;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Archive every catalog target, then rebuild the manifest
    Run {
        /// Destination root (overrides config)
        #[arg(short, long, value_name = "DIR")]
        destination: Option<PathBuf>,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Recompute every digest listed in the destination's manifest
    Verify {
        /// Destination root (overrides config)
        #[arg(short, long, value_name = "DIR")]
        destination: Option<PathBuf>,
    },

    /// Print a complete sample configuration
    InitConfig,

    /// List the catalog with resolved paths
    Targets {
        /// Destination root (overrides config)
        #[arg(short, long, value_name = "DIR")]
        destination: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(EXIT_CONFIG)
        }
    }
}

/// Errors returned from here are configuration problems.
async fn run(args: Args) -> Result<ExitCode> {
    if let Command::InitConfig = args.command {
        print!("{}", Config::sample().to_toml()?);
        return Ok(ExitCode::SUCCESS);
    }

    let Setup {
        config,
        home,
        catalog,
    } = backup_runner::prepare(args.config.as_deref())?;

    // Initialize logging
    let log_level = args.log_level.as_deref().unwrap_or(&config.log.level);
    utils::logger::init(log_level)?;

    match args.command {
        Command::Run { destination, json } => {
            let destination = destination.unwrap_or_else(|| config.destination_root(&home));
            run_backup(&config, catalog, home, destination, json).await
        }
        Command::Verify { destination } => {
            let destination = destination.unwrap_or_else(|| config.destination_root(&home));
            verify(&config, destination).await
        }
        Command::Targets { destination } => {
            let destination = destination.unwrap_or_else(|| config.destination_root(&home));
            let resolver = PathResolver::new(home, destination);
            let extension = config.archive.compression.extension();
            for entry in catalog.entries() {
                let target = resolver.resolve(entry);
                println!(
                    "{:<36} {} -> {}_<timestamp>.{}",
                    entry.name,
                    target.source.display(),
                    target.archive_base_path().display(),
                    extension
                );
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::InitConfig => Ok(ExitCode::SUCCESS),
    }
}

async fn run_backup(
    config: &Config,
    catalog: Catalog,
    home: PathBuf,
    destination: PathBuf,
    json: bool,
) -> Result<ExitCode> {
    let extension = config.archive.compression.extension();

    tracing::info!(
        "Starting backup-runner v{} ({} targets, {} archives)",
        env!("CARGO_PKG_VERSION"),
        catalog.len(),
        extension
    );

    let archiver = Archiver::new(
        TarCompressor::from_config(&config.archive),
        Arc::new(SystemClock),
        extension,
    )
    .with_output_check(config.archive.check_output);
    let manifest = ManifestBuilder::new(Sha512Digester, extension, config.manifest.file_name.clone());

    // Create shutdown coordinator
    let shutdown = ShutdownCoordinator::new();
    let mut backup = BackupRun::new(catalog, PathResolver::new(home, destination), archiver, manifest)
        .with_cancel(shutdown.token());

    let signals = tokio::spawn(async move {
        shutdown.wait_for_signal().await;
    });
    let result = backup.execute().await;
    signals.abort();

    match result {
        Ok(report) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", report);
            }
            if report.is_success() {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::from(EXIT_FAILURE))
            }
        }
        Err(RunError::Interrupted) => {
            eprintln!("Backup interrupted; no manifest was written.");
            Ok(ExitCode::from(EXIT_INTERRUPTED))
        }
        Err(e @ RunError::Destination { .. }) => {
            eprintln!("Error: {}", e);
            Ok(ExitCode::from(EXIT_CONFIG))
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            Ok(ExitCode::from(EXIT_FAILURE))
        }
    }
}

async fn verify(config: &Config, destination: PathBuf) -> Result<ExitCode> {
    let builder = ManifestBuilder::new(
        Sha512Digester,
        config.archive.compression.extension(),
        config.manifest.file_name.clone(),
    );

    let report = match tokio::task::spawn_blocking(move || builder.verify(&destination)).await? {
        Ok(report) => report,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(ExitCode::from(EXIT_FAILURE));
        }
    };

    for (name, status) in &report.entries {
        match status {
            VerifyStatus::Ok => println!("{}: OK", name),
            VerifyStatus::Mismatch { .. } => println!("{}: FAILED", name),
            VerifyStatus::Missing => println!("{}: MISSING", name),
            VerifyStatus::Unreadable { reason } => println!("{}: UNREADABLE ({})", name, reason),
        }
    }
    for name in &report.unlisted {
        println!("{}: NOT IN MANIFEST", name);
    }

    if report.is_clean() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(EXIT_FAILURE))
    }
}
