//! Backup Runner Library
//!
//! Archives a catalog of source directories into timestamped tarballs and
//! keeps a SHA-512 checksum manifest of every archive in the destination.

pub mod catalog;
pub mod config;
pub mod daemon;
pub mod executor;
pub mod fs;
pub mod tools;
pub mod utils;

// Re-export commonly used types
pub use catalog::{Catalog, CatalogEntry};
pub use config::Config;
pub use executor::{BackupRun, RunState};
pub use utils::errors::{Result, RunnerError};

use std::path::{Path, PathBuf};

/// Everything a command needs before it touches a destination.
#[derive(Debug, Clone)]
pub struct Setup {
    pub config: Config,
    pub home: PathBuf,
    pub catalog: Catalog,
}

/// Load the configuration, then resolve the home directory and the catalog.
pub fn prepare(config_path: Option<&Path>) -> Result<Setup> {
    let config = Config::load(config_path)?;
    let home = config::home_dir()?;
    let catalog = Catalog::from_targets(&config.targets)?;

    Ok(Setup {
        config,
        home,
        catalog,
    })
}
