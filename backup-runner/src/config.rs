//! Configuration management for the backup runner.
//!
//! Loads configuration from an optional TOML file with environment variable
//! overrides (`BACKUP_RUNNER_<SECTION>__<KEY>`). Every field has a default, so
//! running without a file is valid.

use crate::catalog::Catalog;
use crate::utils::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "BACKUP_RUNNER";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub destination: DestinationConfig,
    pub archive: ArchiveConfig,
    pub manifest: ManifestConfig,
    pub log: LogConfig,

    /// Catalog of backup targets. Empty means the built-in desktop catalog.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<TargetConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DestinationConfig {
    /// Destination root. Defaults to `$HOME/Backup_<HOSTNAME>`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Compression algorithm (gzip, zstd)
    pub compression: Compression,

    /// Compression level (1-22, zstd only)
    pub compression_level: i32,

    /// Program used to build the tar stream
    pub tar_program: String,

    /// Treat a zero-byte archive as a failure
    pub check_output: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ManifestConfig {
    /// Checksum list written at the destination root
    pub file_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

/// One raw catalog entry as written in the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Display name, e.g. "SSH Keys"
    pub name: String,

    /// Source directory: absolute, `~/...`, or relative to the home directory
    pub source: String,

    /// Archive base name, e.g. "SSHKeys"
    pub archive: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[default]
    Gzip,
    Zstd,
}

impl Compression {
    /// File extension of archives produced with this compression.
    pub fn extension(self) -> &'static str {
        match self {
            Compression::Gzip => "tar.gz",
            Compression::Zstd => "tar.zst",
        }
    }
}

// Default values
fn default_compression_level() -> i32 {
    3
}

fn default_tar_program() -> String {
    "tar".to_string()
}

fn default_manifest_file() -> String {
    "BACKUP.sha512sum".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            compression: Compression::default(),
            compression_level: default_compression_level(),
            tar_program: default_tar_program(),
            check_output: true,
        }
    }
}

impl Default for ManifestConfig {
    fn default() -> Self {
        Self {
            file_name: default_manifest_file(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from an optional TOML file plus environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path).format(config::FileFormat::Toml),
            );
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: Config = builder.build()?.try_deserialize()?;
        config.check()?;
        Ok(config)
    }

    /// A complete sample configuration, with the built-in catalog spelled out.
    pub fn sample() -> Self {
        Self {
            targets: Catalog::builtin_targets(),
            ..Self::default()
        }
    }

    /// Render this configuration as a TOML document.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Destination root for this run.
    ///
    /// Falls back to `Backup_<HOSTNAME>` under the home directory.
    pub fn destination_root(&self, home: &Path) -> PathBuf {
        match &self.destination.root {
            Some(root) => root.clone(),
            None => home.join(format!("Backup_{}", host_label())),
        }
    }

    fn check(&self) -> Result<(), ConfigError> {
        if self.manifest.file_name.is_empty() || self.manifest.file_name.contains('/') {
            return Err(ConfigError::Invalid(format!(
                "manifest.file_name must be a plain file name, got {:?}",
                self.manifest.file_name
            )));
        }
        if self.manifest.file_name.ends_with(self.archive.compression.extension()) {
            return Err(ConfigError::Invalid(
                "manifest.file_name must not use the archive extension".to_string(),
            ));
        }
        Ok(())
    }
}

/// Uppercased hostname, as used in the default destination folder name.
fn host_label() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .map(|h| h.to_uppercase())
        .unwrap_or_else(|| "LOCALHOST".to_string())
}

/// Home directory of the current user.
///
/// `$HOME` wins; otherwise the passwd entry of the current uid is used.
pub fn home_dir() -> Result<PathBuf, ConfigError> {
    if let Some(home) = std::env::var_os("HOME").filter(|h| !h.is_empty()) {
        return Ok(PathBuf::from(home));
    }

    match nix::unistd::User::from_uid(nix::unistd::getuid()) {
        Ok(Some(user)) => Ok(user.dir),
        _ => Err(ConfigError::NoHome),
    }
}
