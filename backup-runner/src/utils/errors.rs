//! Error types for the backup runner.

use std::path::PathBuf;
use std::process::ExitStatus;
use thiserror::Error;

/// Configuration and catalog problems, detected before any target is touched.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Invalid catalog entry '{name}': {reason}")]
    InvalidTarget { name: String, reason: String },

    #[error("Archive base name '{0}' is used by more than one catalog entry")]
    DuplicateArchive(String),

    #[error("Cannot determine the home directory")]
    NoHome,
}

/// Failure reported by the compression collaborator.
#[derive(Error, Debug)]
pub enum CompressError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    Exit {
        program: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("I/O error while compressing: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure of the manifest step. Any of these means no manifest was written.
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("failed to list {}: {source}", dir.display())]
    Scan {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to hash {file}: {source}")]
    Digest {
        file: String,
        #[source]
        source: std::io::Error,
    },

    #[error("archive name {0:?} cannot be listed in a checksum file")]
    InvalidFileName(String),

    #[error("failed to write manifest {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read manifest {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed manifest line {line}: {content:?}")]
    Malformed { line: usize, content: String },
}

/// Run-level failures. Per-target problems never end up here.
#[derive(Error, Debug)]
pub enum RunError {
    #[error("destination root {} is not usable: {reason}", path.display())]
    Destination { path: PathBuf, reason: String },

    #[error("run already started")]
    AlreadyStarted,

    #[error("run interrupted")]
    Interrupted,
}

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Run error: {0}")]
    Run(#[from] RunError),

    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RunnerError>;
