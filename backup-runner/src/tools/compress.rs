//! Compression collaborator.
//!
//! The tar program is always started with an argument vector, never through a
//! shell, so source and output paths are passed literally.

use crate::config::{ArchiveConfig, Compression};
use crate::utils::CompressError;
use async_compression::tokio::write::ZstdEncoder;
use async_compression::Level;
use std::ffi::OsString;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{ChildStdout, Command};
use tracing::debug;

/// Turns one source directory into one archive file.
pub trait Compressor: Send + Sync {
    /// Compress `source` recursively into `output`, creating or truncating it.
    fn compress(
        &self,
        source: &Path,
        output: &Path,
    ) -> impl Future<Output = Result<(), CompressError>> + Send;
}

/// Compressor backed by the system `tar` program.
#[derive(Debug, Clone)]
pub struct TarCompressor {
    program: String,
    compression: Compression,
    level: i32,
}

impl TarCompressor {
    pub fn new(program: impl Into<String>, compression: Compression, level: i32) -> Self {
        Self {
            program: program.into(),
            compression,
            level,
        }
    }

    pub fn from_config(config: &ArchiveConfig) -> Self {
        Self::new(
            config.tar_program.clone(),
            config.compression,
            config.compression_level,
        )
    }

    /// Base tar invocation: members are stored relative to the source's parent.
    fn command(&self, mode: &str, output: &Path, source: &Path) -> Command {
        let (dir, member) = split_source(source);

        let mut cmd = Command::new(&self.program);
        cmd.arg(mode)
            .arg(output)
            .arg("-C")
            .arg(dir)
            .arg("--")
            .arg(member)
            .stdin(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    async fn compress_gzip(&self, source: &Path, output: &Path) -> Result<(), CompressError> {
        let result = self
            .command("-czf", output, source)
            .stdout(Stdio::null())
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;

        if !result.status.success() {
            return Err(CompressError::Exit {
                program: self.program.clone(),
                status: result.status,
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }

        Ok(())
    }

    async fn compress_zstd(&self, source: &Path, output: &Path) -> Result<(), CompressError> {
        let mut child = self
            .command("-cf", Path::new("-"), source)
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("tar stdout was not captured"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| std::io::Error::other("tar stderr was not captured"))?;

        // Drained on its own task so a chatty tar cannot block on stderr.
        let drain = tokio::spawn(async move {
            let mut text = String::new();
            stderr.read_to_string(&mut text).await.map(|_| text)
        });

        if let Err(e) = self.encode_zstd(stdout, output).await {
            // Nobody reads stdout any more; tar must not stay blocked on it.
            if let Err(kill) = child.start_kill() {
                debug!("Could not kill {}: {}", self.program, kill);
            }
            if let Err(wait) = child.wait().await {
                debug!("Could not reap {}: {}", self.program, wait);
            }
            drain.abort();
            return Err(CompressError::Io(e));
        }

        let status = child.wait().await?;
        if !status.success() {
            let stderr = match drain.await {
                Ok(Ok(text)) => text.trim().to_string(),
                _ => String::new(),
            };
            return Err(CompressError::Exit {
                program: self.program.clone(),
                status,
                stderr,
            });
        }

        Ok(())
    }

    /// Encode the tar stream into `output`. Consumes (and so closes) `stdout`.
    async fn encode_zstd(&self, mut stdout: ChildStdout, output: &Path) -> std::io::Result<()> {
        let file = tokio::fs::File::create(output).await?;
        let mut encoder = ZstdEncoder::with_quality(file, Level::Precise(self.level));
        tokio::io::copy(&mut stdout, &mut encoder).await?;
        encoder.shutdown().await
    }

    fn spawn_error(&self, source: std::io::Error) -> CompressError {
        CompressError::Spawn {
            program: self.program.clone(),
            source,
        }
    }
}

impl Compressor for TarCompressor {
    async fn compress(&self, source: &Path, output: &Path) -> Result<(), CompressError> {
        debug!(
            "Compressing {} into {} ({:?})",
            source.display(),
            output.display(),
            self.compression
        );

        match self.compression {
            Compression::Gzip => self.compress_gzip(source, output).await,
            Compression::Zstd => self.compress_zstd(source, output).await,
        }
    }
}

/// Split a source path into the directory tar changes into and the member name.
fn split_source(source: &Path) -> (PathBuf, OsString) {
    match (source.parent(), source.file_name()) {
        (Some(parent), Some(name)) if !parent.as_os_str().is_empty() => {
            (parent.to_path_buf(), name.to_os_string())
        }
        _ => (source.to_path_buf(), OsString::from(".")),
    }
}
