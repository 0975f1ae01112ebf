//! Hash collaborator: SHA-512 digests rendered as lowercase hex.

use sha2::{Digest, Sha512};
use std::fs::File;
use std::io;
use std::path::Path;

/// Length of a hex-encoded SHA-512 digest.
pub const DIGEST_HEX_LEN: usize = 128;

pub trait Digester: Send + Sync {
    fn digest(&self, path: &Path) -> io::Result<String>;
}

/// Streams the file through SHA-512.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha512Digester;

impl Digester for Sha512Digester {
    fn digest(&self, path: &Path) -> io::Result<String> {
        let mut file = File::open(path)?;
        let mut hasher = Sha512::new();
        io::copy(&mut file, &mut hasher)?;
        Ok(format!("{:x}", hasher.finalize()))
    }
}

/// True if `s` looks like a digest produced by [`Sha512Digester`].
pub fn is_digest(s: &str) -> bool {
    s.len() == DIGEST_HEX_LEN && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
