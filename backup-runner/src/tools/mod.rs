//! External collaborators: the compressor and the hasher.

pub mod compress;
pub mod digest;

pub use compress::{Compressor, TarCompressor};
pub use digest::{Digester, Sha512Digester};
