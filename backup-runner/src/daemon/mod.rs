//! Process lifecycle handling.

pub mod shutdown;
