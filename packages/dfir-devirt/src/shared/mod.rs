//! Shared utilities used by every feature

pub mod hash;

#[cfg(test)]
pub(crate) mod fixtures;

pub use hash::local_hash;
