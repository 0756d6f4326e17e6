// src/checksum/mod.rs

//! Content fingerprinting.
//!
//! - [`fingerprint`] defines the [`Fingerprint`] value and its comparison
//!   semantics.
//! - [`engine`] walks source globs, hashes file contents with blake3, and
//!   folds in transitive dependency digests.

pub mod engine;
pub mod fingerprint;

pub use engine::ChecksumEngine;
pub use fingerprint::Fingerprint;
