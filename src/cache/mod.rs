// src/cache/mod.rs

//! Content-addressed result caching.
//!
//! - [`entry`] defines the immutable [`CacheEntry`] payload.
//! - [`local`] is the filesystem tier.
//! - [`remote`] is the abstract object-store + index-store tier.
//! - [`store`] combines the tiers behind one facade with degrade-to-miss
//!   failure semantics.

pub mod entry;
pub mod local;
pub mod remote;
pub mod store;

pub use entry::CacheEntry;
pub use local::LocalCache;
pub use remote::{IndexRecord, RemoteAddress, RemoteBackend, RetryPolicy};
pub use store::{CacheStore, RemoteTier};
