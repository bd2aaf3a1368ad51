//! # contactcache
//!
//! Memoizing cache layer for contact lookups.
//!
//! ## Architecture
//! - **MemoStore**: AHash map from key to a ready value or an in-flight load
//! - **Single flight**: concurrent misses on one key share a single load
//! - **ContactRepository**: wires the store to the slow contact loader
//!
//! Entries are never evicted. The store lives as long as its owner.

#![warn(missing_docs)]

mod memo;
mod repository;
mod stats;

pub use memo::{MemoConfig, MemoStore};
pub use repository::{ContactRepository, RepositoryConfig};
pub use stats::CacheStats;
