//! Bounded in-memory caches shared by the indexing and search pipeline.
//!
//! [`TtlCache`] and [`LruCache`] are coarse-locked containers safe to share
//! behind an `Arc`; [`CacheManager`] groups the typed caches the system uses
//! and can snapshot them to disk for warm restarts.

pub mod cache;
pub mod manager;

pub use cache::{CacheStats, LruCache, TtlCache};
pub use manager::{CacheBudget, CacheError, CacheManager, CacheTtls, ManagerStats};
