//! Query construction and result caching.
//!
//! The builder is a pure function from UI filter parameters to
//! parameterized SQL plus a stable cache key; the cache is a bounded,
//! TTL-aware LRU keyed by that signature.

pub mod builder;
pub mod cache;

pub use builder::{build, QuerySpec, SqlValue};
pub use cache::{CacheConfig, ResultCache};
