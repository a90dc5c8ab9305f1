//! Embedded SQL engine and the database service facade.
//!
//! [`EngineHandle`] stages an acquired image to disk and opens it
//! read-only; the executor runs [`QuerySpec`](plinth_query::QuerySpec)
//! pairs against it; [`Database`] ties acquisition, loading, caching, and
//! a serialized query worker together behind one async API.

pub mod executor;
pub mod host;
pub mod service;

#[cfg(test)]
pub(crate) mod testutil;

pub use host::EngineHandle;
pub use service::{Database, DatabaseConfig, Phase};
