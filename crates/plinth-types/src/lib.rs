//! Shared data model for the Plinth acquisition and query subsystem.
//!
//! Holds the transfer manifest, the database image container, progress
//! events, the query/filter model, and the public error taxonomy. No I/O
//! lives here.

pub mod error;
pub mod image;
pub mod manifest;
pub mod progress;
pub mod query;

pub use error::DbError;
pub use image::DatabaseImage;
pub use manifest::{ChunkInfo, TransferManifest};
pub use progress::{ProgressEvent, TimeoutTier, TransferEvent};
pub use query::{FilterParams, ResultSet, SiteRecord, SortField};
