//! Progressive acquisition of the database image.
//!
//! The transfer manager fetches a manifest-described image (optionally in
//! verified chunks) from a [`ByteSource`], with timeout tiers chosen from
//! a connection estimate, exponential-backoff retries, and a typed
//! progress event channel for the UI.

pub mod manager;
pub mod profiler;
pub mod retry;
pub mod session;
pub mod source;

pub use manager::{event_channel, CancelFlag, TimeoutTiers, TransferConfig, TransferManager};
pub use profiler::{ConnectionClass, ConnectionEstimate, ConnectionProfiler};
pub use retry::{RetryPolicy, RetrySchedule, RetryState};
pub use session::{SessionSummary, TransferSession};
pub use source::{ByteSource, HttpSource, MemorySource, SourceError};
