//! Public error taxonomy for the acquisition and query subsystem.
//!
//! Every failure surfaced to a caller is one of four kinds, so a UI can
//! distinguish "network problem" from "data problem" and offer the right
//! recovery action.

/// Tagged error surface exposed by the subsystem.
///
/// `TransferFailed` and `NotReady` are retryable (restart acquisition or
/// wait, respectively); `LoadFailed` and `QueryFailed` are not — retrying
/// an identical load or query cannot succeed.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DbError {
    /// Network, timeout, or checksum retry exhaustion during acquisition.
    #[error("transfer failed: {detail}")]
    TransferFailed { detail: String },

    /// Corrupt or unparsable database image, or engine init failure.
    #[error("load failed: {detail}")]
    LoadFailed { detail: String },

    /// Malformed query or engine-level SQL error.
    #[error("query failed: {detail}")]
    QueryFailed { detail: String },

    /// Operation attempted before the engine reached the ready state.
    #[error("database not ready: {detail}")]
    NotReady { detail: String },
}

impl DbError {
    pub fn transfer(detail: impl Into<String>) -> Self {
        Self::TransferFailed {
            detail: detail.into(),
        }
    }

    pub fn load(detail: impl Into<String>) -> Self {
        Self::LoadFailed {
            detail: detail.into(),
        }
    }

    pub fn query(detail: impl Into<String>) -> Self {
        Self::QueryFailed {
            detail: detail.into(),
        }
    }

    pub fn not_ready(detail: impl Into<String>) -> Self {
        Self::NotReady {
            detail: detail.into(),
        }
    }

    /// Whether the caller can usefully retry the same operation.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransferFailed { .. } | Self::NotReady { .. })
    }

    /// Human-readable detail string carried by every kind.
    #[must_use]
    pub fn detail(&self) -> &str {
        match self {
            Self::TransferFailed { detail }
            | Self::LoadFailed { detail }
            | Self::QueryFailed { detail }
            | Self::NotReady { detail } => detail,
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, DbError>;
