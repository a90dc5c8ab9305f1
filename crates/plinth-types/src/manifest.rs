//! Transfer manifest: total size and optional chunk layout, fetched before
//! the data transfer begins.

use serde::{Deserialize, Serialize};

use crate::error::{DbError, Result};

/// Metadata describing the database image to acquire.
///
/// A manifest without chunks describes a single-blob transfer; a chunked
/// manifest must tile the declared total contiguously.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferManifest {
    /// Total byte length of the database image.
    pub total_bytes: u64,
    /// Ordered chunk list; empty for single-blob transfers.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chunks: Vec<ChunkInfo>,
}

/// One fixed byte range of the image, transferred and verified independently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkInfo {
    pub offset: u64,
    pub length: u64,
    /// Optional lowercase sha256 hex digest of the chunk bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

impl TransferManifest {
    /// Manifest for a single-blob transfer of `total_bytes`.
    #[must_use]
    pub fn single(total_bytes: u64) -> Self {
        Self {
            total_bytes,
            chunks: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_chunked(&self) -> bool {
        !self.chunks.is_empty()
    }

    /// Reject manifests that cannot describe a complete image: zero size,
    /// zero-length chunks, or a chunk list that does not tile
    /// `total_bytes` contiguously from offset zero.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::TransferFailed`]; a broken manifest means the
    /// acquisition cannot start, which the caller treats like any other
    /// terminal transfer failure.
    pub fn validate(&self) -> Result<()> {
        if self.total_bytes == 0 {
            return Err(DbError::transfer("manifest declares an empty image"));
        }
        if self.chunks.is_empty() {
            return Ok(());
        }

        let mut expected_offset = 0u64;
        for (index, chunk) in self.chunks.iter().enumerate() {
            if chunk.length == 0 {
                return Err(DbError::transfer(format!(
                    "manifest chunk {index} has zero length"
                )));
            }
            if chunk.offset != expected_offset {
                return Err(DbError::transfer(format!(
                    "manifest chunk {index} starts at {} but {} bytes precede it",
                    chunk.offset, expected_offset
                )));
            }
            expected_offset = expected_offset.saturating_add(chunk.length);
        }
        if expected_offset != self.total_bytes {
            return Err(DbError::transfer(format!(
                "manifest chunks cover {expected_offset} bytes but declare {} total",
                self.total_bytes
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(offset: u64, length: u64) -> ChunkInfo {
        ChunkInfo {
            offset,
            length,
            checksum: None,
        }
    }

    #[test]
    fn single_blob_manifest_validates() {
        assert!(TransferManifest::single(4096).validate().is_ok());
    }

    #[test]
    fn empty_image_rejected() {
        let err = TransferManifest::single(0).validate().unwrap_err();
        assert!(matches!(err, DbError::TransferFailed { .. }));
    }

    #[test]
    fn contiguous_chunks_validate() {
        let manifest = TransferManifest {
            total_bytes: 12_288,
            chunks: vec![chunk(0, 4096), chunk(4096, 4096), chunk(8192, 4096)],
        };
        assert!(manifest.validate().is_ok());
        assert!(manifest.is_chunked());
    }

    #[test]
    fn gap_in_chunks_rejected() {
        let manifest = TransferManifest {
            total_bytes: 8192,
            chunks: vec![chunk(0, 4096), chunk(5000, 3192)],
        };
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn coverage_mismatch_rejected() {
        let manifest = TransferManifest {
            total_bytes: 10_000,
            chunks: vec![chunk(0, 4096), chunk(4096, 4096)],
        };
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn manifest_json_roundtrip_preserves_checksums() {
        let manifest = TransferManifest {
            total_bytes: 4096,
            chunks: vec![ChunkInfo {
                offset: 0,
                length: 4096,
                checksum: Some("ab".repeat(32)),
            }],
        };
        let json = serde_json::to_string(&manifest).unwrap();
        let back: TransferManifest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, manifest);
    }
}
