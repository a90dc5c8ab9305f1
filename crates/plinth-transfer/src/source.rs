//! Byte-source abstraction over the transport that serves the image.
//!
//! The transfer manager only ever sees ranged reads and a manifest fetch,
//! so HTTP can be swapped for an in-memory source in tests.

use async_trait::async_trait;
use plinth_types::TransferManifest;

/// Transport-level failure fetching a manifest or byte range.
///
/// These are transient by definition; the transfer manager retries them
/// locally and only surfaces budget exhaustion.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("http error: {0}")]
    Http(String),

    #[error("range {offset}+{length} returned {got} bytes")]
    ShortRead { offset: u64, length: u64, got: u64 },

    #[error("malformed manifest: {0}")]
    Manifest(String),
}

/// A source of manifest metadata and image byte ranges.
#[async_trait]
pub trait ByteSource: Send + Sync {
    /// Fetch the transfer manifest describing the image.
    async fn fetch_manifest(&self) -> Result<TransferManifest, SourceError>;

    /// Fetch exactly `length` bytes starting at `offset`. A zero-length
    /// range yields an empty buffer without touching the transport.
    async fn fetch_range(&self, offset: u64, length: u64) -> Result<Vec<u8>, SourceError>;
}

#[async_trait]
impl<S: ByteSource + ?Sized> ByteSource for std::sync::Arc<S> {
    async fn fetch_manifest(&self) -> Result<TransferManifest, SourceError> {
        (**self).fetch_manifest().await
    }

    async fn fetch_range(&self, offset: u64, length: u64) -> Result<Vec<u8>, SourceError> {
        (**self).fetch_range(offset, length).await
    }
}

/// HTTP source issuing `Range` requests against a static image URL.
#[derive(Debug, Clone)]
pub struct HttpSource {
    http: reqwest::Client,
    image_url: String,
    manifest_url: String,
}

impl HttpSource {
    #[must_use]
    pub fn new(image_url: impl Into<String>, manifest_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            image_url: image_url.into(),
            manifest_url: manifest_url.into(),
        }
    }
}

#[async_trait]
impl ByteSource for HttpSource {
    async fn fetch_manifest(&self) -> Result<TransferManifest, SourceError> {
        let response = self
            .http
            .get(&self.manifest_url)
            .send()
            .await
            .map_err(|e| SourceError::Http(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Http(format!(
                "manifest request returned {status}"
            )));
        }
        response
            .json::<TransferManifest>()
            .await
            .map_err(|e| SourceError::Manifest(e.to_string()))
    }

    async fn fetch_range(&self, offset: u64, length: u64) -> Result<Vec<u8>, SourceError> {
        if length == 0 {
            return Ok(Vec::new());
        }
        let end = offset + length - 1;
        let response = self
            .http
            .get(&self.image_url)
            .header(reqwest::header::RANGE, format!("bytes={offset}-{end}"))
            .send()
            .await
            .map_err(|e| SourceError::Http(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Http(format!("range request returned {status}")));
        }
        let body = response
            .bytes()
            .await
            .map_err(|e| SourceError::Http(e.to_string()))?;

        // A server that ignores Range sends the whole image with 200; slice
        // out the requested window rather than failing the transfer.
        let bytes = if status == reqwest::StatusCode::OK && body.len() as u64 > length {
            let start = usize::try_from(offset)
                .map_err(|_| SourceError::Http("range offset overflows usize".into()))?;
            let stop = start + usize::try_from(length).unwrap_or(usize::MAX);
            body.get(start..stop)
                .map(<[u8]>::to_vec)
                .ok_or(SourceError::ShortRead {
                    offset,
                    length,
                    got: body.len() as u64,
                })?
        } else {
            body.to_vec()
        };

        if bytes.len() as u64 != length {
            return Err(SourceError::ShortRead {
                offset,
                length,
                got: bytes.len() as u64,
            });
        }
        Ok(bytes)
    }
}

/// In-memory source serving a fixed image (for tests and local files).
#[derive(Debug, Clone)]
pub struct MemorySource {
    data: Vec<u8>,
    manifest: TransferManifest,
}

impl MemorySource {
    #[must_use]
    pub fn new(data: Vec<u8>, manifest: TransferManifest) -> Self {
        Self { data, manifest }
    }

    /// Source serving `data` as one unchunked blob.
    #[must_use]
    pub fn single(data: Vec<u8>) -> Self {
        let manifest = TransferManifest::single(data.len() as u64);
        Self { data, manifest }
    }
}

#[async_trait]
impl ByteSource for MemorySource {
    async fn fetch_manifest(&self) -> Result<TransferManifest, SourceError> {
        Ok(self.manifest.clone())
    }

    async fn fetch_range(&self, offset: u64, length: u64) -> Result<Vec<u8>, SourceError> {
        let start = usize::try_from(offset).map_err(|_| SourceError::ShortRead {
            offset,
            length,
            got: 0,
        })?;
        let stop = start.saturating_add(usize::try_from(length).unwrap_or(usize::MAX));
        self.data
            .get(start..stop)
            .map(<[u8]>::to_vec)
            .ok_or(SourceError::ShortRead {
                offset,
                length,
                got: self.data.len().saturating_sub(start) as u64,
            })
    }
}
