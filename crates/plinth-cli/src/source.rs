//! Byte-source selection shared by every subcommand.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use clap::Args;

use plinth_transfer::{ByteSource, HttpSource, MemorySource, SourceError};
use plinth_types::TransferManifest;

/// Where the database image comes from.
#[derive(Args)]
pub struct SourceArgs {
    /// URL of the database image
    #[arg(long, conflicts_with = "file")]
    pub image_url: Option<String>,

    /// URL of the transfer manifest (default: `<image-url>.manifest.json`)
    #[arg(long, requires = "image_url")]
    pub manifest_url: Option<String>,

    /// Local image file, served as a single unchunked blob
    #[arg(long)]
    pub file: Option<PathBuf>,
}

impl SourceArgs {
    /// Build the concrete source, reading a local file eagerly.
    pub fn resolve(&self) -> Result<CliSource> {
        if let Some(path) = &self.file {
            let data = std::fs::read(path)
                .with_context(|| format!("Failed to read image file: {}", path.display()))?;
            return Ok(CliSource::File(MemorySource::single(data)));
        }
        let Some(image_url) = &self.image_url else {
            bail!("either --image-url or --file is required");
        };
        let manifest_url = self
            .manifest_url
            .clone()
            .unwrap_or_else(|| format!("{image_url}.manifest.json"));
        Ok(CliSource::Http(HttpSource::new(image_url, manifest_url)))
    }
}

/// Either a remote HTTP source or a local file held in memory.
pub enum CliSource {
    Http(HttpSource),
    File(MemorySource),
}

#[async_trait]
impl ByteSource for CliSource {
    async fn fetch_manifest(&self) -> Result<TransferManifest, SourceError> {
        match self {
            Self::Http(s) => s.fetch_manifest().await,
            Self::File(s) => s.fetch_manifest().await,
        }
    }

    async fn fetch_range(&self, offset: u64, length: u64) -> Result<Vec<u8>, SourceError> {
        match self {
            Self::Http(s) => s.fetch_range(offset, length).await,
            Self::File(s) => s.fetch_range(offset, length).await,
        }
    }
}
