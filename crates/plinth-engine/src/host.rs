//! Engine host: stage an acquired image to disk and open it read-only.
//!
//! The image arrives as bytes in memory. SQLite wants a file, so the
//! handle writes the image to a temp file and keeps that file alive for
//! as long as the connection is open. Every structural problem with the
//! image surfaces here as [`DbError::LoadFailed`], before any query runs.

use std::io::Write;
use std::sync::OnceLock;

use rusqlite::{Connection, OpenFlags};
use tempfile::NamedTempFile;

use plinth_types::{DatabaseImage, DbError};

/// First 16 bytes of every SQLite 3 database file.
const SQLITE_MAGIC: &[u8; 16] = b"SQLite format 3\0";

static ENGINE_INIT: OnceLock<()> = OnceLock::new();

/// Log the embedded engine version exactly once per process.
fn init_engine_runtime() {
    ENGINE_INIT.get_or_init(|| {
        tracing::info!(sqlite_version = rusqlite::version(), "Embedded SQL engine initialized");
    });
}

/// An open, validated, read-only connection to a staged database image.
///
/// Owns the staging file; dropping the handle closes the connection and
/// removes the file.
#[derive(Debug)]
pub struct EngineHandle {
    conn: Connection,
    /// Held only so the backing file outlives the connection.
    _staging: NamedTempFile,
}

impl EngineHandle {
    /// Stage `image` to disk, open it read-only, and validate it.
    ///
    /// Validation checks the SQLite magic header, that the schema is
    /// readable, and that the `sites` table exists.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::LoadFailed`] for a non-SQLite or corrupt image,
    /// a staging I/O failure, or a missing `sites` table.
    pub fn load(image: &DatabaseImage) -> Result<Self, DbError> {
        init_engine_runtime();

        let bytes = image.as_slice();
        if bytes.len() < SQLITE_MAGIC.len() || &bytes[..SQLITE_MAGIC.len()] != SQLITE_MAGIC {
            return Err(DbError::load("image is not a SQLite database"));
        }

        let mut staging = NamedTempFile::new()
            .map_err(|e| DbError::load(format!("cannot create staging file: {e}")))?;
        staging
            .write_all(bytes)
            .and_then(|()| staging.flush())
            .map_err(|e| DbError::load(format!("cannot stage image: {e}")))?;

        let conn = Connection::open_with_flags(
            staging.path(),
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| DbError::load(format!("cannot open staged image: {e}")))?;

        // A valid header says nothing about the rest of the file; reading
        // the schema version forces SQLite to parse the first page tree.
        let schema_version: i64 = conn
            .query_row("PRAGMA schema_version", [], |row| row.get(0))
            .map_err(|e| DbError::load(format!("image is unreadable: {e}")))?;

        let has_sites: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'sites')",
                [],
                |row| row.get(0),
            )
            .map_err(|e| DbError::load(format!("cannot inspect schema: {e}")))?;
        if !has_sites {
            return Err(DbError::load("image has no sites table"));
        }

        tracing::info!(
            image_bytes = bytes.len(),
            schema_version,
            "Database image loaded"
        );
        Ok(Self {
            conn,
            _staging: staging,
        })
    }

    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }
}
