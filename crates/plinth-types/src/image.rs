//! Immutable container for the acquired database image.

/// The full binary content of the relational database.
///
/// Owned by the transfer manager while chunks accumulate, then handed to
/// the engine host; never mutated after the handoff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseImage {
    bytes: Vec<u8>,
}

impl DatabaseImage {
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    #[must_use]
    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}
