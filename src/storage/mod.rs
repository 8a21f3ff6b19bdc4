//! Storage module - optimistic-concurrency object store contract
//!
//! Tools that mutate shared conversation state (e.g. reply delivery) go
//! through this contract. Safety comes from compare-and-swap generation
//! tokens rather than locks: every write names the generation it read, and
//! a stale generation is rejected, never silently overwritten.

mod fs;
mod memory;

pub use fs::FsStorage;
pub use memory::MemoryStorage;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

/// Opaque version marker returned by a read and required by a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation(String);

impl Generation {
    /// Mint a fresh generation token.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Generation {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for Generation {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for Generation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// HTTP method a signed URL grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlMethod {
    Get,
    Put,
}

/// Errors from storage implementations.
///
/// `PreconditionFailed` is its own variant so callers are forced to handle
/// the retry case explicitly instead of treating every failure as fatal.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("generation mismatch for '{0}': another writer updated it first")]
    PreconditionFailed(String),

    #[error("operation not supported: {0}")]
    Unsupported(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Object store with compare-and-swap writes.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Read an object and its current generation.
    ///
    /// A missing key is `StorageError::NotFound`, never empty data.
    async fn read(&self, key: &str) -> StorageResult<(Vec<u8>, Generation)>;

    /// Write an object, guarded by the expected generation.
    ///
    /// `None` means create-if-absent: the write fails if the key already
    /// exists. `Some(generation)` replaces the object only if its current
    /// generation still matches; otherwise `PreconditionFailed` is
    /// returned and the caller should re-read and retry.
    async fn write(
        &self,
        key: &str,
        mime_type: &str,
        data: &[u8],
        expected: Option<&Generation>,
    ) -> StorageResult<Generation>;

    /// Produce a time-limited URL for fetching or uploading the object.
    async fn signed_url(
        &self,
        key: &str,
        method: UrlMethod,
        ttl: Duration,
    ) -> StorageResult<String>;
}
