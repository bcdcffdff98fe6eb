//! File-store port.
//!
//! Object storage itself is an external collaborator; the core only needs
//! read/write/build-uri. A local-directory adapter backs development and an
//! in-memory adapter backs tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use courier_common::CourierError;
use thiserror::Error;

pub mod local;
pub mod memory;

pub use local::LocalDirFileStore;
pub use memory::InMemoryFileStore;

#[derive(Debug, Error)]
pub enum FilesError {
    #[error("file not found: {0}")]
    NotFound(String),

    #[error("invalid file uri: {0}")]
    InvalidUri(String),

    #[error("file io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<FilesError> for CourierError {
    fn from(err: FilesError) -> Self {
        match err {
            FilesError::NotFound(uri) => CourierError::not_found(format!("file {uri}")),
            FilesError::InvalidUri(uri) => CourierError::permanent(format!("invalid file uri {uri}")),
            FilesError::Io(e) => CourierError::transient(e.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, FilesError>;

/// Metadata returned by a successful write.
#[derive(Debug, Clone)]
pub struct FileInfo {
    pub uri: String,
    pub size: u64,
    pub content_type: Option<String>,
    pub modified_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait FileStore: Send + Sync {
    async fn read(&self, uri: &str) -> Result<Vec<u8>>;

    async fn write(&self, uri: &str, data: &[u8], content_type: Option<&str>) -> Result<FileInfo>;

    /// Compose a storage uri from a prefix and an object name.
    fn build_uri(&self, prefix: &str, name: &str) -> String;

    async fn exists(&self, uri: &str) -> Result<bool>;

    async fn delete(&self, uri: &str) -> Result<()>;
}
