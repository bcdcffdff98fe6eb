//! In-memory file store for tests.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::{FileInfo, FileStore, FilesError, Result};

#[derive(Default)]
pub struct InMemoryFileStore {
    files: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemoryFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a file directly, returning its uri.
    pub fn put(&self, uri: &str, data: &[u8]) {
        let mut files = self.files.lock().expect("file store lock poisoned");
        files.insert(uri.to_string(), data.to_vec());
    }
}

#[async_trait]
impl FileStore for InMemoryFileStore {
    async fn read(&self, uri: &str) -> Result<Vec<u8>> {
        let files = self.files.lock().expect("file store lock poisoned");
        files
            .get(uri)
            .cloned()
            .ok_or_else(|| FilesError::NotFound(uri.to_string()))
    }

    async fn write(&self, uri: &str, data: &[u8], content_type: Option<&str>) -> Result<FileInfo> {
        let mut files = self.files.lock().expect("file store lock poisoned");
        files.insert(uri.to_string(), data.to_vec());
        Ok(FileInfo {
            uri: uri.to_string(),
            size: data.len() as u64,
            content_type: content_type.map(|s| s.to_string()),
            modified_at: Some(Utc::now()),
        })
    }

    fn build_uri(&self, prefix: &str, name: &str) -> String {
        let prefix = prefix.trim_matches('/');
        if prefix.is_empty() {
            format!("mem://{name}")
        } else {
            format!("mem://{prefix}/{name}")
        }
    }

    async fn exists(&self, uri: &str) -> Result<bool> {
        let files = self.files.lock().expect("file store lock poisoned");
        Ok(files.contains_key(uri))
    }

    async fn delete(&self, uri: &str) -> Result<()> {
        let mut files = self.files.lock().expect("file store lock poisoned");
        files.remove(uri);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_round_trip() {
        let store = InMemoryFileStore::new();
        let uri = store.build_uri("qr", "code.png");
        store.write(&uri, b"png-bytes", Some("image/png")).await.unwrap();
        assert_eq!(store.read(&uri).await.unwrap(), b"png-bytes");
        store.delete(&uri).await.unwrap();
        assert!(matches!(store.read(&uri).await, Err(FilesError::NotFound(_))));
    }
}
