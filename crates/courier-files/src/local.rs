//! Local-directory file store.
//!
//! Uris look like `file://<relative path>` and resolve beneath a root
//! directory fixed at construction. Paths escaping the root are rejected.

use async_trait::async_trait;
use chrono::Utc;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

use crate::{FileInfo, FileStore, FilesError, Result};

const URI_SCHEME: &str = "file://";

pub struct LocalDirFileStore {
    root: PathBuf,
}

impl LocalDirFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, uri: &str) -> Result<PathBuf> {
        let relative = uri
            .strip_prefix(URI_SCHEME)
            .ok_or_else(|| FilesError::InvalidUri(uri.to_string()))?;

        let relative = Path::new(relative);
        if relative
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)))
        {
            return Err(FilesError::InvalidUri(uri.to_string()));
        }

        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl FileStore for LocalDirFileStore {
    async fn read(&self, uri: &str) -> Result<Vec<u8>> {
        let path = self.resolve(uri)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(FilesError::NotFound(uri.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, uri: &str, data: &[u8], content_type: Option<&str>) -> Result<FileInfo> {
        let path = self.resolve(uri)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, data).await?;

        debug!(uri = %uri, size = data.len(), "Wrote file");

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
            format!("{URI_SCHEME}{name}")
        } else {
            format!("{URI_SCHEME}{prefix}/{name}")
        }
    }

    async fn exists(&self, uri: &str) -> Result<bool> {
        let path = self.resolve(uri)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }

    async fn delete(&self, uri: &str) -> Result<()> {
        let path = self.resolve(uri)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
