use chrono::{DateTime, Utc};

/// Stored file record. Bytes live behind the file-store port; this is the
/// metadata row.
#[derive(Debug, Clone)]
pub struct File {
    pub id: Option<i64>,
    pub uri: String,
    pub name: String,
    pub size: Option<i64>,
    pub content_type: Option<String>,
    pub user_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    /// Inline content, set by upload paths that carry small payloads in the
    /// request. Never persisted; adapters prefer it over a store read.
    pub base64: Option<String>,
}

impl File {
    pub fn new(uri: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: None,
            uri: uri.into(),
            name: name.into(),
            size: None,
            content_type: None,
            user_id: None,
            created_at: Utc::now(),
            base64: None,
        }
    }

    pub fn with_content_type(mut self, content_type: Option<String>) -> Self {
        self.content_type = content_type;
        self
    }

    pub fn with_size(mut self, size: Option<i64>) -> Self {
        self.size = size;
        self
    }

    pub fn with_user(mut self, user_id: Option<i64>) -> Self {
        self.user_id = user_id;
        self
    }
}
