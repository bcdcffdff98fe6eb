use chrono::{DateTime, Utc};

/// Batch container for one send or a bulk campaign.
#[derive(Debug, Clone)]
pub struct MessagingRequest {
    pub id: Option<i64>,
    pub user_id: i64,
    pub session_id: i64,
    pub request_file_id: Option<i64>,
    pub attachment_file_id: Option<i64>,
    pub title: Option<String>,
    pub default_text: Option<String>,
    pub sending_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl MessagingRequest {
    pub fn new(user_id: i64, session_id: i64) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            user_id,
            session_id,
            request_file_id: None,
            attachment_file_id: None,
            title: None,
            default_text: None,
            sending_time: now,
            created_at: now,
        }
    }

    pub fn with_title(mut self, title: Option<String>) -> Self {
        self.title = title;
        self
    }

    pub fn with_default_text(mut self, text: Option<String>) -> Self {
        self.default_text = text;
        self
    }

    pub fn with_sending_time(mut self, at: Option<DateTime<Utc>>) -> Self {
        if let Some(at) = at {
            self.sending_time = at;
        }
        self
    }

    pub fn with_request_file(mut self, file_id: Option<i64>) -> Self {
        self.request_file_id = file_id;
        self
    }

    pub fn with_attachment(mut self, file_id: Option<i64>) -> Self {
        self.attachment_file_id = file_id;
        self
    }
}
