use chrono::{DateTime, Utc};
use courier_common::{truncate_error, CourierError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Cap on the persisted per-message `error_message` column.
pub const MAX_SEND_ERROR: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageStatus {
    Pending,
    Successful,
    Failed,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Pending => "PENDING",
            MessageStatus::Successful => "SUCCESSFUL",
            MessageStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "PENDING" => Some(MessageStatus::Pending),
            "SUCCESSFUL" => Some(MessageStatus::Successful),
            "FAILED" => Some(MessageStatus::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One recipient's delivery attempt, owned by a [`crate::MessagingRequest`].
///
/// Status only moves `Pending -> Successful` (with `sent_time`) or
/// `Pending -> Failed` (with `error_message`).
#[derive(Debug, Clone)]
pub struct Message {
    pub id: Option<i64>,
    pub message_request_id: i64,
    pub phone_number: Option<String>,
    pub username: Option<String>,
    pub user_id: Option<String>,
    pub text: String,
    pub attachment_file_id: Option<i64>,
    pub sending_time: DateTime<Utc>,
    pub sent_time: Option<DateTime<Utc>>,
    pub status: MessageStatus,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(message_request_id: i64, text: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            message_request_id,
            phone_number: None,
            username: None,
            user_id: None,
            text: text.into(),
            attachment_file_id: None,
            sending_time: now,
            sent_time: None,
            status: MessageStatus::Pending,
            error_message: None,
            created_at: now,
        }
    }

    pub fn with_contact(
        mut self,
        phone_number: Option<String>,
        username: Option<String>,
        user_id: Option<String>,
    ) -> Self {
        self.phone_number = phone_number;
        self.username = username;
        self.user_id = user_id;
        self
    }

    pub fn with_sending_time(mut self, at: DateTime<Utc>) -> Self {
        self.sending_time = at;
        self
    }

    pub fn with_attachment(mut self, file_id: Option<i64>) -> Self {
        self.attachment_file_id = file_id;
        self
    }

    /// Terminal success transition.
    pub fn mark_sent(&mut self, at: DateTime<Utc>) -> Result<(), CourierError> {
        if self.status != MessageStatus::Pending {
            return Err(CourierError::validation(format!(
                "cannot mark {} message as sent",
                self.status
            )));
        }
        self.status = MessageStatus::Successful;
        self.sent_time = Some(at);
        Ok(())
    }

    /// Terminal failure transition. The message is truncated to the column
    /// bound.
    pub fn mark_failed(&mut self, error: &str) -> Result<(), CourierError> {
        if self.status != MessageStatus::Pending {
            return Err(CourierError::validation(format!(
                "cannot mark {} message as failed",
                self.status
            )));
        }
        self.status = MessageStatus::Failed;
        self.error_message = Some(truncate_error(error, MAX_SEND_ERROR));
        Ok(())
    }
}
