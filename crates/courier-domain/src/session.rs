use chrono::{DateTime, Utc};
use courier_common::CourierError;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// External messaging network tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessengerType {
    Telegram,
    Whatsapp,
}

impl MessengerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessengerType::Telegram => "TELEGRAM",
            MessengerType::Whatsapp => "WHATSAPP",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "TELEGRAM" => Some(MessengerType::Telegram),
            "WHATSAPP" => Some(MessengerType::Whatsapp),
            _ => None,
        }
    }
}

impl fmt::Display for MessengerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Network-specific auth state. Exactly one variant per session, determined
/// by the network: Telegram carries an opaque session string, WhatsApp an
/// instance uuid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SessionAuth {
    Account { session_str: String },
    Qr { uuid: Uuid },
}

impl SessionAuth {
    pub fn session_str(&self) -> Option<&str> {
        match self {
            SessionAuth::Account { session_str } => Some(session_str),
            SessionAuth::Qr { .. } => None,
        }
    }

    pub fn uuid(&self) -> Option<Uuid> {
        match self {
            SessionAuth::Account { .. } => None,
            SessionAuth::Qr { uuid } => Some(*uuid),
        }
    }
}

/// A user's authenticated presence on one messaging network.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: Option<i64>,
    pub user_id: i64,
    pub title: String,
    pub phone_number: String,
    pub messenger_type: MessengerType,
    pub auth: SessionAuth,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Construct a session, enforcing the disjoint auth-state schema.
    pub fn new(
        user_id: i64,
        title: impl Into<String>,
        phone_number: impl Into<String>,
        messenger_type: MessengerType,
        auth: SessionAuth,
    ) -> Result<Self, CourierError> {
        match (messenger_type, &auth) {
            (MessengerType::Telegram, SessionAuth::Account { session_str }) => {
                if session_str.is_empty() {
                    return Err(CourierError::validation(
                        "Telegram session requires a non-empty session_str",
                    ));
                }
            }
            (MessengerType::Telegram, SessionAuth::Qr { .. }) => {
                return Err(CourierError::validation(
                    "Telegram session must not carry a uuid (it uses session_str)",
                ));
            }
            (MessengerType::Whatsapp, SessionAuth::Qr { .. }) => {}
            (MessengerType::Whatsapp, SessionAuth::Account { .. }) => {
                return Err(CourierError::validation(
                    "WhatsApp session must not carry a session_str (it uses uuid)",
                ));
            }
        }

        Ok(Self {
            id: None,
            user_id,
            title: title.into(),
            phone_number: phone_number.into(),
            messenger_type,
            auth,
            is_active: false,
            created_at: Utc::now(),
        })
    }

    /// A fresh inactive Telegram session around a client session string.
    pub fn telegram(
        user_id: i64,
        title: impl Into<String>,
        phone_number: impl Into<String>,
        session_str: impl Into<String>,
    ) -> Result<Self, CourierError> {
        Self::new(
            user_id,
            title,
            phone_number,
            MessengerType::Telegram,
            SessionAuth::Account {
                session_str: session_str.into(),
            },
        )
    }

    /// A fresh inactive WhatsApp session with a generated instance uuid.
    pub fn whatsapp(
        user_id: i64,
        title: impl Into<String>,
        phone_number: impl Into<String>,
    ) -> Result<Self, CourierError> {
        Self::new(
            user_id,
            title,
            phone_number,
            MessengerType::Whatsapp,
            SessionAuth::Qr {
                uuid: Uuid::new_v4(),
            },
        )
    }

    /// Replace the Telegram session string after an auth step.
    pub fn set_session_str(&mut self, session_str: impl Into<String>) -> Result<(), CourierError> {
        match self.messenger_type {
            MessengerType::Telegram => {
                self.auth = SessionAuth::Account {
                    session_str: session_str.into(),
                };
                Ok(())
            }
            MessengerType::Whatsapp => Err(CourierError::validation(
                "WhatsApp session has no session_str",
            )),
        }
    }
}
