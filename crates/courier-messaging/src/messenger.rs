//! Messenger port and capability descriptor.

use async_trait::async_trait;
use courier_common::CourierError;
use courier_domain::{Contact, File, MessengerType, Session};
use std::collections::BTreeSet;
use thiserror::Error;

use crate::capabilities::{OtpAuth, Polls, QrAuth, TwoFactorAuth};

#[derive(Debug, Error)]
pub enum MessengerError {
    #[error("invalid code")]
    InvalidCode,

    #[error("expired code")]
    ExpiredCode,

    #[error("two-factor password required")]
    SessionPasswordNeeded,

    #[error("invalid password")]
    InvalidPassword,

    #[error("{0}")]
    Validation(String),

    /// Upstream network failure; the outbox retries these.
    #[error("{0}")]
    Upstream(String),
}

impl From<MessengerError> for CourierError {
    fn from(err: MessengerError) -> Self {
        match err {
            MessengerError::Upstream(msg) => CourierError::transient(msg),
            other => CourierError::validation(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, MessengerError>;

/// What a network can do, declared statically by its factory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessengerDescriptor {
    pub messenger_type: MessengerType,
    pub display_name: String,
    /// Always contains `send_text` and `send_media`; `polls` is optional.
    pub features: BTreeSet<String>,
    /// Subset of `{otp, 2fa_password, qr}`.
    pub auth_methods: BTreeSet<String>,
    /// Subset of `{phone_number, username, user_id}`.
    pub contact_identifiers: BTreeSet<String>,
}

impl MessengerDescriptor {
    pub fn new(messenger_type: MessengerType, display_name: impl Into<String>) -> Self {
        Self {
            messenger_type,
            display_name: display_name.into(),
            features: BTreeSet::from(["send_text".to_string(), "send_media".to_string()]),
            auth_methods: BTreeSet::new(),
            contact_identifiers: BTreeSet::new(),
        }
    }

    pub fn with_feature(mut self, feature: &str) -> Self {
        self.features.insert(feature.to_string());
        self
    }

    pub fn with_auth_method(mut self, method: &str) -> Self {
        self.auth_methods.insert(method.to_string());
        self
    }

    pub fn with_contact_identifier(mut self, identifier: &str) -> Self {
        self.contact_identifiers.insert(identifier.to_string());
        self
    }
}

/// A per-network adapter instance, bound to at most one session.
///
/// Adapters are stateful and single-task: the registry builds a fresh one
/// per handler invocation. Optional capabilities are exposed as accessor
/// methods returning `None` when unimplemented.
#[async_trait]
pub trait Messenger: Send {
    async fn send_message(
        &mut self,
        contact: &Contact,
        text: &str,
        file: Option<&File>,
    ) -> Result<()> {
        match file {
            Some(file) => self.send_media(contact, Some(text), file).await,
            None => self.send_text(contact, text).await,
        }
    }

    async fn send_text(&mut self, contact: &Contact, text: &str) -> Result<()>;

    async fn send_media(&mut self, contact: &Contact, text: Option<&str>, file: &File) -> Result<()>;

    fn otp_auth(&mut self) -> Option<&mut dyn OtpAuth> {
        None
    }

    fn two_factor_auth(&mut self) -> Option<&mut dyn TwoFactorAuth> {
        None
    }

    fn qr_auth(&mut self) -> Option<&mut dyn QrAuth> {
        None
    }

    fn polls(&mut self) -> Option<&mut dyn Polls> {
        None
    }
}

/// Builds adapters for one network and declares its capabilities.
pub trait MessengerFactory: Send + Sync {
    fn describe(&self) -> MessengerDescriptor;

    /// A fresh adapter bound to `session`.
    fn bind(&self, session: &Session) -> std::result::Result<Box<dyn Messenger>, CourierError>;

    /// A fresh adapter with no session, for auth flows that create one.
    /// Networks whose every operation needs a session reject this.
    fn unbound(&self) -> std::result::Result<Box<dyn Messenger>, CourierError> {
        Err(CourierError::validation(format!(
            "{} adapter requires a session",
            self.describe().display_name
        )))
    }
}
