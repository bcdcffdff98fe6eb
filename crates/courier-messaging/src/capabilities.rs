//! Optional auth and feature capabilities a messenger may implement.
//!
//! Capability is encoded statically: an adapter exposes the trait through
//! the corresponding accessor on [`crate::Messenger`], and its factory
//! declares the same set in the descriptor.

use async_trait::async_trait;
use courier_domain::Contact;

use crate::messenger::Result;

/// Result of starting an OTP login attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtpLoginStart {
    /// Current opaque session blob; persisted on the session row.
    pub session_str: String,
    /// Opaque context required to validate the code (cached at the call
    /// site, never persisted).
    pub otp_context: String,
}

/// Outcome of a successful OTP validation round-trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OtpValidation {
    /// Fully signed in; the session may be activated.
    Authorized { session_str: String },
    /// The account has a 2FA password; the caller must switch to the
    /// two-factor flow. The session stays inactive.
    TwoFactorRequired { session_str: String },
}

impl OtpValidation {
    pub fn session_str(&self) -> &str {
        match self {
            OtpValidation::Authorized { session_str } => session_str,
            OtpValidation::TwoFactorRequired { session_str } => session_str,
        }
    }
}

#[async_trait]
pub trait OtpAuth: Send {
    /// Whether the last auth step fully signed in.
    fn is_valid(&self) -> bool;

    /// Start an auth attempt for `phone_number`.
    async fn login(&mut self, phone_number: &str) -> Result<OtpLoginStart>;

    /// Validate the received code. Fails with `InvalidCode` or
    /// `ExpiredCode`.
    async fn validate_otp(
        &mut self,
        otp: &str,
        phone_number: &str,
        otp_context: &str,
    ) -> Result<OtpValidation>;
}

#[async_trait]
pub trait TwoFactorAuth: Send {
    fn is_valid(&self) -> bool;

    /// Complete a 2FA login. Fails with `InvalidPassword`.
    async fn two_factor_authenticate(&mut self, password: &str) -> Result<String>;
}

#[async_trait]
pub trait QrAuth: Send {
    /// Start a QR auth attempt; returns the payload to render as a QR code.
    async fn login(&mut self, integration: &str) -> Result<String>;
}

#[async_trait]
pub trait Polls: Send {
    async fn send_poll(
        &mut self,
        contact: &Contact,
        question: &str,
        options: &[String],
        allows_multiple_answers: bool,
        is_anonymous: bool,
    ) -> Result<()>;
}
