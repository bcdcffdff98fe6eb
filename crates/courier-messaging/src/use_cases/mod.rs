//! Application use cases: the write-side entry points the API layer calls.
//!
//! Each use case runs inside one unit of work and commits before returning;
//! outbox events are enqueued on the same transaction as the business write.

mod create_import;
mod send_message;
mod sessions;

pub use create_import::{create_message_request_import, CreateImportInput, CreateImportResult};
pub use send_message::{send_message, SendMessageInput, SendMessageResult};
pub use sessions::{
    start_otp_session, start_qr_session, two_factor_login, verify_otp, StartOtpSessionResult,
    StartQrSessionResult,
};
