//! PostgreSQL persistence for the messaging core.
//!
//! Hand-written SQL over sqlx. Repository functions take `&mut PgConnection`
//! so they always run inside the caller's transaction; the [`UnitOfWork`]
//! owns that transaction and re-opens one on demand after a mid-flow commit.

pub mod files;
pub mod messages;
pub mod messaging_requests;
pub mod outbox_events;
pub mod schema;
pub mod sessions;
mod unit_of_work;

use courier_common::CourierError;
use thiserror::Error;

pub use unit_of_work::UnitOfWork;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("failed to decode row: {0}")]
    Decode(String),

    #[error("no active transaction")]
    NoTransaction,
}

impl From<StoreError> for CourierError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Decode(msg) => CourierError::permanent(msg),
            other => CourierError::transient(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
