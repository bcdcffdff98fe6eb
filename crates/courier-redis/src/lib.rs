//! Redis-backed ephemeral state: the bulk-import staging store and the
//! auth-state cache used by the OTP login flows. In-memory variants exist for
//! tests and single-process development.

use async_trait::async_trait;
use courier_common::CourierError;
use serde_json::Value;
use thiserror::Error;

pub mod cache;
pub mod memory;
pub mod staging;

pub use cache::RedisAuthStateCache;
pub use memory::{InMemoryAuthStateCache, InMemoryStagingStore};
pub use staging::RedisStagingStore;

#[derive(Debug, Error)]
pub enum StagingError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("staging serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<StagingError> for CourierError {
    fn from(err: StagingError) -> Self {
        match err {
            StagingError::Serialization(e) => CourierError::permanent(e.to_string()),
            other => CourierError::transient(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, StagingError>;

/// TTL-scoped per-job metadata blob plus a FIFO row queue.
///
/// Every write renews the TTL; `update_meta` is a read-modify-write that
/// always refreshes `updated_at`.
#[async_trait]
pub trait StagingStore: Send + Sync {
    async fn create_job(&self, job_key: &str, meta: Value, ttl_seconds: u64) -> Result<()>;

    async fn update_meta(&self, job_key: &str, updates: Value, ttl_seconds: u64) -> Result<()>;

    async fn get_meta(&self, job_key: &str) -> Result<Option<Value>>;

    /// Bulk append; returns the number of rows pushed.
    async fn push_rows(&self, job_key: &str, rows: &[Value], ttl_seconds: u64) -> Result<usize>;

    /// Pop up to `limit` rows from the left; `[]` when drained or `limit = 0`.
    async fn pop_rows(&self, job_key: &str, limit: usize) -> Result<Vec<Value>>;

    async fn remaining(&self, job_key: &str) -> Result<u64>;

    /// Append row errors into the meta blob, capped at `max_errors`
    /// cumulative entries.
    async fn add_errors(
        &self,
        job_key: &str,
        errors: &[Value],
        ttl_seconds: u64,
        max_errors: usize,
    ) -> Result<()>;

    /// Delete both keys.
    async fn cleanup(&self, job_key: &str) -> Result<()>;
}

/// Short-lived JSON KV used by the OTP auth flows.
#[async_trait]
pub trait AuthStateCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>>;
    async fn set(&self, key: &str, value: Value, ttl_seconds: u64) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
}

pub(crate) fn merge_meta(meta: &mut Value, updates: Value) {
    if let (Value::Object(target), Value::Object(source)) = (meta, updates) {
        for (key, value) in source {
            target.insert(key, value);
        }
    }
}
