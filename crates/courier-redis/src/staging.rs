//! Redis staging store.
//!
//! Keys: `importing:job:<job_key>:meta` (JSON blob, atomic rewrite with TTL)
//! and `importing:job:<job_key>:rows` (FIFO list, append-right / pop-left).
//! Multi-op writes go through MULTI/EXEC pipelines.

use async_trait::async_trait;
use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde_json::{json, Value};
use std::num::NonZeroUsize;

use crate::{merge_meta, Result, StagingStore};

const KEY_PREFIX: &str = "importing";

#[derive(Clone)]
pub struct RedisStagingStore {
    conn: ConnectionManager,
}

impl RedisStagingStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self::new(conn))
    }

    fn meta_key(job_key: &str) -> String {
        format!("{KEY_PREFIX}:job:{job_key}:meta")
    }

    fn rows_key(job_key: &str) -> String {
        format!("{KEY_PREFIX}:job:{job_key}:rows")
    }
}

#[async_trait]
impl StagingStore for RedisStagingStore {
    async fn create_job(&self, job_key: &str, meta: Value, ttl_seconds: u64) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let mut meta = meta;
        merge_meta(&mut meta, json!({"created_at": now, "updated_at": now}));

        let mut conn = self.conn.clone();
        let _: () = redis::pipe()
            .atomic()
            .set_ex(Self::meta_key(job_key), serde_json::to_string(&meta)?, ttl_seconds)
            .del(Self::rows_key(job_key))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn update_meta(&self, job_key: &str, updates: Value, ttl_seconds: u64) -> Result<()> {
        let key = Self::meta_key(job_key);
        let mut conn = self.conn.clone();

        let raw: Option<String> = conn.get(&key).await?;
        let mut meta: Value = match raw {
            Some(raw) => serde_json::from_str(&raw)?,
            None => json!({}),
        };
        merge_meta(&mut meta, updates);
        merge_meta(&mut meta, json!({"updated_at": Utc::now().to_rfc3339()}));

        conn.set_ex::<_, _, ()>(&key, serde_json::to_string(&meta)?, ttl_seconds)
            .await?;
        Ok(())
    }

    async fn get_meta(&self, job_key: &str) -> Result<Option<Value>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(Self::meta_key(job_key)).await?;
        Ok(match raw {
            Some(raw) => Some(serde_json::from_str(&raw)?),
            None => None,
        })
    }

    async fn push_rows(&self, job_key: &str, rows: &[Value], ttl_seconds: u64) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }

        let key = Self::rows_key(job_key);
        let mut pipe = redis::pipe();
        pipe.atomic();
        for row in rows {
            pipe.rpush(&key, serde_json::to_string(row)?);
        }
        pipe.expire(&key, ttl_seconds as i64);

        let mut conn = self.conn.clone();
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(rows.len())
    }

    async fn pop_rows(&self, job_key: &str, limit: usize) -> Result<Vec<Value>> {
        let Some(count) = NonZeroUsize::new(limit) else {
            return Ok(Vec::new());
        };

        let mut conn = self.conn.clone();
        let raw: Vec<String> = conn.lpop(Self::rows_key(job_key), Some(count)).await?;

        let mut rows = Vec::with_capacity(raw.len());
        for item in raw {
            rows.push(serde_json::from_str(&item)?);
        }
        Ok(rows)
    }

    async fn remaining(&self, job_key: &str) -> Result<u64> {
        let mut conn = self.conn.clone();
        let len: u64 = conn.llen(Self::rows_key(job_key)).await?;
        Ok(len)
    }

    async fn add_errors(
        &self,
        job_key: &str,
        errors: &[Value],
        ttl_seconds: u64,
        max_errors: usize,
    ) -> Result<()> {
        if errors.is_empty() {
            return Ok(());
        }

        let meta = self.get_meta(job_key).await?.unwrap_or_else(|| json!({}));
        let mut current: Vec<Value> = meta
            .get("errors")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        if current.len() >= max_errors {
            return Ok(());
        }
        let room = max_errors - current.len();
        current.extend(errors.iter().take(room).cloned());

        self.update_meta(job_key, json!({"errors": current}), ttl_seconds)
            .await
    }

    async fn cleanup(&self, job_key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .del(&[Self::meta_key(job_key), Self::rows_key(job_key)])
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        assert_eq!(
            RedisStagingStore::meta_key("message_request:1:abc"),
            "importing:job:message_request:1:abc:meta"
        );
        assert_eq!(
            RedisStagingStore::rows_key("message_request:1:abc"),
            "importing:job:message_request:1:abc:rows"
        );
    }
}
