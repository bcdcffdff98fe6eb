//! Redis JSON KV for short-lived auth state (OTP contexts).

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde_json::Value;

use crate::{AuthStateCache, Result};

#[derive(Clone)]
pub struct RedisAuthStateCache {
    conn: ConnectionManager,
    key_prefix: String,
}

impl RedisAuthStateCache {
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            key_prefix: "auth".to_string(),
        }
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}:{}", self.key_prefix, key)
    }
}

#[async_trait]
impl AuthStateCache for RedisAuthStateCache {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(self.full_key(key)).await?;
        Ok(match raw {
            Some(raw) => Some(serde_json::from_str(&raw)?),
            None => None,
        })
    }

    async fn set(&self, key: &str, value: Value, ttl_seconds: u64) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(self.full_key(key), serde_json::to_string(&value)?, ttl_seconds)
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(self.full_key(key)).await?;
        Ok(())
    }
}
