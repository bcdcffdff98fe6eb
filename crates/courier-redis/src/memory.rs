//! In-memory staging store and auth-state cache.
//!
//! Used by tests and single-process development. TTLs are accepted but not
//! enforced; job state lives for the life of the process.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::{merge_meta, AuthStateCache, Result, StagingStore};

#[derive(Default)]
struct JobEntry {
    meta: Value,
    rows: VecDeque<Value>,
}

#[derive(Default)]
pub struct InMemoryStagingStore {
    jobs: Mutex<HashMap<String, JobEntry>>,
}

impl InMemoryStagingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StagingStore for InMemoryStagingStore {
    async fn create_job(&self, job_key: &str, meta: Value, _ttl_seconds: u64) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let mut meta = meta;
        merge_meta(&mut meta, json!({"created_at": now, "updated_at": now}));

        let mut jobs = self.jobs.lock().expect("staging lock poisoned");
        jobs.insert(
            job_key.to_string(),
            JobEntry {
                meta,
                rows: VecDeque::new(),
            },
        );
        Ok(())
    }

    async fn update_meta(&self, job_key: &str, updates: Value, _ttl_seconds: u64) -> Result<()> {
        let mut jobs = self.jobs.lock().expect("staging lock poisoned");
        let entry = jobs.entry(job_key.to_string()).or_default();
        if entry.meta.is_null() {
            entry.meta = json!({});
        }
        merge_meta(&mut entry.meta, updates);
        merge_meta(&mut entry.meta, json!({"updated_at": Utc::now().to_rfc3339()}));
        Ok(())
    }

    async fn get_meta(&self, job_key: &str) -> Result<Option<Value>> {
        let jobs = self.jobs.lock().expect("staging lock poisoned");
        Ok(jobs.get(job_key).map(|entry| entry.meta.clone()))
    }

    async fn push_rows(&self, job_key: &str, rows: &[Value], _ttl_seconds: u64) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }
        let mut jobs = self.jobs.lock().expect("staging lock poisoned");
        let entry = jobs.entry(job_key.to_string()).or_default();
        entry.rows.extend(rows.iter().cloned());
        Ok(rows.len())
    }

    async fn pop_rows(&self, job_key: &str, limit: usize) -> Result<Vec<Value>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut jobs = self.jobs.lock().expect("staging lock poisoned");
        let Some(entry) = jobs.get_mut(job_key) else {
            return Ok(Vec::new());
        };
        let take = limit.min(entry.rows.len());
        Ok(entry.rows.drain(..take).collect())
    }

    async fn remaining(&self, job_key: &str) -> Result<u64> {
        let jobs = self.jobs.lock().expect("staging lock poisoned");
        Ok(jobs.get(job_key).map(|entry| entry.rows.len() as u64).unwrap_or(0))
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

        let current = {
            let jobs = self.jobs.lock().expect("staging lock poisoned");
            jobs.get(job_key)
                .and_then(|entry| entry.meta.get("errors"))
                .and_then(|v| v.as_array())
                .cloned()
                .unwrap_or_default()
        };

        if current.len() >= max_errors {
            return Ok(());
        }
        let room = max_errors - current.len();
        let mut merged = current;
        merged.extend(errors.iter().take(room).cloned());

        self.update_meta(job_key, json!({"errors": merged}), ttl_seconds)
            .await
    }

    async fn cleanup(&self, job_key: &str) -> Result<()> {
        let mut jobs = self.jobs.lock().expect("staging lock poisoned");
        jobs.remove(job_key);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryAuthStateCache {
    entries: Mutex<HashMap<String, Value>>,
}

impl InMemoryAuthStateCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuthStateCache for InMemoryAuthStateCache {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let entries = self.entries.lock().expect("cache lock poisoned");
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value, _ttl_seconds: u64) -> Result<()> {
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rows_are_fifo() {
        let store = InMemoryStagingStore::new();
        store.create_job("job", json!({"status": "pending"}), 60).await.unwrap();
        store
            .push_rows("job", &[json!({"n": 1}), json!({"n": 2}), json!({"n": 3})], 60)
            .await
            .unwrap();

        let first = store.pop_rows("job", 2).await.unwrap();
        assert_eq!(first, vec![json!({"n": 1}), json!({"n": 2})]);
        assert_eq!(store.remaining("job").await.unwrap(), 1);

        let rest = store.pop_rows("job", 10).await.unwrap();
        assert_eq!(rest, vec![json!({"n": 3})]);
        assert!(store.pop_rows("job", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pop_rows_limit_zero_is_empty() {
        let store = InMemoryStagingStore::new();
        store.create_job("job", json!({}), 60).await.unwrap();
        store.push_rows("job", &[json!({"n": 1})], 60).await.unwrap();
        assert!(store.pop_rows("job", 0).await.unwrap().is_empty());
        assert_eq!(store.remaining("job").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_update_meta_merges_and_stamps() {
        let store = InMemoryStagingStore::new();
        store.create_job("job", json!({"status": "pending", "total": 0}), 60).await.unwrap();
        store.update_meta("job", json!({"status": "staging"}), 60).await.unwrap();

        let meta = store.get_meta("job").await.unwrap().unwrap();
        assert_eq!(meta["status"], "staging");
        assert_eq!(meta["total"], 0);
        assert!(meta.get("updated_at").is_some());
    }

    #[tokio::test]
    async fn test_add_errors_is_capped() {
        let store = InMemoryStagingStore::new();
        store.create_job("job", json!({}), 60).await.unwrap();

        let errors: Vec<Value> = (0..5).map(|i| json!({"row": i})).collect();
        store.add_errors("job", &errors, 60, 3).await.unwrap();

        let meta = store.get_meta("job").await.unwrap().unwrap();
        assert_eq!(meta["errors"].as_array().unwrap().len(), 3);

        // already at the cap; further errors are dropped
        store.add_errors("job", &[json!({"row": 9})], 60, 3).await.unwrap();
        let meta = store.get_meta("job").await.unwrap().unwrap();
        assert_eq!(meta["errors"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_cleanup_removes_job() {
        let store = InMemoryStagingStore::new();
        store.create_job("job", json!({}), 60).await.unwrap();
        store.cleanup("job").await.unwrap();
        assert!(store.get_meta("job").await.unwrap().is_none());
        assert_eq!(store.remaining("job").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_auth_cache_round_trip() {
        let cache = InMemoryAuthStateCache::new();
        cache.set("telegram-session-1", json!({"otp_context": "abc"}), 600).await.unwrap();
        let value = cache.get("telegram-session-1").await.unwrap().unwrap();
        assert_eq!(value["otp_context"], "abc");

        cache.delete("telegram-session-1").await.unwrap();
        assert!(cache.get("telegram-session-1").await.unwrap().is_none());
    }
}
