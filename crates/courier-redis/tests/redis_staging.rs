//! Redis staging store integration tests.
//!
//! Require a running Redis; set COURIER_TEST_REDIS_URL to run them (e.g.
//! redis://localhost:6379/15). Without it every test skips silently.

use courier_redis::{RedisStagingStore, StagingStore};
use serde_json::{json, Value};

async fn test_store() -> Option<RedisStagingStore> {
    let url = std::env::var("COURIER_TEST_REDIS_URL").ok()?;
    Some(
        RedisStagingStore::connect(&url)
            .await
            .expect("failed to connect to the test Redis"),
    )
}

#[tokio::test]
async fn test_job_lifecycle() {
    let Some(store) = test_store().await else { return };
    let job = "it:lifecycle";
    store.cleanup(job).await.unwrap();

    store
        .create_job(job, json!({"status": "pending", "import_type": "message_request"}), 60)
        .await
        .unwrap();

    let meta = store.get_meta(job).await.unwrap().unwrap();
    assert_eq!(meta["status"], "pending");
    assert!(meta.get("created_at").is_some());

    store.update_meta(job, json!({"status": "staging"}), 60).await.unwrap();
    let meta = store.get_meta(job).await.unwrap().unwrap();
    assert_eq!(meta["status"], "staging");
    assert_eq!(meta["import_type"], "message_request");

    store.cleanup(job).await.unwrap();
    assert!(store.get_meta(job).await.unwrap().is_none());
}

#[tokio::test]
async fn test_rows_fifo_and_limits() {
    let Some(store) = test_store().await else { return };
    let job = "it:rows";
    store.cleanup(job).await.unwrap();
    store.create_job(job, json!({}), 60).await.unwrap();

    let rows: Vec<Value> = (1..=5).map(|n| json!({"n": n})).collect();
    assert_eq!(store.push_rows(job, &rows, 60).await.unwrap(), 5);
    assert_eq!(store.remaining(job).await.unwrap(), 5);

    assert!(store.pop_rows(job, 0).await.unwrap().is_empty());

    let first = store.pop_rows(job, 2).await.unwrap();
    assert_eq!(first, vec![json!({"n": 1}), json!({"n": 2})]);

    let rest = store.pop_rows(job, 100).await.unwrap();
    assert_eq!(rest.len(), 3);
    assert!(store.pop_rows(job, 1).await.unwrap().is_empty());

    store.cleanup(job).await.unwrap();
}

#[tokio::test]
async fn test_error_cap() {
    let Some(store) = test_store().await else { return };
    let job = "it:errors";
    store.cleanup(job).await.unwrap();
    store.create_job(job, json!({}), 60).await.unwrap();

    let errors: Vec<Value> = (0..10).map(|n| json!({"row": n})).collect();
    store.add_errors(job, &errors, 60, 4).await.unwrap();

    let meta = store.get_meta(job).await.unwrap().unwrap();
    assert_eq!(meta["errors"].as_array().unwrap().len(), 4);

    store.cleanup(job).await.unwrap();
}
