//! Typed domain events carried through the outbox.
//!
//! The serialized form of an event is its `payload`; transport concerns
//! (`available_at`, `dedup_key`, `aggregate_type`, `aggregate_id`) live on
//! the outbox row via [`EventMeta`], never inside the payload.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A domain event with a stable wire tag.
pub trait OutboxDomainEvent: Serialize + DeserializeOwned {
    const TYPE: &'static str;

    fn payload(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    fn from_payload(payload: &Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(payload.clone())
    }
}

/// Transport-only fields persisted on the outbox row.
#[derive(Debug, Clone, Default)]
pub struct EventMeta {
    pub available_at: Option<DateTime<Utc>>,
    pub dedup_key: Option<String>,
    pub aggregate_type: Option<String>,
    pub aggregate_id: Option<String>,
}

impl EventMeta {
    pub fn available_at(mut self, at: DateTime<Utc>) -> Self {
        self.available_at = Some(at);
        self
    }

    pub fn dedup_key(mut self, key: impl Into<String>) -> Self {
        self.dedup_key = Some(key.into());
        self
    }

    pub fn aggregate(mut self, kind: impl Into<String>, id: impl Into<String>) -> Self {
        self.aggregate_type = Some(kind.into());
        self.aggregate_id = Some(id.into());
        self
    }
}

/// A messaging request has due pending messages; the send loop should claim
/// and deliver a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRequestReadyToSendV1 {
    pub message_request_id: i64,
}

impl OutboxDomainEvent for MessageRequestReadyToSendV1 {
    const TYPE: &'static str = "messaging.request_ready_to_send.v1";
}

/// Kick off the staging phase of a bulk import job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkImportStageV1 {
    pub job_key: String,
    pub import_type: String,
    pub file_id: i64,
    pub ttl_seconds: u64,
    pub config: Value,
    pub context: Value,
}

impl OutboxDomainEvent for BulkImportStageV1 {
    const TYPE: &'static str = "bulk_import.stage.v1";
}

/// Drain staged rows into domain entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkImportProcessV1 {
    pub job_key: String,
    pub import_type: String,
    pub batch_size: u32,
    pub ttl_seconds: u64,
    pub context: Value,
}

impl OutboxDomainEvent for BulkImportProcessV1 {
    const TYPE: &'static str = "bulk_import.process.v1";
}
