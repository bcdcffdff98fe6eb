//! Stage-phase outbox handler.
//!
//! Reads the tabular file, validates headers against the config, delegates
//! row normalization to the import handler, and chains the process event.
//! Deterministic problems (unknown type, bad config, header mismatch, row
//! errors under `stop_on_row_error`) mark the job failed and complete the
//! event; infrastructure failures propagate so the dispatcher retries.

use async_trait::async_trait;
use chrono::Utc;
use courier_domain::{BulkImportProcessV1, BulkImportStageV1, EventMeta};
use courier_files::FileStore;
use courier_outbox::{publish_event, OutboxHandler};
use courier_redis::StagingStore;
use courier_store::{files, UnitOfWork};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{canon, ImportConfig, UnknownColumnsPolicy};
use crate::registry::ImportRegistry;
use crate::tabular::TabularReader;
use crate::ImportStatus;

/// Outcome of comparing file headers against the config. Casing is
/// preserved from the config (missing) and the file (unknown).
#[derive(Debug, Default, PartialEq)]
pub struct HeaderCheck {
    pub missing_required: Vec<String>,
    pub unknown: Vec<String>,
}

/// Canonicalized header comparison: trim + case-fold.
pub fn check_headers(config: &ImportConfig, actual_headers: &[String]) -> HeaderCheck {
    let actual_canon: Vec<String> = actual_headers.iter().map(|h| canon(h)).collect();

    let missing_required = config
        .required
        .values()
        .filter(|header| !actual_canon.contains(&canon(header)))
        .cloned()
        .collect();

    let declared_canon: Vec<String> =
        config.declared_headers().iter().map(|h| canon(h)).collect();
    let unknown = actual_headers
        .iter()
        .filter(|header| !declared_canon.contains(&canon(header)))
        .cloned()
        .collect();

    HeaderCheck {
        missing_required,
        unknown,
    }
}

pub struct BulkImportStageHandler {
    staging: Arc<dyn StagingStore>,
    file_store: Arc<dyn FileStore>,
    reader: Arc<dyn TabularReader>,
    registry: Arc<ImportRegistry>,
    process_batch_size: u32,
}

impl BulkImportStageHandler {
    pub fn new(
        staging: Arc<dyn StagingStore>,
        file_store: Arc<dyn FileStore>,
        reader: Arc<dyn TabularReader>,
        registry: Arc<ImportRegistry>,
        process_batch_size: u32,
    ) -> Self {
        Self {
            staging,
            file_store,
            reader,
            registry,
            process_batch_size,
        }
    }

    async fn fail_job(
        &self,
        job_key: &str,
        ttl_seconds: u64,
        updates: serde_json::Value,
    ) -> courier_common::Result<()> {
        let mut updates = updates;
        if let Some(map) = updates.as_object_mut() {
            map.insert("status".to_string(), json!(ImportStatus::Failed.as_str()));
        }
        self.staging.update_meta(job_key, updates, ttl_seconds).await?;
        Ok(())
    }
}

#[async_trait]
impl OutboxHandler<BulkImportStageV1> for BulkImportStageHandler {
    async fn handle(
        &self,
        uow: &mut UnitOfWork,
        event: BulkImportStageV1,
    ) -> courier_common::Result<()> {
        let ttl = event.ttl_seconds;

        let Some(handler) = self.registry.get(&event.import_type) else {
            warn!(import_type = %event.import_type, job_key = %event.job_key, "Unknown import type");
            return self
                .fail_job(
                    &event.job_key,
                    ttl,
                    json!({"error_message": format!("Unknown import_type: {}", event.import_type)}),
                )
                .await;
        };

        let config = match handler.parse_config(&event.config) {
            Ok(config) => config,
            Err(e) => {
                return self
                    .fail_job(
                        &event.job_key,
                        ttl,
                        json!({"error_message": format!("Invalid config: {e}")}),
                    )
                    .await;
            }
        };

        self.staging
            .update_meta(
                &event.job_key,
                json!({
                    "status": ImportStatus::Staging.as_str(),
                    "import_type": event.import_type,
                }),
                ttl,
            )
            .await?;

        // load file record + bytes
        let Some(file) = files::get_by_id(uow.conn().await?, event.file_id).await? else {
            return self
                .fail_job(
                    &event.job_key,
                    ttl,
                    json!({"error_message": format!("File not found: {}", event.file_id)}),
                )
                .await;
        };

        let content = self.file_store.read(&file.uri).await?;
        let doc = self
            .reader
            .read(Some(file.name.as_str()), file.content_type.as_deref(), &content)?;

        if doc.headers.is_empty() {
            return self
                .fail_job(
                    &event.job_key,
                    ttl,
                    json!({"error_message": "No headers found in file"}),
                )
                .await;
        }

        let check = check_headers(&config, &doc.headers);
        if !check.missing_required.is_empty() {
            return self
                .fail_job(
                    &event.job_key,
                    ttl,
                    json!({
                        "error_message": "Missing required columns",
                        "missing_columns": check.missing_required,
                    }),
                )
                .await;
        }
        if !check.unknown.is_empty()
            && config.unknown_columns_policy == UnknownColumnsPolicy::Error
        {
            return self
                .fail_job(
                    &event.job_key,
                    ttl,
                    json!({
                        "error_message": "Unknown columns present",
                        "unknown_columns": check.unknown,
                    }),
                )
                .await;
        }

        if let Err(e) = handler.validate_config(&config) {
            return self
                .fail_job(&event.job_key, ttl, json!({"error_message": e.to_string()}))
                .await;
        }

        let stats = match handler
            .stage(
                &event.job_key,
                doc,
                &config,
                &event.context,
                self.staging.as_ref(),
                ttl,
            )
            .await
        {
            Ok(stats) => stats,
            // deterministic -> mark failed, no retry
            Err(e) if e.is_permanent() => {
                return self
                    .fail_job(&event.job_key, ttl, json!({"error_message": e.to_string()}))
                    .await;
            }
            Err(e) => return Err(e),
        };

        self.staging
            .update_meta(
                &event.job_key,
                json!({
                    "status": ImportStatus::Staged.as_str(),
                    "stage_stats": stats,
                }),
                ttl,
            )
            .await?;

        info!(
            job_key = %event.job_key,
            total = stats.total,
            staged = stats.staged,
            failed = stats.failed,
            "Staged import job"
        );

        // chain processing
        publish_event(
            uow.conn().await?,
            &BulkImportProcessV1 {
                job_key: event.job_key.clone(),
                import_type: event.import_type.clone(),
                batch_size: self.process_batch_size,
                ttl_seconds: ttl,
                context: event.context.clone(),
            },
            EventMeta::default()
                .available_at(Utc::now())
                .dedup_key(format!("bulk_import:{}:process", event.job_key))
                .aggregate("bulk_import", event.job_key.clone()),
        )
        .await?;

        Ok(())
    }
}
