//! Process-phase outbox handler.
//!
//! Marks the job processing, lets the import handler drain the staging queue
//! into domain entities, then records completion and deletes the staging
//! keys.

use async_trait::async_trait;
use courier_domain::BulkImportProcessV1;
use courier_outbox::OutboxHandler;
use courier_redis::StagingStore;
use courier_store::UnitOfWork;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use crate::registry::ImportRegistry;
use crate::ImportStatus;

pub struct BulkImportProcessHandler {
    staging: Arc<dyn StagingStore>,
    registry: Arc<ImportRegistry>,
}

impl BulkImportProcessHandler {
    pub fn new(staging: Arc<dyn StagingStore>, registry: Arc<ImportRegistry>) -> Self {
        Self { staging, registry }
    }
}

#[async_trait]
impl OutboxHandler<BulkImportProcessV1> for BulkImportProcessHandler {
    async fn handle(
        &self,
        uow: &mut UnitOfWork,
        event: BulkImportProcessV1,
    ) -> courier_common::Result<()> {
        let ttl = event.ttl_seconds;

        let Some(handler) = self.registry.get(&event.import_type) else {
            warn!(import_type = %event.import_type, job_key = %event.job_key, "Unknown import type");
            self.staging
                .update_meta(
                    &event.job_key,
                    json!({
                        "status": ImportStatus::Failed.as_str(),
                        "error_message": format!("Unknown import_type: {}", event.import_type),
                    }),
                    ttl,
                )
                .await?;
            return Ok(());
        };

        self.staging
            .update_meta(
                &event.job_key,
                json!({"status": ImportStatus::Processing.as_str()}),
                ttl,
            )
            .await?;

        let stats = handler
            .process(
                uow,
                &event.job_key,
                &event.context,
                self.staging.as_ref(),
                event.batch_size,
                ttl,
            )
            .await?;

        self.staging
            .update_meta(
                &event.job_key,
                json!({
                    "status": ImportStatus::Completed.as_str(),
                    "process_stats": stats,
                }),
                ttl,
            )
            .await?;
        self.staging.cleanup(&event.job_key).await?;

        info!(
            job_key = %event.job_key,
            created = stats.created,
            skipped = stats.skipped,
            bad_rows = stats.bad_rows,
            "Processed import job"
        );

        Ok(())
    }
}
