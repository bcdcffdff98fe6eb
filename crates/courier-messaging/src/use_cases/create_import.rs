use chrono::{DateTime, Utc};
use courier_common::CourierError;
use courier_domain::{BulkImportStageV1, EventMeta, MessagingRequest};
use courier_importing::ImportStatus;
use courier_outbox::publish_event;
use courier_redis::StagingStore;
use courier_store::{files, messaging_requests, sessions, UnitOfWork};
use serde_json::{json, Value};
use uuid::Uuid;

const IMPORT_TYPE: &str = "message_request";

#[derive(Debug, Clone)]
pub struct CreateImportInput {
    pub user_id: i64,
    pub session_id: i64,
    pub file_id: i64,
    pub title: Option<String>,
    pub default_text: Option<String>,
    pub default_sending_time: Option<DateTime<Utc>>,
    pub attachment_file_id: Option<i64>,
    pub import_config: Value,
    pub ttl_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct CreateImportResult {
    pub message_request_id: i64,
    pub job_key: String,
}

/// Start a bulk campaign from an uploaded spreadsheet.
///
/// Persists the request, creates the staging job record, and emits the
/// stage event; the import pipeline takes over from there.
pub async fn create_message_request_import(
    uow: &mut UnitOfWork,
    staging: &dyn StagingStore,
    input: CreateImportInput,
) -> courier_common::Result<CreateImportResult> {
    let session = sessions::get_by_id(uow.conn().await?, input.session_id)
        .await?
        .ok_or_else(|| CourierError::not_found("Session not found"))?;
    let session_id = session
        .id
        .ok_or_else(|| CourierError::permanent("session row has no id"))?;

    files::get_by_id(uow.conn().await?, input.file_id)
        .await?
        .ok_or_else(|| CourierError::not_found("File not found"))?;

    let request = MessagingRequest::new(input.user_id, session_id)
        .with_title(input.title.clone())
        .with_default_text(input.default_text.clone())
        .with_sending_time(input.default_sending_time)
        .with_request_file(Some(input.file_id))
        .with_attachment(input.attachment_file_id);
    let request = messaging_requests::insert(uow.conn().await?, &request).await?;
    let message_request_id = request
        .id
        .ok_or_else(|| CourierError::permanent("messaging request row has no id"))?;

    let job_key = format!(
        "message_request:{}:{}",
        message_request_id,
        Uuid::new_v4().simple()
    );

    staging
        .create_job(
            &job_key,
            json!({
                "status": ImportStatus::Pending.as_str(),
                "import_type": IMPORT_TYPE,
                "message_request_id": message_request_id,
                "file_id": input.file_id,
                "errors": [],
            }),
            input.ttl_seconds,
        )
        .await?;

    publish_event(
        uow.conn().await?,
        &BulkImportStageV1 {
            job_key: job_key.clone(),
            import_type: IMPORT_TYPE.to_string(),
            file_id: input.file_id,
            ttl_seconds: input.ttl_seconds,
            config: input.import_config,
            context: json!({
                "user_id": input.user_id,
                "session_id": session_id,
                "message_request_id": message_request_id,
                "default_text": input.default_text,
                "default_sending_time": input.default_sending_time.map(|dt| dt.to_rfc3339()),
                "attachment_file_id": input.attachment_file_id,
            }),
        },
        EventMeta::default()
            .available_at(Utc::now())
            .dedup_key(format!("bulk_import:{job_key}:stage"))
            .aggregate("bulk_import", job_key.clone()),
    )
    .await?;

    uow.commit().await?;

    Ok(CreateImportResult {
        message_request_id,
        job_key,
    })
}
