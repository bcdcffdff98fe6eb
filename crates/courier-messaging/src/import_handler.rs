//! The `message_request` import type.
//!
//! Stage: normalize contact rows (phone required; username/user_id/text
//! trimmed; sending_time ISO-8601 with naive values coerced to UTC) into the
//! staging queue. Process: drain staged rows into pending `Message` rows and
//! emit the ready-to-send event with `available_at` at the earliest
//! scheduled time.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use courier_common::CourierError;
use courier_domain::{EventMeta, Message, MessageRequestReadyToSendV1};
use courier_importing::{
    canon, ImportConfig, ImportHandler, ProcessStats, StageStats, StagedRow, TabularDocument,
    TabularRow, UnknownColumnsPolicy, STAGE_CHUNK,
};
use courier_outbox::publish_event;
use courier_redis::StagingStore;
use courier_store::{messages, UnitOfWork};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::debug;

const IMPORT_TYPE: &str = "message_request";

const ALLOWED_KEYS: &[&str] = &["phone_number", "username", "user_id", "text", "sending_time"];

#[derive(Debug, Deserialize)]
struct MessageRequestContext {
    message_request_id: i64,
    #[serde(default)]
    default_text: Option<String>,
    #[serde(default)]
    default_sending_time: Option<String>,
    #[serde(default)]
    attachment_file_id: Option<i64>,
}

/// Parse an ISO-8601 timestamp; naive values are taken as UTC, a trailing
/// `Z` is accepted.
pub fn parse_sending_time(raw: &str) -> Result<DateTime<Utc>, ()> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(naive.and_utc());
        }
    }
    Err(())
}

fn cell<'a>(
    row: &'a TabularRow,
    header_map: &BTreeMap<String, String>,
    header: Option<&String>,
) -> Option<&'a str> {
    let header = header?;
    let actual = header_map.get(&canon(header))?;
    row.values.get(actual).map(|s| s.as_str())
}

/// Per-row normalization for the message_request type.
pub fn normalize_row(row: &TabularRow, config: &ImportConfig) -> StagedRow {
    // canon(file header) -> file header, for config-to-file lookups
    let header_map: BTreeMap<String, String> = row
        .values
        .keys()
        .map(|h| (canon(h), h.clone()))
        .collect();

    let mut normalized = serde_json::Map::new();
    let mut row_errors = Vec::new();

    let phone = cell(row, &header_map, config.required.get("phone_number"))
        .map(str::trim)
        .filter(|s| !s.is_empty());
    if phone.is_none() {
        row_errors.push("phone_number is required".to_string());
    }
    normalized.insert(
        "phone_number".to_string(),
        phone.map(|p| json!(p)).unwrap_or(Value::Null),
    );

    for key in ["username", "user_id", "text"] {
        if let Some(value) = cell(row, &header_map, config.optional.get(key)) {
            let value = value.trim();
            if !value.is_empty() {
                normalized.insert(key.to_string(), json!(value));
            }
        }
    }

    if let Some(raw) = cell(row, &header_map, config.optional.get("sending_time")) {
        let raw = raw.trim();
        if !raw.is_empty() {
            match parse_sending_time(raw) {
                Ok(dt) => {
                    normalized.insert("sending_time".to_string(), json!(dt.to_rfc3339()));
                }
                Err(()) => {
                    row_errors.push("sending_time is invalid (expected ISO8601)".to_string());
                }
            }
        }
    }

    // extras: explicit mapping, plus unknown headers under the capture policy
    let mut extras = serde_json::Map::new();
    for (variable, header) in &config.extras {
        let value = cell(row, &header_map, Some(header))
            .map(|v| json!(v))
            .unwrap_or(Value::Null);
        extras.insert(variable.clone(), value);
    }
    if config.unknown_columns_policy == UnknownColumnsPolicy::Capture {
        let declared: Vec<String> = config.declared_headers().iter().map(|h| canon(h)).collect();
        for (header, value) in &row.values {
            if !declared.contains(&canon(header)) {
                extras.insert(header.clone(), json!(value));
            }
        }
    }

    StagedRow {
        row_number: row.row_number,
        raw: row.values.clone(),
        normalized,
        extras,
        errors: row_errors,
    }
}

pub struct MessageRequestImportHandler;

impl MessageRequestImportHandler {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MessageRequestImportHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImportHandler for MessageRequestImportHandler {
    fn import_type(&self) -> &'static str {
        IMPORT_TYPE
    }

    fn parse_config(&self, raw: &Value) -> courier_common::Result<ImportConfig> {
        ImportConfig::from_value(raw)
    }

    fn validate_config(&self, config: &ImportConfig) -> courier_common::Result<()> {
        let bad: Vec<&String> = config
            .required
            .keys()
            .chain(config.optional.keys())
            .filter(|key| !ALLOWED_KEYS.contains(&key.as_str()))
            .collect();
        if !bad.is_empty() {
            return Err(CourierError::validation(format!(
                "Invalid column keys: {bad:?}"
            )));
        }

        if !config.required.contains_key("phone_number") {
            return Err(CourierError::validation(
                "phone_number must be required for message_request import",
            ));
        }

        Ok(())
    }

    async fn stage(
        &self,
        job_key: &str,
        doc: TabularDocument,
        config: &ImportConfig,
        _context: &Value,
        staging: &dyn StagingStore,
        ttl_seconds: u64,
    ) -> courier_common::Result<StageStats> {
        let mut stats = StageStats::default();
        let mut buffer: Vec<Value> = Vec::new();
        let mut errors: Vec<Value> = Vec::new();

        for row in doc.rows {
            let row = row?;
            stats.total += 1;

            let staged = normalize_row(&row, config);
            if staged.errors.is_empty() {
                stats.staged += 1;
            } else {
                stats.failed += 1;
                if errors.len() < config.max_errors {
                    errors.push(json!({"row": staged.row_number, "errors": staged.errors}));
                }
                if config.stop_on_row_error {
                    staging
                        .add_errors(job_key, &errors, ttl_seconds, config.max_errors)
                        .await?;
                    return Err(CourierError::validation(format!(
                        "Row error at row {}: {:?}",
                        staged.row_number, staged.errors
                    )));
                }
            }

            buffer.push(
                serde_json::to_value(&staged)
                    .map_err(|e| CourierError::permanent(e.to_string()))?,
            );

            // flush in chunks to bound memory
            if buffer.len() >= STAGE_CHUNK {
                staging.push_rows(job_key, &buffer, ttl_seconds).await?;
                buffer.clear();
            }
        }

        if !buffer.is_empty() {
            staging.push_rows(job_key, &buffer, ttl_seconds).await?;
        }
        if !errors.is_empty() {
            staging
                .add_errors(job_key, &errors, ttl_seconds, config.max_errors)
                .await?;
        }

        staging
            .update_meta(
                job_key,
                json!({
                    "total_rows": stats.total,
                    "staged_rows": stats.staged,
                    "failed_rows": stats.failed,
                }),
                ttl_seconds,
            )
            .await?;

        Ok(stats)
    }

    async fn process(
        &self,
        uow: &mut UnitOfWork,
        job_key: &str,
        context: &Value,
        staging: &dyn StagingStore,
        batch_size: u32,
        _ttl_seconds: u64,
    ) -> courier_common::Result<ProcessStats> {
        let context: MessageRequestContext = serde_json::from_value(context.clone())
            .map_err(|e| CourierError::validation(format!("invalid import context: {e}")))?;

        let default_text = context
            .default_text
            .as_deref()
            .unwrap_or_default()
            .trim()
            .to_string();
        let default_sending_time = match context.default_sending_time.as_deref() {
            Some(raw) if !raw.trim().is_empty() => Some(parse_sending_time(raw).map_err(|()| {
                CourierError::validation("default_sending_time is invalid (expected ISO8601)")
            })?),
            _ => None,
        };

        let mut stats = ProcessStats::default();
        let mut earliest: Option<DateTime<Utc>> = None;

        loop {
            let batch = staging.pop_rows(job_key, batch_size as usize).await?;
            if batch.is_empty() {
                break;
            }

            for item in batch {
                let staged: StagedRow = match serde_json::from_value(item) {
                    Ok(staged) => staged,
                    Err(_) => {
                        stats.bad_rows += 1;
                        continue;
                    }
                };

                if !staged.errors.is_empty() {
                    stats.bad_rows += 1;
                    continue;
                }

                let text = staged
                    .normalized
                    .get("text")
                    .and_then(|v| v.as_str())
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| default_text.clone());
                if text.is_empty() {
                    stats.skipped += 1;
                    continue;
                }

                let sending_time = staged
                    .normalized
                    .get("sending_time")
                    .and_then(|v| v.as_str())
                    .and_then(|raw| parse_sending_time(raw).ok())
                    .or(default_sending_time);

                let get = |key: &str| {
                    staged
                        .normalized
                        .get(key)
                        .and_then(|v| v.as_str())
                        .map(|s| s.to_string())
                };

                let mut message = Message::new(context.message_request_id, text)
                    .with_contact(get("phone_number"), get("username"), get("user_id"))
                    .with_attachment(context.attachment_file_id);
                // only explicitly scheduled rows move the ready-event time;
                // unscheduled rows are due whenever the event fires
                if let Some(at) = sending_time {
                    message = message.with_sending_time(at);
                    earliest = Some(match earliest {
                        Some(current) => current.min(at),
                        None => at,
                    });
                }

                messages::insert(uow.conn().await?, &message).await?;
                stats.created += 1;
            }

            uow.commit().await?;
        }

        debug!(
            job_key = %job_key,
            created = stats.created,
            skipped = stats.skipped,
            bad_rows = stats.bad_rows,
            "Drained staged rows into messages"
        );

        publish_event(
            uow.conn().await?,
            &MessageRequestReadyToSendV1 {
                message_request_id: context.message_request_id,
            },
            EventMeta::default()
                .available_at(earliest.unwrap_or_else(Utc::now))
                .dedup_key(format!("messaging_request:{}:send", context.message_request_id))
                .aggregate("messaging_request", context.message_request_id.to_string()),
        )
        .await?;
        uow.commit().await?;

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_redis::InMemoryStagingStore;

    fn config(raw: Value) -> ImportConfig {
        ImportConfig::from_value(&raw).unwrap()
    }

    fn default_config() -> ImportConfig {
        config(json!({
            "required": {"phone_number": "phone_number"},
            "optional": {
                "username": "username",
                "user_id": "user_id",
                "text": "text",
                "sending_time": "sending_time"
            }
        }))
    }

    fn row(number: u64, cells: &[(&str, &str)]) -> TabularRow {
        TabularRow {
            row_number: number,
            values: cells
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn test_parse_sending_time_accepts_z_suffix() {
        let dt = parse_sending_time("2030-01-01T00:00:00Z").unwrap();
        assert_eq!(dt.to_rfc3339(), "2030-01-01T00:00:00+00:00");
    }

    #[test]
    fn test_parse_sending_time_coerces_naive_to_utc() {
        let dt = parse_sending_time("2030-01-01T12:30:00").unwrap();
        assert_eq!(dt.to_rfc3339(), "2030-01-01T12:30:00+00:00");

        let dt = parse_sending_time("2030-01-01").unwrap();
        assert_eq!(dt.to_rfc3339(), "2030-01-01T00:00:00+00:00");
    }

    #[test]
    fn test_parse_sending_time_honors_offsets() {
        let dt = parse_sending_time("2030-01-01T02:00:00+02:00").unwrap();
        assert_eq!(dt.to_rfc3339(), "2030-01-01T00:00:00+00:00");
    }

    #[test]
    fn test_parse_sending_time_rejects_garbage() {
        assert!(parse_sending_time("not-a-date").is_err());
    }

    #[test]
    fn test_normalize_happy_row() {
        let staged = normalize_row(
            &row(2, &[
                ("phone_number", "+111"),
                ("text", "hello"),
                ("sending_time", "2030-01-01T00:00:00Z"),
            ]),
            &default_config(),
        );
        assert!(staged.errors.is_empty());
        assert_eq!(staged.normalized["phone_number"], "+111");
        assert_eq!(staged.normalized["text"], "hello");
        assert_eq!(staged.normalized["sending_time"], "2030-01-01T00:00:00+00:00");
    }

    #[test]
    fn test_normalize_missing_phone_is_a_row_error() {
        let staged = normalize_row(
            &row(2, &[("phone_number", "  "), ("text", "hi")]),
            &default_config(),
        );
        assert_eq!(staged.errors, vec!["phone_number is required"]);
        assert_eq!(staged.normalized["phone_number"], Value::Null);
    }

    #[test]
    fn test_normalize_invalid_sending_time_is_a_row_error() {
        let staged = normalize_row(
            &row(3, &[("phone_number", "+222"), ("sending_time", "not-a-date")]),
            &default_config(),
        );
        assert_eq!(staged.errors, vec!["sending_time is invalid (expected ISO8601)"]);
    }

    #[test]
    fn test_normalize_drops_empty_optionals() {
        let staged = normalize_row(
            &row(4, &[
                ("phone_number", "+333"),
                ("username", "  "),
                ("text", ""),
            ]),
            &default_config(),
        );
        assert!(staged.errors.is_empty());
        assert!(staged.normalized.get("username").is_none());
        assert!(staged.normalized.get("text").is_none());
    }

    #[test]
    fn test_normalize_header_matching_is_case_insensitive() {
        let config = config(json!({"required": {"phone_number": "Phone"}}));
        let staged = normalize_row(&row(2, &[("PHONE", "+444")]), &config);
        assert!(staged.errors.is_empty());
        assert_eq!(staged.normalized["phone_number"], "+444");
    }

    #[test]
    fn test_normalize_capture_policy_collects_unknowns() {
        let config = config(json!({
            "required": {"phone_number": "phone_number"},
            "unknown_columns_policy": "capture"
        }));
        let staged = normalize_row(
            &row(2, &[("phone_number", "+555"), ("company", "acme")]),
            &config,
        );
        assert_eq!(staged.extras["company"], "acme");
    }

    #[test]
    fn test_normalize_explicit_extras_mapping() {
        let config = config(json!({
            "required": {"phone_number": "phone_number"},
            "extras": {"company_name": "company"}
        }));
        let staged = normalize_row(
            &row(2, &[("phone_number", "+555"), ("company", "acme")]),
            &config,
        );
        assert_eq!(staged.extras["company_name"], "acme");
    }

    #[test]
    fn test_validate_config_enforces_key_domain() {
        let handler = MessageRequestImportHandler::new();

        let bad = config(json!({
            "required": {"phone_number": "phone", "color": "color"}
        }));
        assert!(handler.validate_config(&bad).is_err());

        let missing_phone = config(json!({
            "required": {"username": "username"}
        }));
        assert!(handler.validate_config(&missing_phone).is_err());

        assert!(handler.validate_config(&default_config()).is_ok());
    }

    fn doc_from_rows(rows: Vec<TabularRow>) -> TabularDocument {
        TabularDocument {
            headers: vec![
                "phone_number".to_string(),
                "text".to_string(),
                "sending_time".to_string(),
            ],
            rows: Box::new(rows.into_iter().map(Ok)),
        }
    }

    fn bulk_rows() -> Vec<TabularRow> {
        vec![
            row(2, &[
                ("phone_number", "+111"),
                ("text", "hello"),
                ("sending_time", "2030-01-01T00:00:00Z"),
            ]),
            row(3, &[
                ("phone_number", "+222"),
                ("text", "hi"),
                ("sending_time", "not-a-date"),
            ]),
            row(4, &[("phone_number", "+333"), ("text", ""), ("sending_time", "")]),
        ]
    }

    #[tokio::test]
    async fn test_stage_counts_and_queues_rows() {
        let handler = MessageRequestImportHandler::new();
        let staging = InMemoryStagingStore::new();
        staging.create_job("job", json!({"status": "pending"}), 60).await.unwrap();

        let stats = handler
            .stage("job", doc_from_rows(bulk_rows()), &default_config(), &json!({}), &staging, 60)
            .await
            .unwrap();

        assert_eq!(stats, StageStats { total: 3, staged: 2, failed: 1 });
        // all rows are staged, including the bad one (process skips it)
        assert_eq!(staging.remaining("job").await.unwrap(), 3);

        let meta = staging.get_meta("job").await.unwrap().unwrap();
        assert_eq!(meta["total_rows"], 3);
        assert_eq!(meta["staged_rows"], 2);
        assert_eq!(meta["failed_rows"], 1);
        assert_eq!(meta["errors"].as_array().unwrap().len(), 1);
        assert_eq!(meta["errors"][0]["row"], 3);
    }

    #[tokio::test]
    async fn test_stage_stop_on_row_error_fails_fast() {
        let handler = MessageRequestImportHandler::new();
        let staging = InMemoryStagingStore::new();
        staging.create_job("job", json!({}), 60).await.unwrap();

        let config = config(json!({
            "required": {"phone_number": "phone_number"},
            "optional": {"text": "text", "sending_time": "sending_time"},
            "stop_on_row_error": true
        }));

        let err = handler
            .stage("job", doc_from_rows(bulk_rows()), &config, &json!({}), &staging, 60)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Row error at row 3"));

        let meta = staging.get_meta("job").await.unwrap().unwrap();
        assert_eq!(meta["errors"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_stage_caps_recorded_errors() {
        let handler = MessageRequestImportHandler::new();
        let staging = InMemoryStagingStore::new();
        staging.create_job("job", json!({}), 60).await.unwrap();

        let config = config(json!({
            "required": {"phone_number": "phone_number"},
            "max_errors": 2
        }));
        let rows: Vec<TabularRow> = (0..5).map(|i| row(i + 2, &[("phone_number", "")])).collect();

        let stats = handler
            .stage("job", doc_from_rows(rows), &config, &json!({}), &staging, 60)
            .await
            .unwrap();
        assert_eq!(stats.failed, 5);

        let meta = staging.get_meta("job").await.unwrap().unwrap();
        assert_eq!(meta["errors"].as_array().unwrap().len(), 2);
    }
}
