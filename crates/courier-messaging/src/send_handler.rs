//! Send dispatch handler.
//!
//! Triggered by `messaging.request_ready_to_send.v1`: claims a batch of due
//! pending messages under skip-locked row locks, fans them to the session's
//! adapter, records per-message outcome, and re-enqueues itself while more
//! work remains so one event never turns into a giant transaction.

use async_trait::async_trait;
use chrono::Utc;
use courier_common::CourierError;
use courier_domain::{Contact, EventMeta, MessageRequestReadyToSendV1};
use courier_outbox::{publish_event, OutboxHandler};
use courier_store::{files, messages, messaging_requests, sessions, UnitOfWork};
use metrics::counter;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::messenger::MessengerError;
use crate::registry::MessengerRegistry;

/// Max messages claimed per handler invocation.
pub const SEND_BATCH: i64 = 50;

pub struct SendDispatchHandler {
    messengers: Arc<MessengerRegistry>,
}

impl SendDispatchHandler {
    pub fn new(messengers: Arc<MessengerRegistry>) -> Self {
        Self { messengers }
    }
}

#[async_trait]
impl OutboxHandler<MessageRequestReadyToSendV1> for SendDispatchHandler {
    async fn handle(
        &self,
        uow: &mut UnitOfWork,
        event: MessageRequestReadyToSendV1,
    ) -> courier_common::Result<()> {
        let now = Utc::now();

        let request = messaging_requests::get_by_id(uow.conn().await?, event.message_request_id)
            .await?
            .ok_or_else(|| {
                CourierError::not_found(format!(
                    "MessagingRequest not found: {}",
                    event.message_request_id
                ))
            })?;
        let request_id = request.id.ok_or_else(|| {
            CourierError::permanent("messaging request row has no id".to_string())
        })?;

        let session = sessions::get_by_id(uow.conn().await?, request.session_id)
            .await?
            .ok_or_else(|| {
                CourierError::not_found(format!("Session not found: {}", request.session_id))
            })?;

        // claim a batch of due messages system-wide, then narrow to this
        // request
        let claimed = messages::get_pending_to_send_before(
            uow.conn().await?,
            now,
            SEND_BATCH,
            true,
            true,
        )
        .await?;
        let batch: Vec<_> = claimed
            .into_iter()
            .filter(|m| m.message_request_id == request_id)
            .collect();

        if batch.is_empty() {
            return Ok(());
        }

        let mut messenger = self.messengers.for_session(&session)?;

        let mut sent = 0u64;
        for mut message in batch {
            let contact = match Contact::new(
                session.messenger_type,
                message.user_id.clone(),
                message.username.clone(),
                message.phone_number.clone(),
            ) {
                Ok(contact) => contact,
                Err(e) => {
                    message.mark_failed(&e.to_string())?;
                    messages::update(uow.conn().await?, &message).await?;
                    counter!("courier.send.failed_total").increment(1);
                    continue;
                }
            };

            let file = match message.attachment_file_id {
                Some(file_id) => files::get_by_id(uow.conn().await?, file_id).await?,
                None => None,
            };

            match messenger
                .send_message(&contact, &message.text, file.as_ref())
                .await
            {
                Ok(()) => {
                    message.mark_sent(now)?;
                    messages::update(uow.conn().await?, &message).await?;
                    sent += 1;
                    counter!("courier.send.successful_total").increment(1);
                }
                // upstream failures are the dispatcher's to retry; the
                // message stays pending and is re-claimed next tick
                Err(MessengerError::Upstream(msg)) => {
                    counter!("courier.send.upstream_errors_total").increment(1);
                    return Err(CourierError::transient(msg));
                }
                Err(e) => {
                    warn!(message_id = ?message.id, error = %e, "Failed sending message");
                    message.mark_failed(&e.to_string())?;
                    messages::update(uow.conn().await?, &message).await?;
                    counter!("courier.send.failed_total").increment(1);
                }
            }
        }

        // if something went out and more is due, re-enqueue for the next tick
        if sent > 0 && messages::has_pending_for_request(uow.conn().await?, request_id, now).await? {
            debug!(request_id = request_id, "More messages due; re-enqueueing send event");
            publish_event(
                uow.conn().await?,
                &MessageRequestReadyToSendV1 {
                    message_request_id: request_id,
                },
                EventMeta::default()
                    .available_at(now)
                    .dedup_key(format!("messaging_request:{request_id}:send"))
                    .aggregate("messaging_request", request_id.to_string()),
            )
            .await?;
        }

        Ok(())
    }
}
