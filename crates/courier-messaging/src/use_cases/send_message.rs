use courier_common::CourierError;
use courier_domain::{
    validate_contact, EventMeta, Message, MessageRequestReadyToSendV1, MessagingRequest,
};
use courier_outbox::publish_event;
use courier_store::{messages, messaging_requests, sessions, UnitOfWork};

#[derive(Debug, Clone)]
pub struct SendMessageInput {
    pub session_id: i64,
    pub phone_number: Option<String>,
    pub username: Option<String>,
    pub user_id: Option<String>,
    pub text: String,
    pub file_id: Option<i64>,
    pub current_user_id: i64,
}

#[derive(Debug, Clone, Copy)]
pub struct SendMessageResult {
    pub message_request_id: i64,
    pub message_id: i64,
}

/// Queue a single message for delivery.
///
/// Persists a request, one pending message, and the ready-to-send event in
/// one transaction; the dispatcher picks it up on the next tick.
pub async fn send_message(
    uow: &mut UnitOfWork,
    input: SendMessageInput,
) -> courier_common::Result<SendMessageResult> {
    let session = sessions::get_by_id(uow.conn().await?, input.session_id)
        .await?
        .ok_or_else(|| {
            CourierError::validation(format!("Session not found: {}", input.session_id))
        })?;
    let session_id = session
        .id
        .ok_or_else(|| CourierError::permanent("session row has no id"))?;

    // reject contact shapes the session's network cannot address
    validate_contact(
        input.phone_number.as_deref(),
        input.username.as_deref(),
        input.user_id.as_deref(),
        session.messenger_type,
    )?;

    let request = MessagingRequest::new(input.current_user_id, session_id)
        .with_default_text(Some(input.text.clone()))
        .with_attachment(input.file_id);
    let request = messaging_requests::insert(uow.conn().await?, &request).await?;
    let message_request_id = request
        .id
        .ok_or_else(|| CourierError::permanent("messaging request row has no id"))?;

    let message = Message::new(message_request_id, input.text)
        .with_contact(input.phone_number, input.username, input.user_id)
        .with_attachment(input.file_id);
    let message = messages::insert(uow.conn().await?, &message).await?;
    let message_id = message
        .id
        .ok_or_else(|| CourierError::permanent("message row has no id"))?;

    publish_event(
        uow.conn().await?,
        &MessageRequestReadyToSendV1 { message_request_id },
        EventMeta::default()
            .available_at(message.sending_time)
            .dedup_key(format!("messaging_request:{message_request_id}:send"))
            .aggregate("messaging_request", message_request_id.to_string()),
    )
    .await?;

    uow.commit().await?;

    Ok(SendMessageResult {
        message_request_id,
        message_id,
    })
}
