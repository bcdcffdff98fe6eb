//! Session auth flows: OTP start/verify, 2FA login, QR start.
//!
//! Capability is checked by asking the adapter, not the network tag; a
//! network that does not expose a flow rejects it with a validation error.

use courier_common::CourierError;
use courier_domain::{MessengerType, Session, SessionAuth};
use courier_redis::AuthStateCache;
use courier_store::{sessions, UnitOfWork};
use serde_json::json;
use uuid::Uuid;

use crate::capabilities::OtpValidation;
use crate::registry::MessengerRegistry;

/// How long an OTP context stays valid.
const OTP_CONTEXT_TTL_SECONDS: u64 = 600;

fn otp_cache_key(messenger_type: MessengerType, session_id: i64) -> String {
    format!("{messenger_type}-session-{session_id}")
}

#[derive(Debug, Clone, Copy)]
pub struct StartOtpSessionResult {
    pub session_id: i64,
}

#[derive(Debug, Clone)]
pub struct StartQrSessionResult {
    pub session_id: i64,
    /// Payload to render as a QR code; rendering is the API layer's concern.
    pub qr_payload: String,
}

/// Begin an OTP login: create an inactive session and cache the OTP context
/// for the verify step.
pub async fn start_otp_session(
    uow: &mut UnitOfWork,
    registry: &MessengerRegistry,
    cache: &dyn AuthStateCache,
    user_id: i64,
    title: &str,
    phone_number: &str,
    messenger_type: MessengerType,
) -> courier_common::Result<StartOtpSessionResult> {
    let mut messenger = registry.unbound(messenger_type)?;
    let Some(otp) = messenger.otp_auth() else {
        return Err(CourierError::validation(format!(
            "Messenger {messenger_type} does not support OTP login"
        )));
    };

    let start = otp.login(phone_number).await?;

    let session = Session::new(
        user_id,
        title,
        phone_number,
        messenger_type,
        SessionAuth::Account {
            session_str: start.session_str.clone(),
        },
    )?;
    let session = sessions::insert(uow.conn().await?, &session).await?;
    let session_id = session
        .id
        .ok_or_else(|| CourierError::permanent("session row has no id"))?;

    cache
        .set(
            &otp_cache_key(messenger_type, session_id),
            json!({
                "session_str": start.session_str,
                "otp_context": start.otp_context,
            }),
            OTP_CONTEXT_TTL_SECONDS,
        )
        .await?;

    uow.commit().await?;

    Ok(StartOtpSessionResult { session_id })
}

/// Validate the received OTP code. A 2FA-protected account leaves the
/// session inactive and the caller switches to [`two_factor_login`].
pub async fn verify_otp(
    uow: &mut UnitOfWork,
    registry: &MessengerRegistry,
    cache: &dyn AuthStateCache,
    user_id: i64,
    session_id: i64,
    otp: &str,
) -> courier_common::Result<Session> {
    let mut session = sessions::get_by_id(uow.conn().await?, session_id)
        .await?
        .ok_or_else(|| CourierError::not_found(format!("Session not found: {session_id}")))?;

    if session.user_id != user_id {
        return Err(CourierError::validation("You do not own this session"));
    }

    let cache_key = otp_cache_key(session.messenger_type, session_id);
    let cached = cache
        .get(&cache_key)
        .await?
        .ok_or_else(|| CourierError::validation("OTP session expired or not found"))?;
    let otp_context = cached
        .get("otp_context")
        .and_then(|v| v.as_str())
        .ok_or_else(|| CourierError::validation("OTP session expired or not found"))?
        .to_string();

    let mut messenger = registry.for_session(&session)?;
    let Some(auth) = messenger.otp_auth() else {
        return Err(CourierError::validation(format!(
            "Messenger {} does not support OTP login",
            session.messenger_type
        )));
    };

    let outcome = auth
        .validate_otp(otp, &session.phone_number, &otp_context)
        .await
        .map_err(|e| CourierError::validation(format!("Invalid OTP: {e}")))?;

    cache.delete(&cache_key).await?;

    session.set_session_str(outcome.session_str())?;
    session.is_active = matches!(outcome, OtpValidation::Authorized { .. });
    sessions::update(uow.conn().await?, &session).await?;
    uow.commit().await?;

    Ok(session)
}

/// Complete a 2FA login after `verify_otp` reported a password-protected
/// account.
pub async fn two_factor_login(
    uow: &mut UnitOfWork,
    registry: &MessengerRegistry,
    user_id: i64,
    session_id: i64,
    password: &str,
) -> courier_common::Result<Session> {
    let mut session = sessions::get_by_id(uow.conn().await?, session_id)
        .await?
        .ok_or_else(|| CourierError::not_found(format!("Session not found: {session_id}")))?;

    if session.user_id != user_id {
        return Err(CourierError::validation("You do not own this session"));
    }
    if session.auth.session_str().unwrap_or_default().is_empty() {
        return Err(CourierError::validation("Session is missing auth data"));
    }

    let mut messenger = registry.for_session(&session)?;
    let Some(auth) = messenger.two_factor_auth() else {
        return Err(CourierError::validation(
            "Messenger does not support 2FA password authentication",
        ));
    };

    let session_str = auth
        .two_factor_authenticate(password)
        .await
        .map_err(|e| CourierError::validation(format!("Invalid password: {e}")))?;

    session.set_session_str(session_str)?;
    session.is_active = true;
    sessions::update(uow.conn().await?, &session).await?;
    uow.commit().await?;

    Ok(session)
}

/// Begin a QR login: create an inactive session and return the QR payload.
pub async fn start_qr_session(
    uow: &mut UnitOfWork,
    registry: &MessengerRegistry,
    user_id: i64,
    title: &str,
    phone_number: &str,
    messenger_type: MessengerType,
    integration: &str,
) -> courier_common::Result<StartQrSessionResult> {
    let session = Session::new(
        user_id,
        title,
        phone_number,
        messenger_type,
        SessionAuth::Qr {
            uuid: Uuid::new_v4(),
        },
    )?;
    let session = sessions::insert(uow.conn().await?, &session).await?;
    let session_id = session
        .id
        .ok_or_else(|| CourierError::permanent("session row has no id"))?;

    let mut messenger = registry.for_session(&session)?;
    let Some(qr) = messenger.qr_auth() else {
        return Err(CourierError::validation(format!(
            "Messenger {messenger_type} does not support QR login"
        )));
    };

    let qr_payload = qr.login(integration).await?;

    uow.commit().await?;

    Ok(StartQrSessionResult {
        session_id,
        qr_payload,
    })
}
