use crate::session::MessengerType;
use courier_common::CourierError;

/// Addressing triple for one recipient, constrained by network.
#[derive(Debug, Clone, PartialEq)]
pub struct Contact {
    pub messenger_type: MessengerType,
    pub id: Option<String>,
    pub username: Option<String>,
    pub phone_number: Option<String>,
}

impl Contact {
    pub fn new(
        messenger_type: MessengerType,
        id: Option<String>,
        username: Option<String>,
        phone_number: Option<String>,
    ) -> Result<Self, CourierError> {
        validate_contact(
            phone_number.as_deref(),
            username.as_deref(),
            id.as_deref(),
            messenger_type,
        )?;
        Ok(Self {
            messenger_type,
            id,
            username,
            phone_number,
        })
    }
}

/// Enforce the per-network contact shape.
///
/// WhatsApp addresses by phone number only; Telegram accepts any of id,
/// username or phone number but needs at least one.
pub fn validate_contact(
    phone_number: Option<&str>,
    username: Option<&str>,
    user_id: Option<&str>,
    messenger_type: MessengerType,
) -> Result<(), CourierError> {
    let has = |v: Option<&str>| v.map(|s| !s.is_empty()).unwrap_or(false);

    match messenger_type {
        MessengerType::Whatsapp => {
            if has(user_id) || has(username) || !has(phone_number) {
                return Err(CourierError::validation(
                    "WhatsApp contact must have only a phone number (no id or username)",
                ));
            }
        }
        MessengerType::Telegram => {
            if !(has(user_id) || has(username) || has(phone_number)) {
                return Err(CourierError::validation(
                    "Telegram contact must have at least one of: id, username, or phone number",
                ));
            }
        }
    }
    Ok(())
}
