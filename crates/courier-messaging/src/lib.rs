//! Messaging bounded context: messenger capability ports, the per-network
//! adapters (Telegram, WhatsApp), the capability registry, the send dispatch
//! handler, the message-request import handler and the application use
//! cases.

pub mod capabilities;
pub mod import_handler;
pub mod messenger;
pub mod registry;
pub mod send_handler;
pub mod telegram;
pub mod use_cases;
pub mod whatsapp;

pub use capabilities::{OtpAuth, OtpLoginStart, OtpValidation, Polls, QrAuth, TwoFactorAuth};
pub use import_handler::MessageRequestImportHandler;
pub use messenger::{Messenger, MessengerDescriptor, MessengerError, MessengerFactory};
pub use registry::MessengerRegistry;
pub use send_handler::{SendDispatchHandler, SEND_BATCH};
pub use telegram::{
    SentCode, TelegramClient, TelegramClientFactory, TelegramMessenger, TelegramMessengerFactory,
    UnconfiguredTelegramClient, UnconfiguredTelegramClientFactory,
};
pub use whatsapp::{
    SendMediaRequest, WhatsappApi, WhatsappHttpApi, WhatsappMessenger, WhatsappMessengerFactory,
};
