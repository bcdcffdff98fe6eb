pub mod contact;
pub mod events;
pub mod file;
pub mod message;
pub mod messaging_request;
pub mod outbox_event;
pub mod session;

pub use contact::{validate_contact, Contact};
pub use events::{
    BulkImportProcessV1, BulkImportStageV1, EventMeta, MessageRequestReadyToSendV1,
    OutboxDomainEvent,
};
pub use file::File;
pub use message::{Message, MessageStatus};
pub use messaging_request::MessagingRequest;
pub use outbox_event::{OutboxEvent, MAX_LAST_ERROR};
pub use session::{MessengerType, Session, SessionAuth};
