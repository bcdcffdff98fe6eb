//! Telegram adapter (Network A: account-session, OTP + optional 2FA).
//!
//! The wire protocol lives behind [`TelegramClient`]; this module holds the
//! adapter logic: session-string bookkeeping, auth state, target
//! resolution and media handling.

use async_trait::async_trait;
use base64::Engine;
use courier_common::CourierError;
use courier_domain::{Contact, File, MessengerType, Session};
use courier_files::FileStore;
use std::sync::Arc;

use crate::capabilities::{OtpAuth, OtpLoginStart, OtpValidation, TwoFactorAuth};
use crate::messenger::{
    Messenger, MessengerDescriptor, MessengerError, MessengerFactory, Result,
};

/// Result of a send-code request.
#[derive(Debug, Clone)]
pub struct SentCode {
    pub phone_code_hash: String,
}

/// Stateful MTProto client port. One instance per adapter; the session
/// string is the only durable state.
#[async_trait]
pub trait TelegramClient: Send + Sync {
    fn set_session_string(&mut self, session: &str);

    fn session_string(&self) -> String;

    async fn send_code_request(&mut self, phone_number: &str) -> Result<SentCode>;

    async fn sign_in(&mut self, phone_number: &str, code: &str, phone_code_hash: &str)
        -> Result<()>;

    async fn sign_in_with_password(&mut self, password: &str) -> Result<()>;

    async fn disconnect(&mut self) -> Result<()>;

    async fn send_message(&mut self, target: &str, text: &str) -> Result<()>;

    async fn send_file(
        &mut self,
        target: &str,
        filename: &str,
        data: Vec<u8>,
        caption: Option<&str>,
    ) -> Result<()>;
}

/// Builds fresh client instances; injected at composition time.
pub trait TelegramClientFactory: Send + Sync {
    fn create(&self) -> Box<dyn TelegramClient>;
}

/// Placeholder client for deployments without an MTProto implementation
/// wired in; every network call fails as an upstream error.
pub struct UnconfiguredTelegramClient {
    session: String,
}

impl UnconfiguredTelegramClient {
    pub fn new() -> Self {
        Self {
            session: String::new(),
        }
    }

    fn unavailable<T>(&self) -> Result<T> {
        Err(MessengerError::Upstream(
            "telegram client is not configured for this deployment".to_string(),
        ))
    }
}

impl Default for UnconfiguredTelegramClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TelegramClient for UnconfiguredTelegramClient {
    fn set_session_string(&mut self, session: &str) {
        self.session = session.to_string();
    }

    fn session_string(&self) -> String {
        self.session.clone()
    }

    async fn send_code_request(&mut self, _phone_number: &str) -> Result<SentCode> {
        self.unavailable()
    }

    async fn sign_in(&mut self, _phone: &str, _code: &str, _hash: &str) -> Result<()> {
        self.unavailable()
    }

    async fn sign_in_with_password(&mut self, _password: &str) -> Result<()> {
        self.unavailable()
    }

    async fn disconnect(&mut self) -> Result<()> {
        Ok(())
    }

    async fn send_message(&mut self, _target: &str, _text: &str) -> Result<()> {
        self.unavailable()
    }

    async fn send_file(
        &mut self,
        _target: &str,
        _filename: &str,
        _data: Vec<u8>,
        _caption: Option<&str>,
    ) -> Result<()> {
        self.unavailable()
    }
}

pub struct UnconfiguredTelegramClientFactory;

impl TelegramClientFactory for UnconfiguredTelegramClientFactory {
    fn create(&self) -> Box<dyn TelegramClient> {
        Box::new(UnconfiguredTelegramClient::new())
    }
}

pub struct TelegramMessenger {
    client: Box<dyn TelegramClient>,
    file_store: Arc<dyn FileStore>,
    is_valid: bool,
}

impl TelegramMessenger {
    pub fn new(client: Box<dyn TelegramClient>, file_store: Arc<dyn FileStore>) -> Self {
        Self {
            client,
            file_store,
            is_valid: false,
        }
    }

    pub fn with_session(mut self, session: &Session) -> std::result::Result<Self, CourierError> {
        if session.messenger_type != MessengerType::Telegram {
            return Err(CourierError::validation(
                "session network must be TELEGRAM for the Telegram adapter",
            ));
        }
        self.client
            .set_session_string(session.auth.session_str().unwrap_or_default());
        Ok(self)
    }

    /// Preference order: id, then username, then phone number.
    fn resolve_target(contact: &Contact) -> Result<String> {
        if let Some(id) = contact.id.as_deref().filter(|s| !s.is_empty()) {
            return Ok(id.to_string());
        }
        if let Some(username) = contact.username.as_deref().filter(|s| !s.is_empty()) {
            return Ok(username.to_string());
        }
        if let Some(phone) = contact.phone_number.as_deref().filter(|s| !s.is_empty()) {
            return Ok(phone.to_string());
        }
        Err(MessengerError::Validation(
            "Telegram contact must have at least id, username, or phone_number".to_string(),
        ))
    }

    fn filename_for(file: &File) -> String {
        let name = file.name.trim();
        if !name.is_empty() {
            return name.to_string();
        }

        let ct = file
            .content_type
            .as_deref()
            .unwrap_or_default()
            .split(';')
            .next()
            .unwrap_or_default()
            .trim();
        let extension = mime_guess::get_mime_extensions_str(ct)
            .and_then(|exts| exts.first())
            .copied()
            .unwrap_or("bin");
        format!("file.{extension}")
    }

    async fn file_to_bytes(&self, file: &File) -> Result<Vec<u8>> {
        if let Some(inline) = &file.base64 {
            let encoded = match inline.split_once(',') {
                Some((prefix, rest)) if prefix.starts_with("data:") => rest,
                _ => inline.as_str(),
            };
            return base64::engine::general_purpose::STANDARD
                .decode(encoded.trim())
                .map_err(|e| MessengerError::Validation(format!("invalid inline base64: {e}")));
        }

        self.file_store
            .read(&file.uri)
            .await
            .map_err(|e| MessengerError::Upstream(e.to_string()))
    }
}

#[async_trait]
impl Messenger for TelegramMessenger {
    async fn send_text(&mut self, contact: &Contact, text: &str) -> Result<()> {
        let target = Self::resolve_target(contact)?;
        self.client.send_message(&target, text).await
    }

    async fn send_media(&mut self, contact: &Contact, text: Option<&str>, file: &File) -> Result<()> {
        let target = Self::resolve_target(contact)?;
        let data = self.file_to_bytes(file).await?;
        let filename = Self::filename_for(file);
        self.client.send_file(&target, &filename, data, text).await
    }

    fn otp_auth(&mut self) -> Option<&mut dyn OtpAuth> {
        Some(self)
    }

    fn two_factor_auth(&mut self) -> Option<&mut dyn TwoFactorAuth> {
        Some(self)
    }
}

#[async_trait]
impl OtpAuth for TelegramMessenger {
    fn is_valid(&self) -> bool {
        self.is_valid
    }

    async fn login(&mut self, phone_number: &str) -> Result<OtpLoginStart> {
        let sent = self.client.send_code_request(phone_number).await?;
        let session_str = self.client.session_string();
        self.client.disconnect().await?;

        Ok(OtpLoginStart {
            session_str,
            otp_context: sent.phone_code_hash,
        })
    }

    async fn validate_otp(
        &mut self,
        otp: &str,
        phone_number: &str,
        otp_context: &str,
    ) -> Result<OtpValidation> {
        match self.client.sign_in(phone_number, otp, otp_context).await {
            Ok(()) => {
                self.is_valid = true;
                self.client.disconnect().await?;
                Ok(OtpValidation::Authorized {
                    session_str: self.client.session_string(),
                })
            }
            Err(MessengerError::SessionPasswordNeeded) => {
                // 2FA enabled on the account; caller switches flows
                self.is_valid = false;
                self.client.disconnect().await?;
                Ok(OtpValidation::TwoFactorRequired {
                    session_str: self.client.session_string(),
                })
            }
            Err(e) => {
                self.is_valid = false;
                self.client.disconnect().await?;
                Err(e)
            }
        }
    }
}

#[async_trait]
impl TwoFactorAuth for TelegramMessenger {
    fn is_valid(&self) -> bool {
        self.is_valid
    }

    async fn two_factor_authenticate(&mut self, password: &str) -> Result<String> {
        match self.client.sign_in_with_password(password).await {
            Ok(()) => {
                self.is_valid = true;
                self.client.disconnect().await?;
                Ok(self.client.session_string())
            }
            Err(e) => {
                self.is_valid = false;
                self.client.disconnect().await?;
                Err(e)
            }
        }
    }
}

pub struct TelegramMessengerFactory {
    clients: Arc<dyn TelegramClientFactory>,
    file_store: Arc<dyn FileStore>,
}

impl TelegramMessengerFactory {
    pub fn new(clients: Arc<dyn TelegramClientFactory>, file_store: Arc<dyn FileStore>) -> Self {
        Self {
            clients,
            file_store,
        }
    }
}

impl MessengerFactory for TelegramMessengerFactory {
    fn describe(&self) -> MessengerDescriptor {
        MessengerDescriptor::new(MessengerType::Telegram, "Telegram")
            .with_auth_method("otp")
            .with_auth_method("2fa_password")
            .with_contact_identifier("phone_number")
            .with_contact_identifier("username")
            .with_contact_identifier("user_id")
    }

    fn bind(&self, session: &Session) -> std::result::Result<Box<dyn Messenger>, CourierError> {
        let messenger = TelegramMessenger::new(self.clients.create(), self.file_store.clone())
            .with_session(session)?;
        Ok(Box::new(messenger))
    }

    fn unbound(&self) -> std::result::Result<Box<dyn Messenger>, CourierError> {
        Ok(Box::new(TelegramMessenger::new(
            self.clients.create(),
            self.file_store.clone(),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_files::InMemoryFileStore;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockState {
        session: String,
        sent_texts: Vec<(String, String)>,
        sent_files: Vec<(String, String, usize, Option<String>)>,
        sign_in_result: Option<MessengerError>,
        password_result: Option<MessengerError>,
    }

    struct MockTelegramClient {
        state: Arc<Mutex<MockState>>,
    }

    #[async_trait]
    impl TelegramClient for MockTelegramClient {
        fn set_session_string(&mut self, session: &str) {
            self.state.lock().unwrap().session = session.to_string();
        }

        fn session_string(&self) -> String {
            self.state.lock().unwrap().session.clone()
        }

        async fn send_code_request(&mut self, _phone_number: &str) -> Result<SentCode> {
            self.state.lock().unwrap().session = "fresh-session".to_string();
            Ok(SentCode {
                phone_code_hash: "hash-123".to_string(),
            })
        }

        async fn sign_in(&mut self, _phone: &str, _code: &str, _hash: &str) -> Result<()> {
            let result = self.state.lock().unwrap().sign_in_result.take();
            match result {
                Some(e) => Err(e),
                None => {
                    self.state.lock().unwrap().session = "authorized-session".to_string();
                    Ok(())
                }
            }
        }

        async fn sign_in_with_password(&mut self, _password: &str) -> Result<()> {
            let result = self.state.lock().unwrap().password_result.take();
            match result {
                Some(e) => Err(e),
                None => {
                    self.state.lock().unwrap().session = "2fa-session".to_string();
                    Ok(())
                }
            }
        }

        async fn disconnect(&mut self) -> Result<()> {
            Ok(())
        }

        async fn send_message(&mut self, target: &str, text: &str) -> Result<()> {
            self.state
                .lock()
                .unwrap()
                .sent_texts
                .push((target.to_string(), text.to_string()));
            Ok(())
        }

        async fn send_file(
            &mut self,
            target: &str,
            filename: &str,
            data: Vec<u8>,
            caption: Option<&str>,
        ) -> Result<()> {
            self.state.lock().unwrap().sent_files.push((
                target.to_string(),
                filename.to_string(),
                data.len(),
                caption.map(|s| s.to_string()),
            ));
            Ok(())
        }
    }

    fn messenger_with_state() -> (TelegramMessenger, Arc<Mutex<MockState>>, Arc<InMemoryFileStore>) {
        let state = Arc::new(Mutex::new(MockState::default()));
        let store = Arc::new(InMemoryFileStore::new());
        let messenger = TelegramMessenger::new(
            Box::new(MockTelegramClient {
                state: state.clone(),
            }),
            store.clone(),
        );
        (messenger, state, store)
    }

    fn contact(id: Option<&str>, username: Option<&str>, phone: Option<&str>) -> Contact {
        Contact::new(
            MessengerType::Telegram,
            id.map(|s| s.to_string()),
            username.map(|s| s.to_string()),
            phone.map(|s| s.to_string()),
        )
        .unwrap()
    }

    #[test]
    fn test_target_resolution_prefers_id_then_username_then_phone() {
        let c = contact(Some("9"), Some("alice"), Some("+100"));
        assert_eq!(TelegramMessenger::resolve_target(&c).unwrap(), "9");

        let c = contact(None, Some("alice"), Some("+100"));
        assert_eq!(TelegramMessenger::resolve_target(&c).unwrap(), "alice");

        let c = contact(None, None, Some("+100"));
        assert_eq!(TelegramMessenger::resolve_target(&c).unwrap(), "+100");
    }

    #[test]
    fn test_filename_falls_back_to_content_type() {
        let file = File::new("mem://a", "report.pdf");
        assert_eq!(TelegramMessenger::filename_for(&file), "report.pdf");

        let file = File::new("mem://a", "  ").with_content_type(Some("image/png".to_string()));
        assert_eq!(TelegramMessenger::filename_for(&file), "file.png");

        let file = File::new("mem://a", "");
        assert_eq!(TelegramMessenger::filename_for(&file), "file.bin");
    }

    #[tokio::test]
    async fn test_send_text_uses_resolved_target() {
        let (mut messenger, state, _) = messenger_with_state();
        messenger
            .send_text(&contact(None, Some("alice"), None), "hi")
            .await
            .unwrap();
        let sent = state.lock().unwrap().sent_texts.clone();
        assert_eq!(sent, vec![("alice".to_string(), "hi".to_string())]);
    }

    #[tokio::test]
    async fn test_send_media_reads_store_bytes() {
        let (mut messenger, state, store) = messenger_with_state();
        store.put("mem://attachments/pic.png", b"png-data");

        let file = File::new("mem://attachments/pic.png", "pic.png");
        messenger
            .send_media(&contact(None, Some("alice"), None), Some("look"), &file)
            .await
            .unwrap();

        let files = state.lock().unwrap().sent_files.clone();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].1, "pic.png");
        assert_eq!(files[0].2, b"png-data".len());
        assert_eq!(files[0].3.as_deref(), Some("look"));
    }

    #[tokio::test]
    async fn test_send_media_prefers_inline_base64() {
        let (mut messenger, state, _) = messenger_with_state();

        let mut file = File::new("mem://missing", "blob.bin");
        file.base64 = Some("data:application/octet-stream;base64,aGVsbG8=".to_string());
        messenger
            .send_media(&contact(None, Some("alice"), None), None, &file)
            .await
            .unwrap();

        let files = state.lock().unwrap().sent_files.clone();
        assert_eq!(files[0].2, b"hello".len());
    }

    #[tokio::test]
    async fn test_otp_login_returns_session_and_context() {
        let (mut messenger, _, _) = messenger_with_state();
        let start = OtpAuth::login(&mut messenger, "+100").await.unwrap();
        assert_eq!(start.session_str, "fresh-session");
        assert_eq!(start.otp_context, "hash-123");
        assert!(!OtpAuth::is_valid(&messenger));
    }

    #[tokio::test]
    async fn test_validate_otp_success_marks_valid() {
        let (mut messenger, _, _) = messenger_with_state();
        let outcome = messenger.validate_otp("12345", "+100", "hash").await.unwrap();
        assert_eq!(outcome.session_str(), "authorized-session");
        assert!(matches!(outcome, OtpValidation::Authorized { .. }));
        assert!(OtpAuth::is_valid(&messenger));
    }

    #[tokio::test]
    async fn test_validate_otp_invalid_code() {
        let (mut messenger, state, _) = messenger_with_state();
        state.lock().unwrap().sign_in_result = Some(MessengerError::InvalidCode);
        let err = messenger.validate_otp("999", "+100", "hash").await.unwrap_err();
        assert!(matches!(err, MessengerError::InvalidCode));
        assert!(!OtpAuth::is_valid(&messenger));
    }

    #[tokio::test]
    async fn test_validate_otp_expired_code() {
        let (mut messenger, state, _) = messenger_with_state();
        state.lock().unwrap().sign_in_result = Some(MessengerError::ExpiredCode);
        let err = messenger.validate_otp("999", "+100", "hash").await.unwrap_err();
        assert!(matches!(err, MessengerError::ExpiredCode));
    }

    #[tokio::test]
    async fn test_validate_otp_two_factor_account_stays_invalid() {
        let (mut messenger, state, _) = messenger_with_state();
        state.lock().unwrap().sign_in_result = Some(MessengerError::SessionPasswordNeeded);
        let outcome = messenger.validate_otp("12345", "+100", "hash").await.unwrap();
        assert!(matches!(outcome, OtpValidation::TwoFactorRequired { .. }));
        assert!(!OtpAuth::is_valid(&messenger));
    }

    #[tokio::test]
    async fn test_two_factor_authenticate() {
        let (mut messenger, _, _) = messenger_with_state();
        let session = messenger.two_factor_authenticate("secret").await.unwrap();
        assert_eq!(session, "2fa-session");
        assert!(TwoFactorAuth::is_valid(&messenger));
    }

    #[tokio::test]
    async fn test_two_factor_invalid_password() {
        let (mut messenger, state, _) = messenger_with_state();
        state.lock().unwrap().password_result = Some(MessengerError::InvalidPassword);
        let err = messenger.two_factor_authenticate("bad").await.unwrap_err();
        assert!(matches!(err, MessengerError::InvalidPassword));
        assert!(!TwoFactorAuth::is_valid(&messenger));
    }

    #[test]
    fn test_factory_descriptor() {
        let factory = TelegramMessengerFactory::new(
            Arc::new(UnconfiguredTelegramClientFactory),
            Arc::new(InMemoryFileStore::new()),
        );
        let descriptor = factory.describe();
        assert_eq!(descriptor.messenger_type, MessengerType::Telegram);
        assert!(descriptor.auth_methods.contains("otp"));
        assert!(descriptor.auth_methods.contains("2fa_password"));
        assert!(!descriptor.auth_methods.contains("qr"));
        assert_eq!(descriptor.contact_identifiers.len(), 3);
    }

    #[test]
    fn test_bind_rejects_wrong_network() {
        let factory = TelegramMessengerFactory::new(
            Arc::new(UnconfiguredTelegramClientFactory),
            Arc::new(InMemoryFileStore::new()),
        );
        let session = Session::whatsapp(1, "home", "+200").unwrap();
        assert!(factory.bind(&session).is_err());
    }
}
