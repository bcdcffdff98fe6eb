//! WhatsApp adapter (Network B: QR-based account/instance model) over an
//! Evolution-style HTTP API.
//!
//! Instances are keyed `"<title>-<uuid>"`; changing that scheme would break
//! existing instances on the upstream service.

use async_trait::async_trait;
use base64::Engine;
use courier_common::CourierError;
use courier_domain::{Contact, File, MessengerType, Session};
use courier_files::FileStore;
use serde_json::json;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::capabilities::QrAuth;
use crate::messenger::{
    Messenger, MessengerDescriptor, MessengerError, MessengerFactory, Result,
};

pub const DEFAULT_INTEGRATION: &str = "WHATSAPP-BAILEYS";

/// Media send request in the upstream service's vocabulary.
#[derive(Debug, Clone, PartialEq)]
pub struct SendMediaRequest {
    pub number: String,
    /// base64-encoded content
    pub media: String,
    pub mimetype: String,
    /// one of `image`, `video`, `document`
    pub mediatype: String,
    pub caption: Option<String>,
    pub file_name: String,
}

/// Evolution-style API port.
#[async_trait]
pub trait WhatsappApi: Send + Sync {
    async fn create_instance(&self, instance_name: &str, integration: &str) -> Result<()>;

    /// Returns the QR payload to render.
    async fn connect_instance(&self, instance_name: &str) -> Result<String>;

    async fn connection_state(&self, instance_name: &str) -> Result<String>;

    async fn send_text(&self, instance_name: &str, number: &str, text: &str) -> Result<()>;

    async fn send_media(&self, instance_name: &str, request: SendMediaRequest) -> Result<()>;
}

/// HTTP implementation against an Evolution-compatible endpoint.
pub struct WhatsappHttpApi {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl WhatsappHttpApi {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn check(response: reqwest::Response) -> Result<serde_json::Value> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MessengerError::Upstream(format!(
                "whatsapp api returned {status}: {body}"
            )));
        }
        response
            .json()
            .await
            .map_err(|e| MessengerError::Upstream(format!("invalid whatsapp api response: {e}")))
    }
}

#[async_trait]
impl WhatsappApi for WhatsappHttpApi {
    async fn create_instance(&self, instance_name: &str, integration: &str) -> Result<()> {
        let response = self
            .client
            .post(self.url("/instance/create"))
            .header("apikey", &self.api_key)
            .json(&json!({
                "instanceName": instance_name,
                "integration": integration,
                "qrcode": true,
            }))
            .send()
            .await
            .map_err(|e| MessengerError::Upstream(e.to_string()))?;

        Self::check(response).await?;
        Ok(())
    }

    async fn connect_instance(&self, instance_name: &str) -> Result<String> {
        let response = self
            .client
            .get(self.url(&format!("/instance/connect/{instance_name}")))
            .header("apikey", &self.api_key)
            .send()
            .await
            .map_err(|e| MessengerError::Upstream(e.to_string()))?;

        let body = Self::check(response).await?;
        body.get("code")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| {
                MessengerError::Upstream("whatsapp connect response missing 'code'".to_string())
            })
    }

    async fn connection_state(&self, instance_name: &str) -> Result<String> {
        let response = self
            .client
            .get(self.url(&format!("/instance/connectionState/{instance_name}")))
            .header("apikey", &self.api_key)
            .send()
            .await
            .map_err(|e| MessengerError::Upstream(e.to_string()))?;

        let body = Self::check(response).await?;
        let state = body
            .pointer("/instance/state")
            .or_else(|| body.get("state"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        Ok(state.to_string())
    }

    async fn send_text(&self, instance_name: &str, number: &str, text: &str) -> Result<()> {
        let response = self
            .client
            .post(self.url(&format!("/message/sendText/{instance_name}")))
            .header("apikey", &self.api_key)
            .json(&json!({"number": number, "text": text}))
            .send()
            .await
            .map_err(|e| MessengerError::Upstream(e.to_string()))?;

        Self::check(response).await?;
        Ok(())
    }

    async fn send_media(&self, instance_name: &str, request: SendMediaRequest) -> Result<()> {
        let response = self
            .client
            .post(self.url(&format!("/message/sendMedia/{instance_name}")))
            .header("apikey", &self.api_key)
            .json(&json!({
                "number": request.number,
                "mediatype": request.mediatype,
                "mimetype": request.mimetype,
                "caption": request.caption,
                "media": request.media,
                "fileName": request.file_name,
                "options": {"encoding": true},
            }))
            .send()
            .await
            .map_err(|e| MessengerError::Upstream(e.to_string()))?;

        Self::check(response).await?;
        Ok(())
    }
}

pub struct WhatsappMessenger {
    api: Arc<dyn WhatsappApi>,
    file_store: Arc<dyn FileStore>,
    session_title: String,
    session_uuid: Uuid,
}

impl WhatsappMessenger {
    pub fn new(
        api: Arc<dyn WhatsappApi>,
        file_store: Arc<dyn FileStore>,
        session: &Session,
    ) -> std::result::Result<Self, CourierError> {
        if session.messenger_type != MessengerType::Whatsapp {
            return Err(CourierError::validation(
                "session network must be WHATSAPP for the WhatsApp adapter",
            ));
        }
        let session_uuid = session.auth.uuid().ok_or_else(|| {
            CourierError::validation("WhatsApp session is missing its instance uuid")
        })?;

        Ok(Self {
            api,
            file_store,
            session_title: session.title.clone(),
            session_uuid,
        })
    }

    // Keep this stable: changing it breaks existing upstream instances.
    fn instance_name(&self) -> String {
        format!("{}-{}", self.session_title, self.session_uuid)
    }

    fn require_phone(contact: &Contact) -> Result<&str> {
        contact
            .phone_number
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                MessengerError::Validation(
                    "WhatsApp contact must have a phone number".to_string(),
                )
            })
    }

    fn mimetype_for(file: &File) -> String {
        if let Some(ct) = file.content_type.as_deref().filter(|s| !s.is_empty()) {
            return ct.to_string();
        }
        mime_guess::from_path(&file.name)
            .first_raw()
            .unwrap_or("application/octet-stream")
            .to_string()
    }

    fn mediatype_for(mimetype: &str) -> &'static str {
        if mimetype.starts_with("image/") {
            "image"
        } else if mimetype.starts_with("video/") {
            "video"
        } else {
            "document"
        }
    }

    async fn media_base64(&self, file: &File) -> Result<String> {
        if let Some(inline) = &file.base64 {
            return Ok(inline.clone());
        }
        let content = self
            .file_store
            .read(&file.uri)
            .await
            .map_err(|e| MessengerError::Upstream(e.to_string()))?;
        Ok(base64::engine::general_purpose::STANDARD.encode(content))
    }
}

#[async_trait]
impl Messenger for WhatsappMessenger {
    async fn send_text(&mut self, contact: &Contact, text: &str) -> Result<()> {
        let number = Self::require_phone(contact)?;
        self.api
            .send_text(&self.instance_name(), number, text)
            .await
    }

    async fn send_media(&mut self, contact: &Contact, text: Option<&str>, file: &File) -> Result<()> {
        let number = Self::require_phone(contact)?;
        let mimetype = Self::mimetype_for(file);
        let mediatype = Self::mediatype_for(&mimetype).to_string();
        let media = self.media_base64(file).await?;

        debug!(file = %file.name, mediatype = %mediatype, "Sending WhatsApp media");

        self.api
            .send_media(
                &self.instance_name(),
                SendMediaRequest {
                    number: number.to_string(),
                    media,
                    mimetype,
                    mediatype,
                    caption: text.map(|s| s.to_string()),
                    file_name: file.name.clone(),
                },
            )
            .await
    }

    fn qr_auth(&mut self) -> Option<&mut dyn QrAuth> {
        Some(self)
    }
}

#[async_trait]
impl QrAuth for WhatsappMessenger {
    async fn login(&mut self, integration: &str) -> Result<String> {
        let instance_name = self.instance_name();
        self.api.create_instance(&instance_name, integration).await?;
        self.api.connect_instance(&instance_name).await
    }
}

pub struct WhatsappMessengerFactory {
    api: Arc<dyn WhatsappApi>,
    file_store: Arc<dyn FileStore>,
}

impl WhatsappMessengerFactory {
    pub fn new(api: Arc<dyn WhatsappApi>, file_store: Arc<dyn FileStore>) -> Self {
        Self { api, file_store }
    }
}

impl MessengerFactory for WhatsappMessengerFactory {
    fn describe(&self) -> MessengerDescriptor {
        MessengerDescriptor::new(MessengerType::Whatsapp, "WhatsApp")
            .with_auth_method("qr")
            .with_contact_identifier("phone_number")
    }

    fn bind(&self, session: &Session) -> std::result::Result<Box<dyn Messenger>, CourierError> {
        Ok(Box::new(WhatsappMessenger::new(
            self.api.clone(),
            self.file_store.clone(),
            session,
        )?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_files::InMemoryFileStore;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockApiState {
        created: Vec<(String, String)>,
        texts: Vec<(String, String, String)>,
        media: Vec<(String, SendMediaRequest)>,
    }

    struct MockWhatsappApi {
        state: Mutex<MockApiState>,
    }

    impl MockWhatsappApi {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                state: Mutex::new(MockApiState::default()),
            })
        }
    }

    #[async_trait]
    impl WhatsappApi for MockWhatsappApi {
        async fn create_instance(&self, instance_name: &str, integration: &str) -> Result<()> {
            self.state
                .lock()
                .unwrap()
                .created
                .push((instance_name.to_string(), integration.to_string()));
            Ok(())
        }

        async fn connect_instance(&self, instance_name: &str) -> Result<String> {
            Ok(format!("qr-payload-for-{instance_name}"))
        }

        async fn connection_state(&self, _instance_name: &str) -> Result<String> {
            Ok("open".to_string())
        }

        async fn send_text(&self, instance_name: &str, number: &str, text: &str) -> Result<()> {
            self.state.lock().unwrap().texts.push((
                instance_name.to_string(),
                number.to_string(),
                text.to_string(),
            ));
            Ok(())
        }

        async fn send_media(&self, instance_name: &str, request: SendMediaRequest) -> Result<()> {
            self.state
                .lock()
                .unwrap()
                .media
                .push((instance_name.to_string(), request));
            Ok(())
        }
    }

    fn session() -> Session {
        Session::whatsapp(1, "home", "+200").unwrap()
    }

    fn contact() -> Contact {
        Contact::new(MessengerType::Whatsapp, None, None, Some("+300".to_string())).unwrap()
    }

    #[test]
    fn test_instance_name_is_title_dash_uuid() {
        let session = session();
        let messenger = WhatsappMessenger::new(
            MockWhatsappApi::new(),
            Arc::new(InMemoryFileStore::new()),
            &session,
        )
        .unwrap();
        let expected = format!("home-{}", session.auth.uuid().unwrap());
        assert_eq!(messenger.instance_name(), expected);
    }

    #[test]
    fn test_rejects_telegram_session() {
        let session = Session::telegram(1, "work", "+100", "blob").unwrap();
        let result = WhatsappMessenger::new(
            MockWhatsappApi::new(),
            Arc::new(InMemoryFileStore::new()),
            &session,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_mediatype_from_mimetype_prefix() {
        assert_eq!(WhatsappMessenger::mediatype_for("image/png"), "image");
        assert_eq!(WhatsappMessenger::mediatype_for("video/mp4"), "video");
        assert_eq!(WhatsappMessenger::mediatype_for("application/pdf"), "document");
        assert_eq!(WhatsappMessenger::mediatype_for("text/plain"), "document");
    }

    #[tokio::test]
    async fn test_send_text_posts_to_instance() {
        let api = MockWhatsappApi::new();
        let session = session();
        let mut messenger =
            WhatsappMessenger::new(api.clone(), Arc::new(InMemoryFileStore::new()), &session)
                .unwrap();

        messenger.send_text(&contact(), "hola").await.unwrap();

        let texts = api.state.lock().unwrap().texts.clone();
        assert_eq!(texts.len(), 1);
        assert_eq!(texts[0].1, "+300");
        assert_eq!(texts[0].2, "hola");
    }

    #[tokio::test]
    async fn test_send_media_encodes_bytes() {
        let api = MockWhatsappApi::new();
        let store = Arc::new(InMemoryFileStore::new());
        store.put("mem://pic.png", b"img");
        let session = session();
        let mut messenger = WhatsappMessenger::new(api.clone(), store, &session).unwrap();

        let file = File::new("mem://pic.png", "pic.png")
            .with_content_type(Some("image/png".to_string()));
        messenger
            .send_media(&contact(), Some("caption"), &file)
            .await
            .unwrap();

        let media = api.state.lock().unwrap().media.clone();
        assert_eq!(media.len(), 1);
        let request = &media[0].1;
        assert_eq!(request.mediatype, "image");
        assert_eq!(request.mimetype, "image/png");
        assert_eq!(
            request.media,
            base64::engine::general_purpose::STANDARD.encode(b"img")
        );
        assert_eq!(request.caption.as_deref(), Some("caption"));
        assert_eq!(request.file_name, "pic.png");
    }

    #[tokio::test]
    async fn test_qr_login_creates_and_connects_instance() {
        let api = MockWhatsappApi::new();
        let session = session();
        let mut messenger =
            WhatsappMessenger::new(api.clone(), Arc::new(InMemoryFileStore::new()), &session)
                .unwrap();

        let payload = QrAuth::login(&mut messenger, DEFAULT_INTEGRATION).await.unwrap();
        assert!(payload.starts_with("qr-payload-for-home-"));

        let created = api.state.lock().unwrap().created.clone();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].1, DEFAULT_INTEGRATION);
    }

    #[test]
    fn test_factory_descriptor() {
        let factory = WhatsappMessengerFactory::new(
            MockWhatsappApi::new(),
            Arc::new(InMemoryFileStore::new()),
        );
        let descriptor = factory.describe();
        assert_eq!(descriptor.messenger_type, MessengerType::Whatsapp);
        assert!(descriptor.auth_methods.contains("qr"));
        assert!(!descriptor.auth_methods.contains("otp"));
        assert_eq!(
            descriptor.contact_identifiers,
            std::collections::BTreeSet::from(["phone_number".to_string()])
        );
    }
}
