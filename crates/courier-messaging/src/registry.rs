//! Messenger capability registry.
//!
//! The single place where "what a network can do" is centralised: use cases
//! query descriptors before dispatching auth steps, and the send loop asks
//! it for an adapter bound to a session. One adapter instance is built per
//! call, so nothing stateful is ever shared across tasks.

use courier_common::CourierError;
use courier_domain::{MessengerType, Session};
use std::collections::HashMap;
use std::sync::Arc;

use crate::messenger::{Messenger, MessengerDescriptor, MessengerFactory};

pub struct MessengerRegistry {
    factories: HashMap<MessengerType, Arc<dyn MessengerFactory>>,
}

impl MessengerRegistry {
    pub fn new(factories: HashMap<MessengerType, Arc<dyn MessengerFactory>>) -> Self {
        Self { factories }
    }

    pub fn describe_all(&self) -> Vec<MessengerDescriptor> {
        let mut descriptors: Vec<MessengerDescriptor> =
            self.factories.values().map(|f| f.describe()).collect();
        descriptors.sort_by_key(|d| d.messenger_type.as_str());
        descriptors
    }

    pub fn describe(&self, messenger_type: MessengerType) -> Option<MessengerDescriptor> {
        self.factories.get(&messenger_type).map(|f| f.describe())
    }

    pub fn factory(
        &self,
        messenger_type: MessengerType,
    ) -> Result<Arc<dyn MessengerFactory>, CourierError> {
        self.factories.get(&messenger_type).cloned().ok_or_else(|| {
            CourierError::validation(format!("No messenger registered for {messenger_type}"))
        })
    }

    /// A fresh adapter bound to `session`, looked up by the session's
    /// network tag.
    pub fn for_session(&self, session: &Session) -> Result<Box<dyn Messenger>, CourierError> {
        self.factory(session.messenger_type)?.bind(session)
    }

    /// A fresh unbound adapter, for auth flows that create the session.
    pub fn unbound(&self, messenger_type: MessengerType) -> Result<Box<dyn Messenger>, CourierError> {
        self.factory(messenger_type)?.unbound()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messenger::MessengerError;
    use async_trait::async_trait;
    use courier_domain::{Contact, File};

    struct FakeMessenger;

    #[async_trait]
    impl Messenger for FakeMessenger {
        async fn send_text(&mut self, _contact: &Contact, _text: &str) -> crate::messenger::Result<()> {
            Ok(())
        }

        async fn send_media(
            &mut self,
            _contact: &Contact,
            _text: Option<&str>,
            _file: &File,
        ) -> crate::messenger::Result<()> {
            Err(MessengerError::Upstream("no media in fake".to_string()))
        }
    }

    struct FakeFactory;

    impl MessengerFactory for FakeFactory {
        fn describe(&self) -> MessengerDescriptor {
            MessengerDescriptor::new(MessengerType::Telegram, "Fake")
                .with_auth_method("otp")
                .with_contact_identifier("username")
        }

        fn bind(&self, _session: &Session) -> Result<Box<dyn Messenger>, CourierError> {
            Ok(Box::new(FakeMessenger))
        }
    }

    fn registry() -> MessengerRegistry {
        let mut factories: HashMap<MessengerType, Arc<dyn MessengerFactory>> = HashMap::new();
        factories.insert(MessengerType::Telegram, Arc::new(FakeFactory));
        MessengerRegistry::new(factories)
    }

    #[test]
    fn test_describe_all() {
        let descriptors = registry().describe_all();
        assert_eq!(descriptors.len(), 1);
        assert!(descriptors[0].features.contains("send_text"));
        assert!(descriptors[0].features.contains("send_media"));
        assert!(descriptors[0].auth_methods.contains("otp"));
        assert!(!descriptors[0].auth_methods.contains("qr"));
    }

    #[test]
    fn test_for_session_binds_by_network() {
        let registry = registry();
        let session = Session::telegram(1, "work", "+100", "blob").unwrap();
        assert!(registry.for_session(&session).is_ok());

        let session = Session::whatsapp(1, "home", "+200").unwrap();
        assert!(registry.for_session(&session).is_err());
    }

    #[test]
    fn test_unbound_defaults_to_rejection() {
        let registry = registry();
        assert!(registry.unbound(MessengerType::Telegram).is_err());
    }
}
