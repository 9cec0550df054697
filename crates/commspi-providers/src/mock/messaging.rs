//! One-to-one instant messages.

use std::any::Any;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use commspi_core::ListenerRegistry;
use tracing::debug;

use super::contact::Contact;
use super::context::{ProviderContext, next_id};
use crate::error::{OperationFailedCode, ProviderResult};
use crate::operation_set::{OperationSet, OperationSetKind};

/// Content type used when none is given.
pub const DEFAULT_MIME_TYPE: &str = "text/plain";

/// Encoding used when none is given.
pub const DEFAULT_MIME_ENCODING: &str = "UTF-8";

const HTML_MIME_TYPE: &str = "text/html";

/// A text message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub uid: String,
    pub content: String,
    pub content_type: String,
    pub encoding: String,
    pub subject: Option<String>,
}

impl Message {
    /// Creates a plain-text message with a fresh uid.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            uid: next_id(),
            content: text.into(),
            content_type: DEFAULT_MIME_TYPE.to_string(),
            encoding: DEFAULT_MIME_ENCODING.to_string(),
            subject: None,
        }
    }

    /// Content size in bytes.
    pub fn size(&self) -> usize {
        self.content.len()
    }
}

#[derive(Debug, Clone)]
pub struct MessageReceivedEvent {
    pub message: Message,
    pub from: Arc<Contact>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct MessageDeliveredEvent {
    pub message: Message,
    pub to: Arc<Contact>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct MessageDeliveryFailedEvent {
    pub message: Message,
    pub to: Arc<Contact>,
    pub error_code: OperationFailedCode,
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

pub trait MessageListener: Send + Sync {
    fn message_received(&self, _event: &MessageReceivedEvent) {}
    fn message_delivered(&self, _event: &MessageDeliveredEvent) {}
    fn message_delivery_failed(&self, _event: &MessageDeliveryFailedEvent) {}
}

/// Basic instant messaging operation set of the mock provider.
///
/// Sending always succeeds immediately while the provider is registered.
/// Incoming messages and delivery failures are injected with
/// [`deliver_message`](Self::deliver_message) and
/// [`fail_message`](Self::fail_message).
#[derive(Debug)]
pub struct BasicInstantMessaging {
    context: Arc<ProviderContext>,
    listeners: ListenerRegistry<dyn MessageListener>,
}

impl BasicInstantMessaging {
    pub(crate) fn new(context: Arc<ProviderContext>) -> Self {
        Self {
            context,
            listeners: ListenerRegistry::new(),
        }
    }

    /// Creates a plain-text message.
    pub fn create_message(&self, text: &str) -> Message {
        Message::new(text)
    }

    /// Creates a message from raw content. Invalid UTF-8 is replaced.
    pub fn create_message_with(
        &self,
        content: &[u8],
        content_type: &str,
        encoding: &str,
        subject: Option<&str>,
    ) -> Message {
        Message {
            uid: next_id(),
            content: String::from_utf8_lossy(content).into_owned(),
            content_type: content_type.to_string(),
            encoding: encoding.to_string(),
            subject: subject.map(str::to_string),
        }
    }

    /// Sends `message` to `to`.
    ///
    /// # Errors
    ///
    /// Fails with `ProviderNotRegistered` when the provider is signed off.
    pub fn send_message(&self, to: &Arc<Contact>, message: Message) -> ProviderResult<()> {
        self.context.ensure_registered("send a message")?;
        debug!(to = %to.address(), uid = %message.uid, "Message delivered");
        let event = MessageDeliveredEvent {
            message,
            to: to.clone(),
            timestamp: Utc::now(),
        };
        self.listeners.dispatch(|l| l.message_delivered(&event));
        Ok(())
    }

    /// Simulates `message` arriving from `from`.
    pub fn deliver_message(&self, message: Message, from: &Arc<Contact>) {
        let event = MessageReceivedEvent {
            message,
            from: from.clone(),
            timestamp: Utc::now(),
        };
        self.listeners.dispatch(|l| l.message_received(&event));
    }

    /// Simulates a failure to deliver `message` to `to`.
    pub fn fail_message(
        &self,
        to: &Arc<Contact>,
        message: Message,
        error_code: OperationFailedCode,
        reason: Option<&str>,
    ) {
        debug!(to = %to.address(), uid = %message.uid, code = %error_code, "Message delivery failed");
        let event = MessageDeliveryFailedEvent {
            message,
            to: to.clone(),
            error_code,
            reason: reason.map(str::to_string),
            timestamp: Utc::now(),
        };
        self.listeners
            .dispatch(|l| l.message_delivery_failed(&event));
    }

    /// Messages to offline contacts are not stored.
    pub fn is_offline_messaging_supported(&self) -> bool {
        false
    }

    pub fn is_content_type_supported(&self, content_type: &str) -> bool {
        content_type.eq_ignore_ascii_case(DEFAULT_MIME_TYPE)
            || content_type.eq_ignore_ascii_case(HTML_MIME_TYPE)
    }

    pub fn add_message_listener(&self, listener: Arc<dyn MessageListener>) {
        self.listeners.add(listener);
    }

    pub fn remove_message_listener(&self, listener: &Arc<dyn MessageListener>) {
        self.listeners.remove(listener);
    }
}

impl OperationSet for BasicInstantMessaging {
    fn kind(&self) -> OperationSetKind {
        OperationSetKind::BasicInstantMessaging
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::config::MockProviderConfig;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Inbox {
        log: Mutex<Vec<String>>,
    }

    impl MessageListener for Inbox {
        fn message_received(&self, e: &MessageReceivedEvent) {
            self.log
                .lock()
                .unwrap()
                .push(format!("from {}: {}", e.from.address(), e.message.content));
        }

        fn message_delivered(&self, e: &MessageDeliveredEvent) {
            self.log
                .lock()
                .unwrap()
                .push(format!("to {}: {}", e.to.address(), e.message.content));
        }

        fn message_delivery_failed(&self, e: &MessageDeliveryFailedEvent) {
            self.log
                .lock()
                .unwrap()
                .push(format!("failed to {}: {}", e.to.address(), e.error_code));
        }
    }

    fn messaging(registered: bool) -> (BasicInstantMessaging, Arc<Inbox>) {
        let config = MockProviderConfig::default().with_start_registered(registered);
        let messaging = BasicInstantMessaging::new(Arc::new(ProviderContext::new(config)));
        let inbox = Arc::new(Inbox::default());
        messaging.add_message_listener(inbox.clone());
        (messaging, inbox)
    }

    #[test]
    fn create_message_defaults() {
        let (messaging, _) = messaging(true);
        let message = messaging.create_message("hello");
        assert_eq!(message.content, "hello");
        assert_eq!(message.content_type, "text/plain");
        assert_eq!(message.encoding, "UTF-8");
        assert_eq!(message.size(), 5);
        assert!(message.subject.is_none());
        assert_ne!(message.uid, messaging.create_message("hello").uid);
    }

    #[test]
    fn create_message_from_bytes() {
        let (messaging, _) = messaging(true);
        let message = messaging.create_message_with(
            b"<b>hi</b>\xff",
            "text/html",
            "ISO-8859-1",
            Some("greeting"),
        );
        assert_eq!(message.content, "<b>hi</b>\u{fffd}");
        assert_eq!(message.content_type, "text/html");
        assert_eq!(message.encoding, "ISO-8859-1");
        assert_eq!(message.subject.as_deref(), Some("greeting"));
    }

    #[test]
    fn send_receive_and_fail() {
        let (messaging, inbox) = messaging(true);
        let alice = Contact::new("alice");

        messaging
            .send_message(&alice, messaging.create_message("hi"))
            .unwrap();
        messaging.deliver_message(messaging.create_message("hey"), &alice);
        messaging.fail_message(
            &alice,
            messaging.create_message("lost"),
            OperationFailedCode::NetworkFailure,
            Some("timeout"),
        );

        assert_eq!(
            *inbox.log.lock().unwrap(),
            vec!["to alice: hi", "from alice: hey", "failed to alice: network_failure"]
        );
    }

    #[test]
    fn sending_requires_registration() {
        let (messaging, inbox) = messaging(false);
        let err = messaging
            .send_message(&Contact::new("bob"), messaging.create_message("hi"))
            .unwrap_err();
        assert_eq!(err.code(), OperationFailedCode::ProviderNotRegistered);
        assert!(inbox.log.lock().unwrap().is_empty());
    }

    #[test]
    fn content_types() {
        let (messaging, _) = messaging(true);
        assert!(messaging.is_content_type_supported("text/plain"));
        assert!(messaging.is_content_type_supported("TEXT/HTML"));
        assert!(!messaging.is_content_type_supported("image/png"));
        assert!(!messaging.is_offline_messaging_supported());
    }
}
