//! The mock protocol provider.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use commspi_core::{AccountId, ListenerRegistry};
use tracing::{info, warn};

use super::config::MockProviderConfig;
use super::context::ProviderContext;
use super::file_transfer::FileTransferOperations;
use super::messaging::BasicInstantMessaging;
use super::multi_user_chat::MultiUserChat;
use super::presence::PersistentPresence;
use super::telephony::BasicTelephony;
use crate::error::{OperationFailed, ProviderResult};
use crate::operation_set::{OperationSet, OperationSetKind, OperationSetRegistry};
use crate::provider::{
    ProtocolProvider, RegistrationReason, RegistrationState, RegistrationStateChangeEvent,
    RegistrationStateChangeListener,
};

/// An in-memory provider supporting presence, telephony, instant
/// messaging, chat rooms and file transfer.
///
/// Each operation set is created once, when the provider is built.
pub struct MockProvider {
    context: Arc<ProviderContext>,
    presence: Arc<PersistentPresence>,
    telephony: Arc<BasicTelephony>,
    messaging: Arc<BasicInstantMessaging>,
    multi_user_chat: Arc<MultiUserChat>,
    file_transfer: Arc<FileTransferOperations>,
    operation_sets: OperationSetRegistry,
    registration_listeners: ListenerRegistry<dyn RegistrationStateChangeListener>,
}

impl MockProvider {
    /// Builds a provider from `config`.
    ///
    /// # Errors
    ///
    /// Fails with `IllegalArgument` when the configured initial status is
    /// not a mock status.
    pub fn new(config: MockProviderConfig) -> ProviderResult<Self> {
        let initial_status = config.initial_presence_status().map_err(|e| {
            OperationFailed::illegal_argument("invalid mock provider configuration")
                .with_provider(MockProviderConfig::PROTOCOL_NAME)
                .with_source(e)
        })?;

        let context = Arc::new(ProviderContext::new(config));
        let presence = Arc::new(PersistentPresence::new(context.clone(), initial_status));
        let telephony = BasicTelephony::new(context.clone());
        let messaging = Arc::new(BasicInstantMessaging::new(context.clone()));
        let multi_user_chat = MultiUserChat::new(context.clone());
        let file_transfer = Arc::new(FileTransferOperations::new(context.clone()));

        let operation_sets = OperationSetRegistry::new()
            .with(presence.clone())
            .with(telephony.clone())
            .with(messaging.clone())
            .with(multi_user_chat.clone())
            .with(file_transfer.clone());

        info!(
            account = %context.account(),
            state = %context.registration_state(),
            "Mock provider created"
        );

        Ok(Self {
            context,
            presence,
            telephony,
            messaging,
            multi_user_chat,
            file_transfer,
            operation_sets,
            registration_listeners: ListenerRegistry::new(),
        })
    }

    /// Builds a provider for `user_id` with every other setting at its
    /// default.
    pub fn for_user(user_id: impl Into<String>) -> ProviderResult<Self> {
        Self::new(MockProviderConfig::new(user_id))
    }

    pub fn config(&self) -> &MockProviderConfig {
        self.context.config()
    }

    pub fn presence(&self) -> &Arc<PersistentPresence> {
        &self.presence
    }

    pub fn telephony(&self) -> &Arc<BasicTelephony> {
        &self.telephony
    }

    pub fn messaging(&self) -> &Arc<BasicInstantMessaging> {
        &self.messaging
    }

    pub fn multi_user_chat(&self) -> &Arc<MultiUserChat> {
        &self.multi_user_chat
    }

    pub fn file_transfer(&self) -> &Arc<FileTransferOperations> {
        &self.file_transfer
    }

    /// Returns the operation set for `kind` as its concrete type.
    pub fn operation_set_as<T: OperationSet>(&self, kind: OperationSetKind) -> Option<Arc<T>> {
        self.operation_sets.get_as(kind)
    }

    fn set_registration_state(
        &self,
        new_state: RegistrationState,
        reason_code: RegistrationReason,
        reason: Option<&str>,
    ) {
        let Some(old_state) = self.context.set_registration_state(new_state) else {
            return;
        };
        info!(
            account = %self.context.account(),
            old = %old_state,
            new = %new_state,
            "Registration state changed"
        );
        let event = RegistrationStateChangeEvent {
            account: self.context.account().clone(),
            old_state,
            new_state,
            reason_code,
            reason: reason.map(str::to_string),
            timestamp: Utc::now(),
        };
        self.registration_listeners
            .dispatch(|l| l.registration_state_changed(&event));
    }

    /// Simulates the connection dropping.
    pub fn fail_connection(&self, reason: &str) {
        warn!(account = %self.context.account(), reason, "Connection lost");
        self.set_registration_state(
            RegistrationState::ConnectionFailed,
            RegistrationReason::ConnectionLost,
            Some(reason),
        );
    }
}

impl ProtocolProvider for MockProvider {
    fn protocol_name(&self) -> &str {
        self.context.protocol_name()
    }

    fn account_id(&self) -> &AccountId {
        self.context.account()
    }

    fn registration_state(&self) -> RegistrationState {
        self.context.registration_state()
    }

    fn register(&self) -> ProviderResult<()> {
        self.set_registration_state(
            RegistrationState::Registered,
            RegistrationReason::UserRequest,
            None,
        );
        Ok(())
    }

    fn unregister(&self) -> ProviderResult<()> {
        self.set_registration_state(
            RegistrationState::Unregistered,
            RegistrationReason::UserRequest,
            None,
        );
        Ok(())
    }

    fn operation_set(&self, kind: OperationSetKind) -> Option<Arc<dyn OperationSet>> {
        self.operation_sets.get(kind)
    }

    fn supported_operation_sets(&self) -> Vec<OperationSetKind> {
        self.operation_sets.supported()
    }

    fn add_registration_state_change_listener(
        &self,
        listener: Arc<dyn RegistrationStateChangeListener>,
    ) {
        self.registration_listeners.add(listener);
    }

    fn remove_registration_state_change_listener(
        &self,
        listener: &Arc<dyn RegistrationStateChangeListener>,
    ) {
        self.registration_listeners.remove(listener);
    }

    fn shutdown(&self) {
        self.set_registration_state(
            RegistrationState::Unregistered,
            RegistrationReason::UserRequest,
            Some("shutdown"),
        );
        self.registration_listeners.clear();
        info!(account = %self.context.account(), "Mock provider shut down");
    }
}

impl fmt::Debug for MockProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockProvider")
            .field("account", self.context.account())
            .field("state", &self.context.registration_state())
            .field("operation_sets", &self.operation_sets)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OperationFailedCode;
    use crate::mock::call::CallState;
    use crate::mock::status::MockStatus;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        changes: Mutex<Vec<(RegistrationState, RegistrationState)>>,
    }

    impl RegistrationStateChangeListener for Recorder {
        fn registration_state_changed(&self, e: &RegistrationStateChangeEvent) {
            self.changes.lock().unwrap().push((e.old_state, e.new_state));
        }
    }

    #[test]
    fn capability_lookup() {
        let provider = MockProvider::for_user("alice").unwrap();

        assert_eq!(
            provider.supported_operation_sets(),
            vec![
                OperationSetKind::PersistentPresence,
                OperationSetKind::BasicTelephony,
                OperationSetKind::BasicInstantMessaging,
                OperationSetKind::MultiUserChat,
                OperationSetKind::FileTransfer,
            ]
        );
        assert!(provider.operation_set(OperationSetKind::Whiteboarding).is_none());
        assert!(provider.operation_set(OperationSetKind::DesktopSharing).is_none());

        let presence = provider
            .operation_set_as::<PersistentPresence>(OperationSetKind::PersistentPresence)
            .unwrap();
        assert!(Arc::ptr_eq(&presence, provider.presence()));
        assert!(provider
            .operation_set_as::<BasicTelephony>(OperationSetKind::PersistentPresence)
            .is_none());
    }

    #[test]
    fn account_and_protocol() {
        let provider = MockProvider::for_user("alice").unwrap();
        assert_eq!(provider.protocol_name(), "mock");
        assert_eq!(provider.account_id().user_id, "alice");
        assert!(provider.is_registered());
        assert!(!provider.is_signalling_transport_secure());
    }

    #[test]
    fn registration_transitions_fire_once() {
        let provider =
            MockProvider::new(MockProviderConfig::default().with_start_registered(false)).unwrap();
        let recorder = Arc::new(Recorder::default());
        let listener: Arc<dyn RegistrationStateChangeListener> = recorder.clone();
        provider.add_registration_state_change_listener(listener.clone());
        provider.add_registration_state_change_listener(listener.clone());

        provider.register().unwrap();
        provider.register().unwrap();
        provider.fail_connection("cable pulled");
        provider.unregister().unwrap();

        assert_eq!(
            *recorder.changes.lock().unwrap(),
            vec![
                (RegistrationState::Unregistered, RegistrationState::Registered),
                (RegistrationState::Registered, RegistrationState::ConnectionFailed),
                (RegistrationState::ConnectionFailed, RegistrationState::Unregistered),
            ]
        );
    }

    #[test]
    fn operation_sets_follow_registration() {
        let provider = MockProvider::for_user("alice").unwrap();
        provider.unregister().unwrap();

        let err = provider.telephony().create_call("bob").unwrap_err();
        assert_eq!(err.code(), OperationFailedCode::ProviderNotRegistered);

        provider.register().unwrap();
        let call = provider.telephony().create_call("bob").unwrap();
        assert_eq!(call.call_state(), CallState::Initialization);
    }

    #[test]
    fn initial_presence_comes_from_config() {
        let config = MockProviderConfig::new("alice")
            .with_initial_status(MockStatus::MOCK_STATUS_90)
            .with_status_message("Around");
        let provider = MockProvider::new(config).unwrap();

        assert_eq!(provider.presence().presence_status(), MockStatus::MOCK_STATUS_90);
        assert_eq!(provider.presence().current_status_message(), "Around");
        assert_eq!(
            provider.presence().server_stored_contact_list_root().name(),
            "RootMockGroup"
        );
    }

    #[test]
    fn invalid_initial_status_is_rejected() {
        let mut config = MockProviderConfig::default();
        config.initial_status = "Sleepy".to_string();

        let err = MockProvider::new(config).unwrap_err();
        assert_eq!(err.code(), OperationFailedCode::IllegalArgument);
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn shutdown_unregisters_and_drops_listeners() {
        let provider = MockProvider::for_user("alice").unwrap();
        let recorder = Arc::new(Recorder::default());
        provider.add_registration_state_change_listener(recorder.clone());

        provider.shutdown();
        provider.register().unwrap();

        assert_eq!(provider.registration_state(), RegistrationState::Registered);
        assert_eq!(
            *recorder.changes.lock().unwrap(),
            vec![(RegistrationState::Registered, RegistrationState::Unregistered)]
        );
    }

    #[test]
    fn usable_through_the_trait_object() {
        let provider: Arc<dyn ProtocolProvider> =
            Arc::new(MockProvider::for_user("alice").unwrap());
        let set = provider
            .operation_set(OperationSetKind::MultiUserChat)
            .unwrap();
        assert_eq!(set.kind(), OperationSetKind::MultiUserChat);
        let chat = set.into_any().downcast::<MultiUserChat>().unwrap();
        chat.create_chat_room("lobby").unwrap();
        assert_eq!(chat.existing_chat_rooms(), vec!["lobby"]);
    }
}
