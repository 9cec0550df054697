//! One-to-one calls.

use std::any::Any;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use chrono::{DateTime, Utc};
use commspi_core::ListenerRegistry;
use tracing::{debug, info};

use super::call::{Call, CallChangeEvent, CallChangeListener, CallParticipant, CallParticipantState, CallState};
use super::context::ProviderContext;
use crate::error::ProviderResult;
use crate::operation_set::{OperationSet, OperationSetKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallEventKind {
    /// The local user placed the call.
    Initiated,
    /// A remote party called the local user.
    Received,
    Ended,
}

#[derive(Debug, Clone)]
pub struct CallEvent {
    pub kind: CallEventKind,
    pub call: Arc<Call>,
    pub timestamp: DateTime<Utc>,
}

/// Receives call creation and termination.
pub trait CallListener: Send + Sync {
    fn outgoing_call_created(&self, _event: &CallEvent) {}
    fn incoming_call_received(&self, _event: &CallEvent) {}
    fn call_ended(&self, _event: &CallEvent) {}
}

/// Drops calls from the active list once they end.
struct ActiveCallTracker {
    telephony: Weak<BasicTelephony>,
}

impl CallChangeListener for ActiveCallTracker {
    fn call_state_changed(&self, event: &CallChangeEvent) {
        if event.new_state != CallState::Ended {
            return;
        }
        if let Some(telephony) = self.telephony.upgrade() {
            telephony.call_ended(&event.call);
        }
    }
}

/// Basic telephony operation set of the mock provider.
pub struct BasicTelephony {
    context: Arc<ProviderContext>,
    active_calls: Mutex<Vec<Arc<Call>>>,
    listeners: ListenerRegistry<dyn CallListener>,
    tracker: Arc<dyn CallChangeListener>,
}

impl BasicTelephony {
    pub(crate) fn new(context: Arc<ProviderContext>) -> Arc<Self> {
        Arc::new_cyclic(|telephony| Self {
            context,
            active_calls: Mutex::new(Vec::new()),
            listeners: ListenerRegistry::new(),
            tracker: Arc::new(ActiveCallTracker {
                telephony: telephony.clone(),
            }),
        })
    }

    fn active(&self) -> MutexGuard<'_, Vec<Arc<Call>>> {
        self.active_calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Places a call to `callee`.
    ///
    /// # Errors
    ///
    /// Fails with `ProviderNotRegistered` when the provider is signed off.
    pub fn create_call(&self, callee: &str) -> ProviderResult<Arc<Call>> {
        self.context.ensure_registered("create a call")?;
        let call = self.track_new_call(callee);
        info!(call = %call.call_id(), callee, "Outgoing call created");
        self.fire_call_event(CallEventKind::Initiated, &call);
        Ok(call)
    }

    /// Simulates an incoming call from `caller`.
    ///
    /// # Errors
    ///
    /// Fails with `ProviderNotRegistered` when the provider is signed off.
    pub fn receive_call(&self, caller: &str) -> ProviderResult<Arc<Call>> {
        self.context.ensure_registered("receive a call")?;
        let call = self.track_new_call(caller);
        info!(call = %call.call_id(), caller, "Incoming call received");
        self.fire_call_event(CallEventKind::Received, &call);
        Ok(call)
    }

    fn track_new_call(&self, address: &str) -> Arc<Call> {
        let call = Call::new(self.context.protocol_name());
        call.add_call_change_listener(self.tracker.clone());
        CallParticipant::new(address, &call);
        self.active().push(call.clone());
        call
    }

    /// Connects `participant`.
    pub fn answer_call_participant(&self, participant: &Arc<CallParticipant>) -> ProviderResult<()> {
        self.context.ensure_registered("answer a call")?;
        participant.set_state(CallParticipantState::Connected, None);
        Ok(())
    }

    /// Disconnects `participant`. Hanging up on an already-disconnected
    /// participant does nothing.
    pub fn hangup_call_participant(&self, participant: &Arc<CallParticipant>) {
        participant.set_state(CallParticipantState::Disconnected, None);
    }

    /// Marks `participant` as failed.
    pub fn fail_call_participant(&self, participant: &Arc<CallParticipant>, reason: &str) {
        participant.set_state(CallParticipantState::Failed, Some(reason));
    }

    /// Returns the calls that have not ended yet.
    pub fn active_calls(&self) -> Vec<Arc<Call>> {
        self.active().clone()
    }

    fn call_ended(&self, call: &Arc<Call>) {
        let removed = {
            let mut active = self.active();
            let before = active.len();
            active.retain(|c| !Arc::ptr_eq(c, call));
            active.len() != before
        };
        if removed {
            call.remove_call_change_listener(&self.tracker);
            debug!(call = %call.call_id(), "Call ended");
            self.fire_call_event(CallEventKind::Ended, call);
        }
    }

    pub fn add_call_listener(&self, listener: Arc<dyn CallListener>) {
        self.listeners.add(listener);
    }

    pub fn remove_call_listener(&self, listener: &Arc<dyn CallListener>) {
        self.listeners.remove(listener);
    }

    fn fire_call_event(&self, kind: CallEventKind, call: &Arc<Call>) {
        let event = CallEvent {
            kind,
            call: call.clone(),
            timestamp: Utc::now(),
        };
        self.listeners.dispatch(|l| match kind {
            CallEventKind::Initiated => l.outgoing_call_created(&event),
            CallEventKind::Received => l.incoming_call_received(&event),
            CallEventKind::Ended => l.call_ended(&event),
        });
    }
}

impl OperationSet for BasicTelephony {
    fn kind(&self) -> OperationSetKind {
        OperationSetKind::BasicTelephony
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OperationFailedCode;
    use crate::mock::config::MockProviderConfig;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<CallEventKind>>,
    }

    impl CallListener for Recorder {
        fn outgoing_call_created(&self, e: &CallEvent) {
            self.events.lock().unwrap().push(e.kind);
        }

        fn incoming_call_received(&self, e: &CallEvent) {
            self.events.lock().unwrap().push(e.kind);
        }

        fn call_ended(&self, e: &CallEvent) {
            self.events.lock().unwrap().push(e.kind);
        }
    }

    fn telephony(registered: bool) -> (Arc<BasicTelephony>, Arc<Recorder>) {
        let config = MockProviderConfig::default().with_start_registered(registered);
        let telephony = BasicTelephony::new(Arc::new(ProviderContext::new(config)));
        let recorder = Arc::new(Recorder::default());
        telephony.add_call_listener(recorder.clone());
        (telephony, recorder)
    }

    #[test]
    fn outgoing_call_lifecycle() {
        let (telephony, recorder) = telephony(true);

        let call = telephony.create_call("bob").unwrap();
        let bob = call.participants()[0].clone();
        assert_eq!(bob.address(), "bob");
        assert_eq!(call.provider(), "mock");
        assert_eq!(telephony.active_calls().len(), 1);

        telephony.answer_call_participant(&bob).unwrap();
        assert_eq!(call.call_state(), CallState::InProgress);

        telephony.hangup_call_participant(&bob);
        telephony.hangup_call_participant(&bob);
        assert_eq!(call.call_state(), CallState::Ended);
        assert!(telephony.active_calls().is_empty());
        assert_eq!(
            *recorder.events.lock().unwrap(),
            vec![CallEventKind::Initiated, CallEventKind::Ended]
        );
    }

    #[test]
    fn incoming_call_can_fail() {
        let (telephony, recorder) = telephony(true);

        let call = telephony.receive_call("carol").unwrap();
        let carol = call.participants()[0].clone();
        telephony.fail_call_participant(&carol, "busy here");

        assert_eq!(carol.participant_state(), CallParticipantState::Failed);
        assert_eq!(call.call_state(), CallState::Ended);
        assert_eq!(
            *recorder.events.lock().unwrap(),
            vec![CallEventKind::Received, CallEventKind::Ended]
        );
    }

    #[test]
    fn calls_require_registration() {
        let (telephony, recorder) = telephony(false);

        let err = telephony.create_call("bob").unwrap_err();
        assert_eq!(err.code(), OperationFailedCode::ProviderNotRegistered);
        assert_eq!(err.provider(), Some("mock"));
        assert!(telephony.receive_call("bob").is_err());
        assert!(telephony.active_calls().is_empty());
        assert!(recorder.events.lock().unwrap().is_empty());
    }
}
