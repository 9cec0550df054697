//! Calls and call participants.
//!
//! A [`Call`] follows its participants through an observer it registers on
//! each of them when they join and removes when they leave:
//!
//! - a participant becoming `Connected` moves an initializing call to
//!   `InProgress`;
//! - a participant becoming `Disconnected` or `Failed` is removed from the
//!   call;
//! - the call is `Ended` once a removal leaves it without participants.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use chrono::{DateTime, Utc};
use commspi_core::ListenerRegistry;
use tracing::{debug, trace};

use super::context::next_id;

/// Lifecycle of a call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum CallState {
    #[default]
    Initialization,
    InProgress,
    Ended,
}

impl CallState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initialization => "initialization",
            Self::InProgress => "in_progress",
            Self::Ended => "ended",
        }
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a single participant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum CallParticipantState {
    #[default]
    Unknown,
    Connected,
    Disconnected,
    Failed,
}

impl CallParticipantState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Failed => "failed",
        }
    }

    /// Returns true for states after which the participant leaves the call.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Disconnected | Self::Failed)
    }
}

impl fmt::Display for CallParticipantState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A participant changed state.
#[derive(Debug, Clone)]
pub struct CallParticipantChangeEvent {
    pub participant: Arc<CallParticipant>,
    pub old_state: CallParticipantState,
    pub new_state: CallParticipantState,
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Receives participant state changes.
pub trait CallParticipantListener: Send + Sync {
    fn participant_state_changed(&self, event: &CallParticipantChangeEvent);
}

/// A participant joined or left a call.
#[derive(Debug, Clone)]
pub struct CallParticipantEvent {
    pub call: Arc<Call>,
    pub participant: Arc<CallParticipant>,
    pub timestamp: DateTime<Utc>,
}

/// A call changed state.
#[derive(Debug, Clone)]
pub struct CallChangeEvent {
    pub call: Arc<Call>,
    pub old_state: CallState,
    pub new_state: CallState,
    /// The participant change that triggered this one, if any.
    pub cause: Option<CallParticipantChangeEvent>,
    pub timestamp: DateTime<Utc>,
}

/// Receives changes to a call.
pub trait CallChangeListener: Send + Sync {
    fn call_participant_added(&self, _event: &CallParticipantEvent) {}
    fn call_participant_removed(&self, _event: &CallParticipantEvent) {}
    fn call_state_changed(&self, _event: &CallChangeEvent) {}
}

#[derive(Debug)]
struct ParticipantState {
    display_name: String,
    state: CallParticipantState,
    state_start: DateTime<Utc>,
}

/// One remote party of a call.
#[derive(Debug)]
pub struct CallParticipant {
    id: String,
    address: String,
    call: Weak<Call>,
    state: Mutex<ParticipantState>,
    listeners: ListenerRegistry<dyn CallParticipantListener>,
}

impl CallParticipant {
    /// Creates a participant in state `Unknown` and adds it to `call`.
    pub fn new(address: impl Into<String>, call: &Arc<Call>) -> Arc<Self> {
        let address = address.into();
        let participant = Arc::new(Self {
            id: next_id(),
            call: Arc::downgrade(call),
            state: Mutex::new(ParticipantState {
                display_name: address.clone(),
                state: CallParticipantState::Unknown,
                state_start: Utc::now(),
            }),
            listeners: ListenerRegistry::new(),
            address,
        });
        call.add_participant(&participant);
        participant
    }

    fn state(&self) -> MutexGuard<'_, ParticipantState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn participant_id(&self) -> &str {
        &self.id
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn display_name(&self) -> String {
        self.state().display_name.clone()
    }

    pub fn set_display_name(&self, name: impl Into<String>) {
        self.state().display_name = name.into();
    }

    /// Returns the call this participant belongs to, while it is alive.
    pub fn call(&self) -> Option<Arc<Call>> {
        self.call.upgrade()
    }

    pub fn participant_state(&self) -> CallParticipantState {
        self.state().state
    }

    /// Returns when the participant entered its current state.
    pub fn current_state_start_date(&self) -> DateTime<Utc> {
        self.state().state_start
    }

    /// Moves the participant to `new_state` and notifies its listeners.
    ///
    /// Setting the current state again does nothing.
    pub fn set_state(self: &Arc<Self>, new_state: CallParticipantState, reason: Option<&str>) {
        let event = {
            let mut state = self.state();
            if state.state == new_state {
                return;
            }
            let now = Utc::now();
            let old_state = std::mem::replace(&mut state.state, new_state);
            state.state_start = now;
            CallParticipantChangeEvent {
                participant: self.clone(),
                old_state,
                new_state,
                reason: reason.map(str::to_string),
                timestamp: now,
            }
        };
        debug!(
            participant = %self.address,
            old = %event.old_state,
            new = %new_state,
            "Participant state changed"
        );
        self.listeners
            .dispatch(|l| l.participant_state_changed(&event));
    }

    pub fn add_call_participant_listener(&self, listener: Arc<dyn CallParticipantListener>) {
        self.listeners.add(listener);
    }

    pub fn remove_call_participant_listener(&self, listener: &Arc<dyn CallParticipantListener>) {
        self.listeners.remove(listener);
    }
}

impl fmt::Display for CallParticipant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.address, self.participant_state())
    }
}

/// Forwards participant changes to the call that owns the participant.
struct ParticipantObserver {
    call: Weak<Call>,
}

impl CallParticipantListener for ParticipantObserver {
    fn participant_state_changed(&self, event: &CallParticipantChangeEvent) {
        if let Some(call) = self.call.upgrade() {
            call.participant_state_changed(event);
        }
    }
}

#[derive(Debug)]
struct CallInner {
    state: CallState,
    participants: Vec<Arc<CallParticipant>>,
}

/// A call with an ordered list of participants.
pub struct Call {
    id: String,
    provider: String,
    inner: Mutex<CallInner>,
    listeners: ListenerRegistry<dyn CallChangeListener>,
    observer: Arc<dyn CallParticipantListener>,
}

impl Call {
    /// Creates an empty call in state `Initialization` for the provider
    /// named `provider`.
    pub fn new(provider: impl Into<String>) -> Arc<Self> {
        Arc::new_cyclic(|call| Self {
            id: next_id(),
            provider: provider.into(),
            inner: Mutex::new(CallInner {
                state: CallState::Initialization,
                participants: Vec::new(),
            }),
            listeners: ListenerRegistry::new(),
            observer: Arc::new(ParticipantObserver { call: call.clone() }),
        })
    }

    fn inner(&self) -> MutexGuard<'_, CallInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn call_id(&self) -> &str {
        &self.id
    }

    /// Name of the provider that created the call.
    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn call_state(&self) -> CallState {
        self.inner().state
    }

    pub fn participants(&self) -> Vec<Arc<CallParticipant>> {
        self.inner().participants.clone()
    }

    pub fn participant_count(&self) -> usize {
        self.inner().participants.len()
    }

    /// Appends `participant` and starts following its state.
    pub fn add_participant(self: &Arc<Self>, participant: &Arc<CallParticipant>) {
        {
            let mut inner = self.inner();
            if inner.participants.iter().any(|p| Arc::ptr_eq(p, participant)) {
                return;
            }
            inner.participants.push(participant.clone());
        }
        participant.add_call_participant_listener(self.observer.clone());
        trace!(call = %self.id, participant = %participant.address(), "Participant added");

        let event = CallParticipantEvent {
            call: self.clone(),
            participant: participant.clone(),
            timestamp: Utc::now(),
        };
        self.listeners
            .dispatch(|l| l.call_participant_added(&event));
    }

    /// Removes `participant`. The call ends when this removes the last one.
    pub fn remove_participant(
        self: &Arc<Self>,
        participant: &Arc<CallParticipant>,
        cause: Option<&CallParticipantChangeEvent>,
    ) {
        let now_empty = {
            let mut inner = self.inner();
            let before = inner.participants.len();
            inner.participants.retain(|p| !Arc::ptr_eq(p, participant));
            if inner.participants.len() == before {
                return;
            }
            inner.participants.is_empty()
        };
        participant.remove_call_participant_listener(&self.observer);
        trace!(call = %self.id, participant = %participant.address(), "Participant removed");

        let event = CallParticipantEvent {
            call: self.clone(),
            participant: participant.clone(),
            timestamp: Utc::now(),
        };
        self.listeners
            .dispatch(|l| l.call_participant_removed(&event));

        if now_empty {
            self.set_call_state(CallState::Ended, cause);
        }
    }

    /// Moves the call to `new_state`. Setting the current state again does
    /// nothing.
    pub fn set_call_state(
        self: &Arc<Self>,
        new_state: CallState,
        cause: Option<&CallParticipantChangeEvent>,
    ) {
        let old_state = {
            let mut inner = self.inner();
            if inner.state == new_state {
                return;
            }
            std::mem::replace(&mut inner.state, new_state)
        };
        debug!(call = %self.id, old = %old_state, new = %new_state, "Call state changed");

        let event = CallChangeEvent {
            call: self.clone(),
            old_state,
            new_state,
            cause: cause.cloned(),
            timestamp: Utc::now(),
        };
        self.listeners.dispatch(|l| l.call_state_changed(&event));
    }

    fn participant_state_changed(self: &Arc<Self>, event: &CallParticipantChangeEvent) {
        match event.new_state {
            CallParticipantState::Connected => {
                if self.call_state() == CallState::Initialization {
                    self.set_call_state(CallState::InProgress, Some(event));
                }
            }
            CallParticipantState::Disconnected | CallParticipantState::Failed => {
                self.remove_participant(&event.participant, Some(event));
            }
            CallParticipantState::Unknown => {}
        }
    }

    pub fn add_call_change_listener(&self, listener: Arc<dyn CallChangeListener>) {
        self.listeners.add(listener);
    }

    pub fn remove_call_change_listener(&self, listener: &Arc<dyn CallChangeListener>) {
        self.listeners.remove(listener);
    }
}

impl fmt::Debug for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner();
        f.debug_struct("Call")
            .field("id", &self.id)
            .field("provider", &self.provider)
            .field("state", &inner.state)
            .field("participants", &inner.participants.len())
            .finish()
    }
}

impl fmt::Display for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Call {} ({})", self.id, self.call_state())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn take(&self) -> Vec<String> {
            std::mem::take(&mut *self.events.lock().unwrap())
        }
    }

    impl CallChangeListener for Recorder {
        fn call_participant_added(&self, e: &CallParticipantEvent) {
            self.events
                .lock()
                .unwrap()
                .push(format!("added {}", e.participant.address()));
        }

        fn call_participant_removed(&self, e: &CallParticipantEvent) {
            self.events
                .lock()
                .unwrap()
                .push(format!("removed {}", e.participant.address()));
        }

        fn call_state_changed(&self, e: &CallChangeEvent) {
            let cause = e
                .cause
                .as_ref()
                .map(|c| format!(" by {}", c.participant.address()))
                .unwrap_or_default();
            self.events
                .lock()
                .unwrap()
                .push(format!("call {} -> {}{cause}", e.old_state, e.new_state));
        }
    }

    impl CallParticipantListener for Recorder {
        fn participant_state_changed(&self, e: &CallParticipantChangeEvent) {
            self.events.lock().unwrap().push(format!(
                "{} {} -> {}",
                e.participant.address(),
                e.old_state,
                e.new_state
            ));
        }
    }

    fn recorded_call() -> (Arc<Call>, Arc<Recorder>) {
        let call = Call::new("mock");
        let recorder = Arc::new(Recorder::default());
        call.add_call_change_listener(recorder.clone());
        (call, recorder)
    }

    #[test]
    fn new_call_starts_initializing() {
        let call = Call::new("mock");
        assert_eq!(call.call_state(), CallState::Initialization);
        assert_eq!(call.participant_count(), 0);
        assert_eq!(call.provider(), "mock");
    }

    #[test]
    fn in_progress_only_after_connect() {
        let (call, recorder) = recorded_call();
        let bob = CallParticipant::new("bob", &call);

        assert_eq!(call.call_state(), CallState::Initialization);
        assert!(Arc::ptr_eq(&bob.call().unwrap(), &call));

        bob.set_state(CallParticipantState::Connected, None);
        assert_eq!(call.call_state(), CallState::InProgress);
        assert_eq!(
            recorder.take(),
            vec!["added bob", "call initialization -> in_progress by bob"]
        );
    }

    #[test]
    fn disconnecting_the_last_participant_ends_the_call() {
        let (call, recorder) = recorded_call();
        let bob = CallParticipant::new("bob", &call);
        bob.set_state(CallParticipantState::Connected, None);
        recorder.take();

        bob.set_state(CallParticipantState::Disconnected, Some("hung up"));

        assert_eq!(call.call_state(), CallState::Ended);
        assert_eq!(call.participant_count(), 0);
        assert_eq!(
            recorder.take(),
            vec!["removed bob", "call in_progress -> ended by bob"]
        );
    }

    #[test]
    fn call_ends_only_when_the_list_empties() {
        let (call, _) = recorded_call();
        let bob = CallParticipant::new("bob", &call);
        let carol = CallParticipant::new("carol", &call);
        bob.set_state(CallParticipantState::Connected, None);
        carol.set_state(CallParticipantState::Connected, None);

        bob.set_state(CallParticipantState::Failed, Some("codec"));
        assert_eq!(call.call_state(), CallState::InProgress);
        assert_eq!(call.participant_count(), 1);

        carol.set_state(CallParticipantState::Disconnected, None);
        assert_eq!(call.call_state(), CallState::Ended);
    }

    #[test]
    fn same_state_is_silent_and_keeps_start_date() {
        let call = Call::new("mock");
        let bob = CallParticipant::new("bob", &call);
        let recorder = Arc::new(Recorder::default());
        bob.add_call_participant_listener(recorder.clone());

        bob.set_state(CallParticipantState::Connected, None);
        let started = bob.current_state_start_date();
        assert_eq!(recorder.take(), vec!["bob unknown -> connected"]);

        bob.set_state(CallParticipantState::Connected, None);
        assert!(recorder.take().is_empty());
        assert_eq!(bob.current_state_start_date(), started);
    }

    #[test]
    fn removed_participant_is_no_longer_observed() {
        let (call, recorder) = recorded_call();
        let bob = CallParticipant::new("bob", &call);
        let carol = CallParticipant::new("carol", &call);
        recorder.take();

        call.remove_participant(&bob, None);
        assert_eq!(recorder.take(), vec!["removed bob"]);

        // Bob is gone, so his connecting does not start the call.
        bob.set_state(CallParticipantState::Connected, None);
        assert_eq!(call.call_state(), CallState::Initialization);
        assert!(recorder.take().is_empty());

        call.remove_participant(&bob, None);
        assert!(recorder.take().is_empty());
        assert_eq!(call.participants().len(), 1);
        assert!(Arc::ptr_eq(&call.participants()[0], &carol));
    }

    #[test]
    fn adding_twice_is_ignored() {
        let (call, recorder) = recorded_call();
        let bob = CallParticipant::new("bob", &call);
        call.add_participant(&bob);

        assert_eq!(call.participant_count(), 1);
        assert_eq!(recorder.take(), vec!["added bob"]);
    }

    #[test]
    fn participant_ids_are_unique() {
        let call = Call::new("mock");
        let a = CallParticipant::new("a", &call);
        let b = CallParticipant::new("b", &call);
        assert_ne!(a.participant_id(), b.participant_id());
        assert_ne!(Call::new("mock").call_id(), call.call_id());
    }

    #[test]
    fn display() {
        let call = Call::new("mock");
        let bob = CallParticipant::new("bob", &call);
        insta::assert_snapshot!(bob.to_string(), @"bob (unknown)");
    }
}
