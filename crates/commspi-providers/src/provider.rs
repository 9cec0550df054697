//! ProtocolProvider trait definition.
//!
//! A [`ProtocolProvider`] represents one account on one protocol. It owns a
//! fixed set of operation sets and exposes them by capability.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use commspi_core::AccountId;
use serde::{Deserialize, Serialize};

use crate::error::ProviderResult;
use crate::operation_set::{OperationSet, OperationSetKind};

/// Registration state of a provider on its service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationState {
    /// Not signed on.
    #[default]
    Unregistered,
    /// Sign-on in progress.
    Registering,
    /// Signed on.
    Registered,
    /// Sign-off in progress.
    Unregistering,
    /// The last sign-on attempt failed.
    ConnectionFailed,
}

impl RegistrationState {
    /// Returns the snake_case name of this state.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unregistered => "unregistered",
            Self::Registering => "registering",
            Self::Registered => "registered",
            Self::Unregistering => "unregistering",
            Self::ConnectionFailed => "connection_failed",
        }
    }
}

impl fmt::Display for RegistrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a registration state changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationReason {
    /// No particular reason.
    #[default]
    NotSpecified,
    /// The user asked for it.
    UserRequest,
    /// The connection was lost.
    ConnectionLost,
    /// Credentials were rejected.
    AuthenticationFailed,
}

/// Notification that a provider's registration state changed.
#[derive(Debug, Clone)]
pub struct RegistrationStateChangeEvent {
    /// Account of the provider that changed state.
    pub account: AccountId,
    /// State before the change.
    pub old_state: RegistrationState,
    /// State after the change.
    pub new_state: RegistrationState,
    /// Reason code.
    pub reason_code: RegistrationReason,
    /// Optional human-readable explanation.
    pub reason: Option<String>,
    /// When the change happened.
    pub timestamp: DateTime<Utc>,
}

/// Receives registration state changes.
pub trait RegistrationStateChangeListener: Send + Sync {
    /// Called after the provider entered a new registration state.
    fn registration_state_changed(&self, event: &RegistrationStateChangeEvent);
}

/// The core abstraction for protocol providers.
///
/// Implementations are synchronous: every call completes (and fires its
/// notifications) on the calling thread before returning.
pub trait ProtocolProvider: Send + Sync {
    /// Returns the protocol name (e.g. "mock", "sip").
    fn protocol_name(&self) -> &str;

    /// Returns the account this provider acts for.
    fn account_id(&self) -> &AccountId;

    /// Returns the current registration state.
    fn registration_state(&self) -> RegistrationState;

    /// Returns true if the provider is signed on.
    fn is_registered(&self) -> bool {
        self.registration_state() == RegistrationState::Registered
    }

    /// Signs on to the service.
    ///
    /// # Errors
    ///
    /// Returns `OperationFailed` when signing on fails.
    fn register(&self) -> ProviderResult<()>;

    /// Signs off from the service.
    ///
    /// # Errors
    ///
    /// Returns `OperationFailed` when signing off fails.
    fn unregister(&self) -> ProviderResult<()>;

    /// Returns the operation set for `kind`, or `None` if unsupported.
    fn operation_set(&self, kind: OperationSetKind) -> Option<Arc<dyn OperationSet>>;

    /// Returns every supported capability.
    fn supported_operation_sets(&self) -> Vec<OperationSetKind>;

    /// Registers a registration state listener. Duplicate registrations are
    /// ignored.
    fn add_registration_state_change_listener(
        &self,
        listener: Arc<dyn RegistrationStateChangeListener>,
    );

    /// Removes a registration state listener.
    fn remove_registration_state_change_listener(
        &self,
        listener: &Arc<dyn RegistrationStateChangeListener>,
    );

    /// Releases every resource held by the provider.
    fn shutdown(&self);

    /// Returns true if the signalling transport is encrypted.
    fn is_signalling_transport_secure(&self) -> bool {
        false
    }
}
