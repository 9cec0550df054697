//! Operation sets and capability lookup.
//!
//! An operation set is a capability-scoped group of operations (presence,
//! telephony, messaging, ...) that a provider may or may not support.
//! Consumers ask the provider for a capability by [`OperationSetKind`]; an
//! unsupported capability is signalled by `None`, never by an error.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::trace;

/// Well-known capability identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationSetKind {
    /// Server-stored contact list and presence.
    PersistentPresence,
    /// One-to-one calls.
    BasicTelephony,
    /// One-to-one text messages.
    BasicInstantMessaging,
    /// Chat rooms.
    MultiUserChat,
    /// Sending and receiving files.
    FileTransfer,
    /// Typing notifications.
    TypingNotifications,
    /// Shared whiteboards.
    Whiteboarding,
    /// Remote desktop sharing.
    DesktopSharing,
}

impl OperationSetKind {
    /// Returns the snake_case name of this capability.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PersistentPresence => "persistent_presence",
            Self::BasicTelephony => "basic_telephony",
            Self::BasicInstantMessaging => "basic_instant_messaging",
            Self::MultiUserChat => "multi_user_chat",
            Self::FileTransfer => "file_transfer",
            Self::TypingNotifications => "typing_notifications",
            Self::Whiteboarding => "whiteboarding",
            Self::DesktopSharing => "desktop_sharing",
        }
    }
}

impl fmt::Display for OperationSetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An operation-set instance held by a provider.
pub trait OperationSet: Any + Send + Sync {
    /// The capability this instance implements.
    fn kind(&self) -> OperationSetKind;

    /// Converts the shared instance into `Any` so callers can recover the
    /// concrete type.
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// Fixed mapping from capability to operation set, filled once when the
/// provider is built.
#[derive(Default)]
pub struct OperationSetRegistry {
    sets: HashMap<OperationSetKind, Arc<dyn OperationSet>>,
}

impl OperationSetRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: registers `set` under its own kind, replacing any previous
    /// entry.
    pub fn with(mut self, set: Arc<dyn OperationSet>) -> Self {
        trace!(kind = %set.kind(), "Registering operation set");
        self.sets.insert(set.kind(), set);
        self
    }

    /// Returns the operation set for `kind`, or `None` if unsupported.
    pub fn get(&self, kind: OperationSetKind) -> Option<Arc<dyn OperationSet>> {
        self.sets.get(&kind).cloned()
    }

    /// Returns the operation set for `kind` as its concrete type.
    ///
    /// Returns `None` if the capability is unsupported or registered with a
    /// different type.
    pub fn get_as<T>(&self, kind: OperationSetKind) -> Option<Arc<T>>
    where
        T: OperationSet,
    {
        self.get(kind)?.into_any().downcast::<T>().ok()
    }

    /// Returns true if `kind` is supported.
    pub fn supports(&self, kind: OperationSetKind) -> bool {
        self.sets.contains_key(&kind)
    }

    /// Returns the supported capabilities in a stable order.
    pub fn supported(&self) -> Vec<OperationSetKind> {
        let mut kinds: Vec<_> = self.sets.keys().copied().collect();
        kinds.sort();
        kinds
    }
}

impl fmt::Debug for OperationSetRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationSetRegistry")
            .field("supported", &self.supported())
            .finish()
    }
}
