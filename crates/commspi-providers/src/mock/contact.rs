//! Contacts in the mock contact list.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use commspi_core::PresenceStatus;

use super::group::ContactGroup;
use super::status::MockStatus;

#[derive(Debug)]
struct ContactState {
    display_name: String,
    status: PresenceStatus,
    status_message: Option<String>,
    persistent: bool,
    resolved: bool,
    persistent_data: Option<String>,
    parent: Weak<ContactGroup>,
}

/// A remote party, identified by its address.
///
/// A contact belongs to at most one group. The group owns the contact; the
/// contact only keeps a weak reference back to it.
#[derive(Debug)]
pub struct Contact {
    address: String,
    state: Mutex<ContactState>,
}

impl Contact {
    /// Creates a persistent, resolved contact whose display name is its
    /// address and whose status is [`MockStatus::DEFAULT`].
    pub fn new(address: impl Into<String>) -> Arc<Self> {
        let address = address.into();
        Arc::new(Self {
            state: Mutex::new(ContactState {
                display_name: address.clone(),
                status: MockStatus::DEFAULT,
                status_message: None,
                persistent: true,
                resolved: true,
                persistent_data: None,
                parent: Weak::new(),
            }),
            address,
        })
    }

    fn state(&self) -> MutexGuard<'_, ContactState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the address, which also serves as the contact id.
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn display_name(&self) -> String {
        self.state().display_name.clone()
    }

    pub fn set_display_name(&self, name: impl Into<String>) {
        self.state().display_name = name.into();
    }

    /// Returns the last known presence status.
    pub fn presence_status(&self) -> PresenceStatus {
        self.state().status
    }

    /// Stores a new status and returns the previous one.
    pub(crate) fn set_presence_status(&self, status: PresenceStatus) -> PresenceStatus {
        std::mem::replace(&mut self.state().status, status)
    }

    pub fn status_message(&self) -> Option<String> {
        self.state().status_message.clone()
    }

    pub fn set_status_message(&self, message: Option<String>) {
        self.state().status_message = message;
    }

    /// Returns false for contacts that only live for the session.
    pub fn is_persistent(&self) -> bool {
        self.state().persistent
    }

    pub fn set_persistent(&self, persistent: bool) {
        self.state().persistent = persistent;
    }

    /// Returns false until the server has confirmed the contact.
    pub fn is_resolved(&self) -> bool {
        self.state().resolved
    }

    pub fn set_resolved(&self, resolved: bool) {
        self.state().resolved = resolved;
    }

    /// Returns the opaque data stored with an unresolved contact.
    pub fn persistent_data(&self) -> Option<String> {
        self.state().persistent_data.clone()
    }

    pub fn set_persistent_data(&self, data: Option<String>) {
        self.state().persistent_data = data;
    }

    /// Returns the group holding this contact, if any.
    pub fn parent_contact_group(&self) -> Option<Arc<ContactGroup>> {
        self.state().parent.upgrade()
    }

    pub(crate) fn set_parent(&self, parent: Option<&Arc<ContactGroup>>) {
        self.state().parent = parent.map(Arc::downgrade).unwrap_or_default();
    }
}

impl fmt::Display for Contact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_contact_defaults() {
        let contact = Contact::new("alice@mock");
        assert_eq!(contact.address(), "alice@mock");
        assert_eq!(contact.display_name(), "alice@mock");
        assert_eq!(contact.presence_status(), MockStatus::MOCK_STATUS_50);
        assert!(contact.is_persistent());
        assert!(contact.is_resolved());
        assert!(contact.parent_contact_group().is_none());
    }

    #[test]
    fn status_swap_returns_previous() {
        let contact = Contact::new("bob@mock");
        let old = contact.set_presence_status(MockStatus::MOCK_STATUS_90);
        assert_eq!(old, MockStatus::MOCK_STATUS_50);
        assert_eq!(contact.presence_status(), MockStatus::MOCK_STATUS_90);
    }

    #[test]
    fn parent_is_weak() {
        let contact = Contact::new("carol@mock");
        {
            let group = ContactGroup::new("Friends");
            contact.set_parent(Some(&group));
            assert_eq!(contact.parent_contact_group().unwrap().name(), "Friends");
        }
        assert!(contact.parent_contact_group().is_none());
    }
}
