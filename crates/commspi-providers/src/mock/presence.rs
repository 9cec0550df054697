//! Server-stored contact list and presence.
//!
//! [`PersistentPresence`] owns the root of the contact-list tree. Every
//! mutating operation updates the tree first and then notifies the matching
//! listeners synchronously, in registration order, before returning.

use std::any::Any;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use commspi_core::{AccountId, ListenerRegistry, PresenceStatus};
use tracing::{debug, warn};

use super::contact::Contact;
use super::context::ProviderContext;
use super::group::ContactGroup;
use super::status::MockStatus;
use crate::error::{OperationFailed, ProviderResult};
use crate::operation_set::{OperationSet, OperationSetKind};

/// What happened to a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionEventKind {
    Created,
    Removed,
}

/// A contact was added to or removed from the contact list.
#[derive(Debug, Clone)]
pub struct SubscriptionEvent {
    pub kind: SubscriptionEventKind,
    pub contact: Arc<Contact>,
    /// The group holding the contact, or the group it was removed from.
    pub parent_group: Option<Arc<ContactGroup>>,
    pub timestamp: DateTime<Utc>,
}

/// A contact moved between groups.
#[derive(Debug, Clone)]
pub struct SubscriptionMovedEvent {
    pub contact: Arc<Contact>,
    pub old_parent: Option<Arc<ContactGroup>>,
    pub new_parent: Arc<ContactGroup>,
    pub timestamp: DateTime<Utc>,
}

/// Receives contact-list membership changes.
pub trait SubscriptionListener: Send + Sync {
    fn subscription_created(&self, _event: &SubscriptionEvent) {}
    fn subscription_removed(&self, _event: &SubscriptionEvent) {}
    fn subscription_moved(&self, _event: &SubscriptionMovedEvent) {}
}

/// What happened to a server-stored group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupEventKind {
    Created,
    Removed,
    Renamed,
}

#[derive(Debug, Clone)]
pub struct ServerStoredGroupEvent {
    pub kind: GroupEventKind,
    pub group: Arc<ContactGroup>,
    pub parent_group: Option<Arc<ContactGroup>>,
    pub timestamp: DateTime<Utc>,
}

/// Receives group creation, removal and renaming.
pub trait ServerStoredGroupListener: Send + Sync {
    fn group_created(&self, _event: &ServerStoredGroupEvent) {}
    fn group_removed(&self, _event: &ServerStoredGroupEvent) {}
    fn group_renamed(&self, _event: &ServerStoredGroupEvent) {}
}

/// The local user's own status changed.
#[derive(Debug, Clone)]
pub struct ProviderPresenceStatusChangeEvent {
    pub account: AccountId,
    pub old_status: PresenceStatus,
    pub new_status: PresenceStatus,
    pub timestamp: DateTime<Utc>,
}

pub trait ProviderPresenceStatusListener: Send + Sync {
    fn provider_status_changed(&self, event: &ProviderPresenceStatusChangeEvent);
}

/// A contact's status changed.
#[derive(Debug, Clone)]
pub struct ContactPresenceStatusChangeEvent {
    pub contact: Arc<Contact>,
    pub parent_group: Option<Arc<ContactGroup>>,
    pub old_status: PresenceStatus,
    pub new_status: PresenceStatus,
    pub timestamp: DateTime<Utc>,
}

pub trait ContactPresenceStatusListener: Send + Sync {
    fn contact_presence_status_changed(&self, event: &ContactPresenceStatusChangeEvent);
}

#[derive(Debug)]
struct LocalPresence {
    status: PresenceStatus,
    status_message: String,
}

/// Persistent presence operation set of the mock provider.
#[derive(Debug)]
pub struct PersistentPresence {
    context: Arc<ProviderContext>,
    root: Arc<ContactGroup>,
    local: Mutex<LocalPresence>,
    subscription_listeners: ListenerRegistry<dyn SubscriptionListener>,
    group_listeners: ListenerRegistry<dyn ServerStoredGroupListener>,
    provider_status_listeners: ListenerRegistry<dyn ProviderPresenceStatusListener>,
    contact_status_listeners: ListenerRegistry<dyn ContactPresenceStatusListener>,
}

impl PersistentPresence {
    pub(crate) fn new(context: Arc<ProviderContext>, initial_status: PresenceStatus) -> Self {
        let root = ContactGroup::new(context.config().root_group_name.clone());
        let status_message = context.config().status_message.clone();
        Self {
            context,
            root,
            local: Mutex::new(LocalPresence {
                status: initial_status,
                status_message,
            }),
            subscription_listeners: ListenerRegistry::new(),
            group_listeners: ListenerRegistry::new(),
            provider_status_listeners: ListenerRegistry::new(),
            contact_status_listeners: ListenerRegistry::new(),
        }
    }

    fn local(&self) -> MutexGuard<'_, LocalPresence> {
        self.local.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the root of the contact-list tree.
    pub fn server_stored_contact_list_root(&self) -> &Arc<ContactGroup> {
        &self.root
    }

    // Subscriptions

    /// Adds a new contact with address `id` to the root group.
    pub fn subscribe(&self, id: &str) -> ProviderResult<Arc<Contact>> {
        self.subscribe_in(&self.root, id)
    }

    /// Adds a new contact with address `id` to `parent`.
    ///
    /// Duplicate addresses are not detected.
    pub fn subscribe_in(&self, parent: &Arc<ContactGroup>, id: &str) -> ProviderResult<Arc<Contact>> {
        let contact = Contact::new(id);
        parent.add_contact(contact.clone());
        debug!(contact = %id, group = %parent.uid(), "Subscribed");
        self.fire_subscription_event(SubscriptionEventKind::Created, &contact, Some(parent.clone()));
        Ok(contact)
    }

    /// Removes `contact` from its group.
    ///
    /// A contact that is not in any group is left alone.
    pub fn unsubscribe(&self, contact: &Arc<Contact>) -> ProviderResult<()> {
        let Some(parent) = contact.parent_contact_group() else {
            warn!(contact = %contact.address(), "Unsubscribe for a contact with no group");
            return Ok(());
        };
        parent.remove_contact(contact);
        debug!(contact = %contact.address(), group = %parent.uid(), "Unsubscribed");
        self.fire_subscription_event(SubscriptionEventKind::Removed, contact, Some(parent));
        Ok(())
    }

    /// Moves `contact` into `new_parent`.
    pub fn move_contact_to_group(&self, contact: &Arc<Contact>, new_parent: &Arc<ContactGroup>) {
        let old_parent = contact.parent_contact_group();
        if old_parent.as_ref().is_some_and(|p| Arc::ptr_eq(p, new_parent)) {
            return;
        }
        new_parent.add_contact(contact.clone());
        debug!(
            contact = %contact.address(),
            from = ?old_parent.as_ref().map(|g| g.uid()),
            to = %new_parent.uid(),
            "Moved subscription"
        );

        let event = SubscriptionMovedEvent {
            contact: contact.clone(),
            old_parent,
            new_parent: new_parent.clone(),
            timestamp: Utc::now(),
        };
        self.subscription_listeners
            .dispatch(|l| l.subscription_moved(&event));
    }

    /// Creates a contact loaded from local storage that the server has not
    /// confirmed yet. Goes to the root group when `parent` is `None`.
    pub fn create_unresolved_contact(
        &self,
        address: &str,
        persistent_data: Option<&str>,
        parent: Option<&Arc<ContactGroup>>,
    ) -> Arc<Contact> {
        let parent = parent.unwrap_or(&self.root);
        let contact = Contact::new(address);
        contact.set_resolved(false);
        contact.set_persistent_data(persistent_data.map(str::to_string));
        parent.add_contact(contact.clone());
        self.fire_subscription_event(SubscriptionEventKind::Created, &contact, Some(parent.clone()));
        contact
    }

    /// Creates a group loaded from local storage that the server has not
    /// confirmed yet. The name is recovered from `uid`.
    pub fn create_unresolved_contact_group(
        &self,
        uid: &str,
        persistent_data: Option<&str>,
        parent: Option<&Arc<ContactGroup>>,
    ) -> Arc<ContactGroup> {
        let parent = parent.unwrap_or(&self.root);
        let group = ContactGroup::new(ContactGroup::create_name_from_uid(uid));
        group.set_resolved(false);
        group.set_persistent_data(persistent_data.map(str::to_string));
        parent.add_subgroup(group.clone());
        self.fire_group_event(GroupEventKind::Created, &group, Some(parent.clone()));
        group
    }

    /// Creates a session-only contact in the volatile group.
    ///
    /// The volatile group is created on first use. When that happens only a
    /// group creation is reported, since the new group already holds the
    /// contact.
    pub fn create_volatile_contact(&self, id: &str) -> Arc<Contact> {
        let contact = Contact::new(id);
        contact.set_persistent(false);
        contact.set_resolved(false);

        match self.non_persistent_group() {
            Some(group) => {
                group.add_contact(contact.clone());
                self.fire_subscription_event(SubscriptionEventKind::Created, &contact, Some(group));
            }
            None => {
                let group = ContactGroup::new(self.context.config().volatile_group_name.clone());
                group.set_persistent(false);
                group.set_resolved(false);
                group.add_contact(contact.clone());
                self.root.add_subgroup(group.clone());
                debug!(group = %group.uid(), "Created volatile group");
                self.fire_group_event(GroupEventKind::Created, &group, Some(self.root.clone()));
            }
        }
        contact
    }

    /// Returns the volatile group, if it exists.
    pub fn non_persistent_group(&self) -> Option<Arc<ContactGroup>> {
        let name = &self.context.config().volatile_group_name;
        self.root
            .subgroups()
            .into_iter()
            .find(|g| !g.is_persistent() && g.name() == *name)
    }

    // Groups

    /// Creates a group named `name` under `parent`.
    pub fn create_server_stored_contact_group(
        &self,
        parent: &Arc<ContactGroup>,
        name: &str,
    ) -> ProviderResult<Arc<ContactGroup>> {
        let group = ContactGroup::new(name);
        if !parent.add_subgroup(group.clone()) {
            return Err(OperationFailed::internal(format!(
                "could not add group {name} to {}",
                parent.name()
            ))
            .with_provider(self.context.protocol_name()));
        }
        self.fire_group_event(GroupEventKind::Created, &group, Some(parent.clone()));
        Ok(group)
    }

    /// Removes `group` from the contact-list tree.
    ///
    /// # Errors
    ///
    /// Fails with `IllegalArgument` if `group` has no parent in this tree.
    pub fn remove_server_stored_contact_group(&self, group: &Arc<ContactGroup>) -> ProviderResult<()> {
        let Some(parent) = self.root.find_group_parent(group) else {
            return Err(OperationFailed::illegal_argument(format!(
                "group {} does not belong to this contact list",
                group.name()
            ))
            .with_provider(self.context.protocol_name()));
        };
        parent.remove_subgroup(group);
        self.fire_group_event(GroupEventKind::Removed, group, Some(parent));
        Ok(())
    }

    /// Renames `group`. Its uid is unchanged.
    pub fn rename_server_stored_contact_group(&self, group: &Arc<ContactGroup>, new_name: &str) {
        group.set_group_name(new_name);
        let parent = group.parent_contact_group();
        self.fire_group_event(GroupEventKind::Renamed, group, parent);
    }

    /// Adds `group` to the root without notifying anyone.
    pub fn add_mock_group(&self, group: Arc<ContactGroup>) {
        self.root.add_subgroup(group);
    }

    /// Adds `group` to `parent` and reports the creation.
    pub fn add_mock_group_and_fire_event(&self, parent: &Arc<ContactGroup>, group: Arc<ContactGroup>) {
        if parent.add_subgroup(group.clone()) {
            self.fire_group_event(GroupEventKind::Created, &group, Some(parent.clone()));
        }
    }

    // Lookup

    pub fn find_contact_by_id(&self, id: &str) -> Option<Arc<Contact>> {
        self.root.find_contact_by_id(id)
    }

    /// Finds the group that directly holds `group`.
    pub fn find_group_parent(&self, group: &Arc<ContactGroup>) -> Option<Arc<ContactGroup>> {
        self.root.find_group_parent(group)
    }

    /// Finds the group of this contact list that directly holds `contact`.
    pub fn find_contact_parent(&self, contact: &Arc<Contact>) -> Option<Arc<ContactGroup>> {
        self.root.find_contact_parent(contact)
    }

    // Local and contact status

    pub fn presence_status(&self) -> PresenceStatus {
        self.local().status
    }

    pub fn current_status_message(&self) -> String {
        self.local().status_message.clone()
    }

    pub fn set_status_message(&self, message: impl Into<String>) {
        self.local().status_message = message.into();
    }

    pub fn supported_status_set(&self) -> Vec<PresenceStatus> {
        MockStatus::supported().collect()
    }

    /// Publishes a new status for the local user.
    ///
    /// # Errors
    ///
    /// Fails with `IllegalArgument` for a status outside the mock set.
    pub fn publish_presence_status(&self, status: PresenceStatus, message: &str) -> ProviderResult<()> {
        if !MockStatus::is_supported(&status) {
            return Err(OperationFailed::illegal_argument(format!(
                "{status} is not a supported status"
            ))
            .with_provider(self.context.protocol_name()));
        }

        let old_status = {
            let mut local = self.local();
            local.status_message = message.to_string();
            std::mem::replace(&mut local.status, status)
        };
        debug!(old = %old_status, new = %status, "Published presence status");

        let event = ProviderPresenceStatusChangeEvent {
            account: self.context.account().clone(),
            old_status,
            new_status: status,
            timestamp: Utc::now(),
        };
        self.provider_status_listeners
            .dispatch(|l| l.provider_status_changed(&event));
        Ok(())
    }

    /// Returns the status of the contact with address `id`.
    ///
    /// # Errors
    ///
    /// Fails with `NotFound` if no such contact is in the list.
    pub fn query_contact_status(&self, id: &str) -> ProviderResult<PresenceStatus> {
        self.find_contact_by_id(id)
            .map(|c| c.presence_status())
            .ok_or_else(|| {
                OperationFailed::not_found(format!("no contact {id}"))
                    .with_provider(self.context.protocol_name())
            })
    }

    /// Sets the status of `contact` as if the server had reported it.
    pub fn change_presence_status_for_contact(&self, contact: &Arc<Contact>, status: PresenceStatus) {
        let old_status = contact.set_presence_status(status);
        let event = ContactPresenceStatusChangeEvent {
            contact: contact.clone(),
            parent_group: contact.parent_contact_group(),
            old_status,
            new_status: status,
            timestamp: Utc::now(),
        };
        self.contact_status_listeners
            .dispatch(|l| l.contact_presence_status_changed(&event));
    }

    // Listeners

    pub fn add_subscription_listener(&self, listener: Arc<dyn SubscriptionListener>) {
        self.subscription_listeners.add(listener);
    }

    pub fn remove_subscription_listener(&self, listener: &Arc<dyn SubscriptionListener>) {
        self.subscription_listeners.remove(listener);
    }

    pub fn add_server_stored_group_listener(&self, listener: Arc<dyn ServerStoredGroupListener>) {
        self.group_listeners.add(listener);
    }

    pub fn remove_server_stored_group_listener(&self, listener: &Arc<dyn ServerStoredGroupListener>) {
        self.group_listeners.remove(listener);
    }

    pub fn add_provider_presence_status_listener(
        &self,
        listener: Arc<dyn ProviderPresenceStatusListener>,
    ) {
        self.provider_status_listeners.add(listener);
    }

    pub fn remove_provider_presence_status_listener(
        &self,
        listener: &Arc<dyn ProviderPresenceStatusListener>,
    ) {
        self.provider_status_listeners.remove(listener);
    }

    pub fn add_contact_presence_status_listener(
        &self,
        listener: Arc<dyn ContactPresenceStatusListener>,
    ) {
        self.contact_status_listeners.add(listener);
    }

    pub fn remove_contact_presence_status_listener(
        &self,
        listener: &Arc<dyn ContactPresenceStatusListener>,
    ) {
        self.contact_status_listeners.remove(listener);
    }

    fn fire_subscription_event(
        &self,
        kind: SubscriptionEventKind,
        contact: &Arc<Contact>,
        parent_group: Option<Arc<ContactGroup>>,
    ) {
        let event = SubscriptionEvent {
            kind,
            contact: contact.clone(),
            parent_group,
            timestamp: Utc::now(),
        };
        self.subscription_listeners.dispatch(|l| match kind {
            SubscriptionEventKind::Created => l.subscription_created(&event),
            SubscriptionEventKind::Removed => l.subscription_removed(&event),
        });
    }

    fn fire_group_event(
        &self,
        kind: GroupEventKind,
        group: &Arc<ContactGroup>,
        parent_group: Option<Arc<ContactGroup>>,
    ) {
        let event = ServerStoredGroupEvent {
            kind,
            group: group.clone(),
            parent_group,
            timestamp: Utc::now(),
        };
        self.group_listeners.dispatch(|l| match kind {
            GroupEventKind::Created => l.group_created(&event),
            GroupEventKind::Removed => l.group_removed(&event),
            GroupEventKind::Renamed => l.group_renamed(&event),
        });
    }
}

impl OperationSet for PersistentPresence {
    fn kind(&self) -> OperationSetKind {
        OperationSetKind::PersistentPresence
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
