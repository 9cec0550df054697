//! Contact groups and tree search.
//!
//! Groups form a tree rooted at the presence operation set's root group.
//! Each group owns its contacts and subgroups; children point back at their
//! parent through a `Weak` reference only.
//!
//! All recursive searches are pre-order depth-first: the direct children of
//! a group are checked before descending into its subgroups, and subgroups
//! are visited in insertion order. The first match wins.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::warn;

use super::contact::Contact;

/// Suffix appended to a group name to form its uid.
pub const UID_SUFFIX: &str = ".uid";

#[derive(Debug)]
struct GroupState {
    name: String,
    persistent: bool,
    resolved: bool,
    persistent_data: Option<String>,
    contacts: Vec<Arc<Contact>>,
    subgroups: Vec<Arc<ContactGroup>>,
    parent: Weak<ContactGroup>,
}

/// A node of the contact-list tree.
#[derive(Debug)]
pub struct ContactGroup {
    uid: String,
    state: Mutex<GroupState>,
}

impl ContactGroup {
    /// Creates an empty, persistent, resolved group.
    ///
    /// The uid is derived from `name` here and never changes afterwards.
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        let name = name.into();
        Arc::new(Self {
            uid: format!("{name}{UID_SUFFIX}"),
            state: Mutex::new(GroupState {
                name,
                persistent: true,
                resolved: true,
                persistent_data: None,
                contacts: Vec::new(),
                subgroups: Vec::new(),
                parent: Weak::new(),
            }),
        })
    }

    /// Returns the group name encoded in `uid`.
    pub fn create_name_from_uid(uid: &str) -> String {
        uid.strip_suffix(UID_SUFFIX).unwrap_or(uid).to_string()
    }

    fn state(&self) -> MutexGuard<'_, GroupState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn name(&self) -> String {
        self.state().name.clone()
    }

    /// Changes the display name. The uid is unaffected.
    pub fn set_group_name(&self, name: impl Into<String>) {
        self.state().name = name.into();
    }

    pub fn is_persistent(&self) -> bool {
        self.state().persistent
    }

    pub fn set_persistent(&self, persistent: bool) {
        self.state().persistent = persistent;
    }

    pub fn is_resolved(&self) -> bool {
        self.state().resolved
    }

    pub fn set_resolved(&self, resolved: bool) {
        self.state().resolved = resolved;
    }

    pub fn persistent_data(&self) -> Option<String> {
        self.state().persistent_data.clone()
    }

    pub fn set_persistent_data(&self, data: Option<String>) {
        self.state().persistent_data = data;
    }

    /// Groups in the mock list may always nest.
    pub fn can_contain_subgroups(&self) -> bool {
        true
    }

    pub fn parent_contact_group(&self) -> Option<Arc<ContactGroup>> {
        self.state().parent.upgrade()
    }

    pub fn count_contacts(&self) -> usize {
        self.state().contacts.len()
    }

    pub fn count_subgroups(&self) -> usize {
        self.state().subgroups.len()
    }

    /// Counts the contacts in this group and every group below it.
    pub fn total_contact_count(&self) -> usize {
        let (own, subgroups) = {
            let state = self.state();
            (state.contacts.len(), state.subgroups.clone())
        };
        own + subgroups
            .iter()
            .map(|g| g.total_contact_count())
            .sum::<usize>()
    }

    /// Returns the direct contacts in insertion order.
    pub fn contacts(&self) -> Vec<Arc<Contact>> {
        self.state().contacts.clone()
    }

    /// Returns the direct subgroups in insertion order.
    pub fn subgroups(&self) -> Vec<Arc<ContactGroup>> {
        self.state().subgroups.clone()
    }

    pub fn contact_at(&self, index: usize) -> Option<Arc<Contact>> {
        self.state().contacts.get(index).cloned()
    }

    pub fn group_at(&self, index: usize) -> Option<Arc<ContactGroup>> {
        self.state().subgroups.get(index).cloned()
    }

    /// Returns the direct contact with `address`.
    pub fn contact(&self, address: &str) -> Option<Arc<Contact>> {
        self.state()
            .contacts
            .iter()
            .find(|c| c.address() == address)
            .cloned()
    }

    /// Returns the direct subgroup named `name`.
    pub fn group(&self, name: &str) -> Option<Arc<ContactGroup>> {
        self.state()
            .subgroups
            .iter()
            .find(|g| g.name() == name)
            .cloned()
    }

    pub fn contains_contact(&self, contact: &Arc<Contact>) -> bool {
        self.state().contacts.iter().any(|c| Arc::ptr_eq(c, contact))
    }

    pub fn contains_group(&self, group: &Arc<ContactGroup>) -> bool {
        self.state().subgroups.iter().any(|g| Arc::ptr_eq(g, group))
    }

    /// Appends `contact`, detaching it from any previous parent first.
    pub fn add_contact(self: &Arc<Self>, contact: Arc<Contact>) {
        if let Some(old) = contact.parent_contact_group() {
            if Arc::ptr_eq(&old, self) && self.contains_contact(&contact) {
                return;
            }
            old.remove_contact(&contact);
        }
        contact.set_parent(Some(self));
        self.state().contacts.push(contact);
    }

    /// Removes `contact` from this group. Returns false if it was not a
    /// direct child.
    pub fn remove_contact(&self, contact: &Arc<Contact>) -> bool {
        let removed = {
            let mut state = self.state();
            let before = state.contacts.len();
            state.contacts.retain(|c| !Arc::ptr_eq(c, contact));
            state.contacts.len() != before
        };
        if removed {
            contact.set_parent(None);
        }
        removed
    }

    /// Appends `group` as a subgroup, detaching it from any previous parent.
    ///
    /// Returns false, leaving the tree untouched, if `group` is this group
    /// or one of its ancestors.
    pub fn add_subgroup(self: &Arc<Self>, group: Arc<ContactGroup>) -> bool {
        if self.is_self_or_descendant_of(&group) {
            warn!(
                group = %group.uid(),
                parent = %self.uid(),
                "Refusing to add a group below itself"
            );
            return false;
        }
        if let Some(old) = group.parent_contact_group() {
            if Arc::ptr_eq(&old, self) && self.contains_group(&group) {
                return true;
            }
            old.remove_subgroup(&group);
        }
        group.state().parent = Arc::downgrade(self);
        self.state().subgroups.push(group);
        true
    }

    /// Removes a direct subgroup. Returns false if it was not a direct child.
    pub fn remove_subgroup(&self, group: &Arc<ContactGroup>) -> bool {
        let removed = {
            let mut state = self.state();
            let before = state.subgroups.len();
            state.subgroups.retain(|g| !Arc::ptr_eq(g, group));
            state.subgroups.len() != before
        };
        if removed {
            group.state().parent = Weak::new();
        }
        removed
    }

    fn is_self_or_descendant_of(self: &Arc<Self>, ancestor: &Arc<ContactGroup>) -> bool {
        let mut current = Some(self.clone());
        while let Some(group) = current {
            if Arc::ptr_eq(&group, ancestor) {
                return true;
            }
            current = group.parent_contact_group();
        }
        false
    }

    /// Finds a contact by address anywhere below this group.
    pub fn find_contact_by_id(&self, address: &str) -> Option<Arc<Contact>> {
        if let Some(contact) = self.contact(address) {
            return Some(contact);
        }
        self.subgroups()
            .iter()
            .find_map(|g| g.find_contact_by_id(address))
    }

    /// Finds a group by name anywhere below this group.
    pub fn find_group_by_name(&self, name: &str) -> Option<Arc<ContactGroup>> {
        let subgroups = self.subgroups();
        if let Some(group) = subgroups.iter().find(|g| g.name() == name) {
            return Some(group.clone());
        }
        subgroups.iter().find_map(|g| g.find_group_by_name(name))
    }

    /// Finds the group below this one that directly holds `group`.
    pub fn find_group_parent(self: &Arc<Self>, group: &Arc<ContactGroup>) -> Option<Arc<ContactGroup>> {
        if self.contains_group(group) {
            return Some(self.clone());
        }
        self.subgroups()
            .iter()
            .find_map(|g| g.find_group_parent(group))
    }

    /// Finds the group below this one that directly holds `contact`.
    pub fn find_contact_parent(self: &Arc<Self>, contact: &Arc<Contact>) -> Option<Arc<ContactGroup>> {
        if self.contains_contact(contact) {
            return Some(self.clone());
        }
        self.subgroups()
            .iter()
            .find_map(|g| g.find_contact_parent(contact))
    }
}

impl fmt::Display for ContactGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        write!(f, "{}.subGroups={}:", state.name, state.subgroups.len())?;
        for contact in &state.contacts {
            write!(f, " {}", contact.address())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> (Arc<ContactGroup>, Arc<ContactGroup>, Arc<ContactGroup>) {
        let root = ContactGroup::new("Root");
        let work = ContactGroup::new("Work");
        let team = ContactGroup::new("Team");
        root.add_subgroup(work.clone());
        work.add_subgroup(team.clone());
        (root, work, team)
    }

    #[test]
    fn uid_is_stable_across_renames() {
        let group = ContactGroup::new("Friends");
        assert_eq!(group.uid(), "Friends.uid");
        group.set_group_name("Buddies");
        assert_eq!(group.name(), "Buddies");
        assert_eq!(group.uid(), "Friends.uid");
    }

    #[test]
    fn name_from_uid() {
        assert_eq!(ContactGroup::create_name_from_uid("Family.uid"), "Family");
        assert_eq!(ContactGroup::create_name_from_uid("Family"), "Family");
    }

    #[test]
    fn add_and_remove_maintain_back_references() {
        let (root, work, _) = tree();
        let alice = Contact::new("alice");
        work.add_contact(alice.clone());

        assert!(Arc::ptr_eq(&alice.parent_contact_group().unwrap(), &work));
        assert!(Arc::ptr_eq(&work.parent_contact_group().unwrap(), &root));
        assert!(root.parent_contact_group().is_none());

        assert!(work.remove_contact(&alice));
        assert!(alice.parent_contact_group().is_none());
        assert!(!work.remove_contact(&alice));
    }

    #[test]
    fn adding_to_a_new_group_detaches_from_the_old_one() {
        let (root, work, _) = tree();
        let alice = Contact::new("alice");
        root.add_contact(alice.clone());
        work.add_contact(alice.clone());

        assert_eq!(root.count_contacts(), 0);
        assert_eq!(work.count_contacts(), 1);
        assert_eq!(root.total_contact_count(), 1);
    }

    #[test]
    fn cycles_are_refused() {
        let (root, work, team) = tree();
        assert!(!team.add_subgroup(root.clone()));
        assert!(!work.add_subgroup(work.clone()));
        assert_eq!(team.count_subgroups(), 0);
        assert!(Arc::ptr_eq(&work.parent_contact_group().unwrap(), &root));
    }

    #[test]
    fn find_contact_searches_recursively() {
        let (root, work, team) = tree();
        let deep = Contact::new("deep");
        team.add_contact(deep.clone());
        work.add_contact(Contact::new("mid"));

        assert!(Arc::ptr_eq(&root.find_contact_by_id("deep").unwrap(), &deep));
        assert!(root.find_contact_by_id("mid").is_some());
        assert!(root.find_contact_by_id("nobody").is_none());
        assert!(team.find_contact_by_id("mid").is_none());
    }

    #[test]
    fn direct_children_win_over_deeper_matches() {
        let (root, work, team) = tree();
        let shallow = Contact::new("dup");
        let deep = Contact::new("dup");
        team.add_contact(deep);
        work.add_contact(shallow.clone());

        assert!(Arc::ptr_eq(&root.find_contact_by_id("dup").unwrap(), &shallow));
    }

    #[test]
    fn subgroups_are_searched_in_insertion_order() {
        let root = ContactGroup::new("Root");
        let first = ContactGroup::new("First");
        let second = ContactGroup::new("Second");
        root.add_subgroup(first.clone());
        root.add_subgroup(second.clone());
        first.add_contact(Contact::new("x"));
        second.add_contact(Contact::new("x"));

        let found = root.find_contact_by_id("x").unwrap();
        assert!(Arc::ptr_eq(&found.parent_contact_group().unwrap(), &first));
    }

    #[test]
    fn find_parents_and_groups() {
        let (root, work, team) = tree();
        let bob = Contact::new("bob");
        team.add_contact(bob.clone());

        assert!(Arc::ptr_eq(&root.find_group_parent(&team).unwrap(), &work));
        assert!(Arc::ptr_eq(&root.find_contact_parent(&bob).unwrap(), &team));
        assert!(root.find_group_parent(&root).is_none());
        assert!(Arc::ptr_eq(&root.find_group_by_name("Team").unwrap(), &team));
        assert!(root.find_group_by_name("Missing").is_none());
    }

    #[test]
    fn index_access() {
        let (root, work, _) = tree();
        root.add_contact(Contact::new("a"));
        root.add_contact(Contact::new("b"));

        assert_eq!(root.contact_at(1).unwrap().address(), "b");
        assert!(root.contact_at(2).is_none());
        assert!(Arc::ptr_eq(&root.group_at(0).unwrap(), &work));
        assert!(Arc::ptr_eq(&root.group("Work").unwrap(), &work));
    }

    #[test]
    fn display_lists_direct_contacts() {
        let (root, _, _) = tree();
        root.add_contact(Contact::new("a"));
        root.add_contact(Contact::new("b"));
        insta::assert_snapshot!(root.to_string(), @"Root.subGroups=1: a b");
    }
}
