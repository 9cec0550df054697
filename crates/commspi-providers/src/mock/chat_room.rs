//! Chat rooms and their members.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use chrono::{DateTime, Utc};
use commspi_core::ListenerRegistry;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use super::contact::Contact;
use super::context::ProviderContext;
use super::messaging::Message;
use super::multi_user_chat::{LocalUserPresenceKind, MultiUserChat};
use crate::error::{OperationFailed, ProviderResult};

/// Role of a member in a chat room, from least to most privileged.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ChatRoomMemberRole {
    Outcast,
    SilentMember,
    Guest,
    #[default]
    Member,
    Moderator,
    Administrator,
    Owner,
}

impl ChatRoomMemberRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Outcast => "outcast",
            Self::SilentMember => "silent_member",
            Self::Guest => "guest",
            Self::Member => "member",
            Self::Moderator => "moderator",
            Self::Administrator => "administrator",
            Self::Owner => "owner",
        }
    }
}

impl fmt::Display for ChatRoomMemberRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A participant of a chat room.
#[derive(Debug)]
pub struct ChatRoomMember {
    name: Mutex<String>,
    role: Mutex<ChatRoomMemberRole>,
    contact: Arc<Contact>,
    room: Weak<ChatRoom>,
}

impl ChatRoomMember {
    fn new(name: String, role: ChatRoomMemberRole, room: &Arc<ChatRoom>) -> Arc<Self> {
        Arc::new(Self {
            contact: Contact::new(name.clone()),
            name: Mutex::new(name),
            role: Mutex::new(role),
            room: Arc::downgrade(room),
        })
    }

    /// Nickname of the member in the room.
    pub fn name(&self) -> String {
        self.name.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn rename(&self, name: &str) {
        *self.name.lock().unwrap_or_else(PoisonError::into_inner) = name.to_string();
    }

    pub fn role(&self) -> ChatRoomMemberRole {
        *self.role.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_role(&self, role: ChatRoomMemberRole) {
        *self.role.lock().unwrap_or_else(PoisonError::into_inner) = role;
    }

    pub fn contact(&self) -> &Arc<Contact> {
        &self.contact
    }

    pub fn chat_room(&self) -> Option<Arc<ChatRoom>> {
        self.room.upgrade()
    }
}

#[derive(Debug, Clone)]
pub struct ChatRoomMessageReceivedEvent {
    pub room: Arc<ChatRoom>,
    pub from: Arc<ChatRoomMember>,
    pub message: Message,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ChatRoomMessageDeliveredEvent {
    pub room: Arc<ChatRoom>,
    pub message: Message,
    pub timestamp: DateTime<Utc>,
}

pub trait ChatRoomMessageListener: Send + Sync {
    fn message_received(&self, _event: &ChatRoomMessageReceivedEvent) {}
    fn message_delivered(&self, _event: &ChatRoomMessageDeliveredEvent) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberPresenceKind {
    Joined,
    Left,
    Kicked,
}

/// Another member joined or left the room.
#[derive(Debug, Clone)]
pub struct ChatRoomMemberPresenceChangeEvent {
    pub room: Arc<ChatRoom>,
    pub member: Arc<ChatRoomMember>,
    pub kind: MemberPresenceKind,
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

pub trait ChatRoomMemberPresenceListener: Send + Sync {
    fn member_presence_changed(&self, event: &ChatRoomMemberPresenceChangeEvent);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRoomProperty {
    Subject,
    Nickname,
}

#[derive(Debug, Clone)]
pub struct ChatRoomPropertyChangeEvent {
    pub room: Arc<ChatRoom>,
    pub property: ChatRoomProperty,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub timestamp: DateTime<Utc>,
}

pub trait ChatRoomPropertyChangeListener: Send + Sync {
    fn property_changed(&self, event: &ChatRoomPropertyChangeEvent);
}

#[derive(Debug, Default)]
struct RoomState {
    subject: Option<String>,
    nickname: Option<String>,
    local_member: Option<Arc<ChatRoomMember>>,
    members: Vec<Arc<ChatRoomMember>>,
}

/// A multi-user chat room.
///
/// The room is joined while it holds a local member.
pub struct ChatRoom {
    name: String,
    context: Arc<ProviderContext>,
    chat: Weak<MultiUserChat>,
    state: Mutex<RoomState>,
    message_listeners: ListenerRegistry<dyn ChatRoomMessageListener>,
    member_listeners: ListenerRegistry<dyn ChatRoomMemberPresenceListener>,
    property_listeners: ListenerRegistry<dyn ChatRoomPropertyChangeListener>,
}

impl ChatRoom {
    pub(crate) fn new(
        name: impl Into<String>,
        context: Arc<ProviderContext>,
        chat: Weak<MultiUserChat>,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            context,
            chat,
            state: Mutex::new(RoomState::default()),
            message_listeners: ListenerRegistry::new(),
            member_listeners: ListenerRegistry::new(),
            property_listeners: ListenerRegistry::new(),
        })
    }

    fn state(&self) -> MutexGuard<'_, RoomState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn identifier(&self) -> &str {
        &self.name
    }

    pub fn is_joined(&self) -> bool {
        self.state().local_member.is_some()
    }

    pub fn subject(&self) -> Option<String> {
        self.state().subject.clone()
    }

    /// Returns the local user's nickname, once one has been chosen.
    pub fn user_nickname(&self) -> Option<String> {
        self.state().nickname.clone()
    }

    pub fn members(&self) -> Vec<Arc<ChatRoomMember>> {
        self.state().members.clone()
    }

    pub fn members_count(&self) -> usize {
        self.state().members.len()
    }

    pub fn find_member(&self, name: &str) -> Option<Arc<ChatRoomMember>> {
        self.state()
            .members
            .iter()
            .find(|m| m.name() == name)
            .cloned()
    }

    /// Joins with the account's user id as nickname.
    pub fn join(self: &Arc<Self>) -> ProviderResult<()> {
        self.join_as(None)
    }

    /// Joins the room as `nickname`, or as the account's user id when
    /// `None`. Joining an already joined room does nothing.
    ///
    /// # Errors
    ///
    /// Fails with `ProviderNotRegistered` when the provider is signed off
    /// and with `IdentificationConflict` when a member already uses the
    /// nickname.
    pub fn join_as(self: &Arc<Self>, nickname: Option<&str>) -> ProviderResult<()> {
        self.context.ensure_registered("join a chat room")?;
        let nickname = nickname
            .map(str::to_string)
            .unwrap_or_else(|| self.context.account().user_id.clone());

        {
            let mut state = self.state();
            if state.local_member.is_some() {
                return Ok(());
            }
            if state.members.iter().any(|m| m.name() == nickname) {
                return Err(OperationFailed::conflict(format!(
                    "nickname {nickname} is already used in {}",
                    self.name
                ))
                .with_provider(self.context.protocol_name()));
            }
            let member = ChatRoomMember::new(nickname.clone(), ChatRoomMemberRole::Member, self);
            state.members.push(member.clone());
            state.local_member = Some(member);
            state.nickname = Some(nickname.clone());
        }

        info!(room = %self.name, nickname = %nickname, "Joined chat room");
        self.fire_local_user_presence(LocalUserPresenceKind::Joined, None);
        Ok(())
    }

    /// Leaves the room. Leaving a room that is not joined does nothing.
    pub fn leave(self: &Arc<Self>) {
        {
            let mut state = self.state();
            let Some(local) = state.local_member.take() else {
                return;
            };
            state.members.retain(|m| !Arc::ptr_eq(m, &local));
        }
        info!(room = %self.name, "Left chat room");
        self.fire_local_user_presence(LocalUserPresenceKind::Left, None);
    }

    /// Changes the local user's nickname.
    ///
    /// # Errors
    ///
    /// Fails with `IdentificationConflict` when another member already uses
    /// the nickname.
    pub fn set_user_nickname(self: &Arc<Self>, nickname: &str) -> ProviderResult<()> {
        let old_value = {
            let mut state = self.state();
            let taken = state.members.iter().any(|m| {
                m.name() == nickname
                    && !state
                        .local_member
                        .as_ref()
                        .is_some_and(|local| Arc::ptr_eq(local, m))
            });
            if taken {
                return Err(OperationFailed::conflict(format!(
                    "nickname {nickname} is already used in {}",
                    self.name
                ))
                .with_provider(self.context.protocol_name()));
            }
            if state.nickname.as_deref() == Some(nickname) {
                return Ok(());
            }
            if let Some(local) = &state.local_member {
                local.rename(nickname);
            }
            state.nickname.replace(nickname.to_string())
        };
        debug!(room = %self.name, nickname, "Nickname changed");
        self.fire_property_change(ChatRoomProperty::Nickname, old_value, Some(nickname.to_string()));
        Ok(())
    }

    /// Sets the room subject.
    pub fn set_subject(self: &Arc<Self>, subject: &str) -> ProviderResult<()> {
        let old_value = self.state().subject.replace(subject.to_string());
        debug!(room = %self.name, subject, "Subject changed");
        self.fire_property_change(ChatRoomProperty::Subject, old_value, Some(subject.to_string()));
        Ok(())
    }

    /// Simulates another user joining the room.
    pub fn add_member(self: &Arc<Self>, name: &str, role: ChatRoomMemberRole) -> Arc<ChatRoomMember> {
        let member = ChatRoomMember::new(name.to_string(), role, self);
        self.state().members.push(member.clone());
        self.fire_member_presence(&member, MemberPresenceKind::Joined, None);
        member
    }

    /// Simulates the member named `name` leaving the room.
    pub fn remove_member(self: &Arc<Self>, name: &str) -> Option<Arc<ChatRoomMember>> {
        self.remove_member_with(name, MemberPresenceKind::Left, None)
    }

    /// Simulates the member named `name` being kicked out.
    pub fn kick_member(self: &Arc<Self>, name: &str, reason: &str) -> Option<Arc<ChatRoomMember>> {
        self.remove_member_with(name, MemberPresenceKind::Kicked, Some(reason))
    }

    fn remove_member_with(
        self: &Arc<Self>,
        name: &str,
        kind: MemberPresenceKind,
        reason: Option<&str>,
    ) -> Option<Arc<ChatRoomMember>> {
        let (member, was_local) = {
            let mut state = self.state();
            let index = state.members.iter().position(|m| m.name() == name)?;
            let member = state.members.remove(index);
            let was_local = state
                .local_member
                .as_ref()
                .is_some_and(|local| Arc::ptr_eq(local, &member));
            if was_local {
                state.local_member = None;
            }
            (member, was_local)
        };
        debug!(room = %self.name, member = name, ?kind, "Member removed");
        self.fire_member_presence(&member, kind, reason);
        if was_local {
            let local_kind = match kind {
                MemberPresenceKind::Kicked => LocalUserPresenceKind::Kicked,
                _ => LocalUserPresenceKind::Left,
            };
            self.fire_local_user_presence(local_kind, reason);
        }
        Some(member)
    }

    /// Creates a plain-text message for this room.
    pub fn create_message(&self, text: &str) -> Message {
        Message::new(text)
    }

    /// Sends `message` to the room.
    ///
    /// # Errors
    ///
    /// Fails with `ChatRoomNotJoined` unless the room is joined.
    pub fn send_message(self: &Arc<Self>, message: Message) -> ProviderResult<()> {
        if !self.is_joined() {
            return Err(OperationFailed::not_joined(format!(
                "cannot send to {} before joining it",
                self.name
            ))
            .with_provider(self.context.protocol_name()));
        }
        let event = ChatRoomMessageDeliveredEvent {
            room: self.clone(),
            message,
            timestamp: Utc::now(),
        };
        self.message_listeners
            .dispatch(|l| l.message_delivered(&event));
        Ok(())
    }

    /// Simulates `message` arriving from the member named `from`.
    ///
    /// Messages from non-members are dropped.
    pub fn deliver_message(self: &Arc<Self>, message: Message, from: &str) {
        let Some(member) = self.find_member(from) else {
            trace!(room = %self.name, from, "Dropping message from non-member");
            return;
        };
        let event = ChatRoomMessageReceivedEvent {
            room: self.clone(),
            from: member,
            message,
            timestamp: Utc::now(),
        };
        self.message_listeners
            .dispatch(|l| l.message_received(&event));
    }

    pub fn add_message_listener(&self, listener: Arc<dyn ChatRoomMessageListener>) {
        self.message_listeners.add(listener);
    }

    pub fn remove_message_listener(&self, listener: &Arc<dyn ChatRoomMessageListener>) {
        self.message_listeners.remove(listener);
    }

    pub fn add_member_presence_listener(&self, listener: Arc<dyn ChatRoomMemberPresenceListener>) {
        self.member_listeners.add(listener);
    }

    pub fn remove_member_presence_listener(
        &self,
        listener: &Arc<dyn ChatRoomMemberPresenceListener>,
    ) {
        self.member_listeners.remove(listener);
    }

    pub fn add_property_change_listener(&self, listener: Arc<dyn ChatRoomPropertyChangeListener>) {
        self.property_listeners.add(listener);
    }

    pub fn remove_property_change_listener(
        &self,
        listener: &Arc<dyn ChatRoomPropertyChangeListener>,
    ) {
        self.property_listeners.remove(listener);
    }

    fn fire_local_user_presence(self: &Arc<Self>, kind: LocalUserPresenceKind, reason: Option<&str>) {
        if let Some(chat) = self.chat.upgrade() {
            chat.fire_local_user_presence(self, kind, reason);
        }
    }

    fn fire_member_presence(
        self: &Arc<Self>,
        member: &Arc<ChatRoomMember>,
        kind: MemberPresenceKind,
        reason: Option<&str>,
    ) {
        let event = ChatRoomMemberPresenceChangeEvent {
            room: self.clone(),
            member: member.clone(),
            kind,
            reason: reason.map(str::to_string),
            timestamp: Utc::now(),
        };
        self.member_listeners
            .dispatch(|l| l.member_presence_changed(&event));
    }

    fn fire_property_change(
        self: &Arc<Self>,
        property: ChatRoomProperty,
        old_value: Option<String>,
        new_value: Option<String>,
    ) {
        let event = ChatRoomPropertyChangeEvent {
            room: self.clone(),
            property,
            old_value,
            new_value,
            timestamp: Utc::now(),
        };
        self.property_listeners
            .dispatch(|l| l.property_changed(&event));
    }
}

impl fmt::Debug for ChatRoom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("ChatRoom")
            .field("name", &self.name)
            .field("joined", &state.local_member.is_some())
            .field("members", &state.members.len())
            .finish()
    }
}
