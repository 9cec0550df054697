//! Multi-user chat operation set.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use chrono::{DateTime, Utc};
use commspi_core::ListenerRegistry;
use tracing::{debug, info};

use super::chat_room::ChatRoom;
use super::context::ProviderContext;
use crate::error::{OperationFailed, ProviderResult};
use crate::operation_set::{OperationSet, OperationSetKind};

/// What happened to the local user in a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalUserPresenceKind {
    Joined,
    Left,
    Kicked,
}

#[derive(Debug, Clone)]
pub struct LocalUserChatRoomPresenceChangeEvent {
    pub room: Arc<ChatRoom>,
    pub kind: LocalUserPresenceKind,
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Receives the local user's joins and departures.
pub trait LocalUserChatRoomPresenceListener: Send + Sync {
    fn local_user_presence_changed(&self, event: &LocalUserChatRoomPresenceChangeEvent);
}

/// Multi-user chat operation set of the mock provider.
pub struct MultiUserChat {
    context: Arc<ProviderContext>,
    this: Weak<MultiUserChat>,
    rooms: Mutex<Vec<Arc<ChatRoom>>>,
    presence_listeners: ListenerRegistry<dyn LocalUserChatRoomPresenceListener>,
}

impl MultiUserChat {
    pub(crate) fn new(context: Arc<ProviderContext>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            context,
            this: this.clone(),
            rooms: Mutex::new(Vec::new()),
            presence_listeners: ListenerRegistry::new(),
        })
    }

    fn rooms(&self) -> MutexGuard<'_, Vec<Arc<ChatRoom>>> {
        self.rooms.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Creates a room named `name`.
    ///
    /// # Errors
    ///
    /// Fails with `ProviderNotRegistered` when the provider is signed off
    /// and with `IdentificationConflict` if the room already exists.
    pub fn create_chat_room(&self, name: &str) -> ProviderResult<Arc<ChatRoom>> {
        self.context.ensure_registered("create a chat room")?;
        let mut rooms = self.rooms();
        if rooms.iter().any(|r| r.name() == name) {
            return Err(OperationFailed::conflict(format!("room {name} already exists"))
                .with_provider(self.context.protocol_name()));
        }
        let room = ChatRoom::new(name, self.context.clone(), self.this.clone());
        rooms.push(room.clone());
        debug!(room = %name, "Chat room created");
        Ok(room)
    }

    pub fn find_room(&self, name: &str) -> Option<Arc<ChatRoom>> {
        self.rooms().iter().find(|r| r.name() == name).cloned()
    }

    /// Names of every known room.
    pub fn existing_chat_rooms(&self) -> Vec<String> {
        self.rooms().iter().map(|r| r.name().to_string()).collect()
    }

    /// Rooms the local user is currently in.
    pub fn joined_chat_rooms(&self) -> Vec<Arc<ChatRoom>> {
        self.rooms().iter().filter(|r| r.is_joined()).cloned().collect()
    }

    pub fn add_presence_listener(&self, listener: Arc<dyn LocalUserChatRoomPresenceListener>) {
        self.presence_listeners.add(listener);
    }

    pub fn remove_presence_listener(&self, listener: &Arc<dyn LocalUserChatRoomPresenceListener>) {
        self.presence_listeners.remove(listener);
    }

    pub(crate) fn fire_local_user_presence(
        &self,
        room: &Arc<ChatRoom>,
        kind: LocalUserPresenceKind,
        reason: Option<&str>,
    ) {
        info!(room = %room.name(), ?kind, "Local user presence changed");
        let event = LocalUserChatRoomPresenceChangeEvent {
            room: room.clone(),
            kind,
            reason: reason.map(str::to_string),
            timestamp: Utc::now(),
        };
        self.presence_listeners
            .dispatch(|l| l.local_user_presence_changed(&event));
    }
}

impl OperationSet for MultiUserChat {
    fn kind(&self) -> OperationSetKind {
        OperationSetKind::MultiUserChat
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

impl fmt::Debug for MultiUserChat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiUserChat")
            .field("rooms", &self.existing_chat_rooms())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OperationFailedCode;
    use crate::mock::config::MockProviderConfig;

    #[derive(Default)]
    struct Recorder {
        kinds: Mutex<Vec<(String, LocalUserPresenceKind)>>,
    }

    impl LocalUserChatRoomPresenceListener for Recorder {
        fn local_user_presence_changed(&self, e: &LocalUserChatRoomPresenceChangeEvent) {
            self.kinds
                .lock()
                .unwrap()
                .push((e.room.name().to_string(), e.kind));
        }
    }

    fn chat(registered: bool) -> Arc<MultiUserChat> {
        let config = MockProviderConfig::default().with_start_registered(registered);
        MultiUserChat::new(Arc::new(ProviderContext::new(config)))
    }

    #[test]
    fn create_and_find_rooms() {
        let chat = chat(true);
        let lobby = chat.create_chat_room("lobby").unwrap();
        chat.create_chat_room("dev").unwrap();

        assert!(Arc::ptr_eq(&chat.find_room("lobby").unwrap(), &lobby));
        assert!(chat.find_room("ops").is_none());
        assert_eq!(chat.existing_chat_rooms(), vec!["lobby", "dev"]);
    }

    #[test]
    fn duplicate_room_conflicts() {
        let chat = chat(true);
        chat.create_chat_room("lobby").unwrap();
        let err = chat.create_chat_room("lobby").unwrap_err();
        assert_eq!(err.code(), OperationFailedCode::IdentificationConflict);
    }

    #[test]
    fn rooms_require_registration() {
        let chat = chat(false);
        let err = chat.create_chat_room("lobby").unwrap_err();
        assert_eq!(err.code(), OperationFailedCode::ProviderNotRegistered);
    }

    #[test]
    fn local_user_presence_is_reported() {
        let chat = chat(true);
        let recorder = Arc::new(Recorder::default());
        chat.add_presence_listener(recorder.clone());
        let lobby = chat.create_chat_room("lobby").unwrap();
        let dev = chat.create_chat_room("dev").unwrap();

        lobby.join().unwrap();
        dev.join_as(Some("builder")).unwrap();
        assert_eq!(chat.joined_chat_rooms().len(), 2);

        lobby.leave();
        let joined = chat.joined_chat_rooms();
        assert_eq!(joined.len(), 1);
        assert!(Arc::ptr_eq(&joined[0], &dev));

        assert_eq!(
            *recorder.kinds.lock().unwrap(),
            vec![
                ("lobby".to_string(), LocalUserPresenceKind::Joined),
                ("dev".to_string(), LocalUserPresenceKind::Joined),
                ("lobby".to_string(), LocalUserPresenceKind::Left),
            ]
        );
    }

    #[test]
    fn removing_the_local_member_leaves_the_room() {
        let chat = chat(true);
        let recorder = Arc::new(Recorder::default());
        chat.add_presence_listener(recorder.clone());
        let lobby = chat.create_chat_room("lobby").unwrap();
        let dev = chat.create_chat_room("dev").unwrap();

        lobby.join().unwrap();
        dev.join_as(Some("builder")).unwrap();
        lobby.kick_member("mockuser", "bye").unwrap();
        dev.remove_member("builder").unwrap();

        assert!(!lobby.is_joined());
        assert!(chat.joined_chat_rooms().is_empty());
        assert_eq!(
            *recorder.kinds.lock().unwrap(),
            vec![
                ("lobby".to_string(), LocalUserPresenceKind::Joined),
                ("dev".to_string(), LocalUserPresenceKind::Joined),
                ("lobby".to_string(), LocalUserPresenceKind::Kicked),
                ("dev".to_string(), LocalUserPresenceKind::Left),
            ]
        );
    }
}
