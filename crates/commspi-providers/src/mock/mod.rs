//! In-memory mock protocol provider.
//!
//! The mock provider keeps everything in process memory and performs no
//! I/O. It serves as a reference for how providers keep their entity graph
//! and notify listeners, and as a test double for code consuming the
//! provider API.
//!
//! - [`MockProvider`] - Aggregates the operation sets below
//! - [`PersistentPresence`] - Contact-list tree and presence
//! - [`BasicTelephony`] - Calls driven by participant state
//! - [`BasicInstantMessaging`] - One-to-one messages
//! - [`MultiUserChat`] - Chat rooms
//! - [`FileTransferOperations`] - File transfers

pub mod call;
pub mod chat_room;
pub mod config;
pub mod contact;
mod context;
pub mod file_transfer;
pub mod group;
pub mod messaging;
pub mod multi_user_chat;
pub mod presence;
pub mod provider;
pub mod status;
pub mod telephony;

pub use call::{Call, CallParticipant, CallParticipantState, CallState};
pub use chat_room::{ChatRoom, ChatRoomMember, ChatRoomMemberRole};
pub use config::{ConfigError, LoggingSettings, MockProviderConfig};
pub use contact::Contact;
pub use file_transfer::{FileTransfer, FileTransferOperations, FileTransferStatus};
pub use group::ContactGroup;
pub use messaging::{BasicInstantMessaging, Message};
pub use multi_user_chat::MultiUserChat;
pub use presence::PersistentPresence;
pub use provider::MockProvider;
pub use status::MockStatus;
pub use telephony::BasicTelephony;
