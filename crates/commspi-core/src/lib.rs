//! Core types: presence status, accounts, listener registries, tracing

pub mod account;
pub mod listeners;
pub mod status;
pub mod tracing;

pub use account::AccountId;
pub use listeners::ListenerRegistry;
pub use status::PresenceStatus;
pub use tracing::{TracingConfig, TracingError, TracingOutputFormat, build_subscriber, init_tracing};
