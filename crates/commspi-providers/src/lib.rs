//! ProtocolProvider trait, operation sets and the mock provider.
//!
//! This crate provides the service-provider interface for communication
//! protocols:
//!
//! - [`ProtocolProvider`] - The core trait every protocol implements
//! - [`OperationSet`] / [`OperationSetRegistry`] - Capability lookup
//! - [`OperationFailed`] - Error type for operations that reach the service
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │              ProtocolProvider            │
//! │  (account, registration, capabilities)   │
//! └────────────────────┬─────────────────────┘
//!                      │ operation_set(kind)
//!                      ▼
//! ┌──────────────────────────────────────────┐
//! │          OperationSetRegistry            │
//! └───┬──────────┬──────────┬──────────┬─────┘
//!     ▼          ▼          ▼          ▼
//!  Presence  Telephony  Messaging  MultiUserChat ...
//!     │          │          │          │
//!     └──────────┴────┬─────┴──────────┘
//!                     ▼
//!            listeners (synchronous)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use commspi_providers::{MockProvider, OperationSetKind, ProtocolProvider};
//!
//! let provider = MockProvider::for_user("alice")?;
//! assert!(provider.operation_set(OperationSetKind::Whiteboarding).is_none());
//! let bob = provider.presence().subscribe("bob@mock")?;
//! ```

pub mod error;
#[cfg(feature = "mock")]
pub mod mock;
pub mod operation_set;
pub mod provider;

// Re-export main types at crate root
pub use error::{OperationFailed, OperationFailedCode, ProviderResult};
#[cfg(feature = "mock")]
pub use mock::{MockProvider, MockProviderConfig, MockStatus};
pub use operation_set::{OperationSet, OperationSetKind, OperationSetRegistry};
pub use provider::{
    ProtocolProvider, RegistrationReason, RegistrationState, RegistrationStateChangeEvent,
    RegistrationStateChangeListener,
};
