//! Error types for protocol provider operations.
//!
//! Bookkeeping in this layer never fails: lookups that miss return `None`
//! and redundant requests are ignored. [`OperationFailed`] is reserved for
//! operations that a real provider would carry out over the network
//! (subscribing, publishing a status, placing a call, joining a room).

use std::fmt;
use thiserror::Error;

/// The reason an operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationFailedCode {
    /// Unclassified failure.
    GeneralError,
    /// The network could not be reached or the request timed out.
    NetworkFailure,
    /// The provider is not registered on its service.
    ProviderNotRegistered,
    /// Unexpected internal state.
    InternalError,
    /// An argument does not belong to this provider or is malformed.
    IllegalArgument,
    /// The identifier (nickname, room name) is already taken.
    IdentificationConflict,
    /// The target entity does not exist.
    NotFound,
    /// The service refused the request.
    Forbidden,
    /// The provider does not implement the operation.
    NotSupportedOperation,
    /// A chat room operation was attempted before joining the room.
    ChatRoomNotJoined,
    /// A subscription for the contact already exists.
    SubscriptionAlreadyExists,
}

impl OperationFailedCode {
    /// Returns true if the failure is transient.
    ///
    /// Nothing in this layer retries; real providers may use this hint.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NetworkFailure)
    }

    /// Returns a machine-friendly name for this code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GeneralError => "general_error",
            Self::NetworkFailure => "network_failure",
            Self::ProviderNotRegistered => "provider_not_registered",
            Self::InternalError => "internal_error",
            Self::IllegalArgument => "illegal_argument",
            Self::IdentificationConflict => "identification_conflict",
            Self::NotFound => "not_found",
            Self::Forbidden => "forbidden",
            Self::NotSupportedOperation => "not_supported_operation",
            Self::ChatRoomNotJoined => "chat_room_not_joined",
            Self::SubscriptionAlreadyExists => "subscription_already_exists",
        }
    }
}

impl fmt::Display for OperationFailedCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An operation on a protocol provider failed.
#[derive(Debug, Error)]
pub struct OperationFailed {
    code: OperationFailedCode,
    message: String,
    /// The provider that reported the failure (e.g. "mock").
    provider: Option<String>,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl OperationFailed {
    /// Creates a new error with the given code and message.
    pub fn new(code: OperationFailedCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            provider: None,
            source: None,
        }
    }

    /// Creates a general error.
    pub fn general(message: impl Into<String>) -> Self {
        Self::new(OperationFailedCode::GeneralError, message)
    }

    /// Creates a network failure.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(OperationFailedCode::NetworkFailure, message)
    }

    /// Creates a provider-not-registered error.
    pub fn not_registered(message: impl Into<String>) -> Self {
        Self::new(OperationFailedCode::ProviderNotRegistered, message)
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(OperationFailedCode::InternalError, message)
    }

    /// Creates an illegal-argument error.
    pub fn illegal_argument(message: impl Into<String>) -> Self {
        Self::new(OperationFailedCode::IllegalArgument, message)
    }

    /// Creates an identification-conflict error.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(OperationFailedCode::IdentificationConflict, message)
    }

    /// Creates a not-found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(OperationFailedCode::NotFound, message)
    }

    /// Creates a not-supported error.
    pub fn not_supported(message: impl Into<String>) -> Self {
        Self::new(OperationFailedCode::NotSupportedOperation, message)
    }

    /// Creates a chat-room-not-joined error.
    pub fn not_joined(message: impl Into<String>) -> Self {
        Self::new(OperationFailedCode::ChatRoomNotJoined, message)
    }

    /// Sets the provider name.
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Sets the underlying cause.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    /// Returns the error code.
    pub fn code(&self) -> OperationFailedCode {
        self.code
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the provider name, if set.
    pub fn provider(&self) -> Option<&str> {
        self.provider.as_deref()
    }

    /// Returns true if the failure is transient.
    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }
}

impl fmt::Display for OperationFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref provider) = self.provider {
            write!(f, "[{}] ", provider)?;
        }
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// A specialized Result type for provider operations.
pub type ProviderResult<T> = Result<T, OperationFailed>;
