use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use commspi_core::AccountId;
use tracing::debug;

use super::config::MockProviderConfig;
use crate::error::{OperationFailed, ProviderResult};
use crate::provider::RegistrationState;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Returns a process-unique identifier: the current time in milliseconds
/// followed by a sequence number.
pub(crate) fn next_id() -> String {
    let seq = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("{}{:04}", Utc::now().timestamp_millis(), seq)
}

/// State shared between the mock provider and its operation sets.
#[derive(Debug)]
pub(crate) struct ProviderContext {
    config: MockProviderConfig,
    registration: Mutex<RegistrationState>,
}

impl ProviderContext {
    pub(crate) fn new(config: MockProviderConfig) -> Self {
        let initial = if config.start_registered {
            RegistrationState::Registered
        } else {
            RegistrationState::Unregistered
        };
        Self {
            config,
            registration: Mutex::new(initial),
        }
    }

    fn registration(&self) -> MutexGuard<'_, RegistrationState> {
        self.registration
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn config(&self) -> &MockProviderConfig {
        &self.config
    }

    pub(crate) fn account(&self) -> &AccountId {
        &self.config.account
    }

    pub(crate) fn protocol_name(&self) -> &str {
        &self.config.account.protocol
    }

    pub(crate) fn registration_state(&self) -> RegistrationState {
        *self.registration()
    }

    /// Stores `new_state` and returns the previous one, or `None` if the
    /// state did not change.
    pub(crate) fn set_registration_state(
        &self,
        new_state: RegistrationState,
    ) -> Option<RegistrationState> {
        let mut state = self.registration();
        if *state == new_state {
            return None;
        }
        Some(std::mem::replace(&mut *state, new_state))
    }

    /// Fails with `ProviderNotRegistered` unless the provider is signed on.
    pub(crate) fn ensure_registered(&self, operation: &str) -> ProviderResult<()> {
        let state = self.registration_state();
        if state == RegistrationState::Registered {
            return Ok(());
        }
        debug!(operation, state = %state, "Rejecting operation on unregistered provider");
        Err(OperationFailed::not_registered(format!(
            "cannot {operation} while {state}"
        ))
        .with_provider(self.protocol_name()))
    }
}
