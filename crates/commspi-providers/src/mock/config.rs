//! Mock provider configuration.
//!
//! The configuration can be built in code with the `with_*` methods or
//! loaded from a TOML file:
//!
//! ```toml
//! initial_status = "MockStatus70"
//! status_message = "At my desk"
//! start_registered = true
//!
//! [account]
//! protocol = "mock"
//! user_id = "alice"
//! service = "example.org"
//!
//! [logging]
//! level = "debug"
//! format = "json"
//! ```

use std::path::{Path, PathBuf};

use commspi_core::tracing::{TracingConfig, TracingError, TracingOutputFormat};
use commspi_core::{AccountId, PresenceStatus};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::status::MockStatus;

/// Errors raised while loading a [`MockProviderConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for this schema.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// `initial_status` names no known mock status.
    #[error("unknown presence status: {name}")]
    UnknownStatus { name: String },

    /// The `[logging]` section is invalid.
    #[error("invalid logging settings: {0}")]
    Logging(#[from] TracingError),
}

/// Log output settings, turned into a [`TracingConfig`] by the embedding
/// application.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Level name for the `commspi` targets.
    pub level: String,
    pub format: TracingOutputFormat,
    pub include_location: bool,
    /// Full `EnvFilter` directive, replacing `level` when set.
    pub filter: Option<String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: TracingOutputFormat::Compact,
            include_location: false,
            filter: None,
        }
    }
}

impl LoggingSettings {
    pub fn tracing_config(&self) -> Result<TracingConfig, TracingError> {
        let config = TracingConfig::default()
            .with_level_name(&self.level)?
            .with_format(self.format)
            .with_location(self.include_location);
        Ok(match &self.filter {
            Some(filter) => config.with_env_filter(filter.clone()),
            None => config,
        })
    }
}

/// Configuration for the mock provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MockProviderConfig {
    /// Account the provider acts for.
    pub account: AccountId,

    /// Name of the status published at startup.
    pub initial_status: String,

    /// Status message published at startup.
    pub status_message: String,

    /// Name of the root of the server-stored contact list.
    pub root_group_name: String,

    /// Name of the group that holds volatile contacts.
    pub volatile_group_name: String,

    /// Whether the provider starts signed on.
    pub start_registered: bool,

    /// Largest file the file-transfer operation set accepts, in bytes.
    pub max_file_length: u64,

    pub logging: LoggingSettings,
}

impl Default for MockProviderConfig {
    fn default() -> Self {
        Self {
            account: AccountId::new(
                Self::PROTOCOL_NAME,
                Self::DEFAULT_USER_ID,
                Self::DEFAULT_SERVICE,
            ),
            initial_status: MockStatus::MOCK_STATUS_50.name().to_string(),
            status_message: Self::DEFAULT_STATUS_MESSAGE.to_string(),
            root_group_name: Self::DEFAULT_ROOT_GROUP.to_string(),
            volatile_group_name: Self::DEFAULT_VOLATILE_GROUP.to_string(),
            start_registered: true,
            max_file_length: Self::DEFAULT_MAX_FILE_LENGTH,
            logging: LoggingSettings::default(),
        }
    }
}

impl MockProviderConfig {
    /// Protocol name reported by the mock provider.
    pub const PROTOCOL_NAME: &'static str = "mock";

    /// Default user id.
    pub const DEFAULT_USER_ID: &'static str = "mockuser";

    /// Default service name.
    pub const DEFAULT_SERVICE: &'static str = "mock.local";

    /// Default status message.
    pub const DEFAULT_STATUS_MESSAGE: &'static str = "Default Status Message";

    /// Default root group name.
    pub const DEFAULT_ROOT_GROUP: &'static str = "RootMockGroup";

    /// Default volatile group name.
    pub const DEFAULT_VOLATILE_GROUP: &'static str = "Not-In-Contactlist";

    /// Default maximum file length (2 GiB).
    pub const DEFAULT_MAX_FILE_LENGTH: u64 = 2 * 1024 * 1024 * 1024;

    /// Creates a configuration for the given user on the default service.
    pub fn new(user_id: impl Into<String>) -> Self {
        let mut config = Self::default();
        config.account.user_id = user_id.into();
        config
    }

    /// Parses a configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.initial_presence_status()?;
        config.tracing_config()?;
        Ok(config)
    }

    /// Loads a configuration from a TOML file.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Sets the account.
    pub fn with_account(mut self, account: AccountId) -> Self {
        self.account = account;
        self
    }

    /// Sets the initial status from a status value.
    pub fn with_initial_status(mut self, status: PresenceStatus) -> Self {
        self.initial_status = status.name().to_string();
        self
    }

    /// Sets the initial status message.
    pub fn with_status_message(mut self, message: impl Into<String>) -> Self {
        self.status_message = message.into();
        self
    }

    /// Sets the volatile group name.
    pub fn with_volatile_group_name(mut self, name: impl Into<String>) -> Self {
        self.volatile_group_name = name.into();
        self
    }

    /// Sets whether the provider starts registered.
    pub fn with_start_registered(mut self, registered: bool) -> Self {
        self.start_registered = registered;
        self
    }

    /// Sets the largest accepted file.
    pub fn with_max_file_length(mut self, bytes: u64) -> Self {
        self.max_file_length = bytes;
        self
    }

    /// Builds the tracing setup described by the `[logging]` section, for
    /// use with `commspi_core::tracing::init_tracing`.
    pub fn tracing_config(&self) -> Result<TracingConfig, ConfigError> {
        Ok(self.logging.tracing_config()?)
    }

    /// Resolves `initial_status` to a status value.
    pub fn initial_presence_status(&self) -> Result<PresenceStatus, ConfigError> {
        MockStatus::from_name(&self.initial_status).ok_or_else(|| ConfigError::UnknownStatus {
            name: self.initial_status.clone(),
        })
    }
}
