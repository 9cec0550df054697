//! Account identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifies the account a protocol provider acts on behalf of.
///
/// Equality is defined on [`AccountId::account_unique_id`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountId {
    /// Protocol name, e.g. "mock", "sip", "jabber".
    pub protocol: String,
    /// User identifier on the service.
    pub user_id: String,
    /// Service (server or domain) name.
    pub service: String,
}

impl AccountId {
    /// Creates a new account identifier.
    pub fn new(
        protocol: impl Into<String>,
        user_id: impl Into<String>,
        service: impl Into<String>,
    ) -> Self {
        Self {
            protocol: protocol.into(),
            user_id: user_id.into(),
            service: service.into(),
        }
    }

    /// Returns `protocol:user_id@service`.
    pub fn account_unique_id(&self) -> String {
        format!("{}:{}@{}", self.protocol, self.user_id, self.service)
    }
}

impl PartialEq for AccountId {
    fn eq(&self, other: &Self) -> bool {
        self.account_unique_id() == other.account_unique_id()
    }
}

impl Eq for AccountId {}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.account_unique_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_id_format() {
        let id = AccountId::new("mock", "alice", "example.org");
        assert_eq!(id.account_unique_id(), "mock:alice@example.org");
        insta::assert_snapshot!(id.to_string(), @"mock:alice@example.org");
    }

    #[test]
    fn deserializes_from_json() {
        let id: AccountId = serde_json::from_str(
            r#"{"protocol":"mock","user_id":"bob","service":"local"}"#,
        )
        .unwrap();
        assert_eq!(id, AccountId::new("mock", "bob", "local"));
    }
}
