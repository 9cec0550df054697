//! Presence status values.
//!
//! A [`PresenceStatus`] is an immutable, totally ordered connectivity level.
//! Providers declare their supported levels as `const` values; the numeric
//! `status` decides the ordering, the name is only for display.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::Serialize;

/// Statuses at or below this value mean the contact is offline.
pub const OFFLINE_THRESHOLD: u32 = 0;

/// Lowest value of the extended-away range.
pub const EXTENDED_AWAY_THRESHOLD: u32 = 10;

/// Statuses at or above this value mean the contact is online.
pub const ONLINE_THRESHOLD: u32 = 20;

/// Lowest value of the away range.
pub const AWAY_THRESHOLD: u32 = 31;

/// Lowest value of the available range.
pub const AVAILABLE_THRESHOLD: u32 = 65;

/// Lowest value of the "free for chat" range.
pub const EAGER_TO_COMMUNICATE_THRESHOLD: u32 = 85;

/// Highest status value a provider may declare.
pub const MAX_STATUS_VALUE: u32 = 100;

/// A named connectivity level.
///
/// Two statuses are equal when their numeric values are equal.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PresenceStatus {
    status: u32,
    name: &'static str,
}

impl PresenceStatus {
    /// Creates a new status. Values above [`MAX_STATUS_VALUE`] are clamped.
    pub const fn new(status: u32, name: &'static str) -> Self {
        let status = if status > MAX_STATUS_VALUE {
            MAX_STATUS_VALUE
        } else {
            status
        };
        Self { status, name }
    }

    /// Returns the numeric connectivity level.
    pub const fn status(&self) -> u32 {
        self.status
    }

    /// Returns the display name.
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Returns true if this status means the contact can be reached.
    pub const fn is_online(&self) -> bool {
        self.status >= ONLINE_THRESHOLD
    }

    /// Returns true if this status lies in the away range.
    pub const fn is_away(&self) -> bool {
        self.status >= AWAY_THRESHOLD && self.status < AVAILABLE_THRESHOLD
    }
}

impl PartialEq for PresenceStatus {
    fn eq(&self, other: &Self) -> bool {
        self.status == other.status
    }
}

impl Eq for PresenceStatus {}

impl Hash for PresenceStatus {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.status.hash(state);
    }
}

impl PartialOrd for PresenceStatus {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PresenceStatus {
    fn cmp(&self, other: &Self) -> Ordering {
        self.status.cmp(&other.status)
    }
}

impl fmt::Display for PresenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOW: PresenceStatus = PresenceStatus::new(0, "Low");
    const HIGH: PresenceStatus = PresenceStatus::new(90, "High");

    #[test]
    fn ordering_follows_status_value() {
        assert!(LOW < HIGH);
        assert_eq!(LOW.max(HIGH), HIGH);
    }

    #[test]
    fn equality_ignores_name() {
        assert_eq!(PresenceStatus::new(40, "A"), PresenceStatus::new(40, "B"));
    }

    #[test]
    fn online_threshold() {
        assert!(!PresenceStatus::new(10, "x").is_online());
        assert!(PresenceStatus::new(ONLINE_THRESHOLD, "x").is_online());
        assert!(PresenceStatus::new(40, "x").is_away());
        assert!(!PresenceStatus::new(70, "x").is_away());
    }

    #[test]
    fn clamps_to_max() {
        assert_eq!(PresenceStatus::new(250, "x").status(), MAX_STATUS_VALUE);
    }

    #[test]
    fn display_and_serialize() {
        assert_eq!(HIGH.to_string(), "High");
        let json = serde_json::to_value(HIGH).unwrap();
        assert_eq!(json, serde_json::json!({ "status": 90, "name": "High" }));
    }
}
