//! Presence statuses supported by the mock provider.

use commspi_core::PresenceStatus;

/// The mock status set: eleven levels from 0 to 100 in steps of ten.
pub struct MockStatus;

impl MockStatus {
    pub const MOCK_STATUS_00: PresenceStatus = PresenceStatus::new(0, "MockStatus00");
    pub const MOCK_STATUS_10: PresenceStatus = PresenceStatus::new(10, "MockStatus10");
    pub const MOCK_STATUS_20: PresenceStatus = PresenceStatus::new(20, "MockStatus20");
    pub const MOCK_STATUS_30: PresenceStatus = PresenceStatus::new(30, "MockStatus30");
    pub const MOCK_STATUS_40: PresenceStatus = PresenceStatus::new(40, "MockStatus40");
    pub const MOCK_STATUS_50: PresenceStatus = PresenceStatus::new(50, "MockStatus50");
    pub const MOCK_STATUS_60: PresenceStatus = PresenceStatus::new(60, "MockStatus60");
    pub const MOCK_STATUS_70: PresenceStatus = PresenceStatus::new(70, "MockStatus70");
    pub const MOCK_STATUS_80: PresenceStatus = PresenceStatus::new(80, "MockStatus80");
    pub const MOCK_STATUS_90: PresenceStatus = PresenceStatus::new(90, "MockStatus90");
    pub const MOCK_STATUS_100: PresenceStatus = PresenceStatus::new(100, "MockStatus100");

    /// Every supported status, lowest first.
    pub const ALL: [PresenceStatus; 11] = [
        Self::MOCK_STATUS_00,
        Self::MOCK_STATUS_10,
        Self::MOCK_STATUS_20,
        Self::MOCK_STATUS_30,
        Self::MOCK_STATUS_40,
        Self::MOCK_STATUS_50,
        Self::MOCK_STATUS_60,
        Self::MOCK_STATUS_70,
        Self::MOCK_STATUS_80,
        Self::MOCK_STATUS_90,
        Self::MOCK_STATUS_100,
    ];

    /// Status assigned to new contacts and to the provider at startup.
    pub const DEFAULT: PresenceStatus = Self::MOCK_STATUS_50;

    /// Returns every supported status, lowest first.
    pub fn supported() -> impl Iterator<Item = PresenceStatus> {
        Self::ALL.into_iter()
    }

    /// Looks a status up by its numeric value.
    pub fn from_status(status: u32) -> Option<PresenceStatus> {
        Self::ALL.into_iter().find(|s| s.status() == status)
    }

    /// Looks a status up by name.
    pub fn from_name(name: &str) -> Option<PresenceStatus> {
        Self::ALL.into_iter().find(|s| s.name() == name)
    }

    /// Returns true if `status` belongs to the mock set.
    pub fn is_supported(status: &PresenceStatus) -> bool {
        Self::ALL
            .iter()
            .any(|s| s == status && s.name() == status.name())
    }
}
