//! Session configuration.

use std::time::Duration;
use uuid::Uuid;

use crate::ble::uuids::SERVICE_CHANGED_UUID;

/// Tunables for a [`GattSession`](crate::session::GattSession).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SessionConfig {
    /// How long a characteristic read waits for its reply.
    pub read_timeout: Duration,
    /// How long a connection may take to reach `Ready`.
    pub connect_timeout: Duration,
    /// Capacity of the session event channels.
    pub event_capacity: usize,
    /// Characteristics skipped by a full characteristic sweep.
    pub excluded_characteristics: Vec<Uuid>,
    /// Name fragment a listed device must contain, if any.
    pub device_name_filter: Option<String>,
}

impl SessionConfig {
    /// Default read timeout (5 seconds).
    pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);

    /// Default connect timeout (30 seconds).
    pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Vendor prefix of supported devices' advertised names.
    pub const DEFAULT_NAME_FILTER: &'static str = "A&D";

    /// Set the read timeout.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the event channel capacity. Zero is bumped to one.
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    /// Skip an additional characteristic during full sweeps.
    pub fn with_excluded_characteristic(mut self, uuid: Uuid) -> Self {
        if !self.excluded_characteristics.contains(&uuid) {
            self.excluded_characteristics.push(uuid);
        }
        self
    }

    /// Set or clear the device name filter.
    pub fn with_device_name_filter(mut self, filter: Option<impl Into<String>>) -> Self {
        self.device_name_filter = filter.map(Into::into);
        self
    }

    /// Check if a characteristic is skipped by full sweeps.
    pub fn is_excluded(&self, uuid: &Uuid) -> bool {
        self.excluded_characteristics.contains(uuid)
    }

    /// Check if an advertised name passes the name filter.
    ///
    /// Devices without a name never pass an active filter.
    pub fn matches_name(&self, name: Option<&str>) -> bool {
        name_matches(self.device_name_filter.as_deref(), name)
    }
}

/// Check an advertised name against an optional name fragment.
pub(crate) fn name_matches(filter: Option<&str>, name: Option<&str>) -> bool {
    match (filter, name) {
        (None, _) => true,
        (Some(filter), Some(name)) => name.contains(filter),
        (Some(_), None) => false,
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            read_timeout: Self::DEFAULT_READ_TIMEOUT,
            connect_timeout: Self::DEFAULT_CONNECT_TIMEOUT,
            event_capacity: 64,
            excluded_characteristics: vec![SERVICE_CHANGED_UUID],
            device_name_filter: Some(Self::DEFAULT_NAME_FILTER.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::uuids::BATTERY_LEVEL_UUID;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.read_timeout, Duration::from_secs(5));
        assert_eq!(config.connect_timeout, Duration::from_secs(30));
        assert_eq!(config.event_capacity, 64);
        assert!(config.is_excluded(&SERVICE_CHANGED_UUID));
        assert!(!config.is_excluded(&BATTERY_LEVEL_UUID));
    }

    #[test]
    fn test_builders() {
        let config = SessionConfig::default()
            .with_read_timeout(Duration::from_millis(50))
            .with_event_capacity(0)
            .with_excluded_characteristic(BATTERY_LEVEL_UUID)
            .with_excluded_characteristic(BATTERY_LEVEL_UUID);

        assert_eq!(config.read_timeout, Duration::from_millis(50));
        assert_eq!(config.event_capacity, 1);
        assert_eq!(config.excluded_characteristics.len(), 2);
    }

    #[test]
    fn test_name_filter() {
        let config = SessionConfig::default();
        assert!(config.matches_name(Some("A&D_UT201")));
        assert!(!config.matches_name(Some("Fitbit")));
        assert!(!config.matches_name(None));

        let config = config.with_device_name_filter(None::<String>);
        assert!(config.matches_name(None));
        assert!(config.matches_name(Some("anything")));
    }
}
