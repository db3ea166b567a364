//! Execution preconditions for the background refresh.
//!
//! The two user toggles ("Wi-Fi only", "battery optimization") are turned into
//! a [`Constraints`] value every time work is (re)scheduled. The scheduler then
//! checks the current [`DeviceConditions`] against it before each run.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum NetworkRequirement {
    /// Any connected network, metered or not.
    Connected,
    /// Wi-Fi or another unmetered network.
    Unmetered,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Constraints {
    pub required_network: NetworkRequirement,
    pub requires_battery_not_low: bool,
    pub requires_device_idle: bool,
}

impl Default for Constraints {
    fn default() -> Self {
        derive_constraints(false, false)
    }
}

/// Pure mapping from the user preferences to run preconditions.
pub fn derive_constraints(wifi_only: bool, battery_optimized: bool) -> Constraints {
    let required_network = if wifi_only {
        NetworkRequirement::Unmetered
    } else {
        NetworkRequirement::Connected
    };

    Constraints {
        required_network,
        requires_battery_not_low: battery_optimized,
        // Battery optimization prefers idle but never demands it.
        requires_device_idle: false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkState {
    Offline,
    Metered,
    Unmetered,
}

/// Snapshot of the device state the constraints are evaluated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceConditions {
    pub network: NetworkState,
    pub battery_low: bool,
    pub device_idle: bool,
}

impl Constraints {
    pub fn is_satisfied_by(&self, conditions: &DeviceConditions) -> bool {
        let network_ok = match (self.required_network, conditions.network) {
            (_, NetworkState::Offline) => false,
            (NetworkRequirement::Connected, _) => true,
            (NetworkRequirement::Unmetered, NetworkState::Unmetered) => true,
            (NetworkRequirement::Unmetered, NetworkState::Metered) => false,
        };

        if !network_ok {
            return false;
        }
        if self.requires_battery_not_low && conditions.battery_low {
            return false;
        }
        if self.requires_device_idle && !conditions.device_idle {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conditions(network: NetworkState, battery_low: bool) -> DeviceConditions {
        DeviceConditions {
            network,
            battery_low,
            device_idle: false,
        }
    }

    #[test]
    fn wifi_only_requires_unmetered_network() {
        let constraints = derive_constraints(true, false);
        assert_eq!(constraints.required_network, NetworkRequirement::Unmetered);
        assert!(!constraints.requires_battery_not_low);
        assert!(!constraints.requires_device_idle);
    }

    #[test]
    fn default_requires_any_connection() {
        let constraints = derive_constraints(false, false);
        assert_eq!(constraints.required_network, NetworkRequirement::Connected);
        assert_eq!(constraints, Constraints::default());
    }

    #[test]
    fn battery_optimized_gates_on_battery_but_not_idle() {
        let constraints = derive_constraints(false, true);
        assert!(constraints.requires_battery_not_low);
        assert!(!constraints.requires_device_idle);
    }

    #[test]
    fn metered_network_blocks_wifi_only() {
        let wifi_only = derive_constraints(true, false);
        assert!(!wifi_only.is_satisfied_by(&conditions(NetworkState::Metered, false)));
        assert!(wifi_only.is_satisfied_by(&conditions(NetworkState::Unmetered, false)));

        let any = derive_constraints(false, false);
        assert!(any.is_satisfied_by(&conditions(NetworkState::Metered, false)));
        assert!(!any.is_satisfied_by(&conditions(NetworkState::Offline, false)));
    }

    #[test]
    fn low_battery_only_matters_when_optimized() {
        let low = conditions(NetworkState::Unmetered, true);
        assert!(!derive_constraints(false, true).is_satisfied_by(&low));
        assert!(derive_constraints(false, false).is_satisfied_by(&low));
    }
}
