// Snapshot of the environmental signals constraints are evaluated against

use crate::models::{Constraints, NetworkType};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct NetworkState {
    #[serde(default)]
    pub connected: bool,
    #[serde(default)]
    pub metered: bool,
    #[serde(default)]
    pub roaming: bool,
}

impl NetworkState {
    pub fn satisfies(&self, required: NetworkType) -> bool {
        match required {
            NetworkType::NotRequired => true,
            NetworkType::Connected => self.connected,
            NetworkType::Unmetered => self.connected && !self.metered,
            NetworkType::NotRoaming => self.connected && !self.roaming,
            NetworkType::Metered => self.connected && self.metered,
        }
    }
}

/// DeviceState holds the latest reading of every monitored signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DeviceState {
    #[serde(default)]
    pub network: NetworkState,
    #[serde(default)]
    pub charging: bool,
    #[serde(default)]
    pub battery_low: bool,
    #[serde(default)]
    pub storage_low: bool,
    #[serde(default)]
    pub device_idle: bool,
}

impl DeviceState {
    /// Whether every in-process evaluable requirement holds.
    /// Content-URI triggers have no in-process signal and are not evaluated here.
    pub fn satisfies(&self, constraints: &Constraints) -> bool {
        self.network.satisfies(constraints.required_network)
            && (!constraints.requires_charging || self.charging)
            && (!constraints.requires_battery_not_low || !self.battery_low)
            && (!constraints.requires_storage_not_low || !self.storage_low)
            && (!constraints.requires_device_idle || self.device_idle)
    }

    /// Whether any requirement of `constraints` is backed by a signal of this state
    pub fn can_evaluate(constraints: &Constraints) -> bool {
        constraints.required_network != NetworkType::NotRequired
            || constraints.requires_charging
            || constraints.requires_battery_not_low
            || constraints.requires_storage_not_low
            || constraints.requires_device_idle
    }
}
