//! Discovered device representation and protocol classification

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::bluetooth::constants::{ROBOT_NAME_PREFIX, UUID_JBD_SERVICE, UUID_ROBOT_SERVICE};
use crate::core::bluetooth::types::DeviceKind;

/// A device as reported by the discovery layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// The advertised name, may be empty
    pub name: String,
    /// Hardware address, the natural key of a device across the system
    pub address: String,
    /// The signal strength (RSSI) at discovery time
    pub rssi: i16,
    /// Service UUIDs found in the advertisement
    pub service_ids: Vec<Uuid>,
}

impl DeviceDescriptor {
    /// Creates a new DeviceDescriptor instance
    pub fn new(name: impl Into<String>, address: impl Into<String>, rssi: i16, service_ids: Vec<Uuid>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            rssi,
            service_ids,
        }
    }

    pub fn advertises(&self, service: Uuid) -> bool {
        self.service_ids.contains(&service)
    }

    /// Returns true if this device advertises the JBD battery service
    pub fn is_battery_monitor(&self) -> bool {
        self.advertises(UUID_JBD_SERVICE)
    }

    /// Returns true if this device is a robot, by service or by name
    pub fn is_robot(&self) -> bool {
        self.advertises(UUID_ROBOT_SERVICE) || self.name.starts_with(ROBOT_NAME_PREFIX)
    }

    /// Picks the protocol variant for this device.
    ///
    /// The battery service wins over the robot markers; anything else is
    /// treated as a raw stream device.
    pub fn classify(&self) -> DeviceKind {
        if self.is_battery_monitor() {
            DeviceKind::FramedBatteryMonitor
        } else if self.is_robot() {
            DeviceKind::CustomRobot
        } else {
            DeviceKind::GenericStream
        }
    }
}
