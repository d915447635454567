//! Defines shared data structures for the Bluetooth module.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Connection state shared by every device kind.
///
/// `Ready` is the only state in which application data may be sent.
/// `Error` is terminal until the device is explicitly disconnected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Ready,
    Error,
}

impl ConnectionState {
    /// True for the states that count towards the connected-device total.
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected | Self::Ready)
    }

    /// True while a transport session is open or being opened.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Connecting | Self::Connected | Self::Ready)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "Disconnected",
            Self::Connecting => "Connecting",
            Self::Connected => "Connected",
            Self::Ready => "Ready",
            Self::Error => "Error",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Protocol family of a device, decided once at connect time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceKind {
    /// Raw pass-through stream (Nordic UART service)
    GenericStream,
    /// JBD battery monitor speaking the framed command protocol
    FramedBatteryMonitor,
    /// Robot exposing the multi-characteristic control service
    CustomRobot,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::GenericStream => "generic-stream",
            Self::FramedBatteryMonitor => "framed-battery-monitor",
            Self::CustomRobot => "custom-robot",
        };
        f.write_str(name)
    }
}

/// Battery monitor readings decoded from the hardware info frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatteryTelemetry {
    /// Pack voltage in volts
    pub pack_voltage: f32,
    /// Pack current in amperes, negative while discharging
    pub current: f32,
    /// State of charge in percent
    pub state_of_charge: u8,
    /// Remaining capacity in ampere hours
    pub residual_capacity: f32,
    /// Design capacity in ampere hours
    pub nominal_capacity: f32,
    pub cycle_count: u16,
    pub cell_count: u8,
    /// NTC readings in degrees Celsius
    pub temperatures: Vec<f32>,
}

/// Values published by the robot control service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RobotTelemetry {
    /// Raw play state byte, see [`PlayState`]
    pub play_state: u8,
    pub wifi_ssid: String,
    pub wifi_networks: Vec<String>,
    /// Robot battery voltage in volts
    pub battery_voltage: f32,
    pub identity: String,
}

/// Protocol specific telemetry carried by a device record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Telemetry {
    Stream,
    Battery(BatteryTelemetry),
    Robot(RobotTelemetry),
}

impl Telemetry {
    /// Empty telemetry for a freshly classified device.
    pub fn for_kind(kind: DeviceKind) -> Self {
        match kind {
            DeviceKind::GenericStream => Self::Stream,
            DeviceKind::FramedBatteryMonitor => Self::Battery(BatteryTelemetry::default()),
            DeviceKind::CustomRobot => Self::Robot(RobotTelemetry::default()),
        }
    }
}

/// Individual telemetry field, used for field-level change notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TelemetryField {
    PackVoltage,
    Current,
    StateOfCharge,
    ResidualCapacity,
    NominalCapacity,
    CycleCount,
    CellCount,
    Temperatures,
    PlayState,
    WifiSsid,
    WifiNetworks,
    BatteryVoltage,
    Identity,
}

/// Robot play states accepted by the play state characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum PlayState {
    Invalid = 0,
    SoftwareOn = 1,
    MotorsOn = 2,
    KickerOn = 3,
    InPlay = 4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid play state {0}, expected 0..=4")]
pub struct PlayStateError(pub u8);

impl TryFrom<u8> for PlayState {
    type Error = PlayStateError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Invalid),
            1 => Ok(Self::SoftwareOn),
            2 => Ok(Self::MotorsOn),
            3 => Ok(Self::KickerOn),
            4 => Ok(Self::InPlay),
            other => Err(PlayStateError(other)),
        }
    }
}

impl From<PlayState> for u8 {
    fn from(state: PlayState) -> Self {
        state as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connected_states_count_towards_total() {
        assert!(ConnectionState::Connected.is_connected());
        assert!(ConnectionState::Ready.is_connected());
        assert!(!ConnectionState::Connecting.is_connected());
        assert!(!ConnectionState::Error.is_connected());
        assert!(!ConnectionState::Disconnected.is_connected());
    }

    #[test]
    fn play_state_accepts_only_known_values() {
        assert_eq!(PlayState::try_from(4), Ok(PlayState::InPlay));
        assert_eq!(PlayState::try_from(0), Ok(PlayState::Invalid));
        assert_eq!(PlayState::try_from(5), Err(PlayStateError(5)));
        assert_eq!(u8::from(PlayState::MotorsOn), 2);
    }
}
