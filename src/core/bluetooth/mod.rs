//! Bluetooth functionality
//! This module handles discovery, the per-device links with their wire
//! protocols, and the connection manager that multiplexes them.

pub mod commands;
pub mod connection;
pub mod constants;
pub mod device;
pub mod frame;
pub mod links;
pub mod manager;
pub mod notification;
pub mod scanner;
pub mod transport;
pub mod types;

// Re-export types that should be publicly accessible
pub use commands::BmsCommand;
pub use connection::{BluestTransport, BluestTransportFactory};
pub use constants::*;
pub use device::DeviceDescriptor;
pub use frame::{Frame, FrameDecoder};
pub use links::{DeviceLink, LinkError, LinkEvent};
pub use manager::{ConnectionManager, ManagerError, ManagerEvent};
pub use scanner::{BluetoothScanner, DeviceCache};
pub use transport::{
    SessionId, Transport, TransportEnvelope, TransportError, TransportEvent, TransportFactory,
    WriteMode,
};
pub use types::{
    BatteryTelemetry, ConnectionState, DeviceKind, PlayState, RobotTelemetry, Telemetry,
    TelemetryField,
};
