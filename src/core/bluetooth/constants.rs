//! Constants used throughout the application
//! This module contains the GATT UUIDs of the supported peripherals,
//! limits of the connection manager and protocol timing defaults.

use uuid::Uuid;

/// Name prefix advertised by robots running the robot control peripheral
pub const ROBOT_NAME_PREFIX: &str = "Falcons-";

/// Nordic UART Service UUIDs (generic stream devices)
pub const UUID_NUS_SERVICE: Uuid = Uuid::from_u128(0x6e400001_b5a3_f393_e0a9_e50e24dcca9e);
/// Write to the device
pub const UUID_NUS_RX_CHAR: Uuid = Uuid::from_u128(0x6e400002_b5a3_f393_e0a9_e50e24dcca9e);
/// Notifications from the device
pub const UUID_NUS_TX_CHAR: Uuid = Uuid::from_u128(0x6e400003_b5a3_f393_e0a9_e50e24dcca9e);

/// JBD battery management system service (0xFF00)
pub const UUID_JBD_SERVICE: Uuid = Uuid::from_u128(0x0000ff00_0000_1000_8000_00805f9b34fb);
/// JBD notify/read characteristic (0xFF01)
pub const UUID_JBD_NOTIFY_CHAR: Uuid = Uuid::from_u128(0x0000ff01_0000_1000_8000_00805f9b34fb);
/// JBD write characteristic (0xFF02)
pub const UUID_JBD_WRITE_CHAR: Uuid = Uuid::from_u128(0x0000ff02_0000_1000_8000_00805f9b34fb);

/// Robot control service and its characteristics
pub const UUID_ROBOT_SERVICE: Uuid = Uuid::from_u128(0xfa1c0001_b5a3_f393_e0a9_e50e24dcca9e);
pub const UUID_ROBOT_PLAY_STATE_CHAR: Uuid = Uuid::from_u128(0xfa1c0002_b5a3_f393_e0a9_e50e24dcca9e);
pub const UUID_ROBOT_WIFI_SSID_CHAR: Uuid = Uuid::from_u128(0xfa1c0003_b5a3_f393_e0a9_e50e24dcca9e);
pub const UUID_ROBOT_WIFI_LIST_CHAR: Uuid = Uuid::from_u128(0xfa1c0004_b5a3_f393_e0a9_e50e24dcca9e);
pub const UUID_ROBOT_BATTERY_VOLTAGE_CHAR: Uuid = Uuid::from_u128(0xfa1c0005_b5a3_f393_e0a9_e50e24dcca9e);
pub const UUID_ROBOT_IDENTITY_CHAR: Uuid = Uuid::from_u128(0xfa1c0006_b5a3_f393_e0a9_e50e24dcca9e);

/// Maximum number of simultaneous device sessions across all kinds
pub const MAX_DEVICES: usize = 16;

/// Largest payload written to a stream device in one GATT write
pub const STREAM_CHUNK_SIZE: usize = 20;

/// Battery monitor poll period in milliseconds
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;

/// Tolerance used when de-duplicating floating point telemetry
pub const DEFAULT_TELEMETRY_EPSILON: f32 = 0.001;

/// Timeout for Bluetooth operations in seconds
pub const BLUETOOTH_OPERATION_TIMEOUT_SECS: u64 = 10;

/// Scan duration in seconds
pub const DEFAULT_SCAN_DURATION_SECS: u64 = 5;

/// Weakest signal still reported by the scanner
pub const MIN_RSSI_THRESHOLD: i16 = -90;

/// RSSI reported for devices whose signal strength is unknown
pub const UNKNOWN_RSSI: i16 = -100;
