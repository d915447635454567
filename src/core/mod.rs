//! Core functionality
//! Device protocols, the connection manager and the device registry.

pub mod battery;
pub mod bluetooth;
pub mod registry;

// Re-export commonly used types
pub use bluetooth::{ConnectionManager, ManagerEvent};
pub use registry::{DeviceRecord, DeviceRegistry, RegistryEvent};
