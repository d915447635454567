//! Falcons deck library
//! Multi-device BLE connection manager for JBD battery monitors, robots
//! and Nordic UART devices.

pub mod commands;
pub mod config;
pub mod core;
pub mod logging;
pub mod state;
pub mod utils;
