//! Application commands
//! Async entry points for a front end. Every command locks the connection
//! manager for the duration of one call and reports failures as strings.

use std::path::Path;

use crate::core::bluetooth::DeviceDescriptor;
use crate::core::registry::DeviceRecord;
use crate::state::AppState;

/// Starts a scan; discovered devices are published through the scanner.
pub async fn start_scan(app_state: &AppState) -> Result<(), String> {
    let mut scanner = app_state.scanner.lock().await;
    scanner.start_scan().await.map_err(|e| e.to_string())
}

pub async fn stop_scan(app_state: &AppState) -> Result<(), String> {
    let mut scanner = app_state.scanner.lock().await;
    scanner.stop_scan().await.map_err(|e| e.to_string())
}

/// Devices found so far, strongest signal first.
pub async fn discovered_devices(app_state: &AppState) -> Vec<DeviceDescriptor> {
    app_state.scanner.lock().await.discovered()
}

/// Connects to a discovered device
///
/// # Arguments
/// * `address` - Hardware address as reported by the scanner
///
/// # Returns
/// The registry index of the new device.
pub async fn connect_to_device(address: &str, app_state: &AppState) -> Result<usize, String> {
    let descriptor = discovered_devices(app_state)
        .await
        .into_iter()
        .find(|descriptor| descriptor.address == address)
        .ok_or_else(|| format!("Device not found with address: {}", address))?;

    let mut manager = app_state.connection_manager.lock().await;
    manager.connect(&descriptor).map_err(|e| e.to_string())
}

pub async fn disconnect(index: usize, app_state: &AppState) -> Result<(), String> {
    let mut manager = app_state.connection_manager.lock().await;
    manager.disconnect(index).map_err(|e| e.to_string())
}

/// Returns false when no device has this address.
pub async fn disconnect_by_address(address: &str, app_state: &AppState) -> bool {
    app_state.connection_manager.lock().await.disconnect_by_address(address)
}

pub async fn disconnect_all(app_state: &AppState) {
    app_state.connection_manager.lock().await.disconnect_all();
}

pub async fn send_text(index: usize, text: &str, app_state: &AppState) -> Result<(), String> {
    let mut manager = app_state.connection_manager.lock().await;
    manager.send_text(index, text).map_err(|e| e.to_string())
}

pub async fn send_bytes(index: usize, data: Vec<u8>, app_state: &AppState) -> Result<(), String> {
    let mut manager = app_state.connection_manager.lock().await;
    manager.send(index, &data).map_err(|e| e.to_string())
}

/// Returns how many stream devices accepted the text.
pub async fn broadcast_text(text: &str, app_state: &AppState) -> usize {
    app_state.connection_manager.lock().await.broadcast_text(text)
}

pub async fn write_play_state(index: usize, state: u8, app_state: &AppState) -> Result<(), String> {
    let mut manager = app_state.connection_manager.lock().await;
    manager.write_play_state(index, state).map_err(|e| e.to_string())
}

pub async fn write_play_state_all(state: u8, app_state: &AppState) -> Result<usize, String> {
    let mut manager = app_state.connection_manager.lock().await;
    manager.write_play_state_all(state).map_err(|e| e.to_string())
}

pub async fn write_wifi_ssid(index: usize, ssid: &str, app_state: &AppState) -> Result<(), String> {
    let mut manager = app_state.connection_manager.lock().await;
    manager.write_wifi_ssid(index, ssid).map_err(|e| e.to_string())
}

pub async fn write_wifi_ssid_all(ssid: &str, app_state: &AppState) -> usize {
    app_state.connection_manager.lock().await.write_wifi_ssid_all(ssid)
}

/// Snapshot of the device registry.
pub async fn list_devices(app_state: &AppState) -> Vec<DeviceRecord> {
    app_state.connection_manager.lock().await.registry().snapshot()
}

pub async fn connected_count(app_state: &AppState) -> usize {
    app_state.connection_manager.lock().await.connected_count()
}

pub async fn save_config(config_dir: &Path, app_state: &AppState) -> Result<(), String> {
    app_state
        .config
        .save_config(config_dir)
        .await
        .map_err(|e| e.to_string())
}
