use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Result;
use bluest::{Adapter, AdvertisingDevice, Device};
use futures_util::StreamExt;
use log::{debug, error, info};
use regex::Regex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::ScannerConfig;
use crate::core::bluetooth::constants::{UNKNOWN_RSSI, UUID_NUS_SERVICE};
use crate::core::bluetooth::device::DeviceDescriptor;

const FOUND_CHANNEL_CAPACITY: usize = 32;

/// A platform device together with what its advertisement told us.
#[derive(Clone)]
pub struct DiscoveredDevice {
    pub device: Device,
    pub descriptor: DeviceDescriptor,
}

/// Devices seen by the scanner, keyed by address.
pub type DeviceCache = Arc<Mutex<HashMap<String, DiscoveredDevice>>>;

/// Publishes each address at most once per scan.
#[derive(Clone)]
struct ScanPublisher {
    found: broadcast::Sender<DeviceDescriptor>,
    published: Arc<Mutex<HashSet<String>>>,
}

impl ScanPublisher {
    fn new() -> Self {
        let (found, _) = broadcast::channel(FOUND_CHANNEL_CAPACITY);
        Self {
            found,
            published: Arc::default(),
        }
    }

    fn begin_scan(&self) {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Returns whether `descriptor` went out to observers.
    fn publish(&self, descriptor: &DeviceDescriptor) -> bool {
        let first_this_scan = self
            .published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(descriptor.address.clone());
        if !first_this_scan {
            return false;
        }

        info!(
            "Device discovered: {} {} RSSI: {}",
            descriptor.name, descriptor.address, descriptor.rssi
        );
        if self.found.send(descriptor.clone()).is_err() {
            debug!("No scan observers");
        }
        true
    }
}

pub struct BluetoothScanner {
    adapter: Adapter,
    devices: DeviceCache,
    config: ScannerConfig,
    publisher: ScanPublisher,
    cancel_token: CancellationToken,
    scan_task_handle: Option<JoinHandle<Result<()>>>,
}

impl BluetoothScanner {
    pub fn new(adapter: Adapter, devices: DeviceCache, config: ScannerConfig) -> Self {
        Self {
            adapter,
            devices,
            config,
            publisher: ScanPublisher::new(),
            cancel_token: CancellationToken::new(),
            scan_task_handle: None,
        }
    }

    /// Descriptors are published once per address and scan.
    pub fn subscribe(&self) -> broadcast::Receiver<DeviceDescriptor> {
        self.publisher.found.subscribe()
    }

    /// Everything discovered so far, strongest signal first.
    pub fn discovered(&self) -> Vec<DeviceDescriptor> {
        let mut descriptors: Vec<DeviceDescriptor> = self
            .devices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|found| found.descriptor.clone())
            .collect();
        descriptors.sort_by(|a, b| b.rssi.cmp(&a.rssi));
        descriptors
    }

    pub fn is_scanning(&self) -> bool {
        self.scan_task_handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub async fn start_scan(&mut self) -> Result<()> {
        if self.scan_task_handle.is_some() {
            self.stop_scan().await?;
        }

        self.publisher.begin_scan();
        self.cancel_token = CancellationToken::new();
        let cancel_token_for_task = self.cancel_token.clone();
        let adapter_for_task = self.adapter.clone();
        let devices_for_task = self.devices.clone();
        let publisher_for_task = self.publisher.clone();
        let config_for_task = self.config.clone();

        let handle = tokio::spawn(async move {
            let result = Self::internal_scan_task(
                adapter_for_task,
                devices_for_task,
                publisher_for_task,
                cancel_token_for_task,
                config_for_task,
            )
            .await;
            if let Err(e) = &result {
                error!("Bluetooth scan failed: {}", e);
            }
            result
        });

        self.scan_task_handle = Some(handle);
        info!("Device scan task started.");
        Ok(())
    }

    async fn internal_scan_task(
        adapter: Adapter,
        devices: DeviceCache,
        publisher: ScanPublisher,
        cancel_token: CancellationToken,
        config: ScannerConfig,
    ) -> Result<()> {
        info!("Starting bluetooth scan for {:?}", config.scan_duration());
        let deadline = Instant::now() + config.scan_duration();
        let mut scan_stream = adapter.scan(&[]).await?;

        loop {
            tokio::select! {
                result = scan_stream.next() => {
                    match result {
                        Some(discovered) => {
                            debug!("Found device - Device: {:?}, RSSI: {:?}", discovered.device, discovered.rssi);
                            let descriptor = Self::describe(&discovered);
                            if !Self::accepts(&config, &descriptor) {
                                continue;
                            }
                            Self::record_device(&devices, &publisher, discovered.device, descriptor);
                        }
                        None => {
                            info!("Bluetooth scan stream has ended.");
                            break;
                        }
                    }
                }
                _ = tokio::time::sleep_until(deadline) => {
                    info!("Bluetooth scan finished.");
                    break;
                }
                _ = cancel_token.cancelled() => {
                    break;
                }
            }
        }
        Ok(())
    }

    pub async fn stop_scan(&mut self) -> Result<()> {
        info!("Stopping Bluetooth scan.");
        self.cancel_token.cancel();

        if let Some(handle) = self.scan_task_handle.take() {
            match handle.await {
                Ok(Ok(())) => info!("Scan task finished."),
                Ok(Err(e)) => error!("Scan task finished with an error: {:?}", e),
                Err(e) if e.is_cancelled() => info!("Scan task was cancelled."),
                Err(e) => error!("Scan task finished with an unexpected join error: {:?}", e),
            }
        }
        Ok(())
    }

    /// Waits for the running scan to end on its own.
    pub async fn wait(&mut self) -> Result<()> {
        if let Some(handle) = self.scan_task_handle.take() {
            handle.await??;
        }
        Ok(())
    }

    fn record_device(
        devices: &DeviceCache,
        publisher: &ScanPublisher,
        device: Device,
        descriptor: DeviceDescriptor,
    ) {
        devices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                descriptor.address.clone(),
                DiscoveredDevice {
                    device,
                    descriptor: descriptor.clone(),
                },
            );
        publisher.publish(&descriptor);
    }

    fn describe(discovered: &AdvertisingDevice) -> DeviceDescriptor {
        let device = &discovered.device;
        let name = discovered
            .adv_data
            .local_name
            .clone()
            .or_else(|| device.name().ok())
            .unwrap_or_else(|| "Unknown".to_string());
        let id = device.id().to_string();
        let address = Self::extract_mac_address(&id).unwrap_or(id);

        DeviceDescriptor::new(
            name,
            address,
            discovered.rssi.unwrap_or(UNKNOWN_RSSI),
            discovered.adv_data.services.clone(),
        )
    }

    /// Applies the signal threshold and, when enabled, the device filter.
    pub fn accepts(config: &ScannerConfig, descriptor: &DeviceDescriptor) -> bool {
        if descriptor.rssi < config.min_rssi {
            return false;
        }
        !config.filter_enabled
            || descriptor.is_battery_monitor()
            || descriptor.is_robot()
            || descriptor.advertises(UUID_NUS_SERVICE)
    }

    pub fn extract_mac_address(device_id_str: &str) -> Option<String> {
        let re = Regex::new(r"([0-9A-Fa-f]{2}[:-]){5}([0-9A-Fa-f]{2})").ok()?;
        re.find_iter(device_id_str)
            .last()
            .map(|m| m.as_str().replace('-', ":").to_uppercase())
    }
}
