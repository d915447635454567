//! Application state management
//! This module wires the scanner, the transport backend and the connection
//! manager together and runs the event pump that drives the manager.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use bluest::Adapter;
use log::{debug, info, warn};
use tokio::runtime::Handle;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::core::bluetooth::{
    BluestTransportFactory, BluetoothScanner, ConnectionManager, DeviceCache, DeviceDescriptor,
    TransportEnvelope, TransportFactory,
};

/// How long the pump sleeps when no link has a timer armed
const IDLE_WAKEUP: Duration = Duration::from_secs(1);

pub type SharedManager<F> = Arc<Mutex<ConnectionManager<F>>>;

/// Global application state
pub struct AppState {
    pub config: AppConfig,
    /// The connection manager, only ever mutated under this lock
    pub connection_manager: SharedManager<BluestTransportFactory>,
    pub scanner: Arc<Mutex<BluetoothScanner>>,
    cancel_token: CancellationToken,
    pump_handle: Option<JoinHandle<()>>,
}

impl AppState {
    /// Opens the default adapter and starts the event pump.
    pub async fn new(config: AppConfig) -> Result<Self> {
        let adapter = Adapter::default()
            .await
            .ok_or_else(|| anyhow!("No Bluetooth adapter found"))?;
        adapter.wait_available().await?;
        info!("Bluetooth adapter is available.");

        let devices: DeviceCache = Arc::new(std::sync::Mutex::new(HashMap::new()));
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let factory = BluestTransportFactory::new(
            adapter.clone(),
            devices.clone(),
            events_tx,
            Handle::current(),
            config.link.operation_timeout(),
        );
        let connection_manager = Arc::new(Mutex::new(ConnectionManager::new(factory, config.link.clone())));
        let scanner = BluetoothScanner::new(adapter, devices, config.scanner.clone());

        let cancel_token = CancellationToken::new();
        let pump_handle = tokio::spawn(run_event_pump(
            connection_manager.clone(),
            events_rx,
            cancel_token.clone(),
        ));

        Ok(Self {
            config,
            connection_manager,
            scanner: Arc::new(Mutex::new(scanner)),
            cancel_token,
            pump_handle: Some(pump_handle),
        })
    }

    pub fn get_connection_manager_arc(&self) -> SharedManager<BluestTransportFactory> {
        self.connection_manager.clone()
    }

    /// Stops scanning, disconnects every device and stops the pump.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.scanner.lock().await.stop_scan().await?;
        self.connection_manager.lock().await.disconnect_all();

        self.cancel_token.cancel();
        if let Some(handle) = self.pump_handle.take() {
            handle.await?;
        }
        info!("Application state shut down");
        Ok(())
    }
}

/// Feeds transport events and poll deadlines into the manager until cancelled.
pub async fn run_event_pump<F: TransportFactory>(
    manager: SharedManager<F>,
    mut events: mpsc::UnboundedReceiver<TransportEnvelope>,
    cancel_token: CancellationToken,
) {
    info!("Event pump started");
    loop {
        let wake_at = manager
            .lock()
            .await
            .next_poll_deadline()
            .map(Instant::from_std)
            .unwrap_or_else(|| Instant::now() + IDLE_WAKEUP);

        tokio::select! {
            envelope = events.recv() => match envelope {
                Some(envelope) => manager.lock().await.handle_transport_event(envelope),
                None => {
                    debug!("All transport senders dropped");
                    break;
                }
            },
            _ = tokio::time::sleep_until(wake_at) => {
                manager.lock().await.poll(std::time::Instant::now());
            }
            _ = cancel_token.cancelled() => break,
        }
    }
    info!("Event pump stopped");
}

/// Connects every descriptor published on `found` until `shutdown` resolves
/// or the publisher goes away.
pub async fn auto_connect<F, S>(
    manager: SharedManager<F>,
    mut found: broadcast::Receiver<DeviceDescriptor>,
    shutdown: S,
) where
    F: TransportFactory,
    S: Future,
{
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Auto-connect stopped");
                break;
            }
            descriptor = found.recv() => match descriptor {
                Ok(descriptor) => {
                    if let Err(e) = manager.lock().await.connect(&descriptor) {
                        warn!("Not connecting to {}: {}", descriptor.address, e);
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!("Missed {} discovered devices", skipped),
                Err(RecvError::Closed) => break,
            },
        }
    }
}
