//! bluest backed transport
//! Each `BluestTransport` turns the fire-and-forget `Transport` calls into
//! tokio tasks and reports their outcome as `TransportEnvelope`s.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bluest::{Adapter, Characteristic, Device, Service, Uuid};
use log::{debug, error, info, warn};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::core::bluetooth::device::DeviceDescriptor;
use crate::core::bluetooth::notification::NotificationHandler;
use crate::core::bluetooth::scanner::DeviceCache;
use crate::core::bluetooth::transport::{
    SessionId, Transport, TransportEnvelope, TransportError, TransportEvent, TransportFactory,
    WriteMode,
};

/// Delivers events of one session to the manager's event pump.
#[derive(Clone)]
pub struct EventSink {
    session: SessionId,
    address: String,
    events: mpsc::UnboundedSender<TransportEnvelope>,
}

impl EventSink {
    pub fn new(session: SessionId, address: String, events: mpsc::UnboundedSender<TransportEnvelope>) -> Self {
        Self { session, address, events }
    }

    pub fn emit(&self, event: TransportEvent) {
        let envelope = TransportEnvelope::new(self.session, self.address.clone(), event);
        if self.events.send(envelope).is_err() {
            debug!("Event pump gone, dropping event for {}", self.address);
        }
    }
}

/// Serialised GATT data operation
enum GattRequest {
    Read(Uuid),
    Write {
        characteristic: Uuid,
        data: Vec<u8>,
        mode: WriteMode,
    },
}

type CharacteristicCache = Arc<Mutex<HashMap<Uuid, Characteristic>>>;
type ServiceCache = Arc<Mutex<HashMap<Uuid, Service>>>;

fn cached<T: Clone>(cache: &Mutex<HashMap<Uuid, T>>, uuid: &Uuid) -> Option<T> {
    cache.lock().unwrap_or_else(PoisonError::into_inner).get(uuid).cloned()
}

fn store<T>(cache: &Mutex<HashMap<Uuid, T>>, uuid: Uuid, value: T) {
    cache.lock().unwrap_or_else(PoisonError::into_inner).insert(uuid, value);
}

/// GATT client session for one device.
pub struct BluestTransport {
    adapter: Adapter,
    device: Device,
    sink: EventSink,
    runtime: Handle,
    timeout: Duration,
    cancel_token: CancellationToken,
    services: ServiceCache,
    characteristics: CharacteristicCache,
    notification_handler: NotificationHandler,
    requests: mpsc::UnboundedSender<GattRequest>,
}

impl BluestTransport {
    pub fn new(adapter: Adapter, device: Device, sink: EventSink, runtime: Handle, timeout: Duration) -> Self {
        let cancel_token = CancellationToken::new();
        let characteristics: CharacteristicCache = Arc::new(Mutex::new(HashMap::new()));
        let (requests, request_rx) = mpsc::unbounded_channel();

        runtime.spawn(Self::process_requests(
            request_rx,
            characteristics.clone(),
            sink.clone(),
            cancel_token.clone(),
            timeout,
        ));

        let notification_handler = NotificationHandler::new(device.clone(), sink.clone(), cancel_token.clone());

        Self {
            adapter,
            device,
            sink,
            runtime,
            timeout,
            cancel_token,
            services: Arc::new(Mutex::new(HashMap::new())),
            characteristics,
            notification_handler,
            requests,
        }
    }

    /// Runs `operation` on the runtime unless the session gets cancelled first.
    fn spawn<Fut>(&self, operation: Fut)
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel_token = self.cancel_token.clone();
        self.runtime.spawn(async move {
            tokio::select! {
                _ = operation => {}
                _ = cancel_token.cancelled() => {}
            }
        });
    }

    /// Reads and writes go through one queue so they reach the device in call order.
    async fn process_requests(
        mut requests: mpsc::UnboundedReceiver<GattRequest>,
        characteristics: CharacteristicCache,
        sink: EventSink,
        cancel_token: CancellationToken,
        timeout: Duration,
    ) {
        loop {
            let request = tokio::select! {
                request = requests.recv() => match request {
                    Some(request) => request,
                    None => break,
                },
                _ = cancel_token.cancelled() => break,
            };

            match request {
                GattRequest::Read(uuid) => {
                    let Some(characteristic) = cached(&characteristics, &uuid) else {
                        warn!("Read of unresolved characteristic {}", uuid);
                        continue;
                    };
                    match tokio::time::timeout(timeout, characteristic.read()).await {
                        Ok(Ok(value)) => sink.emit(TransportEvent::CharacteristicRead {
                            characteristic: uuid,
                            value,
                        }),
                        Ok(Err(e)) => warn!("Failed to read characteristic {}: {}", uuid, e),
                        Err(_) => warn!("Read of characteristic {} timed out", uuid),
                    }
                }
                GattRequest::Write { characteristic: uuid, data, mode } => {
                    let Some(characteristic) = cached(&characteristics, &uuid) else {
                        warn!("Write to unresolved characteristic {}", uuid);
                        continue;
                    };
                    let result = match mode {
                        WriteMode::WithResponse => {
                            tokio::time::timeout(timeout, characteristic.write(&data)).await
                        }
                        WriteMode::WithoutResponse => {
                            tokio::time::timeout(timeout, characteristic.write_without_response(&data)).await
                        }
                    };
                    match result {
                        Ok(Ok(())) => debug!("Wrote {} bytes to {}", data.len(), uuid),
                        Ok(Err(e)) => warn!("Failed to write characteristic {}: {}", uuid, e),
                        Err(_) => warn!("Write to characteristic {} timed out", uuid),
                    }
                }
            }
        }
        debug!("GATT request queue closed");
    }

    fn enqueue(&self, request: GattRequest) {
        if self.requests.send(request).is_err() {
            warn!("GATT request queue closed for {}", self.device.id());
        }
    }
}

impl Transport for BluestTransport {
    fn connect(&mut self) {
        let adapter = self.adapter.clone();
        let device = self.device.clone();
        let sink = self.sink.clone();
        let timeout = self.timeout;

        self.spawn(async move {
            if device.is_connected().await {
                info!("Device {} already connected", device.id());
                sink.emit(TransportEvent::Connected);
                return;
            }
            info!("Initiating connection to {}...", device.id());
            match tokio::time::timeout(timeout, adapter.connect_device(&device)).await {
                Ok(Ok(())) => sink.emit(TransportEvent::Connected),
                Ok(Err(e)) => {
                    error!("Connection to {} failed: {}", device.id(), e);
                    sink.emit(TransportEvent::Error(e.to_string()));
                }
                Err(_) => {
                    error!("Connection to {} timed out", device.id());
                    sink.emit(TransportEvent::Error("Connection timed out".to_string()));
                }
            }
        });
    }

    fn disconnect(&mut self) {
        self.cancel_token.cancel();

        let adapter = self.adapter.clone();
        let device = self.device.clone();
        let timeout = self.timeout;
        self.runtime.spawn(async move {
            if !device.is_connected().await {
                debug!("Device {} not connected", device.id());
                return;
            }
            match tokio::time::timeout(timeout, adapter.disconnect_device(&device)).await {
                Ok(Ok(())) => info!("Successfully disconnected from {}", device.id()),
                Ok(Err(e)) => warn!("Failed to disconnect from {}: {}", device.id(), e),
                Err(_) => warn!("Disconnect from {} timed out", device.id()),
            }
        });
    }

    fn discover_services(&mut self) {
        let device = self.device.clone();
        let services = self.services.clone();
        let sink = self.sink.clone();
        let timeout = self.timeout;

        self.spawn(async move {
            match tokio::time::timeout(timeout, device.services()).await {
                Ok(Ok(found)) => {
                    for service in found {
                        let uuid = service.uuid();
                        store(&services, uuid, service);
                        sink.emit(TransportEvent::ServiceDiscovered(uuid));
                    }
                    sink.emit(TransportEvent::DiscoveryFinished);
                }
                Ok(Err(e)) => sink.emit(TransportEvent::Error(format!("Service discovery failed: {e}"))),
                Err(_) => sink.emit(TransportEvent::Error("Service discovery timed out".to_string())),
            }
        });
    }

    fn discover_details(&mut self, service: Uuid) {
        let services = self.services.clone();
        let characteristics = self.characteristics.clone();
        let sink = self.sink.clone();
        let timeout = self.timeout;

        self.spawn(async move {
            let Some(remote) = cached(&services, &service) else {
                sink.emit(TransportEvent::Error(format!("Service {service} was not discovered")));
                return;
            };
            match tokio::time::timeout(timeout, remote.characteristics()).await {
                Ok(Ok(found)) => {
                    let mut uuids = Vec::with_capacity(found.len());
                    for characteristic in found {
                        let uuid = characteristic.uuid();
                        debug!("Found characteristic {} in service {}", uuid, service);
                        store(&characteristics, uuid, characteristic);
                        uuids.push(uuid);
                    }
                    sink.emit(TransportEvent::ServiceDetailsDiscovered {
                        service,
                        characteristics: uuids,
                    });
                }
                Ok(Err(e)) => sink.emit(TransportEvent::Error(format!(
                    "Characteristic discovery failed: {e}"
                ))),
                Err(_) => sink.emit(TransportEvent::Error(
                    "Characteristic discovery timed out".to_string(),
                )),
            }
        });
    }

    fn enable_notifications(&mut self, characteristic: Uuid) {
        match cached(&self.characteristics, &characteristic) {
            Some(remote) => self.notification_handler.setup_notifications(&self.runtime, remote),
            None => warn!("Cannot subscribe to unresolved characteristic {}", characteristic),
        }
    }

    fn read(&mut self, characteristic: Uuid) {
        self.enqueue(GattRequest::Read(characteristic));
    }

    fn write(&mut self, characteristic: Uuid, data: &[u8], mode: WriteMode) {
        self.enqueue(GattRequest::Write {
            characteristic,
            data: data.to_vec(),
            mode,
        });
    }
}

impl Drop for BluestTransport {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

/// Opens `BluestTransport`s for devices found by the scanner.
pub struct BluestTransportFactory {
    adapter: Adapter,
    devices: DeviceCache,
    events: mpsc::UnboundedSender<TransportEnvelope>,
    runtime: Handle,
    timeout: Duration,
}

impl BluestTransportFactory {
    pub fn new(
        adapter: Adapter,
        devices: DeviceCache,
        events: mpsc::UnboundedSender<TransportEnvelope>,
        runtime: Handle,
        timeout: Duration,
    ) -> Self {
        Self {
            adapter,
            devices,
            events,
            runtime,
            timeout,
        }
    }
}

impl TransportFactory for BluestTransportFactory {
    fn open(
        &mut self,
        descriptor: &DeviceDescriptor,
        session: SessionId,
    ) -> Result<Box<dyn Transport>, TransportError> {
        let device = self
            .devices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&descriptor.address)
            .map(|found| found.device.clone())
            .ok_or_else(|| TransportError::UnknownDevice(descriptor.address.clone()))?;

        let sink = EventSink::new(session, descriptor.address.clone(), self.events.clone());
        Ok(Box::new(BluestTransport::new(
            self.adapter.clone(),
            device,
            sink,
            self.runtime.clone(),
            self.timeout,
        )))
    }
}
