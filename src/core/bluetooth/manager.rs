//! Connection manager for every device session
//! This module owns the device links and the registry, routes caller
//! commands to links and republishes link events against registry indices.

use std::collections::HashMap;
use std::time::Instant;

use chrono::Local;
use log::{debug, info, warn};
use thiserror::Error;
use tokio::sync::broadcast;

use crate::config::LinkConfig;
use crate::core::bluetooth::constants::MAX_DEVICES;
use crate::core::bluetooth::device::DeviceDescriptor;
use crate::core::bluetooth::links::{DeviceLink, LinkError, LinkEvent, open_link};
use crate::core::bluetooth::transport::{SessionId, TransportEnvelope, TransportError, TransportFactory};
use crate::core::bluetooth::types::{
    ConnectionState, DeviceKind, PlayState, PlayStateError, TelemetryField,
};
use crate::core::registry::{DeviceRecord, DeviceRegistry};

const EVENT_CHANNEL_CAPACITY: usize = 128;

/// Notification raised to observers of the manager.
#[derive(Debug, Clone, PartialEq)]
pub enum ManagerEvent {
    ConnectedCountChanged(usize),
    /// The device at this index reached `Ready`
    DeviceConnected(usize),
    /// The device that was at this index has been removed
    DeviceDisconnected(usize),
    DeviceError { index: usize, message: String },
    TelemetryChanged { index: usize, field: TelemetryField },
}

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("no device at index {0}")]
    InvalidIndex(usize),
    #[error("device {0} is already registered")]
    AlreadyConnected(String),
    #[error("maximum number of devices reached ({0})")]
    CapacityReached(usize),
    #[error("device at index {index} is a {kind} device")]
    UnsupportedOperation { index: usize, kind: DeviceKind },
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error(transparent)]
    PlayState(#[from] PlayStateError),
}

/// Owns every device link and the registry observers read from.
pub struct ConnectionManager<F: TransportFactory> {
    factory: F,
    config: LinkConfig,
    registry: DeviceRegistry,
    /// Links keyed by device address
    links: HashMap<String, Box<dyn DeviceLink>>,
    connected_count: usize,
    next_id: SessionId,
    events: broadcast::Sender<ManagerEvent>,
}

impl<F: TransportFactory> ConnectionManager<F> {
    pub fn new(factory: F, config: LinkConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            factory,
            config,
            registry: DeviceRegistry::new(),
            links: HashMap::new(),
            connected_count: 0,
            next_id: 1,
            events,
        }
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ManagerEvent> {
        self.events.subscribe()
    }

    /// Devices whose link is `Connected` or `Ready`.
    pub fn connected_count(&self) -> usize {
        self.connected_count
    }

    /// Registers `descriptor` and starts connecting to it.
    ///
    /// Returns the registry index of the new record.
    pub fn connect(&mut self, descriptor: &DeviceDescriptor) -> Result<usize, ManagerError> {
        if self.registry.index_of(&descriptor.address).is_some() || self.links.contains_key(&descriptor.address) {
            warn!("Already connected to device: {}", descriptor.address);
            return Err(ManagerError::AlreadyConnected(descriptor.address.clone()));
        }
        if self.links.len() >= MAX_DEVICES {
            warn!("Maximum number of devices reached: {}", MAX_DEVICES);
            return Err(ManagerError::CapacityReached(MAX_DEVICES));
        }

        let kind = descriptor.classify();
        let id = self.next_id;
        let transport = self.factory.open(descriptor, id).inspect_err(|e| {
            warn!("Cannot open transport for {}: {}", descriptor.address, e);
        })?;
        self.next_id += 1;

        info!(
            "Connecting to {} ({}) as {} device",
            descriptor.name, descriptor.address, kind
        );

        let mut link = open_link(kind, descriptor, id, transport, &self.config);
        let events = link.connect()?;
        let index = self.registry.push(DeviceRecord::new(
            id,
            descriptor.name.clone(),
            descriptor.address.clone(),
            descriptor.rssi,
            kind,
        ));
        self.links.insert(descriptor.address.clone(), link);
        self.apply_link_events(&descriptor.address, events);
        Ok(index)
    }

    /// Tears down the device at `index` and removes its record.
    pub fn disconnect(&mut self, index: usize) -> Result<(), ManagerError> {
        let Some(record) = self.registry.get(index) else {
            warn!("Invalid device index: {}", index);
            return Err(ManagerError::InvalidIndex(index));
        };
        let address = record.address.clone();
        info!("Disconnecting device {} at index {}", address, index);

        // Late events for this address are dropped once the link is gone.
        if let Some(mut link) = self.links.remove(&address) {
            link.disconnect();
        }
        self.registry.remove(index);
        self.update_connected_count();
        self.emit(ManagerEvent::DeviceDisconnected(index));
        Ok(())
    }

    /// Returns false when no device has this address.
    pub fn disconnect_by_address(&mut self, address: &str) -> bool {
        match self.registry.index_of(address) {
            Some(index) => self.disconnect(index).is_ok(),
            None => {
                debug!("No device registered for {}", address);
                false
            }
        }
    }

    pub fn disconnect_all(&mut self) {
        info!("Disconnecting all devices");
        while !self.registry.is_empty() {
            if self.disconnect(0).is_err() {
                break;
            }
        }
    }

    /// Sends raw bytes to the stream device at `index`.
    pub fn send(&mut self, index: usize, data: &[u8]) -> Result<(), ManagerError> {
        let link = self.stream_link(index)?;
        link.send(data)?;
        Ok(())
    }

    pub fn send_text(&mut self, index: usize, text: &str) -> Result<(), ManagerError> {
        self.send(index, text.as_bytes())
    }

    /// Sends `data` to every stream device and returns how many accepted it.
    pub fn broadcast(&mut self, data: &[u8]) -> usize {
        debug!("Broadcasting {} bytes to all stream devices", data.len());
        let mut delivered = 0;
        for link in self.links.values_mut() {
            if link.kind() != DeviceKind::GenericStream {
                continue;
            }
            match link.send(data) {
                Ok(()) => delivered += 1,
                Err(e) => warn!("Broadcast to {} skipped: {}", link.address(), e),
            }
        }
        delivered
    }

    pub fn broadcast_text(&mut self, text: &str) -> usize {
        self.broadcast(text.as_bytes())
    }

    /// Writes the play state (0..=4) of the robot at `index`.
    pub fn write_play_state(&mut self, index: usize, state: u8) -> Result<(), ManagerError> {
        let state = PlayState::try_from(state).inspect_err(|e| warn!("{}", e))?;
        let link = self.robot_link(index)?;
        link.write_play_state(state)?;
        Ok(())
    }

    pub fn write_wifi_ssid(&mut self, index: usize, ssid: &str) -> Result<(), ManagerError> {
        let link = self.robot_link(index)?;
        link.write_wifi_ssid(ssid)?;
        Ok(())
    }

    /// Writes the play state of every robot, returning how many accepted it.
    pub fn write_play_state_all(&mut self, state: u8) -> Result<usize, ManagerError> {
        let state = PlayState::try_from(state).inspect_err(|e| warn!("{}", e))?;
        Ok(self.for_each_robot(|link| link.write_play_state(state)))
    }

    pub fn write_wifi_ssid_all(&mut self, ssid: &str) -> usize {
        self.for_each_robot(|link| link.write_wifi_ssid(ssid))
    }

    /// Routes a transport completion to the link that owns its session.
    pub fn handle_transport_event(&mut self, envelope: TransportEnvelope) {
        let TransportEnvelope { session, address, event } = envelope;
        let Some(link) = self.links.get_mut(&address) else {
            debug!("Dropping {:?} for unregistered device {}", event, address);
            return;
        };
        if link.session().id() != session {
            debug!("Dropping {:?} from stale session {} of {}", event, session, address);
            return;
        }
        let events = link.handle_transport_event(event);
        self.apply_link_events(&address, events);
    }

    /// Earliest instant at which some link wants [`ConnectionManager::poll`].
    pub fn next_poll_deadline(&self) -> Option<Instant> {
        self.links.values().filter_map(|link| link.next_poll()).min()
    }

    /// Runs the timers that are due at `now`.
    pub fn poll(&mut self, now: Instant) {
        let due: Vec<String> = self
            .links
            .iter()
            .filter(|(_, link)| link.next_poll().is_some_and(|deadline| deadline <= now))
            .map(|(address, _)| address.clone())
            .collect();

        for address in due {
            let Some(link) = self.links.get_mut(&address) else {
                continue;
            };
            let events = link.poll(now);
            self.apply_link_events(&address, events);
        }
    }

    fn stream_link(&mut self, index: usize) -> Result<&mut Box<dyn DeviceLink>, ManagerError> {
        self.link_of_kind(index, DeviceKind::GenericStream)
    }

    fn robot_link(&mut self, index: usize) -> Result<&mut Box<dyn DeviceLink>, ManagerError> {
        self.link_of_kind(index, DeviceKind::CustomRobot)
    }

    /// Resolves `index` to its link, checking the protocol variant.
    fn link_of_kind(
        &mut self,
        index: usize,
        wanted: DeviceKind,
    ) -> Result<&mut Box<dyn DeviceLink>, ManagerError> {
        let Some(record) = self.registry.get(index) else {
            warn!("Invalid device index: {}", index);
            return Err(ManagerError::InvalidIndex(index));
        };
        if record.kind != wanted {
            warn!(
                "Device at index {} is a {} device, operation needs {}",
                index, record.kind, wanted
            );
            return Err(ManagerError::UnsupportedOperation {
                index,
                kind: record.kind,
            });
        }
        self.links
            .get_mut(&record.address)
            .ok_or(ManagerError::InvalidIndex(index))
    }

    fn for_each_robot<W>(&mut self, mut write: W) -> usize
    where
        W: FnMut(&mut dyn DeviceLink) -> Result<(), LinkError>,
    {
        let mut delivered = 0;
        for link in self.links.values_mut() {
            if link.kind() != DeviceKind::CustomRobot {
                continue;
            }
            match write(link.as_mut()) {
                Ok(()) => delivered += 1,
                Err(e) => warn!("Write to {} skipped: {}", link.address(), e),
            }
        }
        delivered
    }

    /// Mirrors link events into the registry and out to observers.
    fn apply_link_events(&mut self, address: &str, events: Vec<LinkEvent>) {
        if events.is_empty() {
            return;
        }
        let Some(index) = self.registry.index_of(address) else {
            debug!("Dropping link events for unregistered device {}", address);
            return;
        };

        for event in events {
            match event {
                LinkEvent::StateChanged(state) => {
                    self.registry.update(index, |record| record.connection_state = state);
                    self.update_connected_count();
                    if state == ConnectionState::Ready {
                        info!("Device {} ready at index {}", address, index);
                        self.emit(ManagerEvent::DeviceConnected(index));
                    }
                }
                LinkEvent::Error(message) => {
                    warn!("Device {} error: {}", index, message);
                    self.registry
                        .update(index, |record| record.last_error = Some(message.clone()));
                    self.emit(ManagerEvent::DeviceError { index, message });
                }
                LinkEvent::DataReceived(data) => {
                    debug!("Data received from device {}: {:02X?}", index, data);
                    self.registry.update(index, |record| {
                        record.last_payload = data;
                        record.last_update = Some(Local::now());
                    });
                }
                LinkEvent::FieldChanged(field) => {
                    self.emit(ManagerEvent::TelemetryChanged { index, field });
                }
                LinkEvent::TelemetryUpdated(telemetry) => {
                    self.registry.update(index, |record| {
                        record.telemetry = telemetry;
                        record.last_update = Some(Local::now());
                    });
                }
                LinkEvent::NameChanged(name) => {
                    self.registry.update(index, |record| record.display_name = name);
                }
            }
        }
    }

    fn update_connected_count(&mut self) {
        let count = self
            .links
            .values()
            .filter(|link| link.state().is_connected())
            .count();
        if count != self.connected_count {
            self.connected_count = count;
            self.emit(ManagerEvent::ConnectedCountChanged(count));
        }
    }

    fn emit(&self, event: ManagerEvent) {
        if self.events.send(event).is_err() {
            debug!("No manager observers");
        }
    }
}

impl<F: TransportFactory> Drop for ConnectionManager<F> {
    fn drop(&mut self) {
        for link in self.links.values_mut() {
            link.disconnect();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::core::battery::tests::sample_payload;
    use crate::core::bluetooth::constants::{
        UUID_JBD_NOTIFY_CHAR, UUID_JBD_SERVICE, UUID_JBD_WRITE_CHAR, UUID_NUS_RX_CHAR,
        UUID_NUS_SERVICE, UUID_NUS_TX_CHAR, UUID_ROBOT_PLAY_STATE_CHAR, UUID_ROBOT_SERVICE,
    };
    use crate::core::bluetooth::frame::checksum;
    use crate::core::bluetooth::transport::TransportEvent;
    use crate::core::bluetooth::transport::mock::{MockTransportFactory, TransportOp};
    use crate::core::bluetooth::types::Telemetry;
    use uuid::Uuid;

    fn manager() -> (ConnectionManager<MockTransportFactory>, MockTransportFactory) {
        let factory = MockTransportFactory::default();
        (ConnectionManager::new(factory.clone(), LinkConfig::default()), factory)
    }

    fn stream(address: &str) -> DeviceDescriptor {
        DeviceDescriptor::new("uart", address, -50, vec![UUID_NUS_SERVICE])
    }

    fn battery(address: &str) -> DeviceDescriptor {
        DeviceDescriptor::new("xiaoxiang", address, -60, vec![UUID_JBD_SERVICE])
    }

    fn robot(address: &str) -> DeviceDescriptor {
        DeviceDescriptor::new("Falcons-3", address, -65, vec![])
    }

    fn deliver(manager: &mut ConnectionManager<MockTransportFactory>, address: &str, event: TransportEvent) {
        let session = manager.registry().find(address).map(|record| record.id).unwrap();
        manager.handle_transport_event(TransportEnvelope::new(session, address, event));
    }

    /// Walks the device at `address` to `Ready`.
    fn make_ready(
        manager: &mut ConnectionManager<MockTransportFactory>,
        address: &str,
        service: Uuid,
        characteristics: &[Uuid],
    ) {
        deliver(manager, address, TransportEvent::Connected);
        deliver(manager, address, TransportEvent::ServiceDiscovered(service));
        deliver(manager, address, TransportEvent::DiscoveryFinished);
        deliver(
            manager,
            address,
            TransportEvent::ServiceDetailsDiscovered {
                service,
                characteristics: characteristics.to_vec(),
            },
        );
    }

    fn drain(events: &mut broadcast::Receiver<ManagerEvent>) -> Vec<ManagerEvent> {
        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        seen
    }

    fn status_frame(payload: &[u8]) -> Vec<u8> {
        let mut covered = vec![0x00, payload.len() as u8];
        covered.extend_from_slice(payload);
        let crc = checksum(&covered).to_be_bytes();
        let mut frame = vec![0xDD, 0x03, 0x00, payload.len() as u8];
        frame.extend_from_slice(payload);
        frame.extend_from_slice(&[crc[0], crc[1], 0x77]);
        frame
    }

    #[test]
    fn connect_registers_a_connecting_record() {
        let (mut manager, factory) = manager();
        let index = manager.connect(&battery("B1")).unwrap();

        let record = manager.registry().get(index).unwrap();
        assert_eq!(record.connection_state, ConnectionState::Connecting);
        assert_eq!(record.kind, DeviceKind::FramedBatteryMonitor);
        assert_eq!(record.id, 1);
        assert_eq!(factory.transport("B1").ops(), vec![TransportOp::Connect]);
    }

    #[test]
    fn duplicate_address_is_rejected() {
        let (mut manager, _factory) = manager();
        manager.connect(&stream("A")).unwrap();
        assert!(matches!(
            manager.connect(&robot("A")),
            Err(ManagerError::AlreadyConnected(_))
        ));
        assert_eq!(manager.registry().len(), 1);
    }

    #[test]
    fn every_record_has_a_link() {
        let (mut manager, _factory) = manager();
        let paired = |manager: &ConnectionManager<MockTransportFactory>| {
            manager.registry().len() == manager.links.len()
                && manager
                    .registry()
                    .iter()
                    .all(|record| manager.links.contains_key(&record.address))
        };

        manager.connect(&stream("A")).unwrap();
        manager.connect(&battery("B")).unwrap();
        assert!(paired(&manager));

        assert!(manager.connect(&robot("A")).is_err());
        assert!(paired(&manager));

        manager.disconnect(0).unwrap();
        assert!(paired(&manager));
        assert_eq!(manager.registry().len(), 1);
    }

    #[test]
    fn seventeenth_device_is_rejected() {
        let (mut manager, _factory) = manager();
        for n in 0..MAX_DEVICES {
            manager.connect(&stream(&format!("S{n}"))).unwrap();
        }
        assert!(matches!(
            manager.connect(&stream("S16")),
            Err(ManagerError::CapacityReached(16))
        ));
        assert_eq!(manager.registry().len(), MAX_DEVICES);

        manager.disconnect(3).unwrap();
        assert!(manager.connect(&stream("S16")).is_ok());
    }

    #[test]
    fn disconnect_is_idempotent() {
        let (mut manager, factory) = manager();
        manager.connect(&stream("A")).unwrap();

        assert!(manager.disconnect_by_address("A"));
        assert!(!manager.disconnect_by_address("A"));
        assert!(matches!(manager.disconnect(0), Err(ManagerError::InvalidIndex(0))));
        assert!(manager.registry().is_empty());
        assert_eq!(factory.transport("A").ops().last(), Some(&TransportOp::Disconnect));
    }

    #[test]
    fn indices_collapse_after_removal() {
        let (mut manager, factory) = manager();
        for address in ["A", "B", "C"] {
            manager.connect(&stream(address)).unwrap();
            make_ready(&mut manager, address, UUID_NUS_SERVICE, &[UUID_NUS_RX_CHAR, UUID_NUS_TX_CHAR]);
        }

        manager.disconnect(0).unwrap();
        assert_eq!(manager.registry().index_of("C"), Some(1));

        factory.transport("C").clear();
        manager.send_text(1, "go").unwrap();
        assert_eq!(factory.transport("C").writes(), vec![b"go".to_vec()]);
    }

    #[test]
    fn events_for_removed_or_replaced_sessions_are_dropped() {
        let (mut manager, _factory) = manager();
        manager.connect(&stream("A")).unwrap();
        manager.disconnect(0).unwrap();

        manager.handle_transport_event(TransportEnvelope::new(1, "A", TransportEvent::Connected));
        assert!(manager.registry().is_empty());

        manager.connect(&stream("A")).unwrap();
        manager.handle_transport_event(TransportEnvelope::new(1, "A", TransportEvent::Connected));
        let record = manager.registry().get(0).unwrap();
        assert_eq!(record.id, 2);
        assert_eq!(record.connection_state, ConnectionState::Connecting);
    }

    #[test]
    fn connected_count_changes_are_notified_once() {
        let (mut manager, _factory) = manager();
        let mut events = manager.subscribe();
        manager.connect(&stream("A")).unwrap();
        make_ready(&mut manager, "A", UUID_NUS_SERVICE, &[UUID_NUS_RX_CHAR, UUID_NUS_TX_CHAR]);

        assert_eq!(
            drain(&mut events),
            vec![ManagerEvent::ConnectedCountChanged(1), ManagerEvent::DeviceConnected(0)]
        );
        assert_eq!(manager.connected_count(), 1);

        manager.disconnect(0).unwrap();
        assert_eq!(
            drain(&mut events),
            vec![ManagerEvent::ConnectedCountChanged(0), ManagerEvent::DeviceDisconnected(0)]
        );
    }

    #[test]
    fn transport_error_keeps_the_record() {
        let (mut manager, _factory) = manager();
        let mut events = manager.subscribe();
        manager.connect(&stream("A")).unwrap();
        deliver(&mut manager, "A", TransportEvent::Connected);
        deliver(&mut manager, "A", TransportEvent::Error("connection timeout".into()));

        let record = manager.registry().get(0).unwrap();
        assert_eq!(record.connection_state, ConnectionState::Error);
        assert_eq!(record.last_error.as_deref(), Some("connection timeout"));
        assert_eq!(manager.connected_count(), 0);
        assert!(drain(&mut events).contains(&ManagerEvent::DeviceError {
            index: 0,
            message: "connection timeout".into()
        }));

        deliver(&mut manager, "A", TransportEvent::Connected);
        assert_eq!(manager.registry().get(0).unwrap().connection_state, ConnectionState::Error);
    }

    #[test]
    fn stream_operations_reject_other_kinds() {
        let (mut manager, factory) = manager();
        manager.connect(&battery("B")).unwrap();
        manager.connect(&stream("S")).unwrap();
        make_ready(&mut manager, "S", UUID_NUS_SERVICE, &[UUID_NUS_RX_CHAR, UUID_NUS_TX_CHAR]);

        assert!(matches!(
            manager.send(0, b"x"),
            Err(ManagerError::UnsupportedOperation { index: 0, kind: DeviceKind::FramedBatteryMonitor })
        ));
        assert!(matches!(manager.send(7, b"x"), Err(ManagerError::InvalidIndex(7))));

        assert_eq!(manager.broadcast_text("all"), 1);
        assert!(factory.transport("B").writes().is_empty());
        assert_eq!(factory.transport("S").writes().last(), Some(&b"all".to_vec()));
    }

    #[test]
    fn play_state_is_validated_and_routed() {
        let (mut manager, factory) = manager();
        manager.connect(&robot("R")).unwrap();
        make_ready(&mut manager, "R", UUID_ROBOT_SERVICE, &[UUID_ROBOT_PLAY_STATE_CHAR]);
        factory.transport("R").clear();

        assert!(matches!(
            manager.write_play_state(0, 5),
            Err(ManagerError::PlayState(PlayStateError(5)))
        ));
        manager.write_play_state(0, 4).unwrap();
        assert_eq!(manager.write_play_state_all(1).unwrap(), 1);
        assert_eq!(manager.write_wifi_ssid_all("lab"), 0);
        assert_eq!(factory.transport("R").writes(), vec![vec![4], vec![1]]);
    }

    #[test]
    fn battery_telemetry_reaches_the_record() {
        let (mut manager, factory) = manager();
        let mut events = manager.subscribe();
        manager.connect(&battery("B")).unwrap();
        make_ready(&mut manager, "B", UUID_JBD_SERVICE, &[UUID_JBD_NOTIFY_CHAR, UUID_JBD_WRITE_CHAR]);
        assert_eq!(factory.transport("B").writes().len(), 1);
        drain(&mut events);

        deliver(
            &mut manager,
            "B",
            TransportEvent::CharacteristicChanged {
                characteristic: UUID_JBD_NOTIFY_CHAR,
                value: status_frame(&sample_payload()),
            },
        );

        let record = manager.registry().get(0).unwrap();
        match &record.telemetry {
            Telemetry::Battery(battery) => assert_eq!(battery.state_of_charge, 80),
            other => panic!("unexpected telemetry {other:?}"),
        }
        assert!(record.last_update.is_some());
        assert!(drain(&mut events).contains(&ManagerEvent::TelemetryChanged {
            index: 0,
            field: TelemetryField::StateOfCharge
        }));
    }

    #[test]
    fn poll_drives_due_battery_requests() {
        let (mut manager, factory) = manager();
        manager.connect(&stream("S")).unwrap();
        assert_eq!(manager.next_poll_deadline(), None);

        manager.connect(&battery("B")).unwrap();
        make_ready(&mut manager, "B", UUID_JBD_SERVICE, &[UUID_JBD_NOTIFY_CHAR, UUID_JBD_WRITE_CHAR]);
        let deadline = manager.next_poll_deadline().unwrap();

        factory.transport("B").clear();
        manager.poll(deadline + Duration::from_millis(1));
        assert_eq!(factory.transport("B").writes().len(), 1);
        assert!(manager.next_poll_deadline().unwrap() > deadline);
    }

    #[test]
    fn identity_updates_the_display_name() {
        let (mut manager, _factory) = manager();
        manager.connect(&robot("R")).unwrap();
        make_ready(
            &mut manager,
            "R",
            UUID_ROBOT_SERVICE,
            &[UUID_ROBOT_PLAY_STATE_CHAR, crate::core::bluetooth::constants::UUID_ROBOT_IDENTITY_CHAR],
        );
        deliver(
            &mut manager,
            "R",
            TransportEvent::CharacteristicRead {
                characteristic: crate::core::bluetooth::constants::UUID_ROBOT_IDENTITY_CHAR,
                value: b"r5".to_vec(),
            },
        );
        assert_eq!(manager.registry().get(0).unwrap().display_name, "Falcons-r5");
    }

    #[test]
    fn disconnect_all_empties_the_registry() {
        let (mut manager, factory) = manager();
        for address in ["A", "B", "C"] {
            manager.connect(&stream(address)).unwrap();
        }
        manager.disconnect_all();

        assert!(manager.registry().is_empty());
        for address in ["A", "B", "C"] {
            assert_eq!(factory.transport(address).ops().last(), Some(&TransportOp::Disconnect));
        }
    }
}
