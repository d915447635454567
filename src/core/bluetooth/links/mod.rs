//! Device links: one per connected device
//!
//! A link owns the transport session of its device and drives the shared
//! connection state machine:
//!
//! ```text
//! Disconnected --connect()--> Connecting --Connected--> Connected
//!     --service found, mandatory characteristics resolved--> Ready
//! any failure --> Error (terminal until disconnect)
//! disconnect() / remote disconnection --> Disconnected
//! ```
//!
//! Links never call back into the manager. Every entry point returns the
//! [`LinkEvent`]s it produced and the manager applies them afterwards.

mod framed;
mod multi;
mod stream;

use std::time::Instant;

use log::{debug, info, warn};
use thiserror::Error;
use uuid::Uuid;

use crate::config::LinkConfig;
use crate::core::bluetooth::device::DeviceDescriptor;
use crate::core::bluetooth::transport::{SessionId, Transport, TransportEvent};
use crate::core::bluetooth::types::{ConnectionState, DeviceKind, PlayState, Telemetry, TelemetryField};

pub use framed::FramedCommandLink;
pub use multi::MultiCharacteristicLink;
pub use stream::StreamLink;

/// Event emitted by a link towards its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    StateChanged(ConnectionState),
    Error(String),
    /// Raw payload from a stream device
    DataReceived(Vec<u8>),
    /// One telemetry field took a new value
    FieldChanged(TelemetryField),
    /// Snapshot after at least one field changed
    TelemetryUpdated(Telemetry),
    NameChanged(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error("link is {0}, operation requires Ready")]
    NotReady(ConnectionState),
    #[error("characteristic {0} was not resolved on this device")]
    CharacteristicUnavailable(Uuid),
    #[error("operation not supported by {0} devices")]
    Unsupported(DeviceKind),
    #[error("link already started (state {0})")]
    AlreadyStarted(ConnectionState),
}

/// Common interface of the three protocol variants.
pub trait DeviceLink: Send {
    fn kind(&self) -> DeviceKind;

    fn session(&self) -> &Session;

    fn session_mut(&mut self) -> &mut Session;

    /// Starts the connect sequence. Only valid on a fresh link.
    fn connect(&mut self) -> Result<Vec<LinkEvent>, LinkError> {
        let mut events = Vec::new();
        self.session_mut().begin(&mut events)?;
        Ok(events)
    }

    /// Tears the session down and releases the transport.
    fn disconnect(&mut self) -> Vec<LinkEvent>;

    fn handle_transport_event(&mut self, event: TransportEvent) -> Vec<LinkEvent>;

    /// Next instant at which [`DeviceLink::poll`] has work to do.
    fn next_poll(&self) -> Option<Instant> {
        None
    }

    fn poll(&mut self, _now: Instant) -> Vec<LinkEvent> {
        Vec::new()
    }

    fn send(&mut self, _data: &[u8]) -> Result<(), LinkError> {
        Err(LinkError::Unsupported(self.kind()))
    }

    fn write_play_state(&mut self, _state: PlayState) -> Result<(), LinkError> {
        Err(LinkError::Unsupported(self.kind()))
    }

    fn write_wifi_ssid(&mut self, _ssid: &str) -> Result<(), LinkError> {
        Err(LinkError::Unsupported(self.kind()))
    }

    fn address(&self) -> &str {
        self.session().address()
    }

    fn state(&self) -> ConnectionState {
        self.session().state()
    }
}

/// Creates the link variant for `kind`.
pub fn open_link(
    kind: DeviceKind,
    descriptor: &DeviceDescriptor,
    session_id: SessionId,
    transport: Box<dyn Transport>,
    config: &LinkConfig,
) -> Box<dyn DeviceLink> {
    match kind {
        DeviceKind::GenericStream => Box::new(StreamLink::new(descriptor, session_id, transport, config)),
        DeviceKind::FramedBatteryMonitor => {
            Box::new(FramedCommandLink::new(descriptor, session_id, transport, config))
        }
        DeviceKind::CustomRobot => {
            Box::new(MultiCharacteristicLink::new(descriptor, session_id, transport, config))
        }
    }
}

/// What a variant has to act on after the shared lifecycle ran.
#[derive(Debug)]
pub(crate) enum SessionStep {
    /// The service details are known; resolve characteristics and go Ready
    Resolve(Vec<Uuid>),
    /// A characteristic value arrived, from a notification or a read
    Value { characteristic: Uuid, value: Vec<u8> },
    /// The session left its active states; drop handles and timers
    Closed,
}

/// Lifecycle state shared by every link variant.
pub struct Session {
    id: SessionId,
    label: &'static str,
    service: Uuid,
    address: String,
    name: String,
    rssi: i16,
    state: ConnectionState,
    last_error: Option<String>,
    service_found: bool,
    started: bool,
    transport: Box<dyn Transport>,
}

impl Session {
    pub(crate) fn new(
        label: &'static str,
        service: Uuid,
        descriptor: &DeviceDescriptor,
        id: SessionId,
        transport: Box<dyn Transport>,
    ) -> Self {
        Self {
            id,
            label,
            service,
            address: descriptor.address.clone(),
            name: descriptor.name.clone(),
            rssi: descriptor.rssi,
            state: ConnectionState::Disconnected,
            last_error: None,
            service_found: false,
            started: false,
            transport,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rssi(&self) -> i16 {
        self.rssi
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn is_ready(&self) -> bool {
        self.state == ConnectionState::Ready
    }

    pub(crate) fn transport(&mut self) -> &mut dyn Transport {
        self.transport.as_mut()
    }

    pub(crate) fn rename(&mut self, name: String, events: &mut Vec<LinkEvent>) {
        if self.name != name {
            self.name = name.clone();
            events.push(LinkEvent::NameChanged(name));
        }
    }

    pub(crate) fn set_state(&mut self, state: ConnectionState, events: &mut Vec<LinkEvent>) {
        if self.state != state {
            debug!("{} {}: {} -> {}", self.label, self.address, self.state, state);
            self.state = state;
            events.push(LinkEvent::StateChanged(state));
        }
    }

    /// Records `message` and moves to the terminal `Error` state.
    pub(crate) fn fail(&mut self, message: impl Into<String>, events: &mut Vec<LinkEvent>) {
        let message = message.into();
        warn!("{} {}: {}", self.label, self.address, message);
        self.last_error = Some(message.clone());
        events.push(LinkEvent::Error(message));
        self.set_state(ConnectionState::Error, events);
    }

    pub(crate) fn begin(&mut self, events: &mut Vec<LinkEvent>) -> Result<(), LinkError> {
        if self.started {
            warn!("{} {}: already connected or connecting", self.label, self.address);
            return Err(LinkError::AlreadyStarted(self.state));
        }
        self.started = true;
        info!("{} connecting to {} ({})", self.label, self.name, self.address);
        self.set_state(ConnectionState::Connecting, events);
        self.transport.connect();
        Ok(())
    }

    /// Closes the transport session. Safe to call in any state.
    pub(crate) fn teardown(&mut self, events: &mut Vec<LinkEvent>) {
        if self.started {
            info!("{} disconnecting from {}", self.label, self.address);
            self.transport.disconnect();
        }
        self.service_found = false;
        self.set_state(ConnectionState::Disconnected, events);
    }

    /// Runs the part of the lifecycle common to all variants.
    pub(crate) fn advance(&mut self, event: TransportEvent, events: &mut Vec<LinkEvent>) -> Option<SessionStep> {
        if !self.state.is_active() {
            debug!(
                "{} {}: ignoring {:?} while {}",
                self.label, self.address, event, self.state
            );
            return None;
        }

        match event {
            TransportEvent::Connected => {
                if self.state == ConnectionState::Connecting {
                    info!("{} {}: connected, discovering services...", self.label, self.address);
                    self.set_state(ConnectionState::Connected, events);
                    self.service_found = false;
                    self.transport.discover_services();
                }
                None
            }
            TransportEvent::ServiceDiscovered(uuid) => {
                debug!("{} {}: service discovered {}", self.label, self.address, uuid);
                if self.state == ConnectionState::Connected && uuid == self.service {
                    self.service_found = true;
                }
                None
            }
            TransportEvent::DiscoveryFinished => {
                if self.state != ConnectionState::Connected {
                    return None;
                }
                if !self.service_found {
                    self.fail(format!("{} service ({}) not found on device", self.label, self.service), events);
                    return Some(SessionStep::Closed);
                }
                debug!("{} {}: discovering service details...", self.label, self.address);
                self.transport.discover_details(self.service);
                None
            }
            TransportEvent::ServiceDetailsDiscovered { service, characteristics } => {
                if self.state == ConnectionState::Connected && service == self.service {
                    Some(SessionStep::Resolve(characteristics))
                } else {
                    None
                }
            }
            TransportEvent::CharacteristicChanged { characteristic, value }
            | TransportEvent::CharacteristicRead { characteristic, value } => {
                if self.state == ConnectionState::Ready {
                    Some(SessionStep::Value { characteristic, value })
                } else {
                    None
                }
            }
            TransportEvent::Disconnected => {
                info!("{} {}: disconnected by transport", self.label, self.address);
                self.set_state(ConnectionState::Disconnected, events);
                Some(SessionStep::Closed)
            }
            TransportEvent::Error(message) => {
                self.fail(message, events);
                Some(SessionStep::Closed)
            }
        }
    }
}

/// Looks `wanted` up among the resolved characteristics.
pub(crate) fn resolve(available: &[Uuid], wanted: Uuid) -> Option<Uuid> {
    available.iter().copied().find(|uuid| *uuid == wanted)
}

/// Float comparison used for change suppression.
pub(crate) fn differs(current: f32, next: f32, epsilon: f32) -> bool {
    (current - next).abs() > epsilon
}
