//! Transport seam between device links and the BLE backend
//!
//! Every operation returns immediately; its outcome arrives later as a
//! [`TransportEvent`] wrapped in a [`TransportEnvelope`] that names the
//! session it belongs to.

use thiserror::Error;
use uuid::Uuid;

use crate::core::bluetooth::device::DeviceDescriptor;

/// Identifies one link instance; equal to the id of its device record.
pub type SessionId = u64;

/// GATT write flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    WithResponse,
    WithoutResponse,
}

/// Asynchronous completion delivered by a transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The link layer connection is up
    Connected,
    /// The remote device went away, or the session was closed
    Disconnected,
    /// A transport failure (connect timeout, discovery failure, ...)
    Error(String),
    ServiceDiscovered(Uuid),
    DiscoveryFinished,
    /// Characteristics of one service have been resolved
    ServiceDetailsDiscovered { service: Uuid, characteristics: Vec<Uuid> },
    /// Notification payload
    CharacteristicChanged { characteristic: Uuid, value: Vec<u8> },
    /// Result of an explicit read
    CharacteristicRead { characteristic: Uuid, value: Vec<u8> },
}

/// A transport event tagged with its origin.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportEnvelope {
    pub session: SessionId,
    pub address: String,
    pub event: TransportEvent,
}

impl TransportEnvelope {
    pub fn new(session: SessionId, address: impl Into<String>, event: TransportEvent) -> Self {
        Self {
            session,
            address: address.into(),
            event,
        }
    }
}

/// Non-blocking GATT client for one device session.
pub trait Transport: Send {
    fn connect(&mut self);
    /// Closes the session and aborts anything still in flight.
    fn disconnect(&mut self);
    fn discover_services(&mut self);
    fn discover_details(&mut self, service: Uuid);
    fn enable_notifications(&mut self, characteristic: Uuid);
    fn read(&mut self, characteristic: Uuid);
    fn write(&mut self, characteristic: Uuid, data: &[u8], mode: WriteMode);
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("device {0} is unknown to the transport backend")]
    UnknownDevice(String),
    #[error("transport backend unavailable: {0}")]
    Unavailable(String),
}

/// Opens transports for newly accepted connect requests.
pub trait TransportFactory: Send {
    fn open(
        &mut self,
        descriptor: &DeviceDescriptor,
        session: SessionId,
    ) -> Result<Box<dyn Transport>, TransportError>;
}
