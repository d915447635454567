//! Raw pass-through link over the Nordic UART service

use log::{debug, warn};
use uuid::Uuid;

use crate::config::LinkConfig;
use crate::core::bluetooth::constants::{UUID_NUS_RX_CHAR, UUID_NUS_SERVICE, UUID_NUS_TX_CHAR};
use crate::core::bluetooth::device::DeviceDescriptor;
use crate::core::bluetooth::links::{DeviceLink, LinkError, LinkEvent, Session, SessionStep, resolve};
use crate::core::bluetooth::transport::{SessionId, Transport, TransportEvent, WriteMode};
use crate::core::bluetooth::types::{ConnectionState, DeviceKind};

/// Writes go to RX, notifications arrive on TX.
pub struct StreamLink {
    session: Session,
    chunk_size: usize,
    rx_char: Option<Uuid>,
    tx_char: Option<Uuid>,
}

impl StreamLink {
    pub fn new(
        descriptor: &DeviceDescriptor,
        session_id: SessionId,
        transport: Box<dyn Transport>,
        config: &LinkConfig,
    ) -> Self {
        Self {
            session: Session::new("StreamLink", UUID_NUS_SERVICE, descriptor, session_id, transport),
            chunk_size: config.chunk_size(),
            rx_char: None,
            tx_char: None,
        }
    }

    fn setup(&mut self, characteristics: &[Uuid], events: &mut Vec<LinkEvent>) {
        let Some(rx_char) = resolve(characteristics, UUID_NUS_RX_CHAR) else {
            self.session.fail("RX characteristic not found", events);
            return;
        };
        let Some(tx_char) = resolve(characteristics, UUID_NUS_TX_CHAR) else {
            self.session.fail("TX characteristic not found", events);
            return;
        };

        self.rx_char = Some(rx_char);
        self.tx_char = Some(tx_char);
        self.session.transport().enable_notifications(tx_char);
        self.session.set_state(ConnectionState::Ready, events);
    }

    fn release(&mut self) {
        self.rx_char = None;
        self.tx_char = None;
    }
}

impl DeviceLink for StreamLink {
    fn kind(&self) -> DeviceKind {
        DeviceKind::GenericStream
    }

    fn session(&self) -> &Session {
        &self.session
    }

    fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    fn disconnect(&mut self) -> Vec<LinkEvent> {
        let mut events = Vec::new();
        self.release();
        self.session.teardown(&mut events);
        events
    }

    fn handle_transport_event(&mut self, event: TransportEvent) -> Vec<LinkEvent> {
        let mut events = Vec::new();
        match self.session.advance(event, &mut events) {
            Some(SessionStep::Resolve(characteristics)) => self.setup(&characteristics, &mut events),
            Some(SessionStep::Value { characteristic, value }) => {
                if Some(characteristic) == self.tx_char {
                    events.push(LinkEvent::DataReceived(value));
                }
            }
            Some(SessionStep::Closed) => self.release(),
            None => {}
        }
        events
    }

    /// Sends `data` in sequential chunks without waiting for acknowledgement.
    fn send(&mut self, data: &[u8]) -> Result<(), LinkError> {
        if !self.session.is_ready() {
            warn!("Cannot send data to {}: not ready", self.session.address());
            return Err(LinkError::NotReady(self.session.state()));
        }
        let rx_char = self
            .rx_char
            .ok_or(LinkError::CharacteristicUnavailable(UUID_NUS_RX_CHAR))?;

        for chunk in data.chunks(self.chunk_size) {
            debug!("Writing {} bytes to {}", chunk.len(), self.session.address());
            self.session
                .transport()
                .write(rx_char, chunk, WriteMode::WithoutResponse);
        }
        Ok(())
    }
}
