//! Framed command link for JBD battery monitors
//!
//! Once ready the link requests hardware info immediately and then on every
//! poll period. Responses arrive as notifications on 0xFF01 and go through
//! the [`FrameDecoder`].

use std::time::{Duration, Instant};

use log::{debug, info, warn};
use uuid::Uuid;

use crate::config::LinkConfig;
use crate::core::battery::parse_hardware_info;
use crate::core::bluetooth::commands::BmsCommand;
use crate::core::bluetooth::constants::{UUID_JBD_NOTIFY_CHAR, UUID_JBD_SERVICE, UUID_JBD_WRITE_CHAR};
use crate::core::bluetooth::device::DeviceDescriptor;
use crate::core::bluetooth::frame::{Frame, FrameDecoder};
use crate::core::bluetooth::links::{DeviceLink, LinkEvent, Session, SessionStep, differs, resolve};
use crate::core::bluetooth::transport::{SessionId, Transport, TransportEvent, WriteMode};
use crate::core::bluetooth::types::{
    BatteryTelemetry, ConnectionState, DeviceKind, Telemetry, TelemetryField,
};

pub struct FramedCommandLink {
    session: Session,
    poll_interval: Duration,
    epsilon: f32,
    notify_char: Option<Uuid>,
    write_char: Option<Uuid>,
    decoder: FrameDecoder,
    next_poll: Option<Instant>,
    telemetry: BatteryTelemetry,
}

impl FramedCommandLink {
    pub fn new(
        descriptor: &DeviceDescriptor,
        session_id: SessionId,
        transport: Box<dyn Transport>,
        config: &LinkConfig,
    ) -> Self {
        Self {
            session: Session::new("FramedCommandLink", UUID_JBD_SERVICE, descriptor, session_id, transport),
            poll_interval: config.poll_interval(),
            epsilon: config.telemetry_epsilon,
            notify_char: None,
            write_char: None,
            decoder: FrameDecoder::new(),
            next_poll: None,
            telemetry: BatteryTelemetry::default(),
        }
    }

    pub fn telemetry(&self) -> &BatteryTelemetry {
        &self.telemetry
    }

    fn setup(&mut self, characteristics: &[Uuid], events: &mut Vec<LinkEvent>) {
        let Some(notify_char) = resolve(characteristics, UUID_JBD_NOTIFY_CHAR) else {
            self.session.fail("JBD notify characteristic (0xFF01) not found", events);
            return;
        };
        let Some(write_char) = resolve(characteristics, UUID_JBD_WRITE_CHAR) else {
            self.session.fail("JBD write characteristic (0xFF02) not found", events);
            return;
        };

        self.notify_char = Some(notify_char);
        self.write_char = Some(write_char);
        self.session.transport().enable_notifications(notify_char);
        self.session.set_state(ConnectionState::Ready, events);

        info!("{}: connection ready, starting data polling", self.session.address());
        self.request(BmsCommand::HardwareInfo);
        self.next_poll = Some(Instant::now() + self.poll_interval);
    }

    fn release(&mut self) {
        self.notify_char = None;
        self.write_char = None;
        self.next_poll = None;
        self.decoder.reset();
    }

    fn request(&mut self, command: BmsCommand) {
        let Some(write_char) = self.write_char else {
            warn!("Cannot send command to {}, service not ready", self.session.address());
            return;
        };
        let frame = command.to_bytes();
        debug!("Sending {:?} to {}: {:02X?}", command, self.session.address(), frame);
        self.session
            .transport()
            .write(write_char, &frame, WriteMode::WithoutResponse);
    }

    fn on_notification(&mut self, value: &[u8], events: &mut Vec<LinkEvent>) {
        for frame in self.decoder.push(value) {
            self.on_frame(&frame, events);
        }
    }

    fn on_frame(&mut self, frame: &Frame, events: &mut Vec<LinkEvent>) {
        debug!(
            "{}: frame cmd {:#04x} status {:#04x} len {}",
            self.session.address(),
            frame.command,
            frame.status,
            frame.payload.len()
        );

        if !frame.is_ok() {
            warn!(
                "{}: device returned error status {:#04x} for command {:#04x}",
                self.session.address(),
                frame.status,
                frame.command
            );
            return;
        }
        if !frame.checksum_matches() {
            debug!("{}: checksum mismatch on command {:#04x}", self.session.address(), frame.command);
        }

        match BmsCommand::from_code(frame.command) {
            Some(BmsCommand::HardwareInfo) => {
                if let Some(info) = parse_hardware_info(&frame.payload) {
                    self.apply(info, events);
                }
            }
            Some(BmsCommand::CellInfo) => {
                debug!("{}: cell info frame ({} bytes)", self.session.address(), frame.payload.len());
            }
            None => debug!("{}: unhandled command {:#04x}", self.session.address(), frame.command),
        }
    }

    /// Stores `next` and reports the fields that actually changed.
    fn apply(&mut self, next: BatteryTelemetry, events: &mut Vec<LinkEvent>) {
        let current = &self.telemetry;
        let eps = self.epsilon;
        let temperatures_changed = current.temperatures.len() != next.temperatures.len()
            || current
                .temperatures
                .iter()
                .zip(&next.temperatures)
                .any(|(a, b)| differs(*a, *b, eps));

        let checks = [
            (TelemetryField::PackVoltage, differs(current.pack_voltage, next.pack_voltage, eps)),
            (TelemetryField::Current, differs(current.current, next.current, eps)),
            (TelemetryField::StateOfCharge, current.state_of_charge != next.state_of_charge),
            (
                TelemetryField::ResidualCapacity,
                differs(current.residual_capacity, next.residual_capacity, eps),
            ),
            (
                TelemetryField::NominalCapacity,
                differs(current.nominal_capacity, next.nominal_capacity, eps),
            ),
            (TelemetryField::CycleCount, current.cycle_count != next.cycle_count),
            (TelemetryField::CellCount, current.cell_count != next.cell_count),
            (TelemetryField::Temperatures, temperatures_changed),
        ];

        let changed: Vec<TelemetryField> = checks
            .into_iter()
            .filter_map(|(field, changed)| changed.then_some(field))
            .collect();
        if changed.is_empty() {
            return;
        }

        self.telemetry = next;
        events.extend(changed.into_iter().map(LinkEvent::FieldChanged));
        events.push(LinkEvent::TelemetryUpdated(Telemetry::Battery(self.telemetry.clone())));

        debug!(
            "{} - Voltage: {:.2} V Current: {:.2} A SoC: {} %",
            self.session.name(),
            self.telemetry.pack_voltage,
            self.telemetry.current,
            self.telemetry.state_of_charge
        );
    }
}

impl DeviceLink for FramedCommandLink {
    fn kind(&self) -> DeviceKind {
        DeviceKind::FramedBatteryMonitor
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
                if Some(characteristic) == self.notify_char {
                    self.on_notification(&value, &mut events);
                }
            }
            Some(SessionStep::Closed) => self.release(),
            None => {}
        }
        events
    }

    fn next_poll(&self) -> Option<Instant> {
        self.next_poll
    }

    fn poll(&mut self, now: Instant) -> Vec<LinkEvent> {
        if !self.session.is_ready() {
            self.next_poll = None;
            return Vec::new();
        }
        if self.next_poll.is_some_and(|deadline| deadline <= now) {
            self.request(BmsCommand::HardwareInfo);
            self.next_poll = Some(now + self.poll_interval);
        }
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::battery::tests::sample_payload;
    use crate::core::bluetooth::frame::checksum;
    use crate::core::bluetooth::links::test_support::{bring_to_details, descriptor, details};
    use crate::core::bluetooth::transport::mock::{MockTransport, TransportOp};

    const STATUS_REQUEST: [u8; 7] = [0xDD, 0xA5, 0x03, 0x00, 0xFF, 0xFD, 0x77];

    fn response(command: u8, status: u8, payload: &[u8]) -> Vec<u8> {
        let mut covered = vec![status, payload.len() as u8];
        covered.extend_from_slice(payload);
        let crc = checksum(&covered).to_be_bytes();

        let mut frame = vec![0xDD, command, status, payload.len() as u8];
        frame.extend_from_slice(payload);
        frame.extend_from_slice(&[crc[0], crc[1], 0x77]);
        frame
    }

    fn notification(value: Vec<u8>) -> TransportEvent {
        TransportEvent::CharacteristicChanged {
            characteristic: UUID_JBD_NOTIFY_CHAR,
            value,
        }
    }

    fn ready_link() -> (FramedCommandLink, MockTransport) {
        let transport = MockTransport::default();
        let mut link = FramedCommandLink::new(
            &descriptor("xiaoxiang"),
            2,
            Box::new(transport.clone()),
            &LinkConfig::default(),
        );
        bring_to_details(&mut link, &transport, UUID_JBD_SERVICE);
        link.handle_transport_event(details(
            UUID_JBD_SERVICE,
            &[UUID_JBD_NOTIFY_CHAR, UUID_JBD_WRITE_CHAR],
        ));
        (link, transport)
    }

    #[test]
    fn ready_issues_one_immediate_status_request() {
        let (link, transport) = ready_link();
        assert_eq!(link.state(), ConnectionState::Ready);
        assert_eq!(
            transport.ops(),
            vec![
                TransportOp::EnableNotifications(UUID_JBD_NOTIFY_CHAR),
                TransportOp::Write {
                    characteristic: UUID_JBD_WRITE_CHAR,
                    data: STATUS_REQUEST.to_vec(),
                    mode: WriteMode::WithoutResponse,
                },
            ]
        );
        assert!(link.next_poll().is_some());
    }

    #[test]
    fn poll_repeats_the_request_after_the_period() {
        let (mut link, transport) = ready_link();
        transport.clear();

        link.poll(Instant::now());
        assert!(transport.writes().is_empty(), "period has not elapsed yet");

        let later = Instant::now() + Duration::from_secs(3);
        link.poll(later);
        assert_eq!(transport.writes(), vec![STATUS_REQUEST.to_vec()]);
        assert_eq!(link.next_poll(), Some(later + Duration::from_millis(2000)));
    }

    #[test]
    fn polling_stops_when_leaving_ready() {
        let (mut link, transport) = ready_link();
        link.handle_transport_event(TransportEvent::Disconnected);
        assert_eq!(link.next_poll(), None);

        transport.clear();
        link.poll(Instant::now() + Duration::from_secs(10));
        assert!(transport.writes().is_empty());
    }

    #[test]
    fn identical_status_frames_notify_once() {
        let (mut link, _transport) = ready_link();
        let frame = response(0x03, 0x00, &sample_payload());

        let first = link.handle_transport_event(notification(frame.clone()));
        let updates = first
            .iter()
            .filter(|event| matches!(event, LinkEvent::TelemetryUpdated(_)))
            .count();
        assert_eq!(updates, 1);
        assert!(first.contains(&LinkEvent::FieldChanged(TelemetryField::PackVoltage)));
        assert!(first.contains(&LinkEvent::FieldChanged(TelemetryField::StateOfCharge)));

        let second = link.handle_transport_event(notification(frame));
        assert!(second.is_empty());
        assert_eq!(link.telemetry().state_of_charge, 80);
    }

    #[test]
    fn only_changed_fields_are_reported() {
        let (mut link, _transport) = ready_link();
        let mut payload = sample_payload();
        link.handle_transport_event(notification(response(0x03, 0x00, &payload)));

        payload[19] = 79;
        let events = link.handle_transport_event(notification(response(0x03, 0x00, &payload)));
        assert_eq!(
            events[0],
            LinkEvent::FieldChanged(TelemetryField::StateOfCharge)
        );
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn frames_split_across_notifications_are_reassembled() {
        let (mut link, _transport) = ready_link();
        let frame = response(0x03, 0x00, &sample_payload());
        let (head, tail) = frame.split_at(11);

        assert!(link.handle_transport_event(notification(head.to_vec())).is_empty());
        let events = link.handle_transport_event(notification(tail.to_vec()));
        assert!(matches!(events.last(), Some(LinkEvent::TelemetryUpdated(_))));
    }

    #[test]
    fn device_reported_failure_is_discarded() {
        let (mut link, _transport) = ready_link();
        let events = link.handle_transport_event(notification(response(0x03, 0x80, &sample_payload())));
        assert!(events.is_empty());
        assert_eq!(link.state(), ConnectionState::Ready);
        assert_eq!(link.telemetry(), &BatteryTelemetry::default());
    }

    #[test]
    fn cell_info_is_not_decoded() {
        let (mut link, _transport) = ready_link();
        let events = link.handle_transport_event(notification(response(0x04, 0x00, &[0x0D, 0x03])));
        assert!(events.is_empty());
    }

    #[test]
    fn missing_write_characteristic_is_fatal() {
        let transport = MockTransport::default();
        let mut link = FramedCommandLink::new(
            &descriptor("xiaoxiang"),
            3,
            Box::new(transport.clone()),
            &LinkConfig::default(),
        );
        bring_to_details(&mut link, &transport, UUID_JBD_SERVICE);
        link.handle_transport_event(details(UUID_JBD_SERVICE, &[UUID_JBD_NOTIFY_CHAR]));

        assert_eq!(link.state(), ConnectionState::Error);
        assert_eq!(
            link.session().last_error(),
            Some("JBD write characteristic (0xFF02) not found")
        );
        assert!(transport.writes().is_empty());
        assert_eq!(link.next_poll(), None);
    }
}
