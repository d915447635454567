//! Multi-characteristic link for the robot control service
//!
//! Every published value lives in its own characteristic. All of them are
//! subscribed and read once during setup; later updates arrive as
//! notifications and go through the same decoders.

use log::{debug, info, warn};
use uuid::Uuid;

use crate::config::LinkConfig;
use crate::core::bluetooth::constants::{
    ROBOT_NAME_PREFIX, UUID_ROBOT_BATTERY_VOLTAGE_CHAR, UUID_ROBOT_IDENTITY_CHAR,
    UUID_ROBOT_PLAY_STATE_CHAR, UUID_ROBOT_SERVICE, UUID_ROBOT_WIFI_LIST_CHAR,
    UUID_ROBOT_WIFI_SSID_CHAR,
};
use crate::core::bluetooth::device::DeviceDescriptor;
use crate::core::bluetooth::links::{DeviceLink, LinkError, LinkEvent, Session, SessionStep, differs, resolve};
use crate::core::bluetooth::transport::{SessionId, Transport, TransportEvent, WriteMode};
use crate::core::bluetooth::types::{
    ConnectionState, DeviceKind, PlayState, RobotTelemetry, Telemetry, TelemetryField,
};

/// Characteristics the link subscribes to, in setup order.
const ROBOT_CHARACTERISTICS: [Uuid; 5] = [
    UUID_ROBOT_PLAY_STATE_CHAR,
    UUID_ROBOT_WIFI_SSID_CHAR,
    UUID_ROBOT_WIFI_LIST_CHAR,
    UUID_ROBOT_BATTERY_VOLTAGE_CHAR,
    UUID_ROBOT_IDENTITY_CHAR,
];

pub struct MultiCharacteristicLink {
    session: Session,
    epsilon: f32,
    /// Characteristics present on the connected device
    resolved: Vec<Uuid>,
    telemetry: RobotTelemetry,
}

impl MultiCharacteristicLink {
    pub fn new(
        descriptor: &DeviceDescriptor,
        session_id: SessionId,
        transport: Box<dyn Transport>,
        config: &LinkConfig,
    ) -> Self {
        Self {
            session: Session::new("MultiCharacteristicLink", UUID_ROBOT_SERVICE, descriptor, session_id, transport),
            epsilon: config.telemetry_epsilon,
            resolved: Vec::new(),
            telemetry: RobotTelemetry::default(),
        }
    }

    pub fn telemetry(&self) -> &RobotTelemetry {
        &self.telemetry
    }

    fn setup(&mut self, characteristics: &[Uuid], events: &mut Vec<LinkEvent>) {
        if resolve(characteristics, UUID_ROBOT_PLAY_STATE_CHAR).is_none() {
            self.session.fail("Play state characteristic not found", events);
            return;
        }

        self.resolved = ROBOT_CHARACTERISTICS
            .iter()
            .filter_map(|uuid| resolve(characteristics, *uuid))
            .collect();
        if self.resolved.len() < ROBOT_CHARACTERISTICS.len() {
            debug!(
                "{}: {} of {} robot characteristics present",
                self.session.address(),
                self.resolved.len(),
                ROBOT_CHARACTERISTICS.len()
            );
        }

        for uuid in self.resolved.clone() {
            self.session.transport().enable_notifications(uuid);
        }
        for uuid in self.resolved.clone() {
            self.session.transport().read(uuid);
        }

        self.session.set_state(ConnectionState::Ready, events);
        info!("{}: robot connection ready", self.session.address());
    }

    fn release(&mut self) {
        self.resolved.clear();
    }

    fn writable(&self, characteristic: Uuid) -> Result<Uuid, LinkError> {
        if !self.session.is_ready() {
            return Err(LinkError::NotReady(self.session.state()));
        }
        resolve(&self.resolved, characteristic).ok_or(LinkError::CharacteristicUnavailable(characteristic))
    }

    fn on_value(&mut self, characteristic: Uuid, value: &[u8], events: &mut Vec<LinkEvent>) {
        let changed = match characteristic {
            UUID_ROBOT_PLAY_STATE_CHAR => self.decode_play_state(value),
            UUID_ROBOT_WIFI_SSID_CHAR => self.decode_wifi_ssid(value),
            UUID_ROBOT_WIFI_LIST_CHAR => self.decode_wifi_list(value),
            UUID_ROBOT_BATTERY_VOLTAGE_CHAR => self.decode_battery_voltage(value),
            UUID_ROBOT_IDENTITY_CHAR => self.decode_identity(value, events),
            other => {
                debug!("{}: value for unknown characteristic {}", self.session.address(), other);
                None
            }
        };

        if let Some(field) = changed {
            debug!("{}: {:?} updated", self.session.name(), field);
            events.push(LinkEvent::FieldChanged(field));
            events.push(LinkEvent::TelemetryUpdated(Telemetry::Robot(self.telemetry.clone())));
        }
    }

    fn decode_play_state(&mut self, value: &[u8]) -> Option<TelemetryField> {
        let state = *value.first()?;
        if state == self.telemetry.play_state {
            return None;
        }
        self.telemetry.play_state = state;
        Some(TelemetryField::PlayState)
    }

    fn decode_wifi_ssid(&mut self, value: &[u8]) -> Option<TelemetryField> {
        let ssid = String::from_utf8_lossy(value);
        if ssid == self.telemetry.wifi_ssid {
            return None;
        }
        self.telemetry.wifi_ssid = ssid.into_owned();
        Some(TelemetryField::WifiSsid)
    }

    /// Newline separated network names, empty entries skipped.
    fn decode_wifi_list(&mut self, value: &[u8]) -> Option<TelemetryField> {
        let networks: Vec<String> = String::from_utf8_lossy(value)
            .split('\n')
            .filter(|entry| !entry.is_empty())
            .map(str::to_owned)
            .collect();
        if networks == self.telemetry.wifi_networks {
            return None;
        }
        debug!("{}: {} wifi networks", self.session.name(), networks.len());
        self.telemetry.wifi_networks = networks;
        Some(TelemetryField::WifiNetworks)
    }

    /// Little-endian f32 in volts.
    fn decode_battery_voltage(&mut self, value: &[u8]) -> Option<TelemetryField> {
        let bytes: [u8; 4] = value.get(..4)?.try_into().ok()?;
        let voltage = f32::from_le_bytes(bytes);
        if !differs(self.telemetry.battery_voltage, voltage, self.epsilon) {
            return None;
        }
        self.telemetry.battery_voltage = voltage;
        Some(TelemetryField::BatteryVoltage)
    }

    /// A non-empty identity also becomes the display name.
    fn decode_identity(&mut self, value: &[u8], events: &mut Vec<LinkEvent>) -> Option<TelemetryField> {
        let identity = String::from_utf8_lossy(value);
        if identity == self.telemetry.identity {
            return None;
        }
        self.telemetry.identity = identity.into_owned();
        if !self.telemetry.identity.is_empty() {
            let name = format!("{}{}", ROBOT_NAME_PREFIX, self.telemetry.identity);
            self.session.rename(name, events);
        }
        Some(TelemetryField::Identity)
    }
}

impl DeviceLink for MultiCharacteristicLink {
    fn kind(&self) -> DeviceKind {
        DeviceKind::CustomRobot
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
                self.on_value(characteristic, &value, &mut events)
            }
            Some(SessionStep::Closed) => self.release(),
            None => {}
        }
        events
    }

    fn write_play_state(&mut self, state: PlayState) -> Result<(), LinkError> {
        let characteristic = self.writable(UUID_ROBOT_PLAY_STATE_CHAR).inspect_err(|err| {
            warn!("Cannot write play state to {}: {}", self.session.address(), err);
        })?;
        debug!("Writing play state {:?} to {}", state, self.session.address());
        self.session
            .transport()
            .write(characteristic, &[u8::from(state)], WriteMode::WithResponse);
        Ok(())
    }

    fn write_wifi_ssid(&mut self, ssid: &str) -> Result<(), LinkError> {
        let characteristic = self.writable(UUID_ROBOT_WIFI_SSID_CHAR).inspect_err(|err| {
            warn!("Cannot write WiFi SSID to {}: {}", self.session.address(), err);
        })?;
        debug!("Writing WiFi SSID {:?} to {}", ssid, self.session.address());
        self.session
            .transport()
            .write(characteristic, ssid.as_bytes(), WriteMode::WithResponse);
        Ok(())
    }
}
