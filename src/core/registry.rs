//! Ordered collection of device records
//!
//! Observers read the registry and subscribe to its change feed. Only the
//! connection manager mutates it.

use chrono::{DateTime, Local};
use log::debug;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::core::bluetooth::transport::SessionId;
use crate::core::bluetooth::types::{ConnectionState, DeviceKind, Telemetry};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// What callers observe about one device.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceRecord {
    /// Manager assigned, never reused
    pub id: SessionId,
    pub display_name: String,
    pub address: String,
    pub connection_state: ConnectionState,
    pub rssi: i16,
    pub kind: DeviceKind,
    pub last_error: Option<String>,
    /// Last raw payload from a stream device
    pub last_payload: Vec<u8>,
    /// When data last arrived
    pub last_update: Option<DateTime<Local>>,
    pub telemetry: Telemetry,
}

impl DeviceRecord {
    pub fn new(id: SessionId, display_name: String, address: String, rssi: i16, kind: DeviceKind) -> Self {
        Self {
            id,
            display_name,
            address,
            connection_state: ConnectionState::Connecting,
            rssi,
            kind,
            last_error: None,
            last_payload: Vec::new(),
            last_update: None,
            telemetry: Telemetry::for_kind(kind),
        }
    }
}

/// Row-level change of the registry, carrying the current index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryEvent {
    Inserted(usize),
    Updated(usize),
    Removed(usize),
}

pub struct DeviceRegistry {
    records: Vec<DeviceRecord>,
    events: broadcast::Sender<RegistryEvent>,
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceRegistry {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            records: Vec::new(),
            events,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&DeviceRecord> {
        self.records.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeviceRecord> {
        self.records.iter()
    }

    pub fn index_of(&self, address: &str) -> Option<usize> {
        self.records.iter().position(|record| record.address == address)
    }

    pub fn find(&self, address: &str) -> Option<&DeviceRecord> {
        self.index_of(address).and_then(|index| self.get(index))
    }

    /// Copy of every record, in order.
    pub fn snapshot(&self) -> Vec<DeviceRecord> {
        self.records.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    /// Appends `record` and returns its index.
    pub(crate) fn push(&mut self, record: DeviceRecord) -> usize {
        self.records.push(record);
        let index = self.records.len() - 1;
        self.notify(RegistryEvent::Inserted(index));
        index
    }

    /// Applies `change` to the record at `index`.
    ///
    /// Observers are only told when the record actually changed.
    pub(crate) fn update<F>(&mut self, index: usize, change: F) -> bool
    where
        F: FnOnce(&mut DeviceRecord),
    {
        let Some(record) = self.records.get_mut(index) else {
            return false;
        };
        let before = record.clone();
        change(record);
        if *record == before {
            return false;
        }
        self.notify(RegistryEvent::Updated(index));
        true
    }

    pub(crate) fn remove(&mut self, index: usize) -> Option<DeviceRecord> {
        if index >= self.records.len() {
            return None;
        }
        let record = self.records.remove(index);
        self.notify(RegistryEvent::Removed(index));
        Some(record)
    }

    fn notify(&self, event: RegistryEvent) {
        // No receivers is fine.
        if self.events.send(event).is_err() {
            debug!("No registry observers for {:?}", event);
        }
    }
}
