//! GATT characteristic server.
//!
//! Implements [`WirelessTransport`]: holds the read and write observer
//! tables, fans characteristic accesses out to every observer whose filter
//! matches, and hands notifications to a radio sink.  The radio itself
//! (Bluedroid on the device) lives in [`super::ble`] and calls
//! [`GattServer::handle_read`] / [`GattServer::handle_write`] from its
//! event task.
//!
//! ## Service layout
//!
//! | Service                    | Characteristic          | Id     | Perms            |
//! |----------------------------|-------------------------|--------|------------------|
//! | Device information 0x180A  | Manufacturer name       | 0x2A29 | Read             |
//! |                            | Model number            | 0x2A24 | Read             |
//! | Environmental sensing 0x181A | Temperature           | 0x2A6E | Read+Notify      |
//! |                            | Mode                    | 0x2A26 | Read+Write+Notify|
//! |                            | Constant temperature    | 0x2A27 | Read+Write+Notify|
//! |                            | Constant duration       | 0x2A28 | Read+Write+Notify|

use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{debug, info, warn};

use crate::app::ports::{
    CharacteristicId, MAX_WRITE_LEN, ReadObserver, ReadValue, WirelessTransport, WriteObserver,
};
use crate::error::{Error, Result};

// ───────────────────────────────────────────────────────────────
// Constants
// ───────────────────────────────────────────────────────────────

pub const DEVICE_INFORMATION_SERVICE: u16 = 0x180A;
pub const ENVIRONMENTAL_SENSING_SERVICE: u16 = 0x181A;

/// Observer slots per direction.
pub const MAX_OBSERVERS: usize = 8;

const MAX_FILTER: usize = 6;

/// Static description of one characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharacteristicDef {
    pub id: CharacteristicId,
    pub service: u16,
    pub writable: bool,
    pub notify: bool,
}

const fn read_only(id: CharacteristicId) -> CharacteristicDef {
    CharacteristicDef {
        id,
        service: DEVICE_INFORMATION_SERVICE,
        writable: false,
        notify: false,
    }
}

const fn sensing(id: CharacteristicId, writable: bool) -> CharacteristicDef {
    CharacteristicDef {
        id,
        service: ENVIRONMENTAL_SENSING_SERVICE,
        writable,
        notify: true,
    }
}

/// Every characteristic, grouped by service in registration order.
pub const CHARACTERISTICS: [CharacteristicDef; 6] = [
    read_only(CharacteristicId::MANUFACTURER_NAME),
    read_only(CharacteristicId::MODEL_NUMBER),
    sensing(CharacteristicId::TEMPERATURE, false),
    sensing(CharacteristicId::MODE, true),
    sensing(CharacteristicId::CONSTANT_TEMPERATURE, true),
    sensing(CharacteristicId::CONSTANT_DURATION, true),
];

pub fn characteristic(id: CharacteristicId) -> Option<&'static CharacteristicDef> {
    CHARACTERISTICS.iter().find(|c| c.id == id)
}

impl CharacteristicId {
    /// Vendor 128-bit UUID (little-endian bytes) carrying the 16-bit id
    /// at offsets 2 and 8.
    pub const fn uuid128(self) -> [u8; 16] {
        let [lo, hi] = self.0.to_le_bytes();
        [
            0x94, 0x56, lo, hi, 0xB4, 0x11, 0x12, 0xFA, lo, hi, 0x24, 0x4C, 0x44, 0x14, 0x42, 0x80,
        ]
    }

    /// Inverse of [`uuid128`](Self::uuid128).
    pub fn from_uuid128(uuid: &[u8; 16]) -> Option<Self> {
        let id = Self(u16::from_le_bytes([uuid[8], uuid[9]]));
        (id.uuid128() == *uuid).then_some(id)
    }
}

// ───────────────────────────────────────────────────────────────
// Server
// ───────────────────────────────────────────────────────────────

type Filter = heapless::Vec<CharacteristicId, MAX_FILTER>;

struct Observer<F> {
    filter: Filter,
    callback: F,
}

impl<F: Clone> Observer<F> {
    fn matching(table: &[Self], id: CharacteristicId) -> heapless::Vec<F, MAX_OBSERVERS> {
        table
            .iter()
            .filter(|o| o.filter.contains(&id))
            .map(|o| o.callback.clone())
            .collect()
    }
}

/// Outgoing notification: characteristic and its current value.
pub type RadioSink = Box<dyn Fn(CharacteristicId, &[u8]) + Send + Sync>;

pub struct GattServer {
    readers: Mutex<heapless::Vec<Observer<ReadObserver>, MAX_OBSERVERS>>,
    writers: Mutex<heapless::Vec<Observer<WriteObserver>, MAX_OBSERVERS>>,
    connected: AtomicBool,
    sink: RadioSink,
}

impl GattServer {
    pub fn new(sink: impl Fn(CharacteristicId, &[u8]) + Send + Sync + 'static) -> Self {
        Self {
            readers: Mutex::new(heapless::Vec::new()),
            writers: Mutex::new(heapless::Vec::new()),
            connected: AtomicBool::new(false),
            sink: Box::new(sink),
        }
    }

    /// Record the link state reported by the radio (one peer at most).
    pub fn set_connected(&self, connected: bool) {
        let was = self.connected.swap(connected, Ordering::AcqRel);
        if was != connected {
            info!(
                "GATT: peer {}",
                if connected { "connected" } else { "disconnected" }
            );
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Serve a peer read: the concatenated output of every matching read
    /// observer.
    pub fn handle_read(&self, id: CharacteristicId) -> Result<ReadValue> {
        characteristic(id).ok_or(Error::UnknownResource)?;
        let observers = Observer::matching(&lock(&self.readers), id);
        let mut value = ReadValue::new();
        for observer in observers {
            let part = observer(id);
            if part.is_empty() {
                warn!("GATT: observer produced no value for {:#06x}", id.0);
                return Err(Error::ResourceUnavailable);
            }
            value
                .extend_from_slice(&part)
                .map_err(|()| Error::CollectionFull)?;
        }
        Ok(value)
    }

    /// Serve a peer write: copy into the scratch buffer, then hand it to
    /// every matching write observer.
    pub fn handle_write(&self, id: CharacteristicId, bytes: &[u8]) -> Result<()> {
        let def = characteristic(id).ok_or(Error::UnknownResource)?;
        if !def.writable {
            return Err(Error::InvalidInputParameter);
        }
        let scratch: heapless::Vec<u8, MAX_WRITE_LEN> = heapless::Vec::from_slice(bytes)
            .map_err(|()| {
                warn!("GATT: {} byte write to {:#06x} rejected", bytes.len(), id.0);
                Error::InvalidInputParameter
            })?;
        let observers = Observer::matching(&lock(&self.writers), id);
        debug!(
            "GATT: write {:#06x} ({} bytes) -> {} observers",
            id.0,
            scratch.len(),
            observers.len()
        );
        for observer in observers {
            observer(id, &scratch);
        }
        Ok(())
    }
}

fn build_filter(filter: &[CharacteristicId]) -> Result<Filter> {
    if filter.is_empty() {
        return Err(Error::InvalidInputParameter);
    }
    if filter.iter().any(|id| characteristic(*id).is_none()) {
        return Err(Error::UnknownResource);
    }
    heapless::Vec::from_slice(filter).map_err(|()| Error::InvalidInputParameter)
}

impl WirelessTransport for GattServer {
    fn add_read_observer(&self, filter: &[CharacteristicId], observer: ReadObserver) -> Result<()> {
        let filter = build_filter(filter)?;
        lock(&self.readers)
            .push(Observer {
                filter,
                callback: observer,
            })
            .map_err(|_| Error::CollectionFull)
    }

    fn add_write_observer(
        &self,
        filter: &[CharacteristicId],
        observer: WriteObserver,
    ) -> Result<()> {
        let filter = build_filter(filter)?;
        lock(&self.writers)
            .push(Observer {
                filter,
                callback: observer,
            })
            .map_err(|_| Error::CollectionFull)
    }

    fn notify(&self, id: CharacteristicId) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::ResourceUnavailable);
        }
        match characteristic(id) {
            Some(def) if def.notify => {}
            _ => return Err(Error::UnknownResource),
        }
        let value = self.handle_read(id)?;
        (self.sink)(id, &value);
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
