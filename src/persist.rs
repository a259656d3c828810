//! Typed scalar access to the durable key/value store.
//!
//! Every persisted BMS value lives in the `bms` namespace as a little-endian
//! scalar. Callers treat failures as best-effort: they log and keep their
//! in-memory value.

use log::{debug, warn};

use crate::app::ports::{StorageError, StoragePort};

pub const NAMESPACE: &str = "bms";

pub const KEY_SOC: &str = "soc";
pub const KEY_SOH: &str = "soh";
pub const KEY_HIGH_TEMP_S: &str = "hightemp_s";
pub const KEY_FAULTS: &str = "faults";
pub const KEY_CYCLE_COUNT: &str = "cycle_cnt";

/// Scalar get/put on top of a byte [`StoragePort`].
pub trait KvStore {
    fn get_f32(&self, key: &str) -> Result<f32, StorageError>;
    fn put_f32(&mut self, key: &str, value: f32) -> Result<(), StorageError>;
    fn get_u64(&self, key: &str) -> Result<u64, StorageError>;
    fn put_u64(&mut self, key: &str, value: u64) -> Result<(), StorageError>;
}

impl<S: StoragePort + ?Sized> KvStore for S {
    fn get_f32(&self, key: &str) -> Result<f32, StorageError> {
        let mut buf = [0u8; 4];
        match self.read(NAMESPACE, key, &mut buf)? {
            4 => Ok(f32::from_le_bytes(buf)),
            _ => Err(StorageError::Corrupted),
        }
    }

    fn put_f32(&mut self, key: &str, value: f32) -> Result<(), StorageError> {
        self.write(NAMESPACE, key, &value.to_le_bytes())
    }

    fn get_u64(&self, key: &str) -> Result<u64, StorageError> {
        let mut buf = [0u8; 8];
        match self.read(NAMESPACE, key, &mut buf)? {
            8 => Ok(u64::from_le_bytes(buf)),
            _ => Err(StorageError::Corrupted),
        }
    }

    fn put_u64(&mut self, key: &str, value: u64) -> Result<(), StorageError> {
        self.write(NAMESPACE, key, &value.to_le_bytes())
    }
}

/// Read a counter, treating a missing key as zero.
fn read_counter(store: &impl StoragePort, key: &str) -> u64 {
    match store.get_u64(key) {
        Ok(v) => v,
        Err(StorageError::NotFound) => 0,
        Err(e) => {
            warn!("PERSIST: read {} failed ({}), assuming 0", key, e);
            0
        }
    }
}

fn increment(store: &mut impl StoragePort, key: &str) -> u64 {
    let next = read_counter(store, key).saturating_add(1);
    match store.put_u64(key, next) {
        Ok(()) => debug!("PERSIST: {} = {}", key, next),
        Err(e) => warn!("PERSIST: write {} failed ({})", key, e),
    }
    next
}

/// Durable fault counter (one per latch event).
pub fn fault_count(store: &impl StoragePort) -> u64 {
    read_counter(store, KEY_FAULTS)
}

pub fn increment_fault_count(store: &mut impl StoragePort) -> u64 {
    increment(store, KEY_FAULTS)
}

/// Durable charge-cycle counter. This is the canonical source; estimators
/// only read it.
pub fn cycle_count(store: &impl StoragePort) -> u64 {
    read_counter(store, KEY_CYCLE_COUNT)
}

pub fn increment_cycle_count(store: &mut impl StoragePort) -> u64 {
    increment(store, KEY_CYCLE_COUNT)
}
