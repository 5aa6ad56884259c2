//! Per-serial-number device records.
//!
//! Records are kept in first-seen order; enumeration order is observable
//! through [`PairingRegistry::get_ready_for_type`](crate::PairingRegistry::get_ready_for_type).
//! Every access takes the store lock for the duration of a closure, so no
//! lock is ever held across an `.await`.

use ccu_core::DeviceKind;
use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::types::{ConnectionEvent, DeviceStatus, Factsheet};

/// Everything the CCU knows about one device.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceRecord {
    pub status: DeviceStatus,
    /// Last raw connection event.
    pub connection: Option<ConnectionEvent>,
    /// Last capability sheet.
    pub factsheet: Option<Factsheet>,
    pub bound_order_id: Option<String>,
    pub last_finished_action_id: Option<String>,
}

impl DeviceRecord {
    pub fn new(serial_number: impl Into<String>, kind: DeviceKind) -> Self {
        Self {
            status: DeviceStatus::new(serial_number, kind),
            connection: None,
            factsheet: None,
            bound_order_id: None,
            last_finished_action_id: None,
        }
    }

    /// Whether the last connection event said ONLINE.
    pub fn was_online(&self) -> bool {
        self.connection
            .as_ref()
            .map(ConnectionEvent::is_online)
            .unwrap_or(false)
    }
}

/// Storage of device records for one device kind.
pub struct DeviceRecordStore {
    kind: DeviceKind,
    records: RwLock<IndexMap<String, DeviceRecord>>,
}

impl DeviceRecordStore {
    pub fn new(kind: DeviceKind) -> Self {
        Self {
            kind,
            records: RwLock::new(IndexMap::new()),
        }
    }

    pub fn kind(&self) -> DeviceKind {
        self.kind
    }

    /// Clone of the record for `serial`.
    pub fn get(&self, serial: &str) -> Option<DeviceRecord> {
        self.records.read().get(serial).cloned()
    }

    pub fn contains(&self, serial: &str) -> bool {
        self.records.read().contains_key(serial)
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Serial numbers in enumeration order.
    pub fn serials(&self) -> Vec<String> {
        self.records.read().keys().cloned().collect()
    }

    /// Clones of all records in enumeration order.
    pub fn records(&self) -> Vec<DeviceRecord> {
        self.records.read().values().cloned().collect()
    }

    /// Mutate the record for `serial`, creating it first if absent.
    pub fn upsert<R>(&self, serial: &str, f: impl FnOnce(&mut DeviceRecord) -> R) -> R {
        let mut records = self.records.write();
        let record = records
            .entry(serial.to_string())
            .or_insert_with(|| DeviceRecord::new(serial, self.kind));
        f(record)
    }

    /// Mutate the record for `serial` if it exists.
    pub fn modify<R>(&self, serial: &str, f: impl FnOnce(&mut DeviceRecord) -> R) -> Option<R> {
        self.records.write().get_mut(serial).map(f)
    }

    /// Mutate every record under a single lock acquisition.
    pub fn modify_all(&self, mut f: impl FnMut(&mut DeviceRecord)) {
        for record in self.records.write().values_mut() {
            f(record);
        }
    }

    /// Read all records under a single lock acquisition.
    pub fn scan<R>(&self, f: impl FnOnce(&mut dyn Iterator<Item = &DeviceRecord>) -> R) -> R {
        let records = self.records.read();
        let mut iter = records.values();
        f(&mut iter)
    }

    /// Delete a record, keeping the order of the remaining ones.
    pub fn remove(&self, serial: &str) -> Option<DeviceRecord> {
        self.records.write().shift_remove(serial)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Availability, ConnectionState};

    #[test]
    fn test_lazy_creation_and_order() {
        let store = DeviceRecordStore::new(DeviceKind::Module);
        assert!(store.is_empty());

        store.upsert("B", |_| ());
        store.upsert("A", |_| ());
        store.upsert("C", |r| r.status.availability = Availability::Ready);
        store.upsert("B", |r| r.status.connected = true);

        assert_eq!(store.serials(), vec!["B", "A", "C"]);
        assert!(store.get("B").unwrap().status.connected);
        assert_eq!(store.get("C").unwrap().status.kind, DeviceKind::Module);
    }

    #[test]
    fn test_modify_missing_is_none() {
        let store = DeviceRecordStore::new(DeviceKind::Agv);
        assert!(store.modify("nope", |r| r.status.connected = true).is_none());
        assert!(!store.contains("nope"));
    }

    #[test]
    fn test_remove_keeps_order() {
        let store = DeviceRecordStore::new(DeviceKind::Module);
        for serial in ["A", "B", "C"] {
            store.upsert(serial, |_| ());
        }
        assert!(store.remove("B").is_some());
        assert!(store.remove("B").is_none());
        assert_eq!(store.serials(), vec!["A", "C"]);
    }

    #[test]
    fn test_was_online() {
        let mut record = DeviceRecord::new("A", DeviceKind::Module);
        assert!(!record.was_online());
        record.connection = Some(ConnectionEvent::new("A", ConnectionState::Online));
        assert!(record.was_online());
    }

    #[test]
    fn test_scan_counts() {
        let store = DeviceRecordStore::new(DeviceKind::Module);
        store.upsert("A", |r| r.status.connected = true);
        store.upsert("B", |_| ());
        let connected = store.scan(|iter| iter.filter(|r| r.status.connected).count());
        assert_eq!(connected, 1);
    }
}
