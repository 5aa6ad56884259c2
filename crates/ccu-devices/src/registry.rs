//! Pairing registry - turns connection and capability telemetry into the
//! device-availability model used for order assignment.
//!
//! One instance exists per device kind. Behavior that differs between
//! modules and AGVs comes from the injected [`PairingStrategy`].
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ccu_core::{CcuConfig, EventBus, RecordingPublisher};
//! use ccu_devices::PairingRegistry;
//!
//! let config = CcuConfig::default();
//! let registry = PairingRegistry::for_modules(
//!     &config.pairing,
//!     Arc::new(RecordingPublisher::new()),
//!     Arc::new(EventBus::new()),
//! );
//! ```

use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use ccu_core::action::{Action, InstantActions, FACTSHEET_REQUEST};
use ccu_core::bus::{topics, PublishOptions, SharedPublisher};
use ccu_core::config::PairingSettings;
use ccu_core::{CcuEvent, DeviceKind, ModuleType, SharedEventBus};

use crate::store::{DeviceRecord, DeviceRecordStore};
use crate::strategy::{FtsStrategy, ModuleStrategy, PairingStrategy};
use crate::types::{
    AgvState, Availability, ConnectionEvent, DeviceStatus, Factsheet, PairedDevice,
    CALIBRATION_START_ACTION,
};

/// Pairing and availability registry for one device kind.
pub struct PairingRegistry {
    store: DeviceRecordStore,
    strategy: Arc<dyn PairingStrategy>,
    /// Types that never get a default production duration.
    support_modules: HashSet<ModuleType>,
    publisher: SharedPublisher,
    event_bus: SharedEventBus,
}

impl PairingRegistry {
    /// Create a registry with an explicit strategy.
    pub fn new(
        kind: DeviceKind,
        strategy: Arc<dyn PairingStrategy>,
        support_modules: impl IntoIterator<Item = ModuleType>,
        publisher: SharedPublisher,
        event_bus: SharedEventBus,
    ) -> Self {
        Self {
            store: DeviceRecordStore::new(kind),
            strategy,
            support_modules: support_modules.into_iter().collect(),
            publisher,
            event_bus,
        }
    }

    /// Registry for stationary modules.
    pub fn for_modules(
        settings: &PairingSettings,
        publisher: SharedPublisher,
        event_bus: SharedEventBus,
    ) -> Self {
        let strategy = ModuleStrategy::new(settings.default_durations.clone());
        Self::new(
            DeviceKind::Module,
            Arc::new(strategy),
            settings.support_modules.iter().copied(),
            publisher,
            event_bus,
        )
    }

    /// Registry for AGVs.
    pub fn for_agvs(
        settings: &PairingSettings,
        publisher: SharedPublisher,
        event_bus: SharedEventBus,
    ) -> Self {
        Self::new(
            DeviceKind::Agv,
            Arc::new(FtsStrategy),
            settings.support_modules.iter().copied(),
            publisher,
            event_bus,
        )
    }

    pub fn kind(&self) -> DeviceKind {
        self.store.kind()
    }

    // ========== Telemetry ==========

    /// Apply a connection event.
    ///
    /// Going ONLINE refreshes `last_seen` and requests the factsheet when
    /// none is held yet or the device was not ONLINE before. Going anything
    /// else blocks the device and forgets its ip.
    pub async fn update(&self, event: ConnectionEvent) {
        let serial = event.serial_number.clone();
        let online = event.is_online();
        let now = Utc::now();

        let request_factsheet = self.store.upsert(&serial, |record| {
            let was_online = record.was_online();
            let status = &mut record.status;
            status.connected = online;

            let mut request = false;
            if online {
                status.last_seen = Some(now);
                if event.ip.is_some() {
                    status.ip = event.ip.clone();
                }
                if event.version.is_some() {
                    status.protocol_version = event.version.clone();
                }
                request = record.factsheet.is_none() || !was_online;
            } else {
                status.availability = Availability::Blocked;
                status.ip = None;
            }
            record.connection = Some(event);
            request
        });

        debug!(
            category = "pairing",
            kind = %self.kind(),
            serial = %serial,
            online,
            "Connection update"
        );

        if request_factsheet {
            self.request_factsheet(&serial);
        }
        self.notify_changed(&serial);
    }

    /// Apply a capability sheet.
    pub async fn update_capabilities(&self, factsheet: Factsheet) {
        let serial = factsheet.serial_number.clone();
        let subtype = self.strategy.classify(&factsheet);
        let has_calibration = factsheet.declares_action(CALIBRATION_START_ACTION);
        let default_duration = subtype.and_then(|t| self.default_duration_for(t));

        self.store.upsert(&serial, |record| {
            let status = &mut record.status;
            if subtype.is_some() {
                status.subtype = subtype;
            }
            status.has_calibration = has_calibration;
            if status.production_duration.is_none() {
                status.production_duration = default_duration;
            }
            record.factsheet = Some(factsheet);
        });

        match subtype {
            Some(t) => info!(
                category = "pairing",
                kind = %self.kind(),
                serial = %serial,
                subtype = %t,
                has_calibration,
                "Factsheet received"
            ),
            None => warn!(
                category = "pairing",
                kind = %self.kind(),
                serial = %serial,
                "Factsheet does not identify a known device type"
            ),
        }
        self.notify_changed(&serial);
    }

    /// Apply AGV state telemetry.
    pub async fn update_agv_state(&self, state: AgvState) {
        let serial = state.serial_number.clone();
        self.store.upsert(&serial, |record| {
            let status = &mut record.status;
            if let Some(battery) = &state.battery_state {
                status.charging = battery.charging;
                status.battery_voltage = battery.current_voltage;
                status.battery_percentage = battery.percentage;
            }
            if state.last_node_id.is_some() {
                status.last_node_id = state.last_node_id.clone();
            }
            status.last_load_bay = state
                .loads
                .first()
                .and_then(|load| load.load_position.clone());
        });
    }

    /// Set availability and the bound order.
    ///
    /// A disconnected device stays BLOCKED whatever is requested. Returns
    /// `false` for unknown serial numbers.
    pub async fn update_availability(
        &self,
        serial: &str,
        availability: Availability,
        order_id: Option<&str>,
    ) -> bool {
        let applied = self.store.modify(serial, |record| {
            let status = &mut record.status;
            status.availability = if status.connected {
                availability
            } else {
                Availability::Blocked
            };
            status.assigned = order_id.is_some();
            status.assigned_order_id = order_id.map(str::to_string);
            record.bound_order_id = order_id.map(str::to_string);
        });

        if applied.is_none() {
            warn!(
                category = "pairing",
                kind = %self.kind(),
                serial = %serial,
                "Availability update for unknown device"
            );
            return false;
        }
        self.notify_changed(serial);
        true
    }

    /// Set the calibrating flag. No side effects of its own.
    ///
    /// Returns `true` when the flag changed. Read and write happen under one
    /// store lock. Clearing the flag never creates a record.
    pub fn set_calibrating(&self, serial: &str, calibrating: bool) -> bool {
        let apply = |record: &mut DeviceRecord| {
            let changed = record.status.calibrating != calibrating;
            record.status.calibrating = calibrating;
            changed
        };
        if calibrating {
            self.store.upsert(serial, apply)
        } else {
            self.store.modify(serial, apply).unwrap_or(false)
        }
    }

    /// Remember the last finished action of a device.
    ///
    /// Returns `true` when `action_id` was not the last recorded one.
    pub fn record_finished_action(&self, serial: &str, action_id: &str) -> bool {
        self.store.upsert(serial, |record| {
            if record.last_finished_action_id.as_deref() == Some(action_id) {
                false
            } else {
                record.last_finished_action_id = Some(action_id.to_string());
                true
            }
        })
    }

    // ========== Pairing ==========

    /// Replace the paired set.
    ///
    /// Devices missing from `devices` are un-paired but keep their history.
    /// Devices already paired keep their `paired_since`.
    pub async fn set_paired_devices(&self, devices: &[PairedDevice]) {
        let now = Utc::now();
        let wanted: HashSet<&str> = devices.iter().map(|d| d.serial_number.as_str()).collect();

        self.store.modify_all(|record| {
            if !wanted.contains(record.status.serial_number.as_str()) {
                record.status.paired_since = None;
            }
        });

        for device in devices {
            let default_duration = self.default_duration_for(device.device_type);
            self.store.upsert(&device.serial_number, |record| {
                let status = &mut record.status;
                if status.subtype.is_none() {
                    status.subtype = Some(device.device_type);
                }
                if status.production_duration.is_none() {
                    status.production_duration = default_duration;
                }
                if status.paired_since.is_none() {
                    status.paired_since = Some(now);
                }
            });
        }

        info!(
            category = "pairing",
            kind = %self.kind(),
            count = devices.len(),
            "Paired devices updated"
        );
        self.event_bus.publish(CcuEvent::pairing_reset(self.kind()));
    }

    /// Delete a device completely.
    pub async fn remove_device(&self, serial: &str) -> bool {
        let removed = self.store.remove(serial).is_some();
        if removed {
            info!(category = "pairing", kind = %self.kind(), serial = %serial, "Device removed");
        }
        self.notify_changed(serial);
        removed
    }

    // ========== Order assignment ==========

    /// Find a device of `subtype` that can take `order_id`.
    ///
    /// A device already bound to `order_id` is returned immediately. Among
    /// the free ones the **last** in enumeration order wins.
    pub fn get_ready_for_type(&self, subtype: ModuleType, order_id: &str) -> Option<String> {
        self.store.scan(|records| {
            let mut last_free = None;
            for record in records {
                let status = &record.status;
                let candidate = status.is_paired()
                    && status.connected
                    && status.subtype == Some(subtype)
                    && status.availability == Availability::Ready;
                if !candidate {
                    continue;
                }
                match record.bound_order_id.as_deref() {
                    Some(bound) if bound == order_id => {
                        return Some(status.serial_number.clone());
                    }
                    Some(_) => continue,
                    None => last_free = Some(status.serial_number.clone()),
                }
            }
            last_free
        })
    }

    /// Whether `serial` is ready and free for (or already bound to) `order_id`.
    pub fn is_ready_for_order(&self, serial: &str, order_id: &str) -> bool {
        self.store
            .get(serial)
            .map(|record| {
                self.strategy.is_ready(&record.status)
                    && record
                        .bound_order_id
                        .as_deref()
                        .map_or(true, |bound| bound == order_id)
            })
            .unwrap_or(false)
    }

    /// Release every device bound to `order_id`.
    pub async fn clear_order_binding(&self, order_id: &str) -> usize {
        let mut released = Vec::new();
        self.store.modify_all(|record| {
            if record.bound_order_id.as_deref() != Some(order_id) {
                return;
            }
            record.bound_order_id = None;
            let status = &mut record.status;
            status.assigned = false;
            status.assigned_order_id = None;
            status.availability = if status.connected {
                Availability::Ready
            } else {
                Availability::Blocked
            };
            released.push(status.serial_number.clone());
        });

        for serial in &released {
            debug!(category = "pairing", serial = %serial, order_id = %order_id, "Order binding cleared");
            self.notify_changed(serial);
        }
        released.len()
    }

    // ========== Queries ==========

    pub fn record(&self, serial: &str) -> Option<DeviceRecord> {
        self.store.get(serial)
    }

    pub fn status(&self, serial: &str) -> Option<DeviceStatus> {
        self.store.get(serial).map(|r| r.status)
    }

    /// All statuses in enumeration order.
    pub fn statuses(&self) -> Vec<DeviceStatus> {
        self.store.records().into_iter().map(|r| r.status).collect()
    }

    /// Statuses of paired devices only.
    pub fn paired_statuses(&self) -> Vec<DeviceStatus> {
        self.statuses().into_iter().filter(DeviceStatus::is_paired).collect()
    }

    /// Serial numbers of paired devices whose subtype is one of `types`.
    pub fn paired_serials_of_types(&self, types: &[ModuleType]) -> Vec<String> {
        self.store.scan(|records| {
            records
                .filter(|r| r.status.is_paired())
                .filter(|r| r.status.subtype.map_or(false, |t| types.contains(&t)))
                .map(|r| r.status.serial_number.clone())
                .collect()
        })
    }

    pub fn is_calibrating(&self, serial: &str) -> bool {
        self.store
            .get(serial)
            .map(|r| r.status.calibrating)
            .unwrap_or(false)
    }

    /// Whether a status counts as ready for this registry's device kind.
    pub fn is_ready(&self, status: &DeviceStatus) -> bool {
        self.strategy.is_ready(status)
    }

    /// Default durations currently assigned, by serial number.
    pub fn production_durations(&self) -> HashMap<String, u64> {
        self.store.scan(|records| {
            records
                .filter_map(|r| {
                    r.status
                        .production_duration
                        .map(|d| (r.status.serial_number.clone(), d))
                })
                .collect()
        })
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    // ========== Internals ==========

    /// Ask subscribers to republish the aggregate pairing state.
    pub fn notify_changed(&self, serial: &str) {
        self.event_bus
            .publish(CcuEvent::pairing_changed(self.kind(), serial));
    }

    fn default_duration_for(&self, subtype: ModuleType) -> Option<u64> {
        if !subtype.is_production()
            || subtype.is_quality_inspection()
            || self.support_modules.contains(&subtype)
        {
            return None;
        }
        self.strategy.default_production_duration(subtype)
    }

    /// Fire-and-forget factsheet request. A failure is retried by the next
    /// reconnect, not here.
    fn request_factsheet(&self, serial: &str) {
        let message = InstantActions::single(serial, Action::new(FACTSHEET_REQUEST));
        let topic = topics::instant_action(self.kind().topic_prefix(), serial);
        let publisher = self.publisher.clone();
        let serial = serial.to_string();

        tokio::spawn(async move {
            let result = match message.to_json() {
                Ok(body) => publisher.publish(&topic, &body, PublishOptions::command()).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(()) => debug!(category = "pairing", serial = %serial, "Factsheet requested"),
                Err(e) => warn!(
                    category = "pairing",
                    serial = %serial,
                    error = %e,
                    "Factsheet request failed"
                ),
            }
        });
    }
}
