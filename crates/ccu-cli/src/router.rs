//! Inbound message routing.
//!
//! Every message is parsed at the boundary. Payloads that do not parse are
//! logged and dropped without touching any state.
//!
//! Messages are applied strictly in arrival order by a single worker
//! ([`Router::spawn_worker`]); the pairing model relies on the latest
//! connection event per device being the one applied last.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use ccu_calibration::{CalibrationCoordinator, CalibrationRequest, ModuleState};
use ccu_core::bus::topics::{self, DeviceChannel};
use ccu_core::DeviceKind;
use ccu_devices::{AgvState, ConnectionEvent, Factsheet, PairingRegistry};
use ccu_topology::{Layout, ReservationRequest, Topology};

/// Release request from an external router (`ccu/set/release`).
///
/// Without `nodeId` everything the owner holds is released. With `nodeId`
/// and `preceding` the chain behind the node is released, otherwise only the
/// node itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseRequest {
    pub owner_id: String,
    #[serde(default)]
    pub node_id: Option<String>,
    #[serde(default)]
    pub preceding: bool,
}

/// A message received from the broker, waiting for dispatch.
#[derive(Debug, Clone)]
pub struct Inbound {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl Inbound {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Dispatches inbound messages to the CCU components.
pub struct Router {
    modules: Arc<PairingRegistry>,
    agvs: Arc<PairingRegistry>,
    topology: Arc<Topology>,
    calibration: Arc<CalibrationCoordinator>,
}

impl Router {
    pub fn new(
        modules: Arc<PairingRegistry>,
        agvs: Arc<PairingRegistry>,
        topology: Arc<Topology>,
        calibration: Arc<CalibrationCoordinator>,
    ) -> Self {
        Self {
            modules,
            agvs,
            topology,
            calibration,
        }
    }

    /// Start the dispatch worker.
    ///
    /// Messages sent to the returned queue are dispatched one at a time in
    /// the order they were sent. The worker stops once every sender is
    /// dropped and the queue is drained. The queue is unbounded so the MQTT
    /// poll loop never waits on dispatch.
    pub fn spawn_worker(self: Arc<Self>) -> (mpsc::UnboundedSender<Inbound>, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<Inbound>();
        let handle = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                self.dispatch(&message.topic, &message.payload).await;
            }
            debug!(category = "bus", "Dispatch worker stopped");
        });
        (tx, handle)
    }

    fn registry(&self, kind: DeviceKind) -> &PairingRegistry {
        match kind {
            DeviceKind::Module => &self.modules,
            DeviceKind::Agv => &self.agvs,
        }
    }

    /// Route one inbound message.
    pub async fn dispatch(&self, topic: &str, payload: &[u8]) {
        if let Some((kind, serial, channel)) = topics::parse_device_topic(topic) {
            self.dispatch_device(kind, &serial, channel, topic, payload)
                .await;
            return;
        }

        match topic {
            topics::SET_PARK => {
                self.calibration.handle_park_request().await;
            }
            topics::SET_CALIBRATION => {
                if let Some(request) = parse::<CalibrationRequest>(topic, payload) {
                    // Send failures are logged by the coordinator
                    let _ = self.calibration.handle_calibration_request(request).await;
                }
            }
            topics::SET_LAYOUT => {
                if let Some(layout) = parse::<Layout>(topic, payload) {
                    if let Err(e) = self.topology.set_layout(layout) {
                        warn!(category = "topology", error = %e, "Layout rejected");
                    }
                }
            }
            topics::SET_RESERVE => {
                if let Some(requests) = parse::<Vec<ReservationRequest>>(topic, payload) {
                    if let Err(e) = self.topology.graph().reserve_sequence(&requests) {
                        info!(category = "topology", error = %e, "Reservation refused");
                    }
                }
            }
            topics::SET_RELEASE => {
                if let Some(request) = parse::<ReleaseRequest>(topic, payload) {
                    self.release(request);
                }
            }
            _ => debug!(category = "bus", topic = %topic, "Ignoring message"),
        }
    }

    async fn dispatch_device(
        &self,
        kind: DeviceKind,
        serial: &str,
        channel: DeviceChannel,
        topic: &str,
        payload: &[u8],
    ) {
        let registry = self.registry(kind);
        match channel {
            DeviceChannel::Connection => {
                if let Some(event) = parse::<ConnectionEvent>(topic, payload) {
                    if same_device(topic, serial, &event.serial_number) {
                        registry.update(event).await;
                    }
                }
            }
            DeviceChannel::Factsheet => {
                if let Some(sheet) = parse::<Factsheet>(topic, payload) {
                    if same_device(topic, serial, &sheet.serial_number) {
                        registry.update_capabilities(sheet).await;
                    }
                }
            }
            DeviceChannel::State => match kind {
                DeviceKind::Module => {
                    if let Some(state) = parse::<ModuleState>(topic, payload) {
                        if same_device(topic, serial, &state.serial_number) {
                            self.calibration.handle_module_state(&state).await;
                        }
                    }
                }
                DeviceKind::Agv => {
                    if let Some(state) = parse::<AgvState>(topic, payload) {
                        if same_device(topic, serial, &state.serial_number) {
                            registry.update_agv_state(state).await;
                        }
                    }
                }
            },
        }
        debug!(category = "bus", kind = %kind, serial = %serial, ?channel, "Device message handled");
    }

    fn release(&self, request: ReleaseRequest) {
        let graph = self.topology.graph();
        match (&request.node_id, request.preceding) {
            (None, _) => {
                graph.release_all(&request.owner_id);
            }
            (Some(node_id), true) => {
                graph.release_preceding(&request.owner_id, node_id);
            }
            (Some(node_id), false) => {
                graph.release(&request.owner_id, node_id);
            }
        }
    }
}

/// Payloads must describe the device their topic names.
fn same_device(topic: &str, topic_serial: &str, payload_serial: &str) -> bool {
    if topic_serial == payload_serial {
        return true;
    }
    warn!(
        category = "bus",
        topic = %topic,
        payload_serial = %payload_serial,
        "Dropping message for a different device"
    );
    false
}

fn parse<T: DeserializeOwned>(topic: &str, payload: &[u8]) -> Option<T> {
    match serde_json::from_slice(payload) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(category = "bus", topic = %topic, error = %e, "Dropping malformed message");
            None
        }
    }
}
