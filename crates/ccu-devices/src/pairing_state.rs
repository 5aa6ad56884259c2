//! Aggregate pairing state ("traffic light") published for observers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use ccu_core::bus::{topics, PublishOptions, SharedPublisher};
use ccu_core::eventbus::FilteredReceiver;
use ccu_core::{CcuEvent, Result};

use crate::registry::PairingRegistry;
use crate::types::DeviceStatus;

/// Overall factory readiness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TrafficLight {
    /// Nothing paired, or a paired device is disconnected.
    Red,
    /// Everything connected, something not ready.
    Yellow,
    /// Every paired device is ready.
    Green,
}

/// Body of the pairing-state message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingState {
    pub modules: Vec<DeviceStatus>,
    pub transports: Vec<DeviceStatus>,
    pub traffic_light: TrafficLight,
    pub timestamp: DateTime<Utc>,
}

/// Publishes [`PairingState`] whenever a registry reports a change.
pub struct PairingStatePublisher {
    modules: Arc<PairingRegistry>,
    agvs: Arc<PairingRegistry>,
    publisher: SharedPublisher,
}

impl PairingStatePublisher {
    pub fn new(
        modules: Arc<PairingRegistry>,
        agvs: Arc<PairingRegistry>,
        publisher: SharedPublisher,
    ) -> Self {
        Self {
            modules,
            agvs,
            publisher,
        }
    }

    /// Derive the traffic light from both registries.
    pub fn traffic_light(&self) -> TrafficLight {
        let paired: Vec<(&PairingRegistry, DeviceStatus)> = self
            .modules
            .paired_statuses()
            .into_iter()
            .map(|s| (self.modules.as_ref(), s))
            .chain(
                self.agvs
                    .paired_statuses()
                    .into_iter()
                    .map(|s| (self.agvs.as_ref(), s)),
            )
            .collect();

        if paired.is_empty() || paired.iter().any(|(_, s)| !s.connected) {
            TrafficLight::Red
        } else if paired.iter().any(|(registry, s)| !registry.is_ready(s)) {
            TrafficLight::Yellow
        } else {
            TrafficLight::Green
        }
    }

    pub fn snapshot(&self) -> PairingState {
        PairingState {
            modules: self.modules.statuses(),
            transports: self.agvs.statuses(),
            traffic_light: self.traffic_light(),
            timestamp: Utc::now(),
        }
    }

    /// Publish the current state (retained).
    pub async fn publish_now(&self) -> Result<()> {
        let state = self.snapshot();
        let body = serde_json::to_value(&state)?;
        self.publisher
            .publish(topics::PAIRING_STATE, &body, PublishOptions::retained())
            .await?;
        debug!(
            category = "pairing",
            traffic_light = ?state.traffic_light,
            "Pairing state published"
        );
        Ok(())
    }

    /// Republish on every pairing event until the event bus closes.
    pub async fn run<F>(self: Arc<Self>, mut events: FilteredReceiver<F>)
    where
        F: Fn(&CcuEvent) -> bool + Send,
    {
        info!(category = "pairing", "Pairing state publisher started");
        while events.recv().await.is_some() {
            // Collapse bursts into one publish
            events.drain_count();
            if let Err(e) = self.publish_now().await {
                warn!(category = "pairing", error = %e, "Failed to publish pairing state");
            }
        }
        info!(category = "pairing", "Pairing state publisher stopped");
    }
}
