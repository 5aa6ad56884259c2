//! Message bus seam.
//!
//! The CCU core never talks to a broker directly. Everything it sends goes
//! through [`MessagePublisher`]; the binary plugs in the MQTT transport and
//! tests plug in [`RecordingPublisher`].

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

use crate::bus_err;
use crate::error::Result;

/// Delivery guarantee requested for a publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum QoS {
    AtMostOnce,
    #[default]
    AtLeastOnce,
    ExactlyOnce,
}

/// Options for a single publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PublishOptions {
    pub qos: QoS,
    pub retain: bool,
}

impl PublishOptions {
    /// QoS 1, not retained. Used for commands.
    pub fn command() -> Self {
        Self {
            qos: QoS::AtLeastOnce,
            retain: false,
        }
    }

    /// QoS 1, retained. Used for state views late subscribers must see.
    pub fn retained() -> Self {
        Self {
            qos: QoS::AtLeastOnce,
            retain: true,
        }
    }
}

/// Publish side of the message bus.
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    /// Publish a JSON body on a topic.
    async fn publish(
        &self,
        topic: &str,
        body: &serde_json::Value,
        options: PublishOptions,
    ) -> Result<()>;
}

/// Shared publisher handle.
pub type SharedPublisher = Arc<dyn MessagePublisher>;

/// Topic scheme of the factory bus.
pub mod topics {
    /// Prefix of module topics.
    pub const MODULE_PREFIX: &str = "module/v1/ff";
    /// Prefix of AGV topics.
    pub const FTS_PREFIX: &str = "fts/v1/ff";

    /// Aggregate pairing state (retained).
    pub const PAIRING_STATE: &str = "ccu/pairing/state";
    /// Current layout (retained).
    pub const LAYOUT_STATE: &str = "ccu/state/layout";
    /// Prefix of per-module calibration views.
    pub const CALIBRATION_STATE_PREFIX: &str = "ccu/state/calibration";

    /// Park request.
    pub const SET_PARK: &str = "ccu/set/park";
    /// Calibration command request.
    pub const SET_CALIBRATION: &str = "ccu/set/calibration";
    /// Layout replacement request.
    pub const SET_LAYOUT: &str = "ccu/set/layout";
    /// Node reservation request from an external router.
    pub const SET_RESERVE: &str = "ccu/set/reserve";
    /// Node release request from an external router.
    pub const SET_RELEASE: &str = "ccu/set/release";

    /// Instant action topic of a device.
    pub fn instant_action(prefix: &str, serial: &str) -> String {
        format!("{}/{}/instantAction", prefix, serial)
    }

    /// Calibration view topic of a module.
    pub fn calibration_state(serial: &str) -> String {
        format!("{}/{}", CALIBRATION_STATE_PREFIX, serial)
    }

    /// Channel of a device topic (`connection`, `state`, `factsheet`, ...).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum DeviceChannel {
        Connection,
        State,
        Factsheet,
    }

    /// Split `<prefix>/<serial>/<channel>` into its parts.
    ///
    /// Returns `None` for topics outside the device scheme or for channels
    /// the CCU does not consume.
    pub fn parse_device_topic(topic: &str) -> Option<(crate::DeviceKind, String, DeviceChannel)> {
        let (kind, rest) = if let Some(rest) = topic.strip_prefix(MODULE_PREFIX) {
            (crate::DeviceKind::Module, rest)
        } else if let Some(rest) = topic.strip_prefix(FTS_PREFIX) {
            (crate::DeviceKind::Agv, rest)
        } else {
            return None;
        };

        let mut parts = rest.trim_start_matches('/').splitn(2, '/');
        let serial = parts.next().filter(|s| !s.is_empty())?;
        let channel = match parts.next()? {
            "connection" => DeviceChannel::Connection,
            "state" => DeviceChannel::State,
            "factsheet" => DeviceChannel::Factsheet,
            _ => return None,
        };
        Some((kind, serial.to_string(), channel))
    }

    /// Subscriptions the CCU needs.
    pub fn subscriptions() -> Vec<String> {
        vec![
            format!("{}/+/connection", MODULE_PREFIX),
            format!("{}/+/state", MODULE_PREFIX),
            format!("{}/+/factsheet", MODULE_PREFIX),
            format!("{}/+/connection", FTS_PREFIX),
            format!("{}/+/state", FTS_PREFIX),
            format!("{}/+/factsheet", FTS_PREFIX),
            SET_PARK.to_string(),
            SET_CALIBRATION.to_string(),
            SET_LAYOUT.to_string(),
            SET_RESERVE.to_string(),
            SET_RELEASE.to_string(),
        ]
    }
}

/// A message captured by [`RecordingPublisher`].
#[derive(Debug, Clone)]
pub struct PublishedMessage {
    pub topic: String,
    pub body: serde_json::Value,
    pub options: PublishOptions,
}

/// In-memory publisher that records every publish.
///
/// Topics matching a configured failing prefix are rejected with a bus
/// error and not recorded, which lets callers exercise their failure paths.
#[derive(Default)]
pub struct RecordingPublisher {
    messages: Mutex<Vec<PublishedMessage>>,
    failing_prefixes: Mutex<HashSet<String>>,
    notify: Notify,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject publishes to topics starting with `prefix`.
    pub fn fail_topics(&self, prefix: impl Into<String>) {
        self.failing_prefixes.lock().insert(prefix.into());
    }

    /// Accept every topic again.
    pub fn heal(&self) {
        self.failing_prefixes.lock().clear();
    }

    /// Snapshot of all recorded messages.
    pub fn messages(&self) -> Vec<PublishedMessage> {
        self.messages.lock().clone()
    }

    /// Recorded messages on exactly `topic`.
    pub fn messages_on(&self, topic: &str) -> Vec<PublishedMessage> {
        self.messages
            .lock()
            .iter()
            .filter(|m| m.topic == topic)
            .cloned()
            .collect()
    }

    /// Forget everything recorded so far.
    pub fn clear(&self) {
        self.messages.lock().clear();
    }

    /// Wait until at least `count` messages were published on `topic`.
    ///
    /// Returns `false` if the timeout elapsed first.
    pub async fn wait_for(&self, topic: &str, count: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            if self.messages_on(topic).len() >= count {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.messages_on(topic).len() >= count;
            }
        }
    }
}

#[async_trait]
impl MessagePublisher for RecordingPublisher {
    async fn publish(
        &self,
        topic: &str,
        body: &serde_json::Value,
        options: PublishOptions,
    ) -> Result<()> {
        let failing = self
            .failing_prefixes
            .lock()
            .iter()
            .any(|prefix| topic.starts_with(prefix.as_str()));
        if failing {
            return Err(bus_err!("publish to {} rejected", topic));
        }

        tracing::trace!(category = "bus", topic = %topic, "Recorded publish");
        self.messages.lock().push(PublishedMessage {
            topic: topic.to_string(),
            body: body.clone(),
            options,
        });
        self.notify.notify_waiters();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::topics::*;
    use super::*;
    use crate::DeviceKind;

    #[test]
    fn test_parse_device_topic() {
        let parsed = parse_device_topic("module/v1/ff/SVR3QA0022/connection").unwrap();
        assert_eq!(parsed.0, DeviceKind::Module);
        assert_eq!(parsed.1, "SVR3QA0022");
        assert_eq!(parsed.2, DeviceChannel::Connection);

        let parsed = parse_device_topic("fts/v1/ff/5iO4/state").unwrap();
        assert_eq!(parsed.0, DeviceKind::Agv);
        assert_eq!(parsed.2, DeviceChannel::State);

        assert!(parse_device_topic("module/v1/ff/X/order").is_none());
        assert!(parse_device_topic("module/v1/ff//state").is_none());
        assert!(parse_device_topic("ccu/set/park").is_none());
    }

    #[test]
    fn test_topic_builders() {
        assert_eq!(
            instant_action(MODULE_PREFIX, "HBW-1"),
            "module/v1/ff/HBW-1/instantAction"
        );
        assert_eq!(calibration_state("DPS-1"), "ccu/state/calibration/DPS-1");
    }

    #[tokio::test]
    async fn test_recording_publisher_failure_injection() {
        let publisher = RecordingPublisher::new();
        publisher.fail_topics("module/");

        let body = serde_json::json!({"a": 1});
        assert!(publisher
            .publish("module/v1/ff/A/instantAction", &body, PublishOptions::command())
            .await
            .is_err());
        assert!(publisher
            .publish(PAIRING_STATE, &body, PublishOptions::retained())
            .await
            .is_ok());
        assert_eq!(publisher.messages().len(), 1);

        publisher.heal();
        assert!(publisher
            .publish("module/v1/ff/A/instantAction", &body, PublishOptions::command())
            .await
            .is_ok());
        assert!(
            publisher
                .wait_for("module/v1/ff/A/instantAction", 1, Duration::from_millis(10))
                .await
        );
    }
}
