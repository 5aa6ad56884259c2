//! MQTT transport.
//!
//! [`MqttBus`] is the production [`MessagePublisher`]; [`run_event_loop`]
//! drives the rumqttc connection and queues every inbound publish, in
//! arrival order, for the [`Router`](crate::router::Router) worker.

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use ccu_core::bus::{topics, MessagePublisher, PublishOptions, QoS};
use ccu_core::config::MqttSettings;
use ccu_core::{bus_err, Result};

use crate::router::Inbound;

/// Request channel capacity between the client handle and the event loop.
const REQUEST_CAPACITY: usize = 64;
/// Inbound payload limit (factsheets can be large).
const MAX_PACKET_SIZE: usize = 1024 * 1024;

fn to_rumqttc(qos: QoS) -> rumqttc::QoS {
    match qos {
        QoS::AtMostOnce => rumqttc::QoS::AtMostOnce,
        QoS::AtLeastOnce => rumqttc::QoS::AtLeastOnce,
        QoS::ExactlyOnce => rumqttc::QoS::ExactlyOnce,
    }
}

/// Publisher backed by an MQTT broker connection.
#[derive(Clone)]
pub struct MqttBus {
    client: AsyncClient,
}

impl MqttBus {
    /// Build the client. Nothing is sent until the event loop is polled.
    pub fn connect(settings: &MqttSettings) -> (Self, EventLoop) {
        let mut options = MqttOptions::new(&settings.client_id, &settings.host, settings.port);
        options.set_keep_alive(Duration::from_secs(settings.keep_alive_secs));
        options.set_max_packet_size(MAX_PACKET_SIZE, MAX_PACKET_SIZE);
        if let (Some(user), Some(pass)) = (&settings.username, &settings.password) {
            options.set_credentials(user, pass);
        }

        let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        info!(
            category = "bus",
            host = %settings.host,
            port = settings.port,
            client_id = %settings.client_id,
            "MQTT client created"
        );
        (Self { client }, eventloop)
    }

    async fn subscribe_all(client: AsyncClient) {
        for topic in topics::subscriptions() {
            if let Err(e) = client.subscribe(&topic, rumqttc::QoS::AtLeastOnce).await {
                warn!(category = "bus", topic = %topic, error = %e, "Subscribe failed");
            }
        }
        debug!(category = "bus", "Subscriptions requested");
    }

    /// Ask the broker to close the session.
    pub async fn disconnect(&self) {
        if let Err(e) = self.client.disconnect().await {
            debug!(category = "bus", error = %e, "Disconnect request failed");
        }
    }
}

#[async_trait]
impl MessagePublisher for MqttBus {
    async fn publish(
        &self,
        topic: &str,
        body: &serde_json::Value,
        options: PublishOptions,
    ) -> Result<()> {
        let payload = serde_json::to_vec(body)?;
        self.client
            .publish(topic, to_rumqttc(options.qos), options.retain, payload)
            .await
            .map_err(|e| bus_err!("publish to {} failed: {}", topic, e))
    }
}

/// Poll the connection until the process stops or the dispatch worker
/// goes away.
///
/// rumqttc reconnects on the next poll after an error; subscriptions are
/// renewed on every CONNACK since the session is not persisted.
pub async fn run_event_loop(
    mut eventloop: EventLoop,
    bus: MqttBus,
    inbound: mpsc::UnboundedSender<Inbound>,
) {
    let mut consecutive_errors: u32 = 0;

    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                consecutive_errors = 0;
                info!(category = "bus", "Connected to broker");
                // Subscribing from inside the poll loop would stall on a full request channel
                tokio::spawn(MqttBus::subscribe_all(bus.client.clone()));
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let message = Inbound::new(publish.topic, publish.payload.to_vec());
                if inbound.send(message).is_err() {
                    warn!(category = "bus", "Dispatch worker gone, leaving event loop");
                    return;
                }
            }
            Ok(_) => {}
            Err(e) => {
                consecutive_errors = consecutive_errors.saturating_add(1);
                warn!(
                    category = "bus",
                    error = %e,
                    attempt = consecutive_errors,
                    "MQTT connection error"
                );
                let backoff = Duration::from_secs(u64::from(consecutive_errors.min(10)));
                tokio::time::sleep(backoff).await;
            }
        }
    }
}
