//! Traffic light derivation and publishing.

use ccu_core::bus::topics;
use ccu_core::config::PairingSettings;
use ccu_core::{EventBus, ModuleType, RecordingPublisher};
use ccu_devices::{
    AgvState, Availability, BatteryState, ConnectionEvent, ConnectionState, PairedDevice,
    PairingRegistry, PairingStatePublisher, TrafficLight,
};
use std::sync::Arc;
use std::time::Duration;

struct Factory {
    modules: Arc<PairingRegistry>,
    agvs: Arc<PairingRegistry>,
    recorder: Arc<RecordingPublisher>,
    bus: Arc<EventBus>,
    state: Arc<PairingStatePublisher>,
}

fn factory() -> Factory {
    let recorder = Arc::new(RecordingPublisher::new());
    let bus = Arc::new(EventBus::new());
    let settings = PairingSettings::default();
    let modules = Arc::new(PairingRegistry::for_modules(
        &settings,
        recorder.clone(),
        bus.clone(),
    ));
    let agvs = Arc::new(PairingRegistry::for_agvs(
        &settings,
        recorder.clone(),
        bus.clone(),
    ));
    let state = Arc::new(PairingStatePublisher::new(
        modules.clone(),
        agvs.clone(),
        recorder.clone(),
    ));
    Factory {
        modules,
        agvs,
        recorder,
        bus,
        state,
    }
}

async fn bring_up(registry: &PairingRegistry, serial: &str) {
    registry
        .update(ConnectionEvent::new(serial, ConnectionState::Online))
        .await;
    registry
        .update_availability(serial, Availability::Ready, None)
        .await;
}

#[tokio::test]
async fn test_nothing_paired_is_red() {
    let f = factory();
    // Connected but unpaired devices do not count
    bring_up(&f.modules, "MILL-1").await;
    assert_eq!(f.state.traffic_light(), TrafficLight::Red);
}

#[tokio::test]
async fn test_traffic_light_progression() {
    let f = factory();
    f.modules
        .set_paired_devices(&[
            PairedDevice::new("HBW-1", ModuleType::Hbw),
            PairedDevice::new("MILL-1", ModuleType::Mill),
        ])
        .await;
    f.agvs
        .set_paired_devices(&[PairedDevice::new("5iO4", ModuleType::Fts)])
        .await;
    assert_eq!(f.state.traffic_light(), TrafficLight::Red);

    f.modules
        .update(ConnectionEvent::new("HBW-1", ConnectionState::Online))
        .await;
    f.modules
        .update(ConnectionEvent::new("MILL-1", ConnectionState::Online))
        .await;
    f.agvs
        .update(ConnectionEvent::new("5iO4", ConnectionState::Online))
        .await;
    // Connected but still BLOCKED
    assert_eq!(f.state.traffic_light(), TrafficLight::Yellow);

    bring_up(&f.modules, "HBW-1").await;
    bring_up(&f.modules, "MILL-1").await;
    bring_up(&f.agvs, "5iO4").await;
    assert_eq!(f.state.traffic_light(), TrafficLight::Green);

    // A charging AGV is not ready
    f.agvs
        .update_agv_state(AgvState {
            serial_number: "5iO4".to_string(),
            battery_state: Some(BatteryState {
                charging: true,
                ..Default::default()
            }),
            last_node_id: None,
            loads: Vec::new(),
        })
        .await;
    assert_eq!(f.state.traffic_light(), TrafficLight::Yellow);

    f.modules
        .update(ConnectionEvent::new("MILL-1", ConnectionState::ConnectionBroken))
        .await;
    assert_eq!(f.state.traffic_light(), TrafficLight::Red);
}

#[tokio::test]
async fn test_calibrating_module_turns_yellow() {
    let f = factory();
    f.modules
        .set_paired_devices(&[PairedDevice::new("HBW-1", ModuleType::Hbw)])
        .await;
    bring_up(&f.modules, "HBW-1").await;
    assert_eq!(f.state.traffic_light(), TrafficLight::Green);

    f.modules.set_calibrating("HBW-1", true);
    assert_eq!(f.state.traffic_light(), TrafficLight::Yellow);
}

#[tokio::test]
async fn test_publish_now_is_retained() {
    let f = factory();
    f.modules
        .set_paired_devices(&[PairedDevice::new("DPS-1", ModuleType::Dps)])
        .await;
    f.state.publish_now().await.unwrap();

    let messages = f.recorder.messages_on(topics::PAIRING_STATE);
    assert_eq!(messages.len(), 1);
    assert!(messages[0].options.retain);
    assert_eq!(messages[0].body["trafficLight"], "RED");
    assert_eq!(messages[0].body["modules"][0]["serialNumber"], "DPS-1");
    assert!(messages[0].body["transports"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_run_republishes_on_pairing_events() {
    let f = factory();
    let handle = tokio::spawn(f.state.clone().run(f.bus.pairing_events()));
    f.modules
        .set_paired_devices(&[PairedDevice::new("HBW-1", ModuleType::Hbw)])
        .await;
    assert!(
        f.recorder
            .wait_for(topics::PAIRING_STATE, 1, Duration::from_secs(1))
            .await
    );

    bring_up(&f.modules, "HBW-1").await;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
    loop {
        let last = f.recorder.messages_on(topics::PAIRING_STATE).pop().unwrap();
        if last.body["trafficLight"] == "GREEN" {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "never turned green");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    handle.abort();
}

#[tokio::test]
async fn test_publish_failure_is_reported() {
    let f = factory();
    f.recorder.fail_topics("ccu/pairing");
    assert!(f.state.publish_now().await.is_err());
}
