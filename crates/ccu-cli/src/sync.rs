//! Keeps the paired module set and the retained layout view in step with
//! the active layout.

use std::sync::Arc;
use tracing::{info, warn};

use ccu_core::bus::{topics, PublishOptions, SharedPublisher};
use ccu_core::{CcuEvent, FilteredReceiver, Result};
use ccu_devices::{PairedDevice, PairingRegistry};
use ccu_topology::Topology;

pub struct LayoutSync {
    topology: Arc<Topology>,
    modules: Arc<PairingRegistry>,
    publisher: SharedPublisher,
}

impl LayoutSync {
    pub fn new(
        topology: Arc<Topology>,
        modules: Arc<PairingRegistry>,
        publisher: SharedPublisher,
    ) -> Self {
        Self {
            topology,
            modules,
            publisher,
        }
    }

    /// Pair the layout's modules and publish the layout.
    pub async fn apply(&self) -> Result<()> {
        let layout = self.topology.layout();
        let paired: Vec<PairedDevice> = layout
            .modules
            .iter()
            .map(|m| PairedDevice::new(m.serial_number.clone(), m.module_type))
            .collect();
        self.modules.set_paired_devices(&paired).await;

        let body = serde_json::to_value(&layout)?;
        self.publisher
            .publish(topics::LAYOUT_STATE, &body, PublishOptions::retained())
            .await?;
        info!(category = "topology", modules = paired.len(), "Layout applied");
        Ok(())
    }

    /// Re-apply on every layout event until the event bus closes.
    pub async fn run<F>(self: Arc<Self>, mut events: FilteredReceiver<F>)
    where
        F: Fn(&CcuEvent) -> bool + Send,
    {
        while events.recv().await.is_some() {
            events.drain_count();
            if let Err(e) = self.apply().await {
                warn!(category = "topology", error = %e, "Failed to apply layout");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ccu_core::config::PairingSettings;
    use ccu_core::{EventBus, ModuleType, RecordingPublisher};
    use ccu_topology::{Direction, JsonFileLayoutStore, Layout, TopologyGraph};
    use std::time::Duration;

    fn layout(serials: &[(&str, ModuleType)]) -> Layout {
        serials.iter().fold(
            Layout::default().add_intersection("1"),
            |layout, (serial, module_type)| {
                layout
                    .add_module(*module_type, *serial)
                    .add_road(*serial, "1", 380.0, Direction::North)
            },
        )
    }

    #[tokio::test]
    async fn test_layout_event_pairs_modules_and_publishes() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = Arc::new(RecordingPublisher::new());
        let bus = Arc::new(EventBus::new());
        let modules = Arc::new(PairingRegistry::for_modules(
            &PairingSettings::default(),
            recorder.clone(),
            bus.clone(),
        ));
        let topology = Arc::new(Topology::new(
            Arc::new(TopologyGraph::new()),
            Arc::new(JsonFileLayoutStore::new(dir.path().join("layout.json"))),
            bus.clone(),
        ));
        let sync = Arc::new(LayoutSync::new(
            topology.clone(),
            modules.clone(),
            recorder.clone(),
        ));
        let handle = tokio::spawn(sync.run(bus.layout_events()));

        topology
            .set_layout(layout(&[("HBW-1", ModuleType::Hbw), ("MILL-1", ModuleType::Mill)]))
            .unwrap();
        assert!(recorder
            .wait_for(topics::LAYOUT_STATE, 1, Duration::from_secs(2))
            .await);
        assert_eq!(modules.paired_statuses().len(), 2);
        let published = recorder.messages_on(topics::LAYOUT_STATE);
        assert!(published[0].options.retain);
        assert_eq!(published[0].body["modules"][0]["serialNumber"], "HBW-1");

        // MILL-1 leaves the layout and is un-paired
        topology
            .set_layout(layout(&[("HBW-1", ModuleType::Hbw)]))
            .unwrap();
        assert!(recorder
            .wait_for(topics::LAYOUT_STATE, 2, Duration::from_secs(2))
            .await);
        let paired: Vec<String> = modules
            .paired_statuses()
            .into_iter()
            .map(|s| s.serial_number)
            .collect();
        assert_eq!(paired, vec!["HBW-1"]);
        assert!(modules.status("MILL-1").is_some());

        handle.abort();
    }
}
