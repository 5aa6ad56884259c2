//! Topology service: ties the graph to layout persistence and announces
//! layout changes on the event bus.

use ccu_core::{CcuEvent, Error, Result, SharedEventBus};
use std::sync::Arc;
use tracing::{info, warn};

use crate::layout::Layout;
use crate::storage::LayoutStore;
use crate::topology::TopologyGraph;

pub struct Topology {
    graph: Arc<TopologyGraph>,
    store: Arc<dyn LayoutStore>,
    event_bus: SharedEventBus,
}

impl Topology {
    pub fn new(
        graph: Arc<TopologyGraph>,
        store: Arc<dyn LayoutStore>,
        event_bus: SharedEventBus,
    ) -> Self {
        Self {
            graph,
            store,
            event_bus,
        }
    }

    pub fn graph(&self) -> &Arc<TopologyGraph> {
        &self.graph
    }

    pub fn layout(&self) -> Layout {
        self.graph.layout()
    }

    /// Load a new layout and persist it.
    ///
    /// A layout that fails validation changes nothing. A layout that loads
    /// but cannot be saved stays active and the storage error is returned.
    pub fn set_layout(&self, layout: Layout) -> Result<()> {
        self.graph.load_layout(layout.clone())?;
        self.announce();
        self.store.save(&layout)
    }

    /// Load the stored layout. Returns `false` when nothing is stored.
    pub fn reload_from_storage(&self) -> Result<bool> {
        let layout = match self.store.load() {
            Ok(layout) => layout,
            Err(Error::NotFound(what)) => {
                info!(category = "topology", %what, "No stored layout");
                return Ok(false);
            }
            Err(e) => {
                warn!(category = "topology", error = %e, "Stored layout unreadable");
                return Err(e);
            }
        };
        self.graph.load_layout(layout)?;
        self.announce();
        Ok(true)
    }

    pub fn save_to_storage(&self) -> Result<()> {
        self.store.save(&self.graph.layout())
    }

    fn announce(&self) {
        self.event_bus.publish(CcuEvent::layout_changed(
            self.graph.node_count(),
            self.graph.edge_count(),
        ));
    }
}
