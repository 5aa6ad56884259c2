//! Thread-safe topology: the current layout, its graph and the reservation
//! table.

use ccu_core::Result;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, info};

use crate::graph::{AdjacencyMatrix, Edge, Graph, Node};
use crate::layout::Layout;
use crate::reservation::{Reservation, ReservationError, ReservationRequest, ReservationTable};

#[derive(Default)]
struct Current {
    layout: Layout,
    graph: Graph,
}

/// Routing graph plus node reservations.
///
/// The graph is replaced wholesale on every [`load_layout`](Self::load_layout);
/// reservations survive a reload for nodes that still exist.
#[derive(Default)]
pub struct TopologyGraph {
    current: RwLock<Current>,
    reservations: Mutex<ReservationTable>,
}

impl TopologyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate `layout` and rebuild the graph from it.
    ///
    /// An invalid layout leaves the previous graph in place.
    pub fn load_layout(&self, layout: Layout) -> Result<()> {
        let graph = Graph::from_layout(&layout)?;
        let (nodes, edges) = (graph.node_count(), graph.edge_count());

        // Lock order: graph, then reservations
        let mut current = self.current.write();
        let dropped = self
            .reservations
            .lock()
            .retain_nodes(|node_id| graph.contains(node_id));
        *current = Current { layout, graph };
        drop(current);

        info!(
            category = "topology",
            nodes,
            edges,
            dropped_reservations = dropped,
            "Layout loaded"
        );
        Ok(())
    }

    pub fn layout(&self) -> Layout {
        self.current.read().layout.clone()
    }

    pub fn nodes(&self) -> Vec<Node> {
        self.current.read().graph.nodes().to_vec()
    }

    pub fn edges(&self) -> Vec<Edge> {
        self.current.read().graph.edges().to_vec()
    }

    pub fn node_count(&self) -> usize {
        self.current.read().graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.current.read().graph.edge_count()
    }

    /// Outgoing edges of `node_id`.
    pub fn neighbors(&self, node_id: &str) -> Vec<Edge> {
        self.current
            .read()
            .graph
            .neighbors(node_id)
            .into_iter()
            .cloned()
            .collect()
    }

    // ========== Reservations ==========

    /// Reserve a batch of nodes, all or nothing.
    ///
    /// Every node and predecessor must exist in the current graph.
    pub fn reserve_sequence(
        &self,
        requests: &[ReservationRequest],
    ) -> std::result::Result<(), ReservationError> {
        let result = {
            let current = self.current.read();
            let unknown = requests
                .iter()
                .flat_map(|r| std::iter::once(&r.node_id).chain(r.preceding_node_id.as_ref()))
                .find(|node_id| !current.graph.contains(node_id));
            match unknown {
                Some(node_id) => Err(ReservationError::UnknownNode {
                    node_id: node_id.clone(),
                }),
                None => self.reservations.lock().reserve_sequence(requests),
            }
        };
        match &result {
            Ok(applied) => debug!(category = "topology", applied, "Reservations applied"),
            Err(e) => debug!(category = "topology", error = %e, "Reservation batch refused"),
        }
        result.map(|_| ())
    }

    pub fn is_reserved(&self, node_id: &str, excluding_owner: Option<&str>) -> bool {
        self.reservations.lock().is_reserved(node_id, excluding_owner)
    }

    pub fn reserved_node_ids(&self, excluding_owner: Option<&str>) -> BTreeSet<String> {
        self.reservations.lock().reserved_node_ids(excluding_owner)
    }

    pub fn reservation(&self, node_id: &str) -> Option<Reservation> {
        self.reservations.lock().get(node_id).cloned()
    }

    pub fn reservations_of(&self, owner_id: &str) -> Vec<(String, Reservation)> {
        self.reservations.lock().reservations_of(owner_id)
    }

    /// Release the chain behind `node_id`. Returns the released node ids.
    pub fn release_preceding(&self, owner_id: &str, node_id: &str) -> Vec<String> {
        let released = self.reservations.lock().release_preceding(owner_id, node_id);
        if !released.is_empty() {
            debug!(category = "topology", owner = %owner_id, ?released, "Chain released");
        }
        released
    }

    pub fn release(&self, owner_id: &str, node_id: &str) -> bool {
        self.reservations.lock().release(owner_id, node_id)
    }

    pub fn release_all(&self, owner_id: &str) -> usize {
        let released = self.reservations.lock().release_all(owner_id);
        debug!(category = "topology", owner = %owner_id, released, "Owner released");
        released
    }

    /// Distance matrix with nodes reserved by anyone but
    /// `exclude_reserved_for` cut off.
    pub fn adjacency_matrix(&self, exclude_reserved_for: Option<&str>) -> AdjacencyMatrix {
        let blocked: HashSet<String> = self
            .reservations
            .lock()
            .reserved_node_ids(exclude_reserved_for)
            .into_iter()
            .collect();
        self.current.read().graph.adjacency_matrix(&blocked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::Direction;
    use ccu_core::ModuleType;

    fn line() -> Layout {
        Layout::default()
            .add_module(ModuleType::Hbw, "HBW-1")
            .add_intersection("1")
            .add_intersection("2")
            .add_road("HBW-1", "1", 380.0, Direction::North)
            .add_road("1", "2", 500.0, Direction::East)
    }

    #[test]
    fn test_invalid_layout_keeps_previous_graph() {
        let topology = TopologyGraph::new();
        topology.load_layout(line()).unwrap();
        assert!(topology
            .load_layout(line().add_road("2", "3", 1.0, Direction::East))
            .is_err());
        assert_eq!(topology.node_count(), 3);
        assert_eq!(topology.edge_count(), 4);
    }

    #[test]
    fn test_reload_drops_reservations_of_removed_nodes() {
        let topology = TopologyGraph::new();
        topology.load_layout(line()).unwrap();
        topology
            .reserve_sequence(&[
                ReservationRequest::new("1", "agv-1"),
                ReservationRequest::new("2", "agv-1").after("1"),
            ])
            .unwrap();

        let shorter = Layout::default()
            .add_module(ModuleType::Hbw, "HBW-1")
            .add_intersection("1")
            .add_road("HBW-1", "1", 380.0, Direction::North);
        topology.load_layout(shorter).unwrap();

        assert!(topology.is_reserved("1", None));
        assert!(!topology.is_reserved("2", None));
    }

    #[test]
    fn test_own_reservations_do_not_mask() {
        let topology = TopologyGraph::new();
        topology.load_layout(line()).unwrap();
        topology
            .reserve_sequence(&[ReservationRequest::new("1", "agv-1")])
            .unwrap();

        let own = topology.adjacency_matrix(Some("agv-1"));
        assert_eq!(own.get("HBW-1", "1"), Some(380.0));

        let other = topology.adjacency_matrix(Some("agv-2"));
        assert_eq!(other.get("HBW-1", "1"), Some(f64::INFINITY));
        assert_eq!(topology.adjacency_matrix(None), other);
    }

    #[test]
    fn test_unknown_nodes_are_refused() {
        let topology = TopologyGraph::new();
        topology.load_layout(line()).unwrap();

        let err = topology
            .reserve_sequence(&[
                ReservationRequest::new("1", "agv-1"),
                ReservationRequest::new("nowhere", "agv-1").after("1"),
            ])
            .unwrap_err();
        assert_eq!(
            err,
            ReservationError::UnknownNode {
                node_id: "nowhere".to_string()
            }
        );
        assert!(topology.reserved_node_ids(None).is_empty());

        let err = topology
            .reserve_sequence(&[ReservationRequest::new("2", "agv-1").after("9")])
            .unwrap_err();
        assert_eq!(err.node_id(), "9");
        assert!(!topology.is_reserved("2", None));
    }

    #[test]
    fn test_nothing_is_reservable_before_a_layout() {
        let topology = TopologyGraph::new();
        assert!(matches!(
            topology.reserve_sequence(&[ReservationRequest::new("1", "agv-1")]),
            Err(ReservationError::UnknownNode { .. })
        ));
    }

    #[test]
    fn test_neighbors() {
        let topology = TopologyGraph::new();
        topology.load_layout(line()).unwrap();
        let to: Vec<String> = topology.neighbors("1").into_iter().map(|e| e.to).collect();
        assert_eq!(to, vec!["HBW-1".to_string(), "2".to_string()]);
        assert!(topology.neighbors("9").is_empty());
    }
}
