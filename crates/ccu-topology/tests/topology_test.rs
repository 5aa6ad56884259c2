//! Topology tests against the example factory floor.

use ccu_core::{CcuEvent, EventBus};
use ccu_topology::{
    AdjacencyMatrix, Direction, JsonFileLayoutStore, Layout, LayoutStore, ReservationError,
    ReservationRequest, Topology, TopologyGraph,
};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::thread;

fn example_layout() -> Layout {
    Layout::from_json(include_str!("fixtures/layout.json")).unwrap()
}

fn example_graph() -> TopologyGraph {
    let graph = TopologyGraph::new();
    graph.load_layout(example_layout()).unwrap();
    graph
}

fn block(graph: &TopologyGraph, owner: &str, node: &str) {
    graph
        .reserve_sequence(&[ReservationRequest::new(node, owner)])
        .unwrap();
}

/// Whether `to` can be reached from `from` over finite off-diagonal entries.
fn reachable(matrix: &AdjacencyMatrix, from: &str, to: &str) -> bool {
    let start = matrix.index_of(from).unwrap();
    let goal = matrix.index_of(to).unwrap();
    let mut seen = HashSet::from([start]);
    let mut queue = VecDeque::from([start]);
    while let Some(i) = queue.pop_front() {
        if i == goal {
            return true;
        }
        for (j, distance) in matrix.rows[i].iter().enumerate() {
            if i != j && distance.is_finite() && seen.insert(j) {
                queue.push_back(j);
            }
        }
    }
    false
}

#[test]
fn test_example_layout_counts() {
    let graph = example_graph();
    assert_eq!(graph.node_count(), 9);
    assert_eq!(graph.edge_count(), 18);

    let ids: Vec<String> = graph.nodes().into_iter().map(|n| n.id).collect();
    assert_eq!(
        ids,
        vec!["DPS-1", "HBW-1", "AIQS-1", "MILL-1", "DRILL-1", "1", "2", "3", "4"]
    );
}

#[test]
fn test_reverse_edges_carry_opposite_heading() {
    let graph = example_graph();
    let edges = graph.edges();
    for pair in edges.chunks(2) {
        assert_eq!(pair[0].from, pair[1].to);
        assert_eq!(pair[0].to, pair[1].from);
        assert_eq!(pair[0].length_mm, pair[1].length_mm);
        assert_eq!(pair[0].direction.opposite(), pair[1].direction);
    }
    assert_eq!(edges[0].direction, Direction::North);
    assert_eq!(edges[1].direction, Direction::South);
}

#[test]
fn test_blocking_node_masks_only_its_row_and_column() {
    let graph = example_graph();
    let open = graph.adjacency_matrix(None);
    assert!(open.get("2", "4").unwrap().is_finite());

    block(&graph, "agv-2", "4");
    let masked = graph.adjacency_matrix(Some("agv-1"));
    let four = masked.index_of("4").unwrap();

    for i in 0..masked.len() {
        for j in 0..masked.len() {
            let value = masked.rows[i][j];
            if i == j {
                assert_eq!(value, 0.0);
            } else if i == four || j == four {
                assert_eq!(value, f64::INFINITY);
            } else {
                assert_eq!(value, open.rows[i][j]);
            }
        }
    }
}

#[test]
fn test_blocking_four_and_two_cuts_drill_off_from_hbw() {
    let graph = example_graph();
    assert!(reachable(&graph.adjacency_matrix(None), "DRILL-1", "HBW-1"));

    block(&graph, "agv-2", "2");
    // Still reachable via 4 and 3
    assert!(reachable(
        &graph.adjacency_matrix(Some("agv-1")),
        "DRILL-1",
        "HBW-1"
    ));

    block(&graph, "agv-2", "4");
    let matrix = graph.adjacency_matrix(Some("agv-1"));
    assert!(!reachable(&matrix, "DRILL-1", "HBW-1"));
    assert!(!reachable(&matrix, "HBW-1", "DRILL-1"));

    // The blocking owner is not blocked by itself
    assert!(reachable(
        &graph.adjacency_matrix(Some("agv-2")),
        "DRILL-1",
        "HBW-1"
    ));
}

#[test]
fn test_failed_batch_leaves_no_trace() {
    let graph = example_graph();
    block(&graph, "agv-2", "3");

    let before = graph.reserved_node_ids(None);
    let err = graph
        .reserve_sequence(&[
            ReservationRequest::new("1", "agv-1"),
            ReservationRequest::new("3", "agv-1").after("1"),
            ReservationRequest::new("4", "agv-1").after("3"),
        ])
        .unwrap_err();

    assert_eq!(
        err,
        ReservationError::BlockedByOtherOwner {
            node_id: "3".to_string(),
            holder: "agv-2".to_string()
        }
    );
    assert_eq!(graph.reserved_node_ids(None), before);
}

#[test]
fn test_concurrent_reservations_are_mutually_exclusive() {
    let graph = Arc::new(example_graph());
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let graph = graph.clone();
            thread::spawn(move || {
                let owner = format!("agv-{}", i);
                graph
                    .reserve_sequence(&[
                        ReservationRequest::new("1", &owner),
                        ReservationRequest::new("2", &owner).after("1"),
                    ])
                    .is_ok()
            })
        })
        .collect();

    let winners = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|won| *won)
        .count();
    assert_eq!(winners, 1);

    let holder = graph.reservation("1").unwrap().owner_id;
    assert_eq!(graph.reservation("2").unwrap().owner_id, holder);
}

#[test]
fn test_chain_release_follows_vehicle() {
    let graph = example_graph();
    graph
        .reserve_sequence(&[
            ReservationRequest::new("HBW-1", "5iO4"),
            ReservationRequest::new("1", "5iO4").after("HBW-1"),
            ReservationRequest::new("3", "5iO4").after("1"),
            ReservationRequest::new("4", "5iO4").after("3"),
        ])
        .unwrap();
    block(&graph, "agv-2", "2");

    assert_eq!(graph.release_preceding("5iO4", "3"), vec!["1", "HBW-1"]);
    let held: Vec<String> = graph
        .reservations_of("5iO4")
        .into_iter()
        .map(|(node, _)| node)
        .collect();
    assert_eq!(held, vec!["3", "4"]);
    assert!(graph.is_reserved("2", Some("5iO4")));

    assert_eq!(graph.release_all("5iO4"), 2);
    assert_eq!(graph.reserved_node_ids(None).len(), 1);
}

#[test]
fn test_set_layout_persists_and_announces() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(JsonFileLayoutStore::new(dir.path().join("layout.json")));
    let bus = Arc::new(EventBus::new());
    let mut events = bus.layout_events();
    let topology = Topology::new(Arc::new(TopologyGraph::new()), store.clone(), bus.clone());

    topology.set_layout(example_layout()).unwrap();

    assert_eq!(store.load().unwrap(), example_layout());
    match events.try_recv() {
        Some((CcuEvent::LayoutChanged { node_count, edge_count, .. }, _)) => {
            assert_eq!(node_count, 9);
            assert_eq!(edge_count, 18);
        }
        other => panic!("expected LayoutChanged, got {:?}", other),
    }
}

#[test]
fn test_invalid_layout_is_neither_loaded_nor_saved() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(JsonFileLayoutStore::new(dir.path().join("layout.json")));
    let bus = Arc::new(EventBus::new());
    let mut events = bus.layout_events();
    let topology = Topology::new(Arc::new(TopologyGraph::new()), store.clone(), bus);

    let broken = example_layout().add_road("4", "nowhere", 100.0, Direction::East);
    assert!(topology.set_layout(broken).is_err());
    assert!(store.load().is_err());
    assert_eq!(topology.graph().node_count(), 0);
    assert_eq!(events.drain_count(), 0);
}

#[test]
fn test_reload_from_storage() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(JsonFileLayoutStore::new(dir.path().join("layout.json")));
    let bus = Arc::new(EventBus::new());
    let topology = Topology::new(Arc::new(TopologyGraph::new()), store.clone(), bus);

    assert!(!topology.reload_from_storage().unwrap());

    store.save(&example_layout()).unwrap();
    assert!(topology.reload_from_storage().unwrap());
    assert_eq!(topology.layout(), example_layout());
    assert_eq!(topology.graph().edge_count(), 18);

    topology.save_to_storage().unwrap();
    assert_eq!(store.load().unwrap(), example_layout());
}

#[test]
fn test_reservation_on_unknown_node_is_refused() {
    let graph = example_graph();
    let err = graph
        .reserve_sequence(&[ReservationRequest::new("nowhere", "5iO4")])
        .unwrap_err();
    assert_eq!(
        err,
        ReservationError::UnknownNode {
            node_id: "nowhere".to_string()
        }
    );
    assert!(!graph.is_reserved("nowhere", None));
    assert!(graph.reserved_node_ids(None).is_empty());
}

#[test]
fn test_reload_racing_reservation_never_keeps_removed_node() {
    let shrunk = Layout::default()
        .add_intersection("1")
        .add_intersection("3")
        .add_road("1", "3", 640.0, Direction::North);

    for _ in 0..200 {
        let graph = Arc::new(example_graph());
        let reserver = {
            let graph = graph.clone();
            thread::spawn(move || {
                let _ = graph.reserve_sequence(&[ReservationRequest::new("2", "5iO4")]);
            })
        };
        graph.load_layout(shrunk.clone()).unwrap();
        reserver.join().unwrap();

        assert!(!graph.is_reserved("2", None));
    }
}
