//! Routing graph derived from a [`Layout`].
//!
//! Node order is stable: modules in layout order, then intersections. Every
//! road yields two directed edges, forward then reverse, in road order.

use ccu_core::{ModuleType, Result};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::layout::{Direction, Layout};

/// What a graph node stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeKind {
    Module {
        #[serde(rename = "type")]
        module_type: ModuleType,
    },
    Intersection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Node {
    pub id: String,
    #[serde(flatten)]
    pub kind: NodeKind,
}

/// Directed edge.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub from: String,
    pub to: String,
    pub length_mm: f64,
    pub direction: Direction,
}

/// Direct-edge distance matrix.
///
/// `rows[i][j]` is the shortest direct edge from `node_ids[i]` to
/// `node_ids[j]`, `f64::INFINITY` when there is none, `0.0` on the diagonal.
#[derive(Debug, Clone, PartialEq)]
pub struct AdjacencyMatrix {
    pub node_ids: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

impl AdjacencyMatrix {
    pub fn len(&self) -> usize {
        self.node_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.node_ids.is_empty()
    }

    pub fn index_of(&self, node_id: &str) -> Option<usize> {
        self.node_ids.iter().position(|id| id == node_id)
    }

    /// Distance between two nodes by id.
    pub fn get(&self, from: &str, to: &str) -> Option<f64> {
        let i = self.index_of(from)?;
        let j = self.index_of(to)?;
        Some(self.rows[i][j])
    }
}

/// Immutable routing graph.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    index: HashMap<String, usize>,
}

impl Graph {
    /// Validate `layout` and build its graph.
    pub fn from_layout(layout: &Layout) -> Result<Self> {
        layout.validate()?;

        let nodes: Vec<Node> = layout
            .modules
            .iter()
            .map(|m| Node {
                id: m.serial_number.clone(),
                kind: NodeKind::Module {
                    module_type: m.module_type,
                },
            })
            .chain(layout.intersections.iter().map(|i| Node {
                id: i.id.clone(),
                kind: NodeKind::Intersection,
            }))
            .collect();

        let index = nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.clone(), i))
            .collect();

        let mut edges = Vec::with_capacity(layout.roads.len() * 2);
        for road in &layout.roads {
            edges.push(Edge {
                from: road.from.clone(),
                to: road.to.clone(),
                length_mm: road.length_mm,
                direction: road.direction,
            });
            edges.push(Edge {
                from: road.to.clone(),
                to: road.from.clone(),
                length_mm: road.length_mm,
                direction: road.direction.opposite(),
            });
        }

        Ok(Self {
            nodes,
            edges,
            index,
        })
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.index.contains_key(node_id)
    }

    pub fn node(&self, node_id: &str) -> Option<&Node> {
        self.index.get(node_id).map(|&i| &self.nodes[i])
    }

    /// Outgoing edges of `node_id` in edge order.
    pub fn neighbors(&self, node_id: &str) -> Vec<&Edge> {
        self.edges.iter().filter(|e| e.from == node_id).collect()
    }

    /// Distance matrix with every node in `blocked` cut off.
    pub fn adjacency_matrix(&self, blocked: &HashSet<String>) -> AdjacencyMatrix {
        let n = self.nodes.len();
        let mut rows = vec![vec![f64::INFINITY; n]; n];
        for (i, row) in rows.iter_mut().enumerate() {
            row[i] = 0.0;
        }

        for edge in &self.edges {
            let (Some(&i), Some(&j)) = (self.index.get(&edge.from), self.index.get(&edge.to))
            else {
                continue;
            };
            if blocked.contains(&edge.from) || blocked.contains(&edge.to) {
                continue;
            }
            if edge.length_mm < rows[i][j] {
                rows[i][j] = edge.length_mm;
            }
        }

        AdjacencyMatrix {
            node_ids: self.nodes.iter().map(|n| n.id.clone()).collect(),
            rows,
        }
    }
}
