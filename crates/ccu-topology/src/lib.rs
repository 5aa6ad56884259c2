//! Shopfloor topology for the factory CCU.
//!
//! - [`Layout`]: the declarative floor plan operators edit
//! - [`Graph`]: the bidirectional routing graph built from it
//! - [`ReservationTable`]: who may occupy which node
//! - [`TopologyGraph`]: both of the above behind locks
//! - [`Topology`]: persistence and change notification

pub mod graph;
pub mod layout;
pub mod reservation;
pub mod service;
pub mod storage;
pub mod topology;

pub use graph::{AdjacencyMatrix, Edge, Graph, Node, NodeKind};
pub use layout::{Direction, Intersection, Layout, LayoutModule, Road};
pub use reservation::{Reservation, ReservationError, ReservationRequest, ReservationTable};
pub use service::Topology;
pub use storage::{JsonFileLayoutStore, LayoutStore};
pub use topology::TopologyGraph;
