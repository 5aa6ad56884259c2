//! Node reservations serializing AGV access to shared track.
//!
//! A reservation may name the node reserved just before it on the owner's
//! route. Following those links backward yields the owner's chain, which is
//! released from the rear as the vehicle advances.
//!
//! Invariants held by [`ReservationTable`]:
//! - a node has at most one holder
//! - a reservation naming a predecessor was only granted while that
//!   predecessor was reserved
//! - the predecessor of a held reservation never changes

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// One entry of a reservation batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationRequest {
    pub node_id: String,
    pub owner_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preceding_node_id: Option<String>,
}

impl ReservationRequest {
    pub fn new(node_id: impl Into<String>, owner_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            owner_id: owner_id.into(),
            preceding_node_id: None,
        }
    }

    pub fn after(mut self, preceding_node_id: impl Into<String>) -> Self {
        self.preceding_node_id = Some(preceding_node_id.into());
        self
    }
}

/// A held reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    pub owner_id: String,
    pub preceding_node_id: Option<String>,
}

/// Why a reservation batch was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReservationError {
    #[error("Node '{node_id}' is not part of the layout")]
    UnknownNode { node_id: String },

    #[error("Missing preceding reservation: '{predecessor}' is not reserved (requested for '{node_id}')")]
    MissingPredecessor {
        node_id: String,
        predecessor: String,
    },

    #[error("Node '{node_id}' is blocked by another owner ('{holder}')")]
    BlockedByOtherOwner { node_id: String, holder: String },

    #[error("Node '{node_id}' is reserved with a different predecessor ({held:?}, requested {requested:?})")]
    PredecessorMismatch {
        node_id: String,
        held: Option<String>,
        requested: Option<String>,
    },
}

impl ReservationError {
    /// Node the failing entry asked for.
    pub fn node_id(&self) -> &str {
        match self {
            Self::UnknownNode { node_id }
            | Self::MissingPredecessor { node_id, .. }
            | Self::BlockedByOtherOwner { node_id, .. }
            | Self::PredecessorMismatch { node_id, .. } => node_id,
        }
    }
}

/// Reservations keyed by node id.
#[derive(Debug, Clone, Default)]
pub struct ReservationTable {
    entries: HashMap<String, Reservation>,
}

impl ReservationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, node_id: &str) -> Option<&Reservation> {
        self.entries.get(node_id)
    }

    /// Validate and apply a batch. Nothing is applied if any entry fails.
    ///
    /// Entries earlier in the batch count as reserved for the checks of
    /// later ones. Returns the number of entries applied.
    pub fn reserve_sequence(
        &mut self,
        requests: &[ReservationRequest],
    ) -> Result<usize, ReservationError> {
        let mut staged: HashMap<String, Reservation> = HashMap::new();

        for request in requests {
            if let Some(predecessor) = &request.preceding_node_id {
                if !staged.contains_key(predecessor) && !self.entries.contains_key(predecessor) {
                    return Err(ReservationError::MissingPredecessor {
                        node_id: request.node_id.clone(),
                        predecessor: predecessor.clone(),
                    });
                }
            }

            let held = staged
                .get(&request.node_id)
                .or_else(|| self.entries.get(&request.node_id));
            if let Some(held) = held {
                if held.owner_id != request.owner_id {
                    return Err(ReservationError::BlockedByOtherOwner {
                        node_id: request.node_id.clone(),
                        holder: held.owner_id.clone(),
                    });
                }
                if held.preceding_node_id != request.preceding_node_id {
                    return Err(ReservationError::PredecessorMismatch {
                        node_id: request.node_id.clone(),
                        held: held.preceding_node_id.clone(),
                        requested: request.preceding_node_id.clone(),
                    });
                }
            }

            staged.insert(
                request.node_id.clone(),
                Reservation {
                    owner_id: request.owner_id.clone(),
                    preceding_node_id: request.preceding_node_id.clone(),
                },
            );
        }

        let applied = staged.len();
        self.entries.extend(staged);
        Ok(applied)
    }

    /// Whether `node_id` is reserved by anyone other than `excluding_owner`.
    pub fn is_reserved(&self, node_id: &str, excluding_owner: Option<&str>) -> bool {
        match self.entries.get(node_id) {
            None => false,
            Some(r) => excluding_owner.map_or(true, |owner| r.owner_id != owner),
        }
    }

    pub fn reserved_node_ids(&self, excluding_owner: Option<&str>) -> BTreeSet<String> {
        self.entries
            .iter()
            .filter(|(_, r)| excluding_owner.map_or(true, |owner| r.owner_id != owner))
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Reservations held by `owner_id`, sorted by node id.
    pub fn reservations_of(&self, owner_id: &str) -> Vec<(String, Reservation)> {
        let mut held: Vec<(String, Reservation)> = self
            .entries
            .iter()
            .filter(|(_, r)| r.owner_id == owner_id)
            .map(|(id, r)| (id.clone(), r.clone()))
            .collect();
        held.sort_by(|a, b| a.0.cmp(&b.0));
        held
    }

    /// Release every ancestor of `node_id` in `owner_id`'s chain.
    ///
    /// `node_id` itself stays reserved. The walk stops at the first
    /// predecessor that is unreserved or held by someone else. Returns the
    /// released node ids, nearest first.
    pub fn release_preceding(&mut self, owner_id: &str, node_id: &str) -> Vec<String> {
        let mut released = Vec::new();
        let mut next = match self.entries.get(node_id) {
            Some(r) if r.owner_id == owner_id => r.preceding_node_id.clone(),
            _ => return released,
        };

        while let Some(current) = next {
            if current == node_id {
                break;
            }
            match self.entries.get(&current) {
                Some(r) if r.owner_id == owner_id => {
                    next = r.preceding_node_id.clone();
                    self.entries.remove(&current);
                    released.push(current);
                }
                _ => break,
            }
        }
        released
    }

    /// Release one node if `owner_id` holds it.
    pub fn release(&mut self, owner_id: &str, node_id: &str) -> bool {
        match self.entries.get(node_id) {
            Some(r) if r.owner_id == owner_id => {
                self.entries.remove(node_id);
                true
            }
            _ => false,
        }
    }

    /// Release everything `owner_id` holds. Returns the number released.
    pub fn release_all(&mut self, owner_id: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, r| r.owner_id != owner_id);
        before - self.entries.len()
    }

    /// Drop reservations whose node no longer exists.
    pub fn retain_nodes(&mut self, exists: impl Fn(&str) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|id, _| exists(id));
        before - self.entries.len()
    }
}
