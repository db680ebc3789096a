//! Topology Data Model
//!
//! Instance records for a managed fleet live in a single arena keyed by
//! instance id:
//! - A replica refers to its primary by id, never by owning pointer
//! - A primary owns an ordered, duplicate-free set of replica ids
//! - Records are mutated in place by the orchestrator and never deleted here
//!
//! The arena is shared between the orchestrator and status observers
//! through [`SharedTopology`].

mod arena;
mod instance;

pub use arena::{Topology, TopologyViolation};
pub use instance::{Instance, InstanceId, LineageToken, LogPosition, ReplicaSet, Role, TaskStatus};

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Arena shared between the orchestrator, the status tracker and observers.
pub type SharedTopology = Arc<RwLock<Topology>>;

/// Wrap a topology for sharing.
pub fn shared(topology: Topology) -> SharedTopology {
    Arc::new(RwLock::new(topology))
}

/// Acquire the arena for reading.
///
/// A writer that panicked cannot leave a record half-written (every mutation
/// is a single field assignment), so a poisoned lock is recovered.
pub(crate) fn read_lock(topology: &SharedTopology) -> RwLockReadGuard<'_, Topology> {
    topology.read().unwrap_or_else(PoisonError::into_inner)
}

/// Acquire the arena for writing.
pub(crate) fn write_lock(topology: &SharedTopology) -> RwLockWriteGuard<'_, Topology> {
    topology.write().unwrap_or_else(PoisonError::into_inner)
}
