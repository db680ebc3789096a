//! Failover
//!
//! Topology-mutating workflows over a fleet arena:
//! - promote: caller picks the new primary
//! - eject: the new primary is elected from the replicas
//! - detach: one replica leaves its topology
//!
//! Exactly one primary per topology at any instant. No quorum, no
//! zero-data-loss guarantee across failover.
//!
//! Exclusivity is per instance id through [`ActiveOperations`]; two
//! workflows touching a common instance never run at once.

mod active;
mod errors;
mod orchestrator;
mod selector;
mod status;

pub use active::{ActiveOperations, OperationClaim, OperationKind};
pub use errors::{OrchestratorError, OrchestratorResult};
pub use orchestrator::{DetachReport, FailoverReport, TopologyOrchestrator};
pub use selector::{elect, ReplicaSelector};
pub use status::TaskStatusTracker;
