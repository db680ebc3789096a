//! Instance Handles
//!
//! Remote-control proxies for managed instances. The orchestrator only ever
//! talks to instances through [`InstanceHandle`]; how a call reaches the
//! database engine is decided by the engine strategy behind the handle.
//!
//! Non-Responsibilities:
//! - No retry and no timeout; callers of the guest transport own deadlines
//! - No topology bookkeeping; the arena is updated by the orchestrator
//!
//! The replica set of a primary is read from the arena record, not from the
//! handle; the record's forward set is the authoritative copy.

mod engine;
mod errors;
mod simulated;
mod strategy;

pub use engine::{EngineInstance, EngineLoader, GuestDirectory};
pub use errors::{HandleError, HandleResult};
pub use simulated::{GuestCall, SimulatedFleet, SimulatedGuest};
pub use strategy::{
    Endpoint, EngineFamily, GtidReplication, GuestAgent, PrimaryRef, ReplicationStrategy,
    Settings, SyncReplication,
};

use crate::topology::{Instance, InstanceId, LogPosition};

/// Remote-control proxy for one managed instance.
///
/// Every call is synchronous and may block on network I/O. There is no
/// `replicas()` call; read the forward set from the arena with
/// [`crate::topology::Topology::replicas_of`].
pub trait InstanceHandle {
    /// Identity of the instance behind this handle.
    fn id(&self) -> &InstanceId;

    /// Stop replicating from `current_primary`.
    ///
    /// `for_failover` keeps the instance read-only; a plain detach leaves it
    /// writable as a standalone instance.
    fn detach_replica(&self, current_primary: &InstanceId, for_failover: bool) -> HandleResult<()>;

    /// Re-point replication at `new_primary`.
    fn attach_replica(&self, new_primary: &InstanceId) -> HandleResult<()>;

    /// Flip write acceptance.
    fn make_read_only(&self, read_only: bool) -> HandleResult<()>;

    /// Turn off primary-side replication bookkeeping on a former primary.
    fn demote_replication_primary(&self) -> HandleResult<()>;

    /// Current replication log position.
    fn log_position(&self) -> HandleResult<LogPosition>;
}

/// Builds handles for arena records.
pub trait HandleLoader {
    type Handle: InstanceHandle;

    /// Load a handle for `instance`.
    fn load(&self, instance: &Instance) -> HandleResult<Self::Handle>;
}
