//! Observable orchestrator events
//!
//! Events are explicit and typed. Workflow begin/complete pairs come from
//! [`super::ObservationScope`]; the variants here cover the individual
//! steps and decisions inside a workflow.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Configuration
    /// Configuration loaded
    ConfigLoaded,
    /// Fleet snapshot loaded
    FleetLoaded,
    /// Fleet snapshot written back
    FleetSaved,

    // Election
    /// A replica won the election
    ReplicaElected,
    /// Candidates disagree on lineage
    TopologyInconsistent,

    // Workflow steps
    /// Replica detached from its primary
    ReplicaDetached,
    /// Replica re-pointed at a new primary
    ReplicaAttached,
    /// Promoted instance made writable
    PrimaryWritable,
    /// Former primary demoted
    PrimaryDemoted,
    /// Recognised remote failure, wrapped
    ReplicaAttachFailed,
    /// Unrecognised remote fault, propagated
    RemoteFault,

    // Requests
    /// Request rejected before any remote call
    RequestRejected,
    /// Workflow collided with one already in flight
    OperationConflict,

    // Status
    /// Task status of an instance changed
    TaskStatusChanged,

    // Provisioning
    /// Primary snapshot captured for new replicas
    ReplicaSnapshotTaken,
    /// Instance record created
    InstanceCreated,
    /// Temporary replication backup removed
    ReplicaBackupDeleted,
    /// Temporary replication backup could not be removed
    ReplicaBackupOrphaned,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::FleetLoaded => "FLEET_LOADED",
            Event::FleetSaved => "FLEET_SAVED",

            Event::ReplicaElected => "REPLICA_ELECTED",
            Event::TopologyInconsistent => "TOPOLOGY_INCONSISTENT",

            Event::ReplicaDetached => "REPLICA_DETACHED",
            Event::ReplicaAttached => "REPLICA_ATTACHED",
            Event::PrimaryWritable => "PRIMARY_WRITABLE",
            Event::PrimaryDemoted => "PRIMARY_DEMOTED",
            Event::ReplicaAttachFailed => "REPLICA_ATTACH_FAILED",
            Event::RemoteFault => "REMOTE_FAULT",

            Event::RequestRejected => "REQUEST_REJECTED",
            Event::OperationConflict => "OPERATION_CONFLICT",

            Event::TaskStatusChanged => "TASK_STATUS_CHANGED",

            Event::ReplicaSnapshotTaken => "REPLICA_SNAPSHOT_TAKEN",
            Event::InstanceCreated => "INSTANCE_CREATED",
            Event::ReplicaBackupDeleted => "REPLICA_BACKUP_DELETED",
            Event::ReplicaBackupOrphaned => "REPLICA_BACKUP_ORPHANED",
        }
    }

    /// Severity the event is logged at.
    pub fn severity(&self) -> super::Severity {
        use super::Severity;
        match self {
            Event::ReplicaAttachFailed | Event::RemoteFault => Severity::Error,
            Event::TopologyInconsistent
            | Event::RequestRejected
            | Event::OperationConflict
            | Event::ReplicaBackupOrphaned => Severity::Warn,
            Event::TaskStatusChanged => Severity::Trace,
            _ => Severity::Info,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::Severity;

    #[test]
    fn test_event_names_are_upper_snake() {
        let events = [
            Event::ConfigLoaded,
            Event::FleetLoaded,
            Event::FleetSaved,
            Event::ReplicaElected,
            Event::TopologyInconsistent,
            Event::ReplicaDetached,
            Event::ReplicaAttached,
            Event::PrimaryWritable,
            Event::PrimaryDemoted,
            Event::ReplicaAttachFailed,
            Event::RemoteFault,
            Event::RequestRejected,
            Event::OperationConflict,
            Event::TaskStatusChanged,
            Event::ReplicaSnapshotTaken,
            Event::InstanceCreated,
            Event::ReplicaBackupDeleted,
            Event::ReplicaBackupOrphaned,
        ];

        for event in events {
            let s = event.as_str();
            assert!(!s.is_empty());
            assert!(s.chars().all(|c| c.is_uppercase() || c == '_'));
        }
    }

    #[test]
    fn test_failure_events_are_errors() {
        assert_eq!(Event::ReplicaAttachFailed.severity(), Severity::Error);
        assert_eq!(Event::RemoteFault.severity(), Severity::Error);
        assert_eq!(Event::ReplicaElected.severity(), Severity::Info);
    }
}
