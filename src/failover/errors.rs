//! Failover Errors
//!
//! - Request errors are raised before any remote call
//! - `InconsistentTopology` aborts an election before any mutation
//! - `ReplicaAttach` wraps a recognised remote failure and names the instance
//! - `Remote` carries any other remote fault unchanged

use thiserror::Error;

use crate::handle::HandleError;
use crate::topology::InstanceId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrchestratorError {
    /// Candidates report more than one replication lineage.
    #[error("replicas of {primary} are not all replicating from the same primary (lineages: {lineages})")]
    InconsistentTopology {
        primary: InstanceId,
        lineages: String,
    },

    /// A recognised remote failure while re-pointing the topology.
    #[error("replica attach failed on {instance}: {source}")]
    ReplicaAttach {
        instance: InstanceId,
        #[source]
        source: HandleError,
    },

    /// Unrecognised remote fault, propagated verbatim.
    #[error(transparent)]
    Remote(#[from] HandleError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("instance not found: {0}")]
    NotFound(InstanceId),

    /// Another workflow holds the instance.
    #[error("instance {instance} is busy with {operation}")]
    OperationInProgress {
        instance: InstanceId,
        operation: &'static str,
    },
}

impl OrchestratorError {
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Stable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InconsistentTopology { .. } => "AERO_INCONSISTENT_TOPOLOGY",
            Self::ReplicaAttach { .. } => "AERO_REPLICA_ATTACH_FAILED",
            Self::Remote(err) => err.code(),
            Self::InvalidRequest(_) => "AERO_INVALID_REQUEST",
            Self::NotFound(_) => "AERO_INSTANCE_NOT_FOUND",
            Self::OperationInProgress { .. } => "AERO_OPERATION_IN_PROGRESS",
        }
    }

    /// Check if the error was raised before the topology was touched.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::InconsistentTopology { .. }
                | Self::InvalidRequest(_)
                | Self::NotFound(_)
                | Self::OperationInProgress { .. }
        )
    }

    /// Instance named by the error, if any.
    pub fn instance(&self) -> Option<&InstanceId> {
        match self {
            Self::ReplicaAttach { instance, .. }
            | Self::OperationInProgress { instance, .. }
            | Self::NotFound(instance) => Some(instance),
            Self::Remote(err) => Some(err.instance()),
            Self::InconsistentTopology { primary, .. } => Some(primary),
            Self::InvalidRequest(_) => None,
        }
    }
}

/// Result type for orchestrator workflows
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;
