//! Provisioning Errors

use thiserror::Error;

use crate::topology::InstanceId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProvisioningError {
    /// More than one id without a replication source.
    #[error("cannot create multiple non-replica instances")]
    MultipleNonReplica,

    #[error("no instance ids given")]
    NoInstances,

    #[error("instance {0} already exists")]
    AlreadyExists(InstanceId),

    #[error("replication source {0} not found")]
    UnknownSource(InstanceId),

    /// Replicas of replicas are not supported.
    #[error("{0} is a replica and cannot serve as a replication source")]
    InvalidSource(InstanceId),

    #[error("instance {instance} is busy with {operation}")]
    InProgress {
        instance: InstanceId,
        operation: &'static str,
    },

    /// The provisioning backend reported a failure.
    #[error("provisioning backend failed: {0}")]
    Backend(String),
}

impl ProvisioningError {
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }

    /// Stable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MultipleNonReplica => "AERO_PROVISION_MULTIPLE_NON_REPLICA",
            Self::NoInstances => "AERO_PROVISION_NO_INSTANCES",
            Self::AlreadyExists(_) => "AERO_PROVISION_EXISTS",
            Self::UnknownSource(_) => "AERO_INSTANCE_NOT_FOUND",
            Self::InvalidSource(_) => "AERO_PROVISION_INVALID_SOURCE",
            Self::InProgress { .. } => "AERO_OPERATION_IN_PROGRESS",
            Self::Backend(_) => "AERO_PROVISION_BACKEND",
        }
    }

    /// Check if the error is a usage error raised before any backend call.
    pub fn is_usage_error(&self) -> bool {
        !matches!(self, Self::Backend(_))
    }
}

/// Result type for provisioning
pub type ProvisioningResult<T> = Result<T, ProvisioningError>;
