//! Remote Operation Errors
//!
//! Two families with different treatment upstream:
//! - `OperationFailed`: the engine ran the command and reported failure
//! - `Transport` / `Fault`: anything else; never reinterpreted as a domain error

use thiserror::Error;

use crate::topology::InstanceId;

/// Error raised by an [`super::InstanceHandle`] call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandleError {
    /// The engine-level replication command failed.
    #[error("remote operation {operation} failed on {instance}: {message}")]
    OperationFailed {
        instance: InstanceId,
        operation: &'static str,
        message: String,
    },

    /// The guest agent could not be reached.
    #[error("transport failure talking to {instance}: {message}")]
    Transport { instance: InstanceId, message: String },

    /// Unexpected runtime fault.
    #[error("unexpected fault on {instance}: {message}")]
    Fault { instance: InstanceId, message: String },
}

impl HandleError {
    pub fn operation_failed(
        instance: &InstanceId,
        operation: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self::OperationFailed {
            instance: instance.clone(),
            operation,
            message: message.into(),
        }
    }

    pub fn transport(instance: &InstanceId, message: impl Into<String>) -> Self {
        Self::Transport {
            instance: instance.clone(),
            message: message.into(),
        }
    }

    pub fn fault(instance: &InstanceId, message: impl Into<String>) -> Self {
        Self::Fault {
            instance: instance.clone(),
            message: message.into(),
        }
    }

    /// Instance the failed call was addressed to.
    pub fn instance(&self) -> &InstanceId {
        match self {
            Self::OperationFailed { instance, .. }
            | Self::Transport { instance, .. }
            | Self::Fault { instance, .. } => instance,
        }
    }

    /// Check if this is a recognised, engine-level failure.
    pub fn is_operation_failed(&self) -> bool {
        matches!(self, Self::OperationFailed { .. })
    }

    /// Stable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::OperationFailed { .. } => "AERO_REMOTE_OPERATION_FAILED",
            Self::Transport { .. } => "AERO_REMOTE_TRANSPORT",
            Self::Fault { .. } => "AERO_REMOTE_FAULT",
        }
    }
}

/// Result type for remote instance calls
pub type HandleResult<T> = Result<T, HandleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_operation_failed_is_domain_error() {
        let id = InstanceId::new("db-1");
        assert!(HandleError::operation_failed(&id, "detach_replica", "boom").is_operation_failed());
        assert!(!HandleError::transport(&id, "timeout").is_operation_failed());
        assert!(!HandleError::fault(&id, "Error").is_operation_failed());
    }

    #[test]
    fn test_error_names_instance() {
        let err = HandleError::operation_failed(&InstanceId::new("db-1"), "attach_replica", "denied");
        assert_eq!(err.instance().as_str(), "db-1");
        let text = err.to_string();
        assert!(text.contains("db-1"));
        assert!(text.contains("attach_replica"));
        assert_eq!(err.code(), "AERO_REMOTE_OPERATION_FAILED");
    }
}
