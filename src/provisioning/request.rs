//! Provisioning Requests and Backend Contract

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::ProvisioningResult;
use crate::topology::{InstanceId, LogPosition};

/// Caller identity and correlation id for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub request_id: Uuid,
    pub operator: Option<String>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self {
            request_id: Uuid::new_v4(),
            operator: None,
        }
    }

    pub fn with_operator(mut self, operator: impl Into<String>) -> Self {
        self.operator = Some(operator.into());
        self
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// What to build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRequest {
    pub name: String,
    pub flavor: String,
    /// Backup to seed from; for replicas, an existing backup of the primary.
    #[serde(default)]
    pub backup_id: Option<String>,
}

impl CreateRequest {
    pub fn new(name: impl Into<String>, flavor: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            flavor: flavor.into(),
            backup_id: None,
        }
    }

    pub fn with_backup(mut self, backup_id: impl Into<String>) -> Self {
        self.backup_id = Some(backup_id.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotDataset {
    /// Temporary backup taken for the snapshot. Deleted once replicas exist.
    #[serde(default)]
    pub snapshot_id: Option<String>,
}

/// State of a primary captured for seeding replicas.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationSnapshot {
    pub dataset: SnapshotDataset,
    /// Position the replicas start from.
    #[serde(default)]
    pub log_position: LogPosition,
}

/// Boots instances and manages their backups.
pub trait Provisioner {
    /// Capture the primary for seeding a replica.
    ///
    /// One snapshot seeds every replica of a request, so `replica_number`
    /// is always 1.
    fn get_replication_primary_snapshot(
        &self,
        context: &RequestContext,
        primary: &InstanceId,
        flavor: &str,
        backup_id: Option<&str>,
        replica_number: u32,
    ) -> ProvisioningResult<ReplicationSnapshot>;

    /// Boot one instance, as a replica when `snapshot` is given.
    fn create_instance(
        &self,
        context: &RequestContext,
        id: &InstanceId,
        request: &CreateRequest,
        snapshot: Option<&ReplicationSnapshot>,
    ) -> ProvisioningResult<()>;

    fn delete_backup(&self, context: &RequestContext, backup_id: &str) -> ProvisioningResult<()>;
}
