//! Instance Creation
//!
//! Creates arena records for new instances and has the backend boot them.
//! New replicas share one snapshot of their primary; the temporary backup
//! behind it is deleted afterwards whatever the outcome.

use std::sync::Arc;

use super::errors::{ProvisioningError, ProvisioningResult};
use super::request::{CreateRequest, Provisioner, ReplicationSnapshot, RequestContext};
use crate::failover::{ActiveOperations, OperationKind, OrchestratorError, TaskStatusTracker};
use crate::observability::{
    log_event, AuditAction, AuditLog, AuditOutcome, AuditRecord, Event, Logger, MemoryAuditLog,
    ObservationScope, OperationMetrics,
};
use crate::topology::{self, Instance, InstanceId, Role, SharedTopology, TaskStatus};

pub struct ReplicaProvisioning<P: Provisioner> {
    provisioner: P,
    topology: SharedTopology,
    tracker: TaskStatusTracker,
    active: ActiveOperations,
    audit: Arc<dyn AuditLog>,
    metrics: Arc<OperationMetrics>,
}

impl<P: Provisioner> ReplicaProvisioning<P> {
    pub fn new(provisioner: P, topology: SharedTopology) -> Self {
        Self {
            provisioner,
            tracker: TaskStatusTracker::new(Arc::clone(&topology)),
            topology,
            active: ActiveOperations::new(),
            audit: Arc::new(MemoryAuditLog::new()),
            metrics: Arc::new(OperationMetrics::new()),
        }
    }

    /// Share the exclusivity registry of an orchestrator on the same arena.
    pub fn with_active_operations(mut self, active: ActiveOperations) -> Self {
        self.active = active;
        self
    }

    pub fn with_audit_log(mut self, audit: Arc<dyn AuditLog>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<OperationMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn provisioner(&self) -> &P {
        &self.provisioner
    }

    /// Create `ids`, as replicas of `replica_of` when given.
    ///
    /// Without a source exactly one id is accepted. Each record is created
    /// in `Building` and cleared once the backend reports success; a record
    /// whose creation failed stays in `Building`.
    pub fn create_instances(
        &self,
        context: &RequestContext,
        ids: &[InstanceId],
        request: &CreateRequest,
        replica_of: Option<&InstanceId>,
    ) -> ProvisioningResult<Vec<InstanceId>> {
        if replica_of.is_none() && ids.len() > 1 {
            return Err(ProvisioningError::MultipleNonReplica);
        }
        if ids.is_empty() {
            return Err(ProvisioningError::NoInstances);
        }

        let scope = ObservationScope::with_fields(
            "PROVISION",
            &[
                ("count", &ids.len().to_string()),
                ("replica_of", replica_of.map(InstanceId::as_str).unwrap_or("")),
            ],
        );
        self.append(context, AuditAction::OperationRequested, AuditOutcome::Pending, replica_of, None);

        let result = self.run(context, ids, request, replica_of);
        match &result {
            Ok(created) => {
                self.metrics.add_instances_provisioned(created.len() as u64);
                self.append(context, AuditAction::OperationExecuted, AuditOutcome::Success, replica_of, None);
                scope.complete();
            }
            Err(err) => {
                let (action, outcome) = if err.is_usage_error() {
                    self.metrics.increment_rejected_requests();
                    (AuditAction::OperationRejected, AuditOutcome::Rejected)
                } else {
                    (AuditAction::OperationFailed, AuditOutcome::Failed)
                };
                self.append(context, action, outcome, replica_of, Some(err));
                scope.fail(err.code(), &err.to_string());
            }
        }
        result
    }

    fn run(
        &self,
        context: &RequestContext,
        ids: &[InstanceId],
        request: &CreateRequest,
        replica_of: Option<&InstanceId>,
    ) -> ProvisioningResult<Vec<InstanceId>> {
        self.validate(ids, replica_of)?;

        let mut claimed: Vec<InstanceId> = ids.to_vec();
        claimed.extend(replica_of.cloned());
        let _claim = self
            .active
            .claim(OperationKind::Provision, &claimed)
            .map_err(|err| match err {
                OrchestratorError::OperationInProgress {
                    instance,
                    operation,
                } => ProvisioningError::InProgress {
                    instance,
                    operation,
                },
                other => ProvisioningError::backend(other.to_string()),
            })?;

        let Some(primary) = replica_of else {
            return ids
                .iter()
                .map(|id| self.create_one(context, id, request, None, None))
                .collect();
        };

        let snapshot = self.provisioner.get_replication_primary_snapshot(
            context,
            primary,
            &request.flavor,
            request.backup_id.as_deref(),
            1,
        )?;
        log_event(
            Event::ReplicaSnapshotTaken,
            &[
                ("position", &snapshot.log_position.to_string()),
                ("primary", primary.as_str()),
                ("snapshot_id", snapshot.dataset.snapshot_id.as_deref().unwrap_or("")),
            ],
        );

        let result: ProvisioningResult<Vec<InstanceId>> = ids
            .iter()
            .map(|id| self.create_one(context, id, request, Some(&snapshot), Some(primary)))
            .collect();

        if let Some(backup_id) = snapshot.dataset.snapshot_id.as_deref() {
            self.delete_snapshot_backup(context, backup_id);
        }
        result
    }

    fn validate(&self, ids: &[InstanceId], replica_of: Option<&InstanceId>) -> ProvisioningResult<()> {
        let arena = topology::read_lock(&self.topology);
        if let Some(existing) = ids.iter().find(|id| arena.contains(id)) {
            return Err(ProvisioningError::AlreadyExists(existing.clone()));
        }
        if let Some(primary) = replica_of {
            let record = arena
                .get(primary)
                .ok_or_else(|| ProvisioningError::UnknownSource(primary.clone()))?;
            if record.is_replica() {
                return Err(ProvisioningError::InvalidSource(primary.clone()));
            }
        }
        Ok(())
    }

    fn create_one(
        &self,
        context: &RequestContext,
        id: &InstanceId,
        request: &CreateRequest,
        snapshot: Option<&ReplicationSnapshot>,
        primary: Option<&InstanceId>,
    ) -> ProvisioningResult<InstanceId> {
        let position = snapshot.map(|s| s.log_position.clone()).unwrap_or_default();
        let record = Instance::standalone(id.clone())
            .with_log_position(position)
            .with_task_status(TaskStatus::Building);
        topology::write_lock(&self.topology).insert(record);

        self.provisioner.create_instance(context, id, request, snapshot)?;

        if let Some(primary) = primary {
            let mut arena = topology::write_lock(&self.topology);
            if arena.get(primary).map(|p| p.role) == Some(Role::Standalone) {
                arena.set_role(primary, Role::Primary);
            }
            arena.attach(id, primary);
        }
        self.tracker.clear(std::slice::from_ref(id));
        log_event(
            Event::InstanceCreated,
            &[
                ("instance", id.as_str()),
                ("name", &request.name),
                ("replica_of", primary.map(InstanceId::as_str).unwrap_or("")),
            ],
        );
        Ok(id.clone())
    }

    /// The backup only existed to seed replicas. A failed delete is logged,
    /// never returned.
    fn delete_snapshot_backup(&self, context: &RequestContext, backup_id: &str) {
        match self.provisioner.delete_backup(context, backup_id) {
            Ok(()) => log_event(Event::ReplicaBackupDeleted, &[("backup_id", backup_id)]),
            Err(err) => log_event(
                Event::ReplicaBackupOrphaned,
                &[("backup_id", backup_id), ("error", &err.to_string())],
            ),
        }
    }

    fn append(
        &self,
        context: &RequestContext,
        action: AuditAction,
        outcome: AuditOutcome,
        replica_of: Option<&InstanceId>,
        error: Option<&ProvisioningError>,
    ) {
        let mut record = AuditRecord::new(action, outcome)
            .with_operation(OperationKind::Provision.as_str())
            .with_request_id(context.request_id);
        if let Some(operator) = &context.operator {
            record = record.with_operator(operator.clone());
        }
        if let Some(primary) = replica_of {
            record = record.with_target(primary.as_str());
        }
        if let Some(err) = error {
            record = record.with_error(err.code(), err.to_string());
        }
        if let Err(err) = self.audit.append(&record) {
            Logger::warn("AUDIT_APPEND_FAILED", &[("error", &err.to_string())]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provisioning::SnapshotDataset;
    use crate::topology::{shared, LogPosition, Topology};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        calls: Mutex<Vec<String>>,
        fail_create: Option<String>,
        snapshot_id: Option<String>,
    }

    impl Recording {
        fn with_snapshot(snapshot_id: &str) -> Self {
            Self {
                snapshot_id: Some(snapshot_id.to_string()),
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Provisioner for Recording {
        fn get_replication_primary_snapshot(
            &self,
            _context: &RequestContext,
            primary: &InstanceId,
            flavor: &str,
            backup_id: Option<&str>,
            replica_number: u32,
        ) -> ProvisioningResult<ReplicationSnapshot> {
            self.calls.lock().unwrap().push(format!(
                "snapshot {} {} {} {}",
                primary,
                flavor,
                backup_id.unwrap_or("-"),
                replica_number
            ));
            Ok(ReplicationSnapshot {
                dataset: SnapshotDataset {
                    snapshot_id: self.snapshot_id.clone(),
                },
                log_position: LogPosition::new("2a", 40),
            })
        }

        fn create_instance(
            &self,
            _context: &RequestContext,
            id: &InstanceId,
            _request: &CreateRequest,
            snapshot: Option<&ReplicationSnapshot>,
        ) -> ProvisioningResult<()> {
            self.calls.lock().unwrap().push(format!(
                "create {} {}",
                id,
                if snapshot.is_some() { "replica" } else { "single" }
            ));
            if self.fail_create.as_deref() == Some(id.as_str()) {
                return Err(ProvisioningError::backend("boot failed"));
            }
            Ok(())
        }

        fn delete_backup(&self, _context: &RequestContext, backup_id: &str) -> ProvisioningResult<()> {
            self.calls.lock().unwrap().push(format!("delete {}", backup_id));
            Ok(())
        }
    }

    fn ids(names: &[&str]) -> Vec<InstanceId> {
        names.iter().map(|name| InstanceId::new(*name)).collect()
    }

    fn fleet() -> SharedTopology {
        let topology: Topology = [Instance::primary("p"), Instance::standalone("solo")]
            .into_iter()
            .collect();
        shared(topology)
    }

    #[test]
    fn test_multiple_non_replica_rejected_before_backend() {
        let topology = fleet();
        let provisioning = ReplicaProvisioning::new(Recording::default(), Arc::clone(&topology));

        let err = provisioning
            .create_instances(&RequestContext::new(), &ids(&["a", "b"]), &CreateRequest::new("x", "small"), None)
            .unwrap_err();

        assert_eq!(err, ProvisioningError::MultipleNonReplica);
        assert_eq!(err.to_string(), "cannot create multiple non-replica instances");
        assert!(provisioning.provisioner().calls().is_empty());
        assert_eq!(topology::read_lock(&topology).len(), 2);
    }

    #[test]
    fn test_single_instance() {
        let topology = fleet();
        let provisioning = ReplicaProvisioning::new(Recording::default(), Arc::clone(&topology));

        let created = provisioning
            .create_instances(&RequestContext::new(), &ids(&["a"]), &CreateRequest::new("x", "small"), None)
            .unwrap();

        assert_eq!(created, ids(&["a"]));
        assert_eq!(provisioning.provisioner().calls(), vec!["create a single"]);
        let arena = topology::read_lock(&topology);
        let record = arena.get(&InstanceId::new("a")).unwrap();
        assert_eq!(record.role, Role::Standalone);
        assert!(record.task_status.is_idle());
    }

    #[test]
    fn test_replicas_share_one_snapshot_and_backup_is_deleted() {
        let topology = fleet();
        let provisioning =
            ReplicaProvisioning::new(Recording::with_snapshot("tmp-backup"), Arc::clone(&topology));
        let request = CreateRequest::new("x", "small").with_backup("base-backup");

        provisioning
            .create_instances(
                &RequestContext::new(),
                &ids(&["a", "b"]),
                &request,
                Some(&InstanceId::new("p")),
            )
            .unwrap();

        assert_eq!(
            provisioning.provisioner().calls(),
            vec![
                "snapshot p small base-backup 1",
                "create a replica",
                "create b replica",
                "delete tmp-backup",
            ]
        );
        let arena = topology::read_lock(&topology);
        assert_eq!(arena.replicas_of(&InstanceId::new("p")), ids(&["a", "b"]));
        assert!(arena.is_consistent());
        assert_eq!(
            arena.get(&InstanceId::new("b")).unwrap().log_position,
            LogPosition::new("2a", 40)
        );
    }

    #[test]
    fn test_backup_deleted_when_creation_fails() {
        let topology = fleet();
        let provisioner = Recording {
            fail_create: Some("a".to_string()),
            ..Recording::with_snapshot("tmp-backup")
        };
        let provisioning = ReplicaProvisioning::new(provisioner, Arc::clone(&topology));

        let err = provisioning
            .create_instances(
                &RequestContext::new(),
                &ids(&["a", "b"]),
                &CreateRequest::new("x", "small"),
                Some(&InstanceId::new("p")),
            )
            .unwrap_err();

        assert_eq!(err.code(), "AERO_PROVISION_BACKEND");
        assert_eq!(
            provisioning.provisioner().calls(),
            vec!["snapshot p small - 1", "create a replica", "delete tmp-backup"]
        );
        let arena = topology::read_lock(&topology);
        assert_eq!(
            arena.get(&InstanceId::new("a")).unwrap().task_status,
            TaskStatus::Building
        );
        assert!(arena.replicas_of(&InstanceId::new("p")).is_empty());
    }

    #[test]
    fn test_standalone_source_becomes_primary() {
        let topology = fleet();
        let provisioning = ReplicaProvisioning::new(Recording::default(), Arc::clone(&topology));

        provisioning
            .create_instances(
                &RequestContext::new(),
                &ids(&["a"]),
                &CreateRequest::new("x", "small"),
                Some(&InstanceId::new("solo")),
            )
            .unwrap();

        let arena = topology::read_lock(&topology);
        assert_eq!(arena.get(&InstanceId::new("solo")).unwrap().role, Role::Primary);
        assert!(arena.is_consistent());
        // No temporary backup was reported, so none is deleted.
        assert!(!provisioning
            .provisioner()
            .calls()
            .iter()
            .any(|call| call.starts_with("delete")));
    }

    #[test]
    fn test_source_validation() {
        let topology = fleet();
        topology::write_lock(&topology).insert(Instance::standalone("r"));
        topology::write_lock(&topology).attach(&InstanceId::new("r"), &InstanceId::new("p"));
        let provisioning = ReplicaProvisioning::new(Recording::default(), Arc::clone(&topology));
        let context = RequestContext::new();
        let request = CreateRequest::new("x", "small");

        let err = provisioning
            .create_instances(&context, &ids(&["a"]), &request, Some(&InstanceId::new("r")))
            .unwrap_err();
        assert_eq!(err, ProvisioningError::InvalidSource(InstanceId::new("r")));

        let err = provisioning
            .create_instances(&context, &ids(&["a"]), &request, Some(&InstanceId::new("ghost")))
            .unwrap_err();
        assert_eq!(err.code(), "AERO_INSTANCE_NOT_FOUND");

        let err = provisioning
            .create_instances(&context, &ids(&["p"]), &request, None)
            .unwrap_err();
        assert_eq!(err, ProvisioningError::AlreadyExists(InstanceId::new("p")));
        assert!(provisioning.provisioner().calls().is_empty());
    }

    #[test]
    fn test_audit_names_operator() {
        let topology = fleet();
        let audit = MemoryAuditLog::new();
        let provisioning = ReplicaProvisioning::new(Recording::default(), topology)
            .with_audit_log(Arc::new(audit.clone()));
        let context = RequestContext::new().with_operator("ops-alice");

        provisioning
            .create_instances(&context, &ids(&["a"]), &CreateRequest::new("x", "small"), None)
            .unwrap();

        let records = audit.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].operator.as_deref(), Some("ops-alice"));
        assert_eq!(records[1].request_id, Some(context.request_id));
    }
}
