//! Topology Orchestrator
//!
//! Runs promote, eject and detach against one fleet arena.
//!
//! Every workflow:
//! 1. Validates the request against the arena (no remote call yet)
//! 2. Claims every instance it touches in [`ActiveOperations`]
//! 3. Loads handles, then marks the touched instances with its task status
//! 4. Issues handle calls one at a time, mirroring each success in the arena
//! 5. Clears the task status on success
//!
//! Non-Responsibilities:
//! - No retry, no timeout, no rollback of completed steps. An unwrapped
//!   remote error after the old primary was attached leaves it a replica
//!   that still lists the unreached siblings, which `violations()` reports
//! - No parallel fan-out across replicas
//!
//! Failure interpretation during re-pointing:
//! - An operation-failed error becomes `ReplicaAttach` naming the instance;
//!   instances already processed get their status cleared first
//! - Any other remote error is returned unchanged, with no status cleanup
//! - Demote wraps every error as `ReplicaAttach` naming the old primary

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use super::active::{ActiveOperations, OperationKind};
use super::errors::{OrchestratorError, OrchestratorResult};
use super::selector::ReplicaSelector;
use super::status::TaskStatusTracker;
use crate::config::OrchestratorConfig;
use crate::handle::{HandleError, HandleLoader, InstanceHandle};
use crate::observability::{
    log_event, AuditAction, AuditLog, AuditOutcome, AuditRecord, Event, Logger, MemoryAuditLog,
    ObservationScope, OperationMetrics,
};
use crate::topology::{self, Instance, InstanceId, Role, SharedTopology, Topology};

/// Outcome of a promote or eject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailoverReport {
    pub operation: OperationKind,
    pub new_primary: InstanceId,
    pub old_primary: InstanceId,
    /// Siblings re-pointed at the new primary, in replica-set order.
    pub repointed: Vec<InstanceId>,
}

/// Outcome of a detach.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DetachReport {
    pub replica: InstanceId,
    pub former_primary: InstanceId,
}

/// Records resolved from the arena for one failover.
struct FailoverPlan {
    old_primary: Instance,
    candidates: Vec<Instance>,
}

impl FailoverPlan {
    fn touched(&self) -> Vec<InstanceId> {
        std::iter::once(&self.old_primary)
            .chain(self.candidates.iter())
            .map(|instance| instance.id.clone())
            .collect()
    }
}

/// Correlation data for one workflow invocation.
struct Request {
    id: Uuid,
    kind: OperationKind,
    subject: InstanceId,
    scope: ObservationScope,
}

pub struct TopologyOrchestrator<L: HandleLoader> {
    loader: L,
    topology: SharedTopology,
    tracker: TaskStatusTracker,
    active: ActiveOperations,
    selector: ReplicaSelector,
    config: OrchestratorConfig,
    audit: Arc<dyn AuditLog>,
    metrics: Arc<OperationMetrics>,
}

impl<L: HandleLoader> TopologyOrchestrator<L> {
    pub fn new(loader: L, topology: SharedTopology, config: OrchestratorConfig) -> Self {
        Self {
            loader,
            tracker: TaskStatusTracker::new(Arc::clone(&topology)),
            topology,
            active: ActiveOperations::new(),
            selector: ReplicaSelector::new(),
            config,
            audit: Arc::new(MemoryAuditLog::new()),
            metrics: Arc::new(OperationMetrics::new()),
        }
    }

    pub fn with_audit_log(mut self, audit: Arc<dyn AuditLog>) -> Self {
        self.audit = audit;
        self
    }

    /// Share an exclusivity registry with other components (provisioning).
    pub fn with_active_operations(mut self, active: ActiveOperations) -> Self {
        self.active = active;
        self
    }

    /// Copy of the arena as it stands.
    pub fn topology(&self) -> Topology {
        topology::read_lock(&self.topology).clone()
    }

    pub fn shared_topology(&self) -> SharedTopology {
        Arc::clone(&self.topology)
    }

    pub fn tracker(&self) -> &TaskStatusTracker {
        &self.tracker
    }

    pub fn active_operations(&self) -> &ActiveOperations {
        &self.active
    }

    pub fn metrics(&self) -> &OperationMetrics {
        &self.metrics
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    // =========================================================================
    // WORKFLOWS
    // =========================================================================

    /// Promote `target` to primary of its current topology.
    ///
    /// The old primary is re-pointed at `target` and demoted; every sibling
    /// is re-pointed at `target` and stays read-only.
    pub fn promote(&self, target: &InstanceId) -> OrchestratorResult<FailoverReport> {
        let request = self.begin(OperationKind::Promote, target);
        let result = self.run_promote(target);
        self.finish(request, &result, |report| {
            self.metrics.increment_promotions();
            report.new_primary.to_string()
        });
        result
    }

    /// Replace `primary` by its most current replica.
    ///
    /// Refused while the primary still heartbeats within the configured
    /// grace period.
    pub fn eject(&self, primary: &InstanceId) -> OrchestratorResult<FailoverReport> {
        let request = self.begin(OperationKind::Eject, primary);
        let result = self.run_eject(primary);
        self.finish(request, &result, |report| {
            self.metrics.increment_ejections();
            report.new_primary.to_string()
        });
        result
    }

    /// Remove `replica` from its topology. It ends up standalone and writable.
    pub fn detach(&self, replica: &InstanceId) -> OrchestratorResult<DetachReport> {
        let request = self.begin(OperationKind::Detach, replica);
        let result = self.run_detach(replica);
        self.finish(request, &result, |report| {
            self.metrics.increment_detaches();
            report.former_primary.to_string()
        });
        result
    }

    /// Run the election for `primary` without changing anything.
    pub fn elect(&self, primary: &InstanceId) -> OrchestratorResult<InstanceId> {
        let plan = self.plan_eject(primary)?;
        let handles = self.load_all(&plan.candidates)?;
        let index = self.selector.most_current_index(primary, &handles)?;
        self.metrics.increment_elections();
        Ok(handles[index].id().clone())
    }

    fn run_promote(&self, target: &InstanceId) -> OrchestratorResult<FailoverReport> {
        let plan = self.plan_promote(target)?;
        let _claim = self.active.claim(OperationKind::Promote, &plan.touched())?;

        let old_primary = self.loader.load(&plan.old_primary)?;
        let mut handles = self.load_all(&plan.candidates)?;
        // plan_promote lists the target first
        let target = handles.remove(0);

        self.tracker
            .set(&plan.touched(), OperationKind::Promote.task_status());
        self.run_failover(OperationKind::Promote, &old_primary, &target, &handles)
    }

    fn run_eject(&self, primary: &InstanceId) -> OrchestratorResult<FailoverReport> {
        let plan = self.plan_eject(primary)?;
        self.check_heartbeat(&plan.old_primary)?;
        let _claim = self.active.claim(OperationKind::Eject, &plan.touched())?;

        let old_primary = self.loader.load(&plan.old_primary)?;
        let mut handles = self.load_all(&plan.candidates)?;
        let index = self.selector.most_current_index(primary, &handles)?;
        self.metrics.increment_elections();
        let target = handles.remove(index);

        self.tracker
            .set(&plan.touched(), OperationKind::Eject.task_status());
        self.run_failover(OperationKind::Eject, &old_primary, &target, &handles)
    }

    fn run_detach(&self, replica: &InstanceId) -> OrchestratorResult<DetachReport> {
        let (record, primary) = {
            let arena = topology::read_lock(&self.topology);
            let record = find(&arena, replica)?;
            let primary = match (&record.role, &record.primary) {
                (Role::Replica, Some(primary)) => primary.clone(),
                _ => {
                    return Err(OrchestratorError::invalid_request(format!(
                        "{} is not a replica",
                        replica
                    )))
                }
            };
            find(&arena, &primary)?;
            (record, primary)
        };
        let _claim = self
            .active
            .claim(OperationKind::Detach, &[replica.clone(), primary.clone()])?;

        let handle = self.loader.load(&record)?;
        handle.detach_replica(&primary, false)?;
        topology::write_lock(&self.topology).detach(replica);
        log_event(
            Event::ReplicaDetached,
            &[("primary", primary.as_str()), ("replica", replica.as_str())],
        );

        Ok(DetachReport {
            replica: replica.clone(),
            former_primary: primary,
        })
    }

    // =========================================================================
    // FAILOVER SEQUENCE
    // =========================================================================

    fn run_failover(
        &self,
        kind: OperationKind,
        old_primary: &L::Handle,
        target: &L::Handle,
        siblings: &[L::Handle],
    ) -> OrchestratorResult<FailoverReport> {
        let old_id = old_primary.id();
        let target_id = target.id();
        let mut processed: Vec<InstanceId> = Vec::new();

        target
            .detach_replica(old_id, true)
            .map_err(|err| self.step_failure(&processed, target_id, err))?;
        {
            let mut arena = topology::write_lock(&self.topology);
            arena.detach(target_id);
            arena.set_role(target_id, Role::Primary);
        }
        old_primary
            .attach_replica(target_id)
            .map_err(|err| self.step_failure(&processed, old_id, err))?;
        topology::write_lock(&self.topology).attach(old_id, target_id);
        target
            .make_read_only(false)
            .map_err(|err| self.step_failure(&processed, target_id, err))?;
        log_event(Event::PrimaryWritable, &[("instance", target_id.as_str())]);
        processed.push(target_id.clone());

        let mut repointed = Vec::with_capacity(siblings.len());
        for sibling in siblings {
            let sibling_id = sibling.id();
            sibling
                .detach_replica(old_id, true)
                .map_err(|err| self.step_failure(&processed, sibling_id, err))?;
            topology::write_lock(&self.topology).detach(sibling_id);
            sibling
                .attach_replica(target_id)
                .map_err(|err| self.step_failure(&processed, sibling_id, err))?;
            topology::write_lock(&self.topology).attach(sibling_id, target_id);
            log_event(
                Event::ReplicaAttached,
                &[("primary", target_id.as_str()), ("replica", sibling_id.as_str())],
            );
            processed.push(sibling_id.clone());
            repointed.push(sibling_id.clone());
        }

        old_primary
            .demote_replication_primary()
            .map_err(|err| self.attach_failure(&processed, old_id, err))?;
        log_event(Event::PrimaryDemoted, &[("instance", old_id.as_str())]);

        let mut touched = vec![old_id.clone(), target_id.clone()];
        touched.extend(repointed.iter().cloned());
        self.tracker.clear(&touched);

        Ok(FailoverReport {
            operation: kind,
            new_primary: target_id.clone(),
            old_primary: old_id.clone(),
            repointed,
        })
    }

    /// Interpret a failed detach/attach/read-only step.
    fn step_failure(
        &self,
        processed: &[InstanceId],
        instance: &InstanceId,
        err: HandleError,
    ) -> OrchestratorError {
        if err.is_operation_failed() {
            return self.attach_failure(processed, instance, err);
        }
        self.metrics.increment_unexpected_faults();
        log_event(
            Event::RemoteFault,
            &[
                ("code", err.code()),
                ("error", &err.to_string()),
                ("instance", instance.as_str()),
            ],
        );
        OrchestratorError::Remote(err)
    }

    /// Wrap `err` as a replica attach failure on `instance`.
    fn attach_failure(
        &self,
        processed: &[InstanceId],
        instance: &InstanceId,
        err: HandleError,
    ) -> OrchestratorError {
        self.tracker.clear(processed);
        self.metrics.increment_attach_failures();
        log_event(
            Event::ReplicaAttachFailed,
            &[
                ("error", &err.to_string()),
                ("instance", instance.as_str()),
                ("processed", &processed.len().to_string()),
            ],
        );
        OrchestratorError::ReplicaAttach {
            instance: instance.clone(),
            source: err,
        }
    }

    // =========================================================================
    // PLANNING
    // =========================================================================

    /// Target first, then its siblings in replica-set order.
    fn plan_promote(&self, target: &InstanceId) -> OrchestratorResult<FailoverPlan> {
        let arena = topology::read_lock(&self.topology);
        let record = find(&arena, target)?;
        if record.is_primary() {
            return Err(OrchestratorError::invalid_request(format!(
                "{} is already a primary",
                target
            )));
        }
        let old_id = match (&record.role, &record.primary) {
            (Role::Replica, Some(primary)) => primary.clone(),
            _ => {
                return Err(OrchestratorError::invalid_request(format!(
                    "{} is not a replica",
                    target
                )))
            }
        };
        let old_primary = find(&arena, &old_id)?;
        if !old_primary.is_primary() {
            return Err(OrchestratorError::invalid_request(format!(
                "{} replicates from {}, which is not a primary",
                target, old_id
            )));
        }

        let mut candidates = vec![record];
        for id in old_primary.replicas.iter().filter(|id| *id != target) {
            candidates.push(find(&arena, id)?);
        }
        Ok(FailoverPlan {
            old_primary,
            candidates,
        })
    }

    /// All replicas of `primary` in replica-set order.
    fn plan_eject(&self, primary: &InstanceId) -> OrchestratorResult<FailoverPlan> {
        let arena = topology::read_lock(&self.topology);
        let record = find(&arena, primary)?;
        if !record.is_primary() {
            return Err(OrchestratorError::invalid_request(format!(
                "{} is not a primary",
                primary
            )));
        }
        if record.replicas.is_empty() {
            return Err(OrchestratorError::invalid_request(format!(
                "{} has no replica to promote",
                primary
            )));
        }

        let candidates = record
            .replicas
            .iter()
            .map(|id| find(&arena, id))
            .collect::<OrchestratorResult<Vec<_>>>()?;
        Ok(FailoverPlan {
            old_primary: record,
            candidates,
        })
    }

    fn check_heartbeat(&self, primary: &Instance) -> OrchestratorResult<()> {
        let Some(last) = primary.last_heartbeat else {
            return Ok(());
        };
        let age = Utc::now() - last;
        if age < self.config.heartbeat_grace() {
            return Err(OrchestratorError::invalid_request(format!(
                "{} sent a heartbeat {}s ago; eject requires {}s of silence",
                primary.id,
                age.num_seconds().max(0),
                self.config.eject_heartbeat_grace_secs
            )));
        }
        Ok(())
    }

    fn load_all(&self, records: &[Instance]) -> OrchestratorResult<Vec<L::Handle>> {
        records
            .iter()
            .map(|record| self.loader.load(record).map_err(OrchestratorError::from))
            .collect()
    }

    // =========================================================================
    // AUDIT
    // =========================================================================

    fn begin(&self, kind: OperationKind, subject: &InstanceId) -> Request {
        let scope = ObservationScope::with_fields(
            kind_scope(kind),
            &[("instance", subject.as_str())],
        );
        let request = Request {
            id: Uuid::new_v4(),
            kind,
            subject: subject.clone(),
            scope,
        };
        self.append(
            AuditRecord::new(AuditAction::OperationRequested, AuditOutcome::Pending),
            &request,
        );
        request
    }

    fn finish<T>(
        &self,
        request: Request,
        result: &OrchestratorResult<T>,
        on_success: impl FnOnce(&T) -> String,
    ) {
        match result {
            Ok(value) => {
                let detail = on_success(value);
                self.append(
                    AuditRecord::new(AuditAction::OperationExecuted, AuditOutcome::Success)
                        .with_detail(detail.clone()),
                    &request,
                );
                request.scope.complete_with_fields(&[("result", &detail)]);
            }
            Err(err) => {
                let (action, outcome) = if err.is_rejection() {
                    self.metrics.increment_rejected_requests();
                    let event = match err {
                        OrchestratorError::OperationInProgress { .. } => Event::OperationConflict,
                        _ => Event::RequestRejected,
                    };
                    log_event(
                        event,
                        &[
                            ("code", err.code()),
                            ("instance", request.subject.as_str()),
                            ("operation", request.kind.as_str()),
                        ],
                    );
                    (AuditAction::OperationRejected, AuditOutcome::Rejected)
                } else {
                    (AuditAction::OperationFailed, AuditOutcome::Failed)
                };
                self.append(
                    AuditRecord::new(action, outcome).with_error(err.code(), err.to_string()),
                    &request,
                );
                request.scope.fail(err.code(), &err.to_string());
            }
        }
    }

    fn append(&self, record: AuditRecord, request: &Request) {
        let record = record
            .with_operation(request.kind.as_str())
            .with_target(request.subject.as_str())
            .with_request_id(request.id);
        if let Err(err) = self.audit.append(&record) {
            Logger::warn("AUDIT_APPEND_FAILED", &[("error", &err.to_string())]);
        }
    }
}

fn kind_scope(kind: OperationKind) -> &'static str {
    match kind {
        OperationKind::Promote => "PROMOTE",
        OperationKind::Eject => "EJECT",
        OperationKind::Detach => "DETACH",
        OperationKind::Provision => "PROVISION",
    }
}

fn find(arena: &Topology, id: &InstanceId) -> OrchestratorResult<Instance> {
    arena
        .get(id)
        .cloned()
        .ok_or_else(|| OrchestratorError::NotFound(id.clone()))
}
