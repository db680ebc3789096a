//! Active Operations
//!
//! One workflow at a time per instance. A workflow claims every instance it
//! touches up front; the claim is all-or-nothing and is released when the
//! returned [`OperationClaim`] is dropped.

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::errors::{OrchestratorError, OrchestratorResult};
use crate::topology::{InstanceId, TaskStatus};

/// Kind of topology workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Promote,
    Eject,
    Detach,
    Provision,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Promote => "promote",
            OperationKind::Eject => "eject",
            OperationKind::Detach => "detach",
            OperationKind::Provision => "provision",
        }
    }

    /// Marker set on touched instances while the workflow runs.
    pub fn task_status(&self) -> TaskStatus {
        match self {
            OperationKind::Promote => TaskStatus::Promoting,
            OperationKind::Eject => TaskStatus::Ejecting,
            OperationKind::Provision => TaskStatus::Building,
            OperationKind::Detach => TaskStatus::None,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type Registry = Arc<Mutex<HashMap<InstanceId, OperationKind>>>;

fn lock(registry: &Registry) -> MutexGuard<'_, HashMap<InstanceId, OperationKind>> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Registry of instances held by running workflows.
#[derive(Debug, Clone, Default)]
pub struct ActiveOperations {
    registry: Registry,
}

impl ActiveOperations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim every instance in `instances` for `kind`.
    ///
    /// Fails with `OperationInProgress` naming the first held instance;
    /// nothing is claimed in that case.
    pub fn claim(
        &self,
        kind: OperationKind,
        instances: &[InstanceId],
    ) -> OrchestratorResult<OperationClaim> {
        let mut registry = lock(&self.registry);
        if let Some((instance, held)) = instances
            .iter()
            .find_map(|id| registry.get(id).map(|held| (id, *held)))
        {
            return Err(OrchestratorError::OperationInProgress {
                instance: instance.clone(),
                operation: held.as_str(),
            });
        }

        let mut claimed = Vec::with_capacity(instances.len());
        for id in instances {
            if registry.insert(id.clone(), kind).is_none() {
                claimed.push(id.clone());
            }
        }

        Ok(OperationClaim {
            registry: Arc::clone(&self.registry),
            kind,
            instances: claimed,
        })
    }

    /// Operation currently holding `id`.
    pub fn holder(&self, id: &InstanceId) -> Option<OperationKind> {
        lock(&self.registry).get(id).copied()
    }

    pub fn is_idle(&self) -> bool {
        lock(&self.registry).is_empty()
    }
}

/// Instances held by one workflow. Released on drop.
#[derive(Debug)]
pub struct OperationClaim {
    registry: Registry,
    kind: OperationKind,
    instances: Vec<InstanceId>,
}

impl OperationClaim {
    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn instances(&self) -> &[InstanceId] {
        &self.instances
    }
}

impl Drop for OperationClaim {
    fn drop(&mut self) {
        let mut registry = lock(&self.registry);
        for id in &self.instances {
            registry.remove(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<InstanceId> {
        names.iter().map(|name| InstanceId::new(*name)).collect()
    }

    #[test]
    fn test_claim_and_release() {
        let active = ActiveOperations::new();
        let claim = active.claim(OperationKind::Promote, &ids(&["p", "r1"])).unwrap();

        assert_eq!(claim.kind(), OperationKind::Promote);
        assert_eq!(active.holder(&InstanceId::new("r1")), Some(OperationKind::Promote));

        drop(claim);
        assert!(active.is_idle());
    }

    #[test]
    fn test_overlapping_claim_rejected() {
        let active = ActiveOperations::new();
        let _held = active.claim(OperationKind::Eject, &ids(&["p", "r1"])).unwrap();

        let err = active
            .claim(OperationKind::Detach, &ids(&["r2", "r1"]))
            .unwrap_err();
        assert_eq!(
            err,
            OrchestratorError::OperationInProgress {
                instance: InstanceId::new("r1"),
                operation: "eject",
            }
        );
        // All-or-nothing: r2 was not claimed.
        assert_eq!(active.holder(&InstanceId::new("r2")), None);
    }

    #[test]
    fn test_disjoint_claims_coexist() {
        let active = ActiveOperations::new();
        let _a = active.claim(OperationKind::Detach, &ids(&["r1"])).unwrap();
        let _b = active.claim(OperationKind::Detach, &ids(&["r2"])).unwrap();
        assert!(!active.is_idle());
    }

    #[test]
    fn test_duplicate_ids_in_one_claim() {
        let active = ActiveOperations::new();
        let claim = active.claim(OperationKind::Promote, &ids(&["p", "p"])).unwrap();
        assert_eq!(claim.instances().len(), 1);
        drop(claim);
        assert!(active.is_idle());
    }

    #[test]
    fn test_kind_markers() {
        assert_eq!(OperationKind::Promote.task_status(), TaskStatus::Promoting);
        assert_eq!(OperationKind::Eject.task_status(), TaskStatus::Ejecting);
        assert_eq!(OperationKind::Provision.task_status(), TaskStatus::Building);
    }
}
