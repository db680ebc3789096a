//! Instance Arena
//!
//! All instance records of a fleet, addressed by id. The primary/replica
//! relationship is stored twice (back-reference on the replica, forward set
//! on the primary); every mutator here keeps both sides in step.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use chrono::{DateTime, Utc};

use super::instance::{Instance, InstanceId, LogPosition, Role, TaskStatus};

/// A broken structural invariant found by [`Topology::violations`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopologyViolation {
    #[error("replica {replica} points at unknown primary {primary}")]
    DanglingPrimary {
        replica: InstanceId,
        primary: InstanceId,
    },

    #[error("replica {replica} points at {primary}, which is not a primary")]
    PrimaryNotPrimary {
        replica: InstanceId,
        primary: InstanceId,
    },

    #[error("replica {replica} is missing from the replica set of {primary}")]
    MissingForwardReference {
        replica: InstanceId,
        primary: InstanceId,
    },

    #[error("{primary} lists {replica} as a replica, but {replica} does not replicate from it")]
    StaleForwardReference {
        primary: InstanceId,
        replica: InstanceId,
    },

    #[error("{instance} is not a primary but has replicas")]
    NonPrimaryWithReplicas { instance: InstanceId },

    #[error("primary {instance} replicates from {primary}")]
    PrimaryWithPrimary {
        instance: InstanceId,
        primary: InstanceId,
    },
}

/// Arena of instance records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "TopologySnapshot", into = "TopologySnapshot")]
pub struct Topology {
    instances: BTreeMap<InstanceId, Instance>,
}

/// On-disk layout: a flat list of records.
#[derive(Serialize, Deserialize)]
struct TopologySnapshot {
    #[serde(default)]
    instances: Vec<Instance>,
}

impl From<TopologySnapshot> for Topology {
    fn from(snapshot: TopologySnapshot) -> Self {
        snapshot.instances.into_iter().collect()
    }
}

impl From<Topology> for TopologySnapshot {
    fn from(topology: Topology) -> Self {
        Self {
            instances: topology.instances.into_values().collect(),
        }
    }
}

impl FromIterator<Instance> for Topology {
    fn from_iter<I: IntoIterator<Item = Instance>>(iter: I) -> Self {
        let mut topology = Self::new();
        for instance in iter {
            topology.insert(instance);
        }
        topology
    }
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a record as-is. Returns the previous record.
    pub fn insert(&mut self, instance: Instance) -> Option<Instance> {
        self.instances.insert(instance.id.clone(), instance)
    }

    pub fn get(&self, id: &InstanceId) -> Option<&Instance> {
        self.instances.get(id)
    }

    pub fn contains(&self, id: &InstanceId) -> bool {
        self.instances.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Records in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Instance> {
        self.instances.values()
    }

    /// Replica ids of `primary` in attach order. Empty for unknown ids.
    pub fn replicas_of(&self, primary: &InstanceId) -> Vec<InstanceId> {
        self.instances
            .get(primary)
            .map(|instance| instance.replicas.to_vec())
            .unwrap_or_default()
    }

    /// Primary of `replica`, if it has one.
    pub fn primary_of(&self, replica: &InstanceId) -> Option<&InstanceId> {
        self.instances.get(replica).and_then(|instance| instance.primary.as_ref())
    }

    /// Point `replica` at `primary`, updating both sides.
    ///
    /// The replica is removed from its previous primary's forward set and
    /// takes the `Replica` role. The primary's role is left unchanged.
    pub fn attach(&mut self, replica: &InstanceId, primary: &InstanceId) {
        if !self.contains(replica) || !self.contains(primary) {
            return;
        }
        self.unlink(replica);
        if let Some(record) = self.instances.get_mut(replica) {
            record.primary = Some(primary.clone());
            record.role = Role::Replica;
        }
        if let Some(record) = self.instances.get_mut(primary) {
            record.replicas.insert(replica.clone());
        }
    }

    /// Sever `replica` from its primary. The replica becomes standalone.
    pub fn detach(&mut self, replica: &InstanceId) {
        self.unlink(replica);
        if let Some(record) = self.instances.get_mut(replica) {
            if record.role == Role::Replica {
                record.role = Role::Standalone;
            }
        }
    }

    fn unlink(&mut self, replica: &InstanceId) {
        let previous = match self.instances.get_mut(replica) {
            Some(record) => record.primary.take(),
            None => return,
        };
        if let Some(previous) = previous {
            if let Some(record) = self.instances.get_mut(&previous) {
                record.replicas.remove(replica);
            }
        }
    }

    pub fn set_role(&mut self, id: &InstanceId, role: Role) {
        if let Some(record) = self.instances.get_mut(id) {
            record.role = role;
        }
    }

    /// Set the task status. Returns the previous one.
    pub fn set_task_status(&mut self, id: &InstanceId, status: TaskStatus) -> Option<TaskStatus> {
        self.instances
            .get_mut(id)
            .map(|record| std::mem::replace(&mut record.task_status, status))
    }

    pub fn task_status(&self, id: &InstanceId) -> Option<TaskStatus> {
        self.instances.get(id).map(|record| record.task_status)
    }

    pub fn set_log_position(&mut self, id: &InstanceId, position: LogPosition) {
        if let Some(record) = self.instances.get_mut(id) {
            record.log_position = position;
        }
    }

    pub fn record_heartbeat(&mut self, id: &InstanceId, at: DateTime<Utc>) {
        if let Some(record) = self.instances.get_mut(id) {
            record.last_heartbeat = Some(at);
        }
    }

    /// Check every structural invariant. Empty means consistent.
    pub fn violations(&self) -> Vec<TopologyViolation> {
        let mut violations = Vec::new();

        for instance in self.instances.values() {
            if let Some(primary_id) = &instance.primary {
                if instance.role == Role::Primary {
                    violations.push(TopologyViolation::PrimaryWithPrimary {
                        instance: instance.id.clone(),
                        primary: primary_id.clone(),
                    });
                }
                match self.instances.get(primary_id) {
                    None => violations.push(TopologyViolation::DanglingPrimary {
                        replica: instance.id.clone(),
                        primary: primary_id.clone(),
                    }),
                    Some(primary) => {
                        if primary.role != Role::Primary {
                            violations.push(TopologyViolation::PrimaryNotPrimary {
                                replica: instance.id.clone(),
                                primary: primary_id.clone(),
                            });
                        }
                        if !primary.replicas.contains(&instance.id) {
                            violations.push(TopologyViolation::MissingForwardReference {
                                replica: instance.id.clone(),
                                primary: primary_id.clone(),
                            });
                        }
                    }
                }
            }

            if instance.role != Role::Primary && !instance.replicas.is_empty() {
                violations.push(TopologyViolation::NonPrimaryWithReplicas {
                    instance: instance.id.clone(),
                });
            }

            for replica_id in instance.replicas.iter() {
                let points_back = self
                    .instances
                    .get(replica_id)
                    .and_then(|replica| replica.primary.as_ref())
                    == Some(&instance.id);
                if !points_back {
                    violations.push(TopologyViolation::StaleForwardReference {
                        primary: instance.id.clone(),
                        replica: replica_id.clone(),
                    });
                }
            }
        }

        violations
    }

    /// Check if no structural invariant is broken.
    pub fn is_consistent(&self) -> bool {
        self.violations().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> InstanceId {
        InstanceId::new(s)
    }

    fn three_node() -> Topology {
        let mut topology: Topology = [
            Instance::primary("p"),
            Instance::standalone("r1"),
            Instance::standalone("r2"),
        ]
        .into_iter()
        .collect();
        topology.attach(&id("r1"), &id("p"));
        topology.attach(&id("r2"), &id("p"));
        topology
    }

    #[test]
    fn test_attach_links_both_sides() {
        let topology = three_node();

        assert_eq!(topology.replicas_of(&id("p")), vec![id("r1"), id("r2")]);
        assert_eq!(topology.primary_of(&id("r1")), Some(&id("p")));
        assert_eq!(topology.get(&id("r2")).unwrap().role, Role::Replica);
        assert!(topology.is_consistent());
    }

    #[test]
    fn test_attach_moves_between_primaries() {
        let mut topology = three_node();
        topology.insert(Instance::primary("q"));

        topology.attach(&id("r1"), &id("q"));

        assert_eq!(topology.replicas_of(&id("p")), vec![id("r2")]);
        assert_eq!(topology.replicas_of(&id("q")), vec![id("r1")]);
        assert!(topology.is_consistent());
    }

    #[test]
    fn test_detach_makes_standalone() {
        let mut topology = three_node();

        topology.detach(&id("r1"));

        let r1 = topology.get(&id("r1")).unwrap();
        assert_eq!(r1.role, Role::Standalone);
        assert!(r1.primary.is_none());
        assert_eq!(topology.replicas_of(&id("p")), vec![id("r2")]);
        assert!(topology.is_consistent());
    }

    #[test]
    fn test_attach_unknown_is_noop() {
        let mut topology = three_node();
        topology.attach(&id("ghost"), &id("p"));
        topology.attach(&id("r1"), &id("ghost"));

        assert_eq!(topology.replicas_of(&id("p")), vec![id("r1"), id("r2")]);
        assert_eq!(topology.primary_of(&id("r1")), Some(&id("p")));
    }

    #[test]
    fn test_violation_dangling_primary() {
        let topology: Topology = [Instance::replica_of("r", "missing")].into_iter().collect();

        assert_eq!(
            topology.violations(),
            vec![TopologyViolation::DanglingPrimary {
                replica: id("r"),
                primary: id("missing"),
            }]
        );
    }

    #[test]
    fn test_violation_missing_forward_reference() {
        let topology: Topology = [Instance::primary("p"), Instance::replica_of("r", "p")]
            .into_iter()
            .collect();

        assert!(topology
            .violations()
            .contains(&TopologyViolation::MissingForwardReference {
                replica: id("r"),
                primary: id("p"),
            }));
    }

    #[test]
    fn test_violation_replica_with_replicas() {
        let mut topology = three_node();
        topology.set_role(&id("p"), Role::Replica);

        let violations = topology.violations();
        assert!(violations.contains(&TopologyViolation::NonPrimaryWithReplicas { instance: id("p") }));
        assert!(violations.contains(&TopologyViolation::PrimaryNotPrimary {
            replica: id("r1"),
            primary: id("p"),
        }));
    }

    #[test]
    fn test_task_status_roundtrip() {
        let mut topology = three_node();

        let previous = topology.set_task_status(&id("r1"), TaskStatus::Promoting);
        assert_eq!(previous, Some(TaskStatus::None));
        assert_eq!(topology.task_status(&id("r1")), Some(TaskStatus::Promoting));
        assert_eq!(topology.set_task_status(&id("ghost"), TaskStatus::Promoting), None);
    }

    #[test]
    fn test_snapshot_json_layout() {
        let json = r#"{
            "instances": [
                {"id": "p", "role": "primary", "replicas": ["r"]},
                {"id": "r", "role": "replica", "primary": "p",
                 "log_position": {"lineage": "2a", "sequence": 4}}
            ]
        }"#;
        let topology: Topology = serde_json::from_str(json).unwrap();

        assert_eq!(topology.len(), 2);
        assert!(topology.is_consistent());
        assert_eq!(
            topology.get(&id("r")).unwrap().log_position,
            LogPosition::new("2a", 4)
        );

        let rendered = serde_json::to_value(&topology).unwrap();
        assert_eq!(rendered["instances"].as_array().unwrap().len(), 2);
    }
}
