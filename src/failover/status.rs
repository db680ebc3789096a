//! Task Status Tracker
//!
//! Sets and clears the transient per-instance marker that tells observers
//! an operation is in flight. Every write takes the arena lock, so two
//! workflows never interleave on the same record.

use crate::observability::{log_event, Event};
use crate::topology::{self, InstanceId, SharedTopology, TaskStatus};

#[derive(Clone)]
pub struct TaskStatusTracker {
    topology: SharedTopology,
}

impl TaskStatusTracker {
    pub fn new(topology: SharedTopology) -> Self {
        Self { topology }
    }

    /// Mark every listed instance with `status`. Unknown ids are skipped.
    pub fn set(&self, instances: &[InstanceId], status: TaskStatus) {
        let mut arena = topology::write_lock(&self.topology);
        for id in instances {
            if let Some(previous) = arena.set_task_status(id, status) {
                if previous != status {
                    log_event(
                        Event::TaskStatusChanged,
                        &[
                            ("from", previous.as_str()),
                            ("instance", id.as_str()),
                            ("to", status.as_str()),
                        ],
                    );
                }
            }
        }
    }

    /// Reset every listed instance to idle.
    pub fn clear(&self, instances: &[InstanceId]) {
        self.set(instances, TaskStatus::None);
    }

    pub fn status(&self, id: &InstanceId) -> Option<TaskStatus> {
        topology::read_lock(&self.topology).task_status(id)
    }

    /// Instances with a non-idle marker, in id order.
    pub fn in_flight(&self) -> Vec<(InstanceId, TaskStatus)> {
        topology::read_lock(&self.topology)
            .iter()
            .filter(|instance| !instance.task_status.is_idle())
            .map(|instance| (instance.id.clone(), instance.task_status))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::{shared, Instance, Topology};

    fn tracker() -> TaskStatusTracker {
        let topology: Topology = [Instance::primary("p"), Instance::standalone("s")]
            .into_iter()
            .collect();
        TaskStatusTracker::new(shared(topology))
    }

    #[test]
    fn test_set_and_clear() {
        let tracker = tracker();
        let ids = [InstanceId::new("p"), InstanceId::new("s")];

        tracker.set(&ids, TaskStatus::Ejecting);
        assert_eq!(tracker.status(&ids[0]), Some(TaskStatus::Ejecting));
        assert_eq!(tracker.in_flight().len(), 2);

        tracker.clear(&ids[..1]);
        assert_eq!(tracker.status(&ids[0]), Some(TaskStatus::None));
        assert_eq!(tracker.in_flight(), vec![(ids[1].clone(), TaskStatus::Ejecting)]);
    }

    #[test]
    fn test_unknown_instance_is_ignored() {
        let tracker = tracker();
        tracker.set(&[InstanceId::new("ghost")], TaskStatus::Promoting);

        assert_eq!(tracker.status(&InstanceId::new("ghost")), None);
        assert!(tracker.in_flight().is_empty());
    }

    #[test]
    fn test_clones_share_the_arena() {
        let tracker = tracker();
        let observer = tracker.clone();

        tracker.set(&[InstanceId::new("s")], TaskStatus::Building);
        assert_eq!(observer.status(&InstanceId::new("s")), Some(TaskStatus::Building));
    }
}
