//! Replica Election
//!
//! Picks the most advanced replica of a primary:
//! - Candidates with a known lineage must all share it
//! - Highest sequence number wins; ties go to the first listed candidate
//! - Unset positions never beat set ones
//! - With no set position at all, the first candidate wins
//!
//! [`elect`] is pure over `(id, position)` pairs. [`ReplicaSelector`] only
//! adds the position queries on top.

use std::collections::BTreeSet;

use super::errors::{OrchestratorError, OrchestratorResult};
use crate::handle::InstanceHandle;
use crate::observability::{log_event, Event};
use crate::topology::{InstanceId, LogPosition};

/// Pick the winning index among `candidates`.
pub fn elect(
    primary: &InstanceId,
    candidates: &[(InstanceId, LogPosition)],
) -> OrchestratorResult<usize> {
    if candidates.is_empty() {
        return Err(OrchestratorError::invalid_request(format!(
            "no replica of {} to elect from",
            primary
        )));
    }

    let lineages: BTreeSet<&str> = candidates
        .iter()
        .filter_map(|(_, position)| position.lineage.as_ref())
        .map(|lineage| lineage.as_str())
        .collect();
    if lineages.len() > 1 {
        let lineages = lineages.into_iter().collect::<Vec<_>>().join(", ");
        log_event(
            Event::TopologyInconsistent,
            &[("primary", primary.as_str()), ("lineages", &lineages)],
        );
        return Err(OrchestratorError::InconsistentTopology {
            primary: primary.clone(),
            lineages,
        });
    }

    let mut best: Option<(usize, u64)> = None;
    for (index, (_, position)) in candidates.iter().enumerate() {
        if !position.is_set() {
            continue;
        }
        match best {
            Some((_, sequence)) if sequence >= position.sequence => {}
            _ => best = Some((index, position.sequence)),
        }
    }

    Ok(best.map(|(index, _)| index).unwrap_or(0))
}

/// Election over live handles.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReplicaSelector;

impl ReplicaSelector {
    pub fn new() -> Self {
        Self
    }

    /// Query every candidate's log position, then elect.
    ///
    /// A failing position query propagates unchanged.
    pub fn most_current_index<H: InstanceHandle>(
        &self,
        primary: &InstanceId,
        candidates: &[H],
    ) -> OrchestratorResult<usize> {
        let mut positions = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            positions.push((candidate.id().clone(), candidate.log_position()?));
        }

        let index = elect(primary, &positions)?;
        let (winner, position) = &positions[index];
        log_event(
            Event::ReplicaElected,
            &[
                ("candidates", &positions.len().to_string()),
                ("position", &position.to_string()),
                ("primary", primary.as_str()),
                ("replica", winner.as_str()),
            ],
        );
        Ok(index)
    }

    /// The most current replica among `candidates`.
    pub fn most_current_replica<'c, H: InstanceHandle>(
        &self,
        primary: &InstanceId,
        candidates: &'c [H],
    ) -> OrchestratorResult<&'c H> {
        let index = self.most_current_index(primary, candidates)?;
        Ok(&candidates[index])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::{HandleError, HandleResult};

    struct Fixed {
        id: InstanceId,
        position: HandleResult<LogPosition>,
    }

    impl InstanceHandle for Fixed {
        fn id(&self) -> &InstanceId {
            &self.id
        }
        fn detach_replica(&self, _: &InstanceId, _: bool) -> HandleResult<()> {
            Ok(())
        }
        fn attach_replica(&self, _: &InstanceId) -> HandleResult<()> {
            Ok(())
        }
        fn make_read_only(&self, _: bool) -> HandleResult<()> {
            Ok(())
        }
        fn demote_replication_primary(&self) -> HandleResult<()> {
            Ok(())
        }
        fn log_position(&self) -> HandleResult<LogPosition> {
            self.position.clone()
        }
    }

    fn at(id: &str, lineage: Option<&str>, sequence: u64) -> (InstanceId, LogPosition) {
        let position = match lineage {
            Some(lineage) => LogPosition::new(lineage, sequence),
            None => LogPosition {
                lineage: None,
                sequence,
            },
        };
        (InstanceId::new(id), position)
    }

    fn winner(candidates: &[(InstanceId, LogPosition)]) -> OrchestratorResult<&str> {
        elect(&InstanceId::new("p"), candidates).map(|index| candidates[index].0.as_str())
    }

    #[test]
    fn test_highest_sequence_wins() {
        let candidates = [at("a", Some("2a"), 1), at("b", Some("2a"), 2)];
        assert_eq!(winner(&candidates).unwrap(), "b");
    }

    #[test]
    fn test_divergent_lineages_rejected() {
        let candidates = [at("a", Some("2a99e-32bf"), 2), at("b", Some("2a"), 1)];
        let err = winner(&candidates).unwrap_err();
        assert_eq!(err.code(), "AERO_INCONSISTENT_TOPOLOGY");
    }

    #[test]
    fn test_unset_never_beats_set() {
        let candidates = [at("a", None, 0), at("b", Some("2a"), 1)];
        assert_eq!(winner(&candidates).unwrap(), "b");

        // An unset candidate with a stale sequence still loses.
        let candidates = [at("a", None, 50), at("b", Some("2a"), 1)];
        assert_eq!(winner(&candidates).unwrap(), "b");
    }

    #[test]
    fn test_tie_goes_to_first_listed() {
        let candidates = [
            at("c", Some("2a"), 7),
            at("a", Some("2a"), 7),
            at("b", Some("2a"), 3),
        ];
        assert_eq!(winner(&candidates).unwrap(), "c");
    }

    #[test]
    fn test_all_unset_picks_first() {
        let candidates = [at("x", None, 0), at("y", None, 0)];
        assert_eq!(winner(&candidates).unwrap(), "x");
    }

    #[test]
    fn test_single_candidate_always_selected() {
        assert_eq!(winner(&[at("solo", None, 0)]).unwrap(), "solo");
        assert_eq!(winner(&[at("solo", Some("2a"), 0)]).unwrap(), "solo");
    }

    #[test]
    fn test_empty_candidates_is_invalid_request() {
        let err = winner(&[]).unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidRequest(_)));
    }

    #[test]
    fn test_selector_returns_handle() {
        let candidates = vec![
            Fixed {
                id: InstanceId::new("a"),
                position: Ok(LogPosition::new("2a", 1)),
            },
            Fixed {
                id: InstanceId::new("b"),
                position: Ok(LogPosition::new("2a", 2)),
            },
        ];

        let selected = ReplicaSelector::new()
            .most_current_replica(&InstanceId::new("p"), &candidates)
            .unwrap();
        assert_eq!(selected.id().as_str(), "b");
    }

    #[test]
    fn test_position_query_failure_propagates() {
        let candidates = vec![Fixed {
            id: InstanceId::new("a"),
            position: Err(HandleError::transport(&InstanceId::new("a"), "timeout")),
        }];

        let err = ReplicaSelector::new()
            .most_current_index(&InstanceId::new("p"), &candidates)
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::Remote(HandleError::Transport { .. })));
    }
}
