//! Simulated Fleet
//!
//! In-memory guest agents that behave like a well-mannered engine: they
//! keep read-only flags, replication sources, override groups and log
//! positions, and fail on demand. Used for dry runs from the CLI and by the
//! workflow tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use super::engine::GuestDirectory;
use super::errors::{HandleError, HandleResult};
use super::strategy::{Endpoint, EngineFamily, GuestAgent, PrimaryRef, Settings};
use crate::topology::{InstanceId, LogPosition, Role, Topology};

/// Guest agent call, used for failure injection and call history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GuestCall {
    ApplyOverride,
    RemoveOverride,
    SetReplicationSource,
    StartReplication,
    StopReplication,
    SetReadOnly,
    ReplicationPosition,
}

#[derive(Debug, Default)]
struct GuestState {
    read_only: bool,
    replicating: bool,
    source: Option<PrimaryRef>,
    overrides: BTreeMap<&'static str, Settings>,
    position: LogPosition,
    failures: HashMap<GuestCall, HandleError>,
    calls: Vec<GuestCall>,
}

/// One simulated guest agent.
#[derive(Debug)]
pub struct SimulatedGuest {
    id: InstanceId,
    endpoint: Endpoint,
    auth_password: Option<String>,
    state: Mutex<GuestState>,
}

impl SimulatedGuest {
    pub fn new(id: InstanceId, family: EngineFamily) -> Self {
        let endpoint = Endpoint {
            host: format!("{}.fleet.internal", id),
            port: family.default_port(),
        };
        Self {
            id,
            endpoint,
            auth_password: None,
            state: Mutex::new(GuestState::default()),
        }
    }

    pub fn with_auth_password(mut self, password: impl Into<String>) -> Self {
        self.auth_password = Some(password.into());
        self
    }

    fn state(&self) -> MutexGuard<'_, GuestState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record `call` and return the injected failure, if any.
    fn enter(&self, call: GuestCall) -> HandleResult<MutexGuard<'_, GuestState>> {
        let mut state = self.state();
        state.calls.push(call);
        match state.failures.get(&call) {
            Some(err) => Err(err.clone()),
            None => Ok(state),
        }
    }

    /// Make every subsequent `call` fail with `error`.
    pub fn fail_on(&self, call: GuestCall, error: HandleError) {
        self.state().failures.insert(call, error);
    }

    /// Remove all injected failures.
    pub fn heal(&self) {
        self.state().failures.clear();
    }

    pub fn set_position(&self, position: LogPosition) {
        self.state().position = position;
    }

    pub fn is_read_only(&self) -> bool {
        self.state().read_only
    }

    pub fn is_replicating(&self) -> bool {
        self.state().replicating
    }

    /// Instance this guest replicates from.
    pub fn source(&self) -> Option<InstanceId> {
        self.state().source.as_ref().map(|source| source.instance.clone())
    }

    pub fn has_override(&self, label: &str) -> bool {
        self.state().overrides.contains_key(label)
    }

    pub fn override_settings(&self, label: &str) -> Option<Settings> {
        self.state().overrides.get(label).cloned()
    }

    /// Calls received so far, in order.
    pub fn calls(&self) -> Vec<GuestCall> {
        self.state().calls.clone()
    }
}

impl GuestAgent for SimulatedGuest {
    fn instance_id(&self) -> &InstanceId {
        &self.id
    }

    fn endpoint(&self) -> Endpoint {
        self.endpoint.clone()
    }

    fn auth_password(&self) -> Option<String> {
        self.auth_password.clone()
    }

    fn apply_override(&self, label: &'static str, settings: &Settings) -> HandleResult<()> {
        self.enter(GuestCall::ApplyOverride)?
            .overrides
            .insert(label, settings.clone());
        Ok(())
    }

    fn remove_override(&self, label: &'static str) -> HandleResult<()> {
        self.enter(GuestCall::RemoveOverride)?.overrides.remove(label);
        Ok(())
    }

    fn set_replication_source(&self, source: Option<&PrimaryRef>) -> HandleResult<()> {
        let mut state = self.enter(GuestCall::SetReplicationSource)?;
        state.source = source.cloned();
        state.replicating = state.source.is_some();
        Ok(())
    }

    fn start_replication(&self) -> HandleResult<()> {
        let mut state = self.enter(GuestCall::StartReplication)?;
        if state.source.is_none() {
            return Err(HandleError::operation_failed(
                &self.id,
                "start_replication",
                "no replication source configured",
            ));
        }
        state.replicating = true;
        Ok(())
    }

    fn stop_replication(&self) -> HandleResult<()> {
        self.enter(GuestCall::StopReplication)?.replicating = false;
        Ok(())
    }

    fn set_read_only(&self, read_only: bool) -> HandleResult<()> {
        self.enter(GuestCall::SetReadOnly)?.read_only = read_only;
        Ok(())
    }

    fn replication_position(&self) -> HandleResult<LogPosition> {
        Ok(self.enter(GuestCall::ReplicationPosition)?.position.clone())
    }
}

/// Directory of simulated guests, one per arena record.
#[derive(Debug)]
pub struct SimulatedFleet {
    family: EngineFamily,
    guests: RwLock<HashMap<InstanceId, Arc<SimulatedGuest>>>,
}

impl SimulatedFleet {
    pub fn new(family: EngineFamily) -> Self {
        Self {
            family,
            guests: RwLock::new(HashMap::new()),
        }
    }

    /// Build guests mirroring the arena: replicas are read-only and stream
    /// from their primary, and every guest reports its recorded position.
    pub fn from_topology(topology: &Topology, family: EngineFamily) -> Self {
        let fleet = Self::new(family);
        for instance in topology.iter() {
            fleet.add(instance.id.clone());
        }
        for instance in topology.iter() {
            let Some(guest) = fleet.guest_state(&instance.id) else {
                continue;
            };
            let mut state = guest.state();
            state.position = instance.log_position.clone();
            if instance.role == Role::Replica {
                state.read_only = true;
                if let Some(primary) = instance.primary.as_ref().and_then(|id| fleet.guest_state(id)) {
                    state.source = Some(PrimaryRef {
                        instance: primary.id.clone(),
                        endpoint: primary.endpoint(),
                        user: None,
                        password: primary.auth_password(),
                    });
                    state.replicating = true;
                }
            }
        }
        fleet
    }

    /// Register a fresh guest for `id` and return it.
    pub fn add(&self, id: InstanceId) -> Arc<SimulatedGuest> {
        let guest = Arc::new(SimulatedGuest::new(id.clone(), self.family));
        self.guests
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Arc::clone(&guest));
        guest
    }

    /// Concrete guest for inspection and failure injection.
    pub fn guest_state(&self, id: &InstanceId) -> Option<Arc<SimulatedGuest>> {
        self.guests
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

}

impl GuestDirectory for SimulatedFleet {
    fn guest(&self, id: &InstanceId) -> HandleResult<Arc<dyn GuestAgent>> {
        match self.guest_state(id) {
            Some(guest) => Ok(guest),
            None => Err(HandleError::transport(id, "no guest agent registered")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::Instance;

    fn id(s: &str) -> InstanceId {
        InstanceId::new(s)
    }

    #[test]
    fn test_fleet_mirrors_topology() {
        let mut topology: Topology = [
            Instance::primary("p"),
            Instance::standalone("r").with_log_position(LogPosition::new("2a", 9)),
        ]
        .into_iter()
        .collect();
        topology.attach(&id("r"), &id("p"));

        let fleet = SimulatedFleet::from_topology(&topology, EngineFamily::Sync);
        let replica = fleet.guest_state(&id("r")).unwrap();
        let primary = fleet.guest_state(&id("p")).unwrap();

        assert!(replica.is_read_only());
        assert!(replica.is_replicating());
        assert_eq!(replica.source(), Some(id("p")));
        assert_eq!(replica.replication_position().unwrap(), LogPosition::new("2a", 9));
        assert!(!primary.is_read_only());
        assert_eq!(primary.endpoint().port, 6379);
    }

    #[test]
    fn test_injected_failure_is_sticky_until_healed() {
        let guest = SimulatedGuest::new(id("g"), EngineFamily::Gtid);
        guest.fail_on(
            GuestCall::SetReadOnly,
            HandleError::fault(&id("g"), "Error"),
        );

        assert!(guest.set_read_only(false).is_err());
        assert!(guest.set_read_only(false).is_err());
        guest.heal();
        assert!(guest.set_read_only(false).is_ok());
        assert_eq!(guest.calls().len(), 3);
    }

    #[test]
    fn test_start_without_source_fails_as_operation() {
        let guest = SimulatedGuest::new(id("g"), EngineFamily::Gtid);
        let err = guest.start_replication().unwrap_err();
        assert!(err.is_operation_failed());
    }

    #[test]
    fn test_unknown_guest_is_transport_error() {
        let fleet = SimulatedFleet::new(EngineFamily::Gtid);
        let err = fleet.guest(&id("nobody")).err().unwrap();
        assert!(matches!(err, HandleError::Transport { .. }));
    }
}
