//! Engine-backed Instance Handles
//!
//! [`EngineInstance`] implements [`InstanceHandle`] by delegating to the
//! configured [`ReplicationStrategy`] and the instance's guest agent.

use std::sync::Arc;

use super::errors::HandleResult;
use super::strategy::{EngineFamily, GuestAgent, ReplicationStrategy};
use super::{HandleLoader, InstanceHandle};
use crate::topology::{Instance, InstanceId, LogPosition};

/// Resolves the guest agent of any instance in the fleet.
pub trait GuestDirectory: Send + Sync {
    fn guest(&self, id: &InstanceId) -> HandleResult<Arc<dyn GuestAgent>>;
}

/// Handle for one instance, driven through its engine strategy.
pub struct EngineInstance {
    id: InstanceId,
    guest: Arc<dyn GuestAgent>,
    directory: Arc<dyn GuestDirectory>,
    strategy: Arc<dyn ReplicationStrategy>,
    replication_user: String,
}

impl EngineInstance {
    /// Name of the strategy behind this handle.
    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }
}

impl InstanceHandle for EngineInstance {
    fn id(&self) -> &InstanceId {
        &self.id
    }

    fn detach_replica(&self, current_primary: &InstanceId, for_failover: bool) -> HandleResult<()> {
        self.strategy.detach_replica(&*self.guest, for_failover)?;
        if !for_failover {
            let source = self.directory.guest(current_primary)?;
            self.strategy
                .cleanup_source_on_replica_detach(&*source, &self.id)?;
        }
        Ok(())
    }

    fn attach_replica(&self, new_primary: &InstanceId) -> HandleResult<()> {
        let primary = self.directory.guest(new_primary)?;
        self.strategy.enable_as_primary(&*primary)?;
        let reference = self.strategy.primary_ref(&*primary, &self.replication_user);
        self.strategy.enable_as_replica(&*self.guest, &reference)
    }

    fn make_read_only(&self, read_only: bool) -> HandleResult<()> {
        self.guest.set_read_only(read_only)
    }

    fn demote_replication_primary(&self) -> HandleResult<()> {
        self.strategy.demote_primary(&*self.guest)
    }

    fn log_position(&self) -> HandleResult<LogPosition> {
        self.guest.replication_position()
    }
}

/// Loads [`EngineInstance`] handles with one strategy for the whole fleet.
#[derive(Clone)]
pub struct EngineLoader {
    directory: Arc<dyn GuestDirectory>,
    strategy: Arc<dyn ReplicationStrategy>,
    replication_user: String,
}

impl EngineLoader {
    pub fn new(
        directory: Arc<dyn GuestDirectory>,
        family: EngineFamily,
        replication_user: impl Into<String>,
    ) -> Self {
        Self {
            directory,
            strategy: Arc::from(family.strategy()),
            replication_user: replication_user.into(),
        }
    }

    pub fn strategy(&self) -> &dyn ReplicationStrategy {
        &*self.strategy
    }
}

impl HandleLoader for EngineLoader {
    type Handle = EngineInstance;

    fn load(&self, instance: &Instance) -> HandleResult<EngineInstance> {
        Ok(EngineInstance {
            id: instance.id.clone(),
            guest: self.directory.guest(&instance.id)?,
            directory: Arc::clone(&self.directory),
            strategy: Arc::clone(&self.strategy),
            replication_user: self.replication_user.clone(),
        })
    }
}
