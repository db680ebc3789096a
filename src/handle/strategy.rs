//! Engine Replication Strategies
//!
//! One strategy per engine family, selected from configuration when a
//! handle loader is built. A strategy knows how to describe a primary to a
//! replica and how to switch an instance between primary, replica and
//! standalone configurations. The actual engine commands are issued by the
//! guest agent running next to the database.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::errors::HandleResult;
use crate::topology::{InstanceId, LogPosition};

/// Configuration settings applied as one named override group.
pub type Settings = BTreeMap<String, String>;

/// Network location of an instance's database service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Everything a replica needs to start streaming from a primary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryRef {
    /// Primary instance id.
    pub instance: InstanceId,
    /// Where to connect.
    pub endpoint: Endpoint,
    /// Replication user, for engines with user accounts.
    pub user: Option<String>,
    /// Credential for `user`, or the engine-wide auth password.
    pub password: Option<String>,
}

/// Control surface of the agent running on an instance.
///
/// Implementations carry commands to the engine; every method may block.
pub trait GuestAgent: Send + Sync {
    fn instance_id(&self) -> &InstanceId;

    fn endpoint(&self) -> Endpoint;

    /// Engine auth password, if the engine has one configured.
    fn auth_password(&self) -> Option<String>;

    /// Apply (or replace) the override group `label`.
    fn apply_override(&self, label: &'static str, settings: &Settings) -> HandleResult<()>;

    /// Remove the override group `label`. Removing an absent group succeeds.
    fn remove_override(&self, label: &'static str) -> HandleResult<()>;

    /// Set or clear the replication source.
    fn set_replication_source(&self, source: Option<&PrimaryRef>) -> HandleResult<()>;

    fn start_replication(&self) -> HandleResult<()>;

    fn stop_replication(&self) -> HandleResult<()>;

    fn set_read_only(&self, read_only: bool) -> HandleResult<()>;

    fn replication_position(&self) -> HandleResult<LogPosition>;
}

/// Per-engine replication behaviour.
pub trait ReplicationStrategy: Send + Sync {
    /// Strategy name for logs.
    fn name(&self) -> &'static str;

    /// Describe `primary` to a replica about to attach to it.
    fn primary_ref(&self, primary: &dyn GuestAgent, replication_user: &str) -> PrimaryRef;

    /// Whether seeding a replica needs a backup of the primary.
    fn backup_required_for_replication(&self) -> bool {
        true
    }

    /// Configure `guest` to serve as a replication source. Idempotent.
    fn enable_as_primary(&self, guest: &dyn GuestAgent) -> HandleResult<()>;

    /// Configure `guest` to replicate from `primary`.
    fn enable_as_replica(&self, guest: &dyn GuestAgent, primary: &PrimaryRef) -> HandleResult<()>;

    /// Turn replication off on a replica.
    fn detach_replica(&self, guest: &dyn GuestAgent, for_failover: bool) -> HandleResult<()>;

    /// Clean up on the source after one of its replicas left for good.
    fn cleanup_source_on_replica_detach(
        &self,
        _source: &dyn GuestAgent,
        _replica: &InstanceId,
    ) -> HandleResult<()> {
        Ok(())
    }

    /// Turn primary-side replication off on a former primary.
    fn demote_primary(&self, guest: &dyn GuestAgent) -> HandleResult<()>;
}

const PRIMARY_OVERRIDE: &str = "replication_primary";
const REPLICA_OVERRIDE: &str = "replication_replica";

/// Replication for SQL engines that position replicas by global transaction id.
#[derive(Debug, Clone, Copy, Default)]
pub struct GtidReplication;

impl GtidReplication {
    fn primary_settings() -> Settings {
        Settings::from([
            ("log_bin".to_string(), "ON".to_string()),
            ("gtid_strict_mode".to_string(), "ON".to_string()),
        ])
    }

    fn replica_settings() -> Settings {
        Settings::from([
            ("read_only".to_string(), "ON".to_string()),
            ("relay_log_recovery".to_string(), "ON".to_string()),
        ])
    }
}

impl ReplicationStrategy for GtidReplication {
    fn name(&self) -> &'static str {
        "gtid"
    }

    fn primary_ref(&self, primary: &dyn GuestAgent, replication_user: &str) -> PrimaryRef {
        PrimaryRef {
            instance: primary.instance_id().clone(),
            endpoint: primary.endpoint(),
            user: Some(replication_user.to_string()),
            password: primary.auth_password(),
        }
    }

    fn enable_as_primary(&self, guest: &dyn GuestAgent) -> HandleResult<()> {
        guest.apply_override(PRIMARY_OVERRIDE, &Self::primary_settings())
    }

    fn enable_as_replica(&self, guest: &dyn GuestAgent, primary: &PrimaryRef) -> HandleResult<()> {
        guest.apply_override(REPLICA_OVERRIDE, &Self::replica_settings())?;
        guest.set_replication_source(Some(primary))?;
        guest.start_replication()?;
        guest.set_read_only(true)
    }

    fn detach_replica(&self, guest: &dyn GuestAgent, for_failover: bool) -> HandleResult<()> {
        guest.stop_replication()?;
        guest.set_replication_source(None)?;
        guest.remove_override(REPLICA_OVERRIDE)?;
        if !for_failover {
            guest.set_read_only(false)?;
        }
        Ok(())
    }

    fn demote_primary(&self, guest: &dyn GuestAgent) -> HandleResult<()> {
        guest.remove_override(PRIMARY_OVERRIDE)
    }
}

/// Replication for key/value engines that resynchronise replicas in full.
///
/// Replicas are seeded by the engine itself, so no backup is needed, and a
/// source keeps no per-replica state.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncReplication;

impl ReplicationStrategy for SyncReplication {
    fn name(&self) -> &'static str {
        "sync"
    }

    fn primary_ref(&self, primary: &dyn GuestAgent, _replication_user: &str) -> PrimaryRef {
        PrimaryRef {
            instance: primary.instance_id().clone(),
            endpoint: primary.endpoint(),
            user: None,
            password: primary.auth_password(),
        }
    }

    fn backup_required_for_replication(&self) -> bool {
        false
    }

    fn enable_as_primary(&self, guest: &dyn GuestAgent) -> HandleResult<()> {
        guest.apply_override(PRIMARY_OVERRIDE, &Settings::new())
    }

    fn enable_as_replica(&self, guest: &dyn GuestAgent, primary: &PrimaryRef) -> HandleResult<()> {
        let mut settings = Settings::from([(
            "replicaof".to_string(),
            format!("{} {}", primary.endpoint.host, primary.endpoint.port),
        )]);
        settings.insert(
            "primaryauth".to_string(),
            primary.password.clone().unwrap_or_default(),
        );
        guest.apply_override(REPLICA_OVERRIDE, &settings)?;
        guest.set_replication_source(Some(primary))
    }

    fn detach_replica(&self, guest: &dyn GuestAgent, for_failover: bool) -> HandleResult<()> {
        guest.remove_override(REPLICA_OVERRIDE)?;
        guest.set_replication_source(None)?;
        if !for_failover {
            guest.set_read_only(false)?;
        }
        Ok(())
    }

    fn demote_primary(&self, guest: &dyn GuestAgent) -> HandleResult<()> {
        guest.remove_override(PRIMARY_OVERRIDE)
    }
}

/// Engine family, as named in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineFamily {
    /// SQL engines with GTID positioning.
    #[default]
    Gtid,
    /// Key/value engines with full resynchronisation.
    Sync,
}

impl EngineFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineFamily::Gtid => "gtid",
            EngineFamily::Sync => "sync",
        }
    }

    /// Strategy implementing this family.
    pub fn strategy(&self) -> Box<dyn ReplicationStrategy> {
        match self {
            EngineFamily::Gtid => Box::new(GtidReplication),
            EngineFamily::Sync => Box::new(SyncReplication),
        }
    }

    /// Default service port of the family's engines.
    pub fn default_port(&self) -> u16 {
        match self {
            EngineFamily::Gtid => 3306,
            EngineFamily::Sync => 6379,
        }
    }
}

impl fmt::Display for EngineFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::simulated::SimulatedGuest;

    fn guest(id: &str) -> SimulatedGuest {
        SimulatedGuest::new(InstanceId::new(id), EngineFamily::Gtid)
    }

    #[test]
    fn test_family_selects_strategy() {
        assert_eq!(EngineFamily::Gtid.strategy().name(), "gtid");
        assert_eq!(EngineFamily::Sync.strategy().name(), "sync");
        assert!(EngineFamily::Gtid.strategy().backup_required_for_replication());
        assert!(!EngineFamily::Sync.strategy().backup_required_for_replication());
    }

    #[test]
    fn test_family_from_config_name() {
        let family: EngineFamily = serde_json::from_str("\"sync\"").unwrap();
        assert_eq!(family, EngineFamily::Sync);
        assert_eq!(EngineFamily::default(), EngineFamily::Gtid);
    }

    #[test]
    fn test_gtid_replica_lifecycle() {
        let primary = guest("p");
        let replica = guest("r");
        let strategy = GtidReplication;

        let reference = strategy.primary_ref(&primary, "repl");
        assert_eq!(reference.user.as_deref(), Some("repl"));
        strategy.enable_as_replica(&replica, &reference).unwrap();

        assert!(replica.is_read_only());
        assert!(replica.is_replicating());
        assert_eq!(replica.source(), Some(InstanceId::new("p")));

        strategy.detach_replica(&replica, false).unwrap();
        assert!(!replica.is_read_only());
        assert!(!replica.is_replicating());
        assert_eq!(replica.source(), None);
        assert!(!replica.has_override(REPLICA_OVERRIDE));
    }

    #[test]
    fn test_gtid_failover_detach_stays_read_only() {
        let primary = guest("p");
        let replica = guest("r");
        let strategy = GtidReplication;

        strategy
            .enable_as_replica(&replica, &strategy.primary_ref(&primary, "repl"))
            .unwrap();
        strategy.detach_replica(&replica, true).unwrap();

        assert!(replica.is_read_only());
        assert_eq!(replica.source(), None);
    }

    #[test]
    fn test_sync_replica_carries_primary_auth() {
        let primary = guest("p").with_auth_password("s3cret");
        let replica = guest("r");
        let strategy = SyncReplication;

        let reference = strategy.primary_ref(&primary, "ignored");
        assert!(reference.user.is_none());
        strategy.enable_as_replica(&replica, &reference).unwrap();

        let settings = replica.override_settings(REPLICA_OVERRIDE).unwrap();
        assert_eq!(settings.get("primaryauth").map(String::as_str), Some("s3cret"));
        assert!(settings.get("replicaof").unwrap().starts_with("p."));
    }

    #[test]
    fn test_demote_removes_primary_override() {
        let primary = guest("p");
        let strategy = GtidReplication;

        strategy.enable_as_primary(&primary).unwrap();
        assert!(primary.has_override(PRIMARY_OVERRIDE));

        strategy.demote_primary(&primary).unwrap();
        assert!(!primary.has_override(PRIMARY_OVERRIDE));
    }
}
