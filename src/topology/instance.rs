//! Instance Records
//!
//! One record per managed database instance. Records carry identity, role,
//! replication links and the transient task status shown to operators.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque identity of a managed instance.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(String);

impl InstanceId {
    /// Wrap an existing identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh identifier for a newly provisioned instance.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Borrow the identifier text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for InstanceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for InstanceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Replication role of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Accepts writes; other instances replicate from it.
    Primary,
    /// Applies a primary's change stream; read-only.
    Replica,
    /// Not part of any replication topology.
    Standalone,
}

impl Role {
    /// Returns the role name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Primary => "primary",
            Role::Replica => "replica",
            Role::Standalone => "standalone",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier of one replication history.
///
/// Two positions with different tokens belong to different chains and
/// cannot be compared by sequence number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LineageToken(String);

impl LineageToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LineageToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Replication log position.
///
/// An unset lineage means replication never started on the instance; such a
/// position is dominated by every set one.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LogPosition {
    /// Lineage the sequence number belongs to, if any.
    #[serde(default)]
    pub lineage: Option<LineageToken>,
    /// Position within the lineage.
    #[serde(default)]
    pub sequence: u64,
}

impl LogPosition {
    /// A position within a known lineage.
    pub fn new(lineage: impl Into<String>, sequence: u64) -> Self {
        Self {
            lineage: Some(LineageToken::new(lineage)),
            sequence,
        }
    }

    /// Position of an instance that never began applying data.
    pub fn unset() -> Self {
        Self::default()
    }

    /// Check whether the lineage is known.
    pub fn is_set(&self) -> bool {
        self.lineage.is_some()
    }
}

impl fmt::Display for LogPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.lineage {
            Some(lineage) => write!(f, "{}:{}", lineage, self.sequence),
            None => f.write_str("unset"),
        }
    }
}

/// Transient per-instance marker for an operation in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Idle.
    #[default]
    None,
    /// A replica of this topology is being promoted.
    Promoting,
    /// The primary of this topology is being ejected.
    Ejecting,
    /// The instance is being provisioned.
    Building,
    /// A backup of the instance is running.
    BackingUp,
}

impl TaskStatus {
    /// Returns the status name shown to operators.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::None => "NONE",
            TaskStatus::Promoting => "PROMOTING",
            TaskStatus::Ejecting => "EJECTING",
            TaskStatus::Building => "BUILDING",
            TaskStatus::BackingUp => "BACKING_UP",
        }
    }

    /// Check if no operation is marked on the instance.
    pub fn is_idle(&self) -> bool {
        matches!(self, TaskStatus::None)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Insertion-ordered set of replica ids.
///
/// Order matters: election ties resolve to the first replica listed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReplicaSet(Vec<InstanceId>);

impl ReplicaSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a replica. Returns false if it was already present.
    pub fn insert(&mut self, id: InstanceId) -> bool {
        if self.0.contains(&id) {
            return false;
        }
        self.0.push(id);
        true
    }

    /// Remove a replica. Returns false if it was not present.
    pub fn remove(&mut self, id: &InstanceId) -> bool {
        let before = self.0.len();
        self.0.retain(|existing| existing != id);
        self.0.len() != before
    }

    pub fn contains(&self, id: &InstanceId) -> bool {
        self.0.contains(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &InstanceId> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn to_vec(&self) -> Vec<InstanceId> {
        self.0.clone()
    }
}

impl FromIterator<InstanceId> for ReplicaSet {
    fn from_iter<I: IntoIterator<Item = InstanceId>>(iter: I) -> Self {
        let mut set = Self::new();
        for id in iter {
            set.insert(id);
        }
        set
    }
}

/// A managed database instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    /// Instance identity.
    pub id: InstanceId,

    /// Current replication role.
    pub role: Role,

    /// Back-reference to the primary (replicas only). Lookup only.
    #[serde(default)]
    pub primary: Option<InstanceId>,

    /// Forward set of replicas (primaries only).
    #[serde(default)]
    pub replicas: ReplicaSet,

    /// Last known replication log position.
    #[serde(default)]
    pub log_position: LogPosition,

    /// Transient operation marker.
    #[serde(default)]
    pub task_status: TaskStatus,

    /// Last heartbeat received from the instance's guest agent.
    #[serde(default)]
    pub last_heartbeat: Option<DateTime<Utc>>,
}

impl Instance {
    fn with_role(id: InstanceId, role: Role, primary: Option<InstanceId>) -> Self {
        Self {
            id,
            role,
            primary,
            replicas: ReplicaSet::new(),
            log_position: LogPosition::unset(),
            task_status: TaskStatus::None,
            last_heartbeat: None,
        }
    }

    /// A record outside any topology.
    pub fn standalone(id: impl Into<InstanceId>) -> Self {
        Self::with_role(id.into(), Role::Standalone, None)
    }

    /// A primary record with no replicas yet.
    pub fn primary(id: impl Into<InstanceId>) -> Self {
        Self::with_role(id.into(), Role::Primary, None)
    }

    /// A replica record pointing at `primary`.
    ///
    /// Only the back-reference is set; use [`super::Topology::attach`] to
    /// keep the primary's forward set in sync.
    pub fn replica_of(id: impl Into<InstanceId>, primary: impl Into<InstanceId>) -> Self {
        Self::with_role(id.into(), Role::Replica, Some(primary.into()))
    }

    pub fn with_log_position(mut self, position: LogPosition) -> Self {
        self.log_position = position;
        self
    }

    pub fn with_heartbeat(mut self, at: DateTime<Utc>) -> Self {
        self.last_heartbeat = Some(at);
        self
    }

    pub fn with_task_status(mut self, status: TaskStatus) -> Self {
        self.task_status = status;
        self
    }

    pub fn is_primary(&self) -> bool {
        self.role == Role::Primary
    }

    pub fn is_replica(&self) -> bool {
        self.role == Role::Replica
    }
}
