//! Provisioning
//!
//! Creation of new instances, standalone or as replicas of an existing
//! primary. The backend that actually boots machines sits behind the
//! [`Provisioner`] trait.
//!
//! - One non-replica instance per request
//! - Replicas of one request share a single snapshot of their primary
//! - The temporary snapshot backup is always deleted afterwards

mod errors;
mod replicas;
mod request;

pub use errors::{ProvisioningError, ProvisioningResult};
pub use replicas::ReplicaProvisioning;
pub use request::{CreateRequest, Provisioner, ReplicationSnapshot, RequestContext, SnapshotDataset};
