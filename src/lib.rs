//! aerofleet - replication topology orchestration for a managed database fleet
//!
//! Promotes, ejects and detaches instances of primary/replica topologies
//! through remote-control handles, keeping an arena of instance records in
//! step with what was applied.

pub mod cli;
pub mod config;
pub mod failover;
pub mod handle;
pub mod observability;
pub mod provisioning;
pub mod topology;
