//! CLI module for aerofleet
//!
//! Provides command-line interface for:
//! - promote: Promote a replica to primary
//! - eject: Replace a failed primary with its most current replica
//! - detach: Remove one replica from its topology
//! - elect: Dry-run election
//! - inspect: Task statuses and topology violations

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{detach, eject, elect, inspect, load_fleet, promote, run, run_command, save_fleet};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{write_error, write_response};
