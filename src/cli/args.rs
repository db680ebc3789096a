//! CLI argument definitions using clap
//!
//! Commands:
//! - aerofleet promote --fleet <path> <id>
//! - aerofleet eject --fleet <path> <id>
//! - aerofleet detach --fleet <path> <id>
//! - aerofleet elect --fleet <path> <primary-id>
//! - aerofleet inspect --fleet <path>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// aerofleet - replication topology orchestration for a managed fleet
#[derive(Parser, Debug)]
#[command(name = "aerofleet")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Promote a replica to primary of its topology
    Promote {
        /// Path to the fleet snapshot file
        #[arg(long, default_value = "./fleet.json")]
        fleet: PathBuf,

        /// Path to configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Replica to promote
        id: String,
    },

    /// Replace a failed primary with its most current replica
    Eject {
        /// Path to the fleet snapshot file
        #[arg(long, default_value = "./fleet.json")]
        fleet: PathBuf,

        /// Path to configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Primary to eject
        id: String,
    },

    /// Remove one replica from its topology
    Detach {
        /// Path to the fleet snapshot file
        #[arg(long, default_value = "./fleet.json")]
        fleet: PathBuf,

        /// Path to configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Replica to detach
        id: String,
    },

    /// Show which replica an eject would promote, without changing anything
    Elect {
        /// Path to the fleet snapshot file
        #[arg(long, default_value = "./fleet.json")]
        fleet: PathBuf,

        /// Path to configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Primary whose replicas are compared
        id: String,
    },

    /// Print task statuses and topology violations
    Inspect {
        /// Path to the fleet snapshot file
        #[arg(long, default_value = "./fleet.json")]
        fleet: PathBuf,

        /// Path to configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_promote() {
        let cli = Cli::try_parse_from(["aerofleet", "promote", "--fleet", "/tmp/f.json", "r1"]).unwrap();
        match cli.command {
            Command::Promote { fleet, config, id } => {
                assert_eq!(fleet, PathBuf::from("/tmp/f.json"));
                assert!(config.is_none());
                assert_eq!(id, "r1");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_inspect_defaults() {
        let cli = Cli::try_parse_from(["aerofleet", "inspect"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Inspect { ref fleet, config: None } if fleet == &PathBuf::from("./fleet.json")
        ));
    }

    #[test]
    fn test_eject_requires_id() {
        assert!(Cli::try_parse_from(["aerofleet", "eject"]).is_err());
    }
}
