//! CLI command implementations
//!
//! Every command loads the fleet snapshot, runs one workflow against a
//! simulated fleet built from it, and prints a single JSON response.
//! Mutating commands write the resulting snapshot back, also when the
//! workflow failed part way, so the file reflects what was applied.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};

use crate::config::OrchestratorConfig;
use crate::failover::{OrchestratorResult, TopologyOrchestrator};
use crate::handle::{EngineLoader, SimulatedFleet};
use crate::observability::{log_event, Event, FileAuditLog};
use crate::topology::{self, InstanceId, Topology};

use super::args::Command;
use super::errors::{CliError, CliResult};
use super::io::{write_error, write_response};

type FleetOrchestrator = TopologyOrchestrator<EngineLoader>;

/// Main CLI entry point
///
/// Parses arguments and dispatches to the appropriate command.
/// This is the only function that main.rs should call.
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    run_command(cli.command)
}

/// Run a command and print its response.
///
/// A failed command prints an error response and is also returned, so the
/// process exits non-zero.
pub fn run_command(cmd: Command) -> CliResult<()> {
    let outcome = match cmd {
        Command::Promote { fleet, config, id } => promote(&fleet, config.as_deref(), &id),
        Command::Eject { fleet, config, id } => eject(&fleet, config.as_deref(), &id),
        Command::Detach { fleet, config, id } => detach(&fleet, config.as_deref(), &id),
        Command::Elect { fleet, config, id } => elect(&fleet, config.as_deref(), &id),
        Command::Inspect { fleet, config } => inspect(&fleet, config.as_deref()),
    };

    match outcome {
        Ok(data) => write_response(data),
        Err(e) => {
            write_error(e.code_str(), e.message())?;
            Err(e)
        }
    }
}

/// Promote replica `id` to primary.
pub fn promote(fleet: &Path, config: Option<&Path>, id: &str) -> CliResult<Value> {
    let target = InstanceId::new(id);
    mutate(fleet, config, |orchestrator| orchestrator.promote(&target))
}

/// Eject primary `id`, promoting its most current replica.
pub fn eject(fleet: &Path, config: Option<&Path>, id: &str) -> CliResult<Value> {
    let primary = InstanceId::new(id);
    mutate(fleet, config, |orchestrator| orchestrator.eject(&primary))
}

/// Detach replica `id` from its primary.
pub fn detach(fleet: &Path, config: Option<&Path>, id: &str) -> CliResult<Value> {
    let replica = InstanceId::new(id);
    mutate(fleet, config, |orchestrator| orchestrator.detach(&replica))
}

/// Report the replica an eject of `id` would promote. Read-only.
pub fn elect(fleet: &Path, config: Option<&Path>, id: &str) -> CliResult<Value> {
    let primary = InstanceId::new(id);
    let orchestrator = open(fleet, config)?;
    let winner = orchestrator.elect(&primary)?;

    Ok(json!({
        "primary": primary,
        "winner": winner,
    }))
}

/// Report in-flight task statuses and structural violations. Read-only.
pub fn inspect(fleet: &Path, config: Option<&Path>) -> CliResult<Value> {
    let orchestrator = open(fleet, config)?;
    let snapshot = orchestrator.topology();

    let in_flight: Vec<Value> = orchestrator
        .tracker()
        .in_flight()
        .into_iter()
        .map(|(id, status)| json!({"id": id, "task_status": status}))
        .collect();
    let violations: Vec<String> = snapshot
        .violations()
        .iter()
        .map(|violation| violation.to_string())
        .collect();

    Ok(json!({
        "instances": snapshot.len(),
        "consistent": violations.is_empty(),
        "in_flight": in_flight,
        "violations": violations,
    }))
}

// ===== HELPERS =====

/// Run a mutating workflow and persist the arena whatever its outcome.
fn mutate<T, F>(fleet: &Path, config: Option<&Path>, workflow: F) -> CliResult<Value>
where
    T: Serialize,
    F: FnOnce(&FleetOrchestrator) -> OrchestratorResult<T>,
{
    let orchestrator = open(fleet, config)?;
    let result = workflow(&orchestrator);
    save_fleet(fleet, &orchestrator.topology())?;

    Ok(serde_json::to_value(result?)?)
}

fn open(fleet: &Path, config: Option<&Path>) -> CliResult<FleetOrchestrator> {
    let config = load_config(config)?;
    let arena = load_fleet(fleet)?;

    let guests = SimulatedFleet::from_topology(&arena, config.engine);
    let loader = EngineLoader::new(Arc::new(guests), config.engine, config.replication_user.clone());

    let audit_path = config.audit_log_path.clone();
    let mut orchestrator = TopologyOrchestrator::new(loader, topology::shared(arena), config);
    if let Some(path) = audit_path {
        let audit = FileAuditLog::open(&path).map_err(|e| {
            CliError::io_error(format!("Failed to open audit log {}: {}", path.display(), e))
        })?;
        orchestrator = orchestrator.with_audit_log(Arc::new(audit));
    }

    Ok(orchestrator)
}

fn load_config(path: Option<&Path>) -> CliResult<OrchestratorConfig> {
    let Some(path) = path else {
        return Ok(OrchestratorConfig::default());
    };
    let config = OrchestratorConfig::load(path)?;
    log_event(
        Event::ConfigLoaded,
        &[
            ("engine", config.engine.as_str()),
            ("path", &path.display().to_string()),
        ],
    );
    Ok(config)
}

/// Read a fleet snapshot file.
pub fn load_fleet(path: &Path) -> CliResult<Topology> {
    let content = fs::read_to_string(path).map_err(|e| {
        CliError::fleet_error(format!("Failed to read fleet {}: {}", path.display(), e))
    })?;
    let topology: Topology = serde_json::from_str(&content)
        .map_err(|e| CliError::fleet_error(format!("Invalid fleet JSON: {}", e)))?;

    log_event(
        Event::FleetLoaded,
        &[
            ("instances", &topology.len().to_string()),
            ("path", &path.display().to_string()),
        ],
    );
    Ok(topology)
}

/// Write a fleet snapshot file.
pub fn save_fleet(path: &Path, topology: &Topology) -> CliResult<()> {
    let content = serde_json::to_string_pretty(topology)?;
    fs::write(path, content).map_err(|e| {
        CliError::fleet_error(format!("Failed to write fleet {}: {}", path.display(), e))
    })?;

    log_event(
        Event::FleetSaved,
        &[
            ("instances", &topology.len().to_string()),
            ("path", &path.display().to_string()),
        ],
    );
    Ok(())
}
