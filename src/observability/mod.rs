//! Observability
//!
//! - Structured logging (JSON lines on stderr)
//! - Operation counters
//! - Workflow lifecycle scopes
//! - Append-only audit trail
//!
//! Observability is read-only: a logging or audit failure never changes
//! the outcome of a workflow.
//!
//! ```ignore
//! use aerofleet::observability::{log_event, Event, ObservationScope};
//!
//! let scope = ObservationScope::with_fields("PROMOTE", &[("target", "r1")]);
//! log_event(Event::ReplicaAttached, &[("replica", "r2")]);
//! scope.complete();
//! ```

mod events;
mod logger;
mod metrics;
mod scope;
pub mod audit;

pub use audit::{AuditAction, AuditLog, AuditOutcome, AuditRecord, FileAuditLog, MemoryAuditLog};
pub use events::Event;
pub use logger::{Logger, Severity};
pub use metrics::{MetricsSnapshot, OperationMetrics};
pub use scope::ObservationScope;

/// Log a typed event at its own severity.
pub fn log_event(event: Event, fields: &[(&str, &str)]) {
    Logger::log(event.severity(), event.as_str(), fields);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_event() {
        log_event(Event::FleetLoaded, &[("path", "/tmp/fleet.json")]);
        log_event(Event::RemoteFault, &[]);
    }
}
