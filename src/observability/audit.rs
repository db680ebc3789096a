//! Audit Trail
//!
//! Every workflow attempt and every outcome (success, rejection, failure)
//! is recorded. The file log is append-only, one JSON record per line, and
//! synced before `append` returns.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

/// Audit action type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    /// Workflow was requested.
    OperationRequested,

    /// Workflow ran to completion.
    OperationExecuted,

    /// Workflow was rejected before any remote call.
    OperationRejected,

    /// Workflow failed partway.
    OperationFailed,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::OperationRequested => "OPERATION_REQUESTED",
            AuditAction::OperationExecuted => "OPERATION_EXECUTED",
            AuditAction::OperationRejected => "OPERATION_REJECTED",
            AuditAction::OperationFailed => "OPERATION_FAILED",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Audit record outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditOutcome {
    Success,
    Rejected,
    Failed,
    /// Recorded before the outcome is known.
    Pending,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditOutcome::Success => "SUCCESS",
            AuditOutcome::Rejected => "REJECTED",
            AuditOutcome::Failed => "FAILED",
            AuditOutcome::Pending => "PENDING",
        }
    }
}

impl fmt::Display for AuditOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single audit record.
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    /// Unique record ID.
    pub id: Uuid,

    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,

    pub action: AuditAction,

    /// Workflow name (`promote`, `eject`, ...).
    #[serde(rename = "op", skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,

    /// Instance the workflow was invoked on.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,

    /// Correlates the records of one workflow.
    #[serde(rename = "req_id", skip_serializing_if = "Option::is_none")]
    pub request_id: Option<Uuid>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,

    pub outcome: AuditOutcome,

    /// Stable error code (if outcome is Rejected or Failed).
    #[serde(rename = "code", skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,

    #[serde(rename = "error", skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Free-form detail, e.g. the elected replica.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl AuditRecord {
    pub fn new(action: AuditAction, outcome: AuditOutcome) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            action,
            operation: None,
            target: None,
            request_id: None,
            operator: None,
            outcome,
            error_code: None,
            error_message: None,
            detail: None,
        }
    }

    pub fn with_operation(mut self, name: impl Into<String>) -> Self {
        self.operation = Some(name.into());
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_request_id(mut self, id: Uuid) -> Self {
        self.request_id = Some(id);
        self
    }

    pub fn with_operator(mut self, operator: impl Into<String>) -> Self {
        self.operator = Some(operator.into());
        self
    }

    /// Set error code and message.
    pub fn with_error(mut self, code: impl Into<String>, message: impl Into<String>) -> Self {
        self.error_code = Some(code.into());
        self.error_message = Some(message.into());
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Serialize to one JSON line (no trailing newline).
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(
                "{{\"id\":\"{}\",\"action\":\"{}\",\"outcome\":\"{}\"}}",
                self.id, self.action, self.outcome
            )
        })
    }
}

/// Append-only audit log.
pub trait AuditLog: Send + Sync {
    /// Append a record. The record is durable when this returns.
    fn append(&self, record: &AuditRecord) -> io::Result<()>;

    /// Sync the log to durable storage.
    fn sync(&self) -> io::Result<()>;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// File-based audit log, one JSON record per line.
pub struct FileAuditLog {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl FileAuditLog {
    /// Open or create an audit log file.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditLog for FileAuditLog {
    fn append(&self, record: &AuditRecord) -> io::Result<()> {
        let json = record.to_json();
        let mut writer = lock(&self.writer);
        writeln!(writer, "{}", json)?;
        writer.flush()?;
        writer.get_ref().sync_all()
    }

    fn sync(&self) -> io::Result<()> {
        lock(&self.writer).get_ref().sync_all()
    }
}

/// In-memory audit log. Clones share the same records.
#[derive(Debug, Default, Clone)]
pub struct MemoryAuditLog {
    records: Arc<Mutex<Vec<AuditRecord>>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        lock(&self.records).clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.records).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.records).is_empty()
    }
}

impl AuditLog for MemoryAuditLog {
    fn append(&self, record: &AuditRecord) -> io::Result<()> {
        lock(&self.records).push(record.clone());
        Ok(())
    }

    fn sync(&self) -> io::Result<()> {
        Ok(())
    }
}
