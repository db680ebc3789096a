//! Orchestrator configuration
//!
//! JSON file, every field optional:
//!
//! ```json
//! {
//!   "engine": "gtid",
//!   "eject_heartbeat_grace_secs": 60,
//!   "audit_log_path": "/var/log/aerofleet/audit.log",
//!   "replication_user": "os_admin_repl"
//! }
//! ```

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::handle::EngineFamily;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Read { .. } => "AERO_CONFIG_READ",
            Self::Parse(_) => "AERO_CONFIG_PARSE",
            Self::Invalid(_) => "AERO_CONFIG_INVALID",
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Engine family, selects the replication strategy
    #[serde(default)]
    pub engine: EngineFamily,

    /// Eject is refused while the primary heartbeated within this window
    #[serde(default = "default_eject_heartbeat_grace_secs")]
    pub eject_heartbeat_grace_secs: u64,

    /// Append-only audit file (optional, in-memory audit otherwise)
    #[serde(default)]
    pub audit_log_path: Option<PathBuf>,

    /// Replication user handed to the engine strategy
    #[serde(default = "default_replication_user")]
    pub replication_user: String,
}

fn default_eject_heartbeat_grace_secs() -> u64 {
    60
}
fn default_replication_user() -> String {
    "os_admin_repl".to_string()
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            engine: EngineFamily::default(),
            eject_heartbeat_grace_secs: default_eject_heartbeat_grace_secs(),
            audit_log_path: None,
            replication_user: default_replication_user(),
        }
    }
}

impl OrchestratorConfig {
    /// Load and validate configuration from file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> ConfigResult<Self> {
        let config: OrchestratorConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.eject_heartbeat_grace_secs == 0 {
            return Err(ConfigError::Invalid(
                "eject_heartbeat_grace_secs must be > 0".to_string(),
            ));
        }
        if self.eject_heartbeat_grace_secs > i64::MAX as u64 / 1000 {
            return Err(ConfigError::Invalid(format!(
                "eject_heartbeat_grace_secs out of range: {}",
                self.eject_heartbeat_grace_secs
            )));
        }
        if self.replication_user.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "replication_user must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn heartbeat_grace(&self) -> Duration {
        Duration::seconds(self.eject_heartbeat_grace_secs as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_from_empty_object() {
        let config = OrchestratorConfig::from_json("{}").unwrap();
        assert_eq!(config, OrchestratorConfig::default());
        assert_eq!(config.engine, EngineFamily::Gtid);
        assert_eq!(config.heartbeat_grace(), Duration::seconds(60));
        assert_eq!(config.replication_user, "os_admin_repl");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"engine":"sync","eject_heartbeat_grace_secs":5,"audit_log_path":"/tmp/a.log"}}"#
        )
        .unwrap();

        let config = OrchestratorConfig::load(file.path()).unwrap();
        assert_eq!(config.engine, EngineFamily::Sync);
        assert_eq!(config.eject_heartbeat_grace_secs, 5);
        assert_eq!(config.audit_log_path, Some(PathBuf::from("/tmp/a.log")));
    }

    #[test]
    fn test_zero_grace_rejected() {
        let err = OrchestratorConfig::from_json(r#"{"eject_heartbeat_grace_secs":0}"#).unwrap_err();
        assert_eq!(err.code(), "AERO_CONFIG_INVALID");
    }

    #[test]
    fn test_empty_user_rejected() {
        let err = OrchestratorConfig::from_json(r#"{"replication_user":"  "}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_unknown_engine_is_parse_error() {
        let err = OrchestratorConfig::from_json(r#"{"engine":"paxos"}"#).unwrap_err();
        assert_eq!(err.code(), "AERO_CONFIG_PARSE");
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = OrchestratorConfig::load(&dir.path().join("absent.json")).unwrap_err();
        assert_eq!(err.code(), "AERO_CONFIG_READ");
    }
}
