//! Configuration parsing and the persisted config-apply flag.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use pigeon_ipc::{ServiceConfig, ServiceStatus};
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;

const KNOWN_LOG_LEVELS: [&str; 6] = ["CRITICAL", "ERROR", "WARNING", "INFO", "DEBUG", "VERBOSE"];

const APPLY_FLAG_FILE: &str = "config_apply_in_progress.json";

/// Parse the JSON blob handed to `initialize`.
pub fn parse_config(config_json: &str) -> Result<ServiceConfig, ServiceError> {
    let config: ServiceConfig =
        serde_json::from_str(config_json).map_err(|err| ServiceError::InvalidConfig {
            message: format!("malformed config blob: {err}"),
        })?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &ServiceConfig) -> Result<(), ServiceError> {
    if config.storage_path.trim().is_empty() {
        return Err(ServiceError::InvalidConfig {
            message: "storage_path must not be empty".into(),
        });
    }
    if !KNOWN_LOG_LEVELS.contains(&config.log_level.to_ascii_uppercase().as_str()) {
        return Err(ServiceError::InvalidConfig {
            message: format!("unknown log_level: {}", config.log_level),
        });
    }
    for interface in &config.enabled_interfaces {
        if interface.kind.trim().is_empty() {
            return Err(ServiceError::InvalidConfig {
                message: "interface entry missing type".into(),
            });
        }
    }
    Ok(())
}

#[derive(Debug, Serialize, Deserialize)]
struct ApplyFlagRecord {
    started_at: u64,
}

/// Persisted "config apply in progress" marker.
///
/// Written when an initialize cycle with a new configuration begins and
/// removed when it settles, so a competing auto-initialization attempt in
/// another process backs off. A flag left behind by a crashed apply is
/// detected through [`ConfigApplyFlag::is_stale`] and safe to clear.
pub struct ConfigApplyFlag {
    path: PathBuf,
}

impl ConfigApplyFlag {
    pub fn new(storage_root: &Path) -> Self {
        Self {
            path: storage_root.join(APPLY_FLAG_FILE),
        }
    }

    pub fn mark(&self) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let record = ApplyFlagRecord {
            started_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
        };
        let body = serde_json::to_vec(&record).map_err(std::io::Error::other)?;
        fs::write(&self.path, body)
    }

    pub fn clear(&self) -> std::io::Result<()> {
        match fs::remove_file(&self.path) {
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }

    pub fn is_marked(&self) -> bool {
        self.path.exists()
    }

    /// A marked flag is stale — safe to clear and ignore — when the observed
    /// service status is `SHUTDOWN`, an `ERROR` state, or unobservable: a
    /// live apply would hold the service in `INITIALIZING`/`RESTARTING` or
    /// have reached `READY`.
    pub fn is_stale(&self, observed_status: Option<&ServiceStatus>) -> bool {
        if !self.is_marked() {
            return false;
        }
        match observed_status {
            None => true,
            Some(ServiceStatus::Shutdown) | Some(ServiceStatus::Error(_)) => true,
            Some(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_rejects_blank_storage_path_and_bad_level() {
        let err = parse_config(r#"{"storage_path": "  "}"#).expect_err("blank path");
        assert!(matches!(err, ServiceError::InvalidConfig { .. }));

        let err = parse_config(r#"{"storage_path": "/tmp/p", "log_level": "LOUD"}"#)
            .expect_err("bad level");
        assert!(matches!(err, ServiceError::InvalidConfig { .. }));
    }

    #[test]
    fn parse_accepts_minimal_config() {
        let config = parse_config(r#"{"storagePath": "/tmp/p"}"#).expect("minimal config");
        assert_eq!(config.storage_path, "/tmp/p");
    }

    #[test]
    fn apply_flag_marks_clears_and_reports_staleness() {
        let dir = tempfile::tempdir().expect("tempdir");
        let flag = ConfigApplyFlag::new(dir.path());

        assert!(!flag.is_marked());
        // An absent flag is never stale, whatever the status looks like.
        assert!(!flag.is_stale(None));

        flag.mark().expect("mark");
        assert!(flag.is_marked());

        // Live apply: not stale.
        assert!(!flag.is_stale(Some(&ServiceStatus::Initializing)));
        assert!(!flag.is_stale(Some(&ServiceStatus::Ready)));

        // Crashed apply: stale under SHUTDOWN, ERROR, or no observable status.
        assert!(flag.is_stale(Some(&ServiceStatus::Shutdown)));
        assert!(flag.is_stale(Some(&ServiceStatus::Error("boom".into()))));
        assert!(flag.is_stale(None));

        flag.clear().expect("clear");
        assert!(!flag.is_marked());
        // Clearing an already cleared flag is fine.
        flag.clear().expect("clear twice");
    }
}
