//! Runtime configuration.
//!
//! One [`FleetConfig`] is built at startup (defaults, then an optional TOML
//! file, then `FLEETRUN_*` environment overrides) and handed to every
//! component that needs a path or a limit.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Errors produced while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },
}

/// Paths and limits shared by the inventory store, launcher and sessions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FleetConfig {
    /// Directory holding `.yml` / `.yaml` playbooks.
    pub playbooks_dir: PathBuf,
    /// INI inventory file passed to the orchestrator with `-i`.
    pub inventory_file: PathBuf,
    /// Value exported as `ANSIBLE_CONFIG` to every run.
    pub ansible_config: PathBuf,
    /// Orchestrator executable.
    pub ansible_playbook_bin: String,
    /// Upper bound on simultaneously running playbooks.
    pub max_concurrent_runs: usize,
    /// Lines buffered between a session and its client feed.
    pub feed_capacity: usize,
    /// History database URL; `None` selects the local default.
    pub history_url: Option<String>,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            playbooks_dir: PathBuf::from("/etc/ansible/playbooks"),
            inventory_file: PathBuf::from("/etc/ansible/hosts"),
            ansible_config: PathBuf::from("/etc/ansible/ansible.cfg"),
            ansible_playbook_bin: "ansible-playbook".to_string(),
            max_concurrent_runs: 4,
            feed_capacity: 256,
            history_url: None,
        }
    }
}

impl FleetConfig {
    /// Parse a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|source| ConfigError::Parse {
            path: "<inline>".to_string(),
            source,
        })
    }

    /// Read and parse a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Load from an optional file, apply environment overrides, validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        let config = config.with_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `FLEETRUN_*` overrides looked up through `lookup`.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("FLEETRUN_PLAYBOOKS_DIR") {
            self.playbooks_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("FLEETRUN_INVENTORY") {
            self.inventory_file = PathBuf::from(v);
        }
        if let Some(v) = lookup("FLEETRUN_ANSIBLE_CFG") {
            self.ansible_config = PathBuf::from(v);
        }
        if let Some(v) = lookup("FLEETRUN_ANSIBLE_BIN") {
            self.ansible_playbook_bin = v;
        }
        if let Some(v) = lookup("FLEETRUN_MAX_RUNS") {
            self.max_concurrent_runs = v.trim().parse().map_err(|_| ConfigError::Invalid {
                key: "FLEETRUN_MAX_RUNS".to_string(),
                reason: format!("expected a positive integer, got {v:?}"),
            })?;
        }
        if let Some(v) = lookup("FLEETRUN_HISTORY_URL") {
            self.history_url = Some(v);
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_runs == 0 {
            return Err(ConfigError::Invalid {
                key: "max_concurrent_runs".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.feed_capacity == 0 {
            return Err(ConfigError::Invalid {
                key: "feed_capacity".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.ansible_playbook_bin.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "ansible_playbook_bin".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_ansible_layout() {
        let cfg = FleetConfig::default();
        assert_eq!(cfg.inventory_file, PathBuf::from("/etc/ansible/hosts"));
        assert_eq!(cfg.ansible_config, PathBuf::from("/etc/ansible/ansible.cfg"));
        assert_eq!(cfg.max_concurrent_runs, 4);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg = FleetConfig::from_toml_str(
            r#"
            inventory_file = "/tmp/hosts"
            max_concurrent_runs = 2
            "#,
        )
        .unwrap();
        assert_eq!(cfg.inventory_file, PathBuf::from("/tmp/hosts"));
        assert_eq!(cfg.max_concurrent_runs, 2);
        assert_eq!(cfg.ansible_playbook_bin, "ansible-playbook");
    }

    #[test]
    fn bad_toml_is_parse_error() {
        let err = FleetConfig::from_toml_str("max_concurrent_runs = \"many\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn env_overrides_apply() {
        let env: HashMap<&str, &str> = [
            ("FLEETRUN_INVENTORY", "/srv/hosts"),
            ("FLEETRUN_MAX_RUNS", "8"),
            ("FLEETRUN_HISTORY_URL", "mem://"),
        ]
        .into_iter()
        .collect();

        let cfg = FleetConfig::default()
            .with_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(cfg.inventory_file, PathBuf::from("/srv/hosts"));
        assert_eq!(cfg.max_concurrent_runs, 8);
        assert_eq!(cfg.history_url.as_deref(), Some("mem://"));
    }

    #[test]
    fn non_numeric_max_runs_is_rejected() {
        let err = FleetConfig::default()
            .with_overrides(|k| (k == "FLEETRUN_MAX_RUNS").then(|| "lots".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn zero_limits_fail_validation() {
        let cfg = FleetConfig {
            max_concurrent_runs: 0,
            ..FleetConfig::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = FleetConfig {
            feed_capacity: 0,
            ..FleetConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fleetrun.toml");
        std::fs::write(&path, "playbooks_dir = \"/opt/playbooks\"\n").unwrap();
        let cfg = FleetConfig::from_file(&path).unwrap();
        assert_eq!(cfg.playbooks_dir, PathBuf::from("/opt/playbooks"));
    }

    #[test]
    fn missing_file_is_read_error() {
        let err = FleetConfig::from_file(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
