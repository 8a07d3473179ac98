//! Validated inventory requests.
//!
//! Raw payloads are checked here, before the store opens any file, so a
//! malformed host can never be appended.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::error::{InventoryError, InventoryResult};
use super::model::{HostRecord, DEFAULT_GROUP};

fn hostname_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^\s=\[\]#;][^\s=]*$").expect("valid hostname regex"))
}

fn group_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.:\-]*$").expect("valid group regex"))
}

fn address_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^\s=]+$").expect("valid address regex"))
}

/// Request to append a host to the inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddHostRequest {
    pub hostname: String,
    pub ip: String,
    #[serde(default)]
    pub group: Option<String>,
}

impl AddHostRequest {
    pub fn new(hostname: impl Into<String>, ip: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            ip: ip.into(),
            group: None,
        }
    }

    pub fn in_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Trim and check every field, producing the record to append.
    ///
    /// A missing or blank group falls back to `all`.
    pub fn validate(self) -> InventoryResult<HostRecord> {
        let hostname = validate_hostname(&self.hostname)?;

        let ip = self.ip.trim();
        if !address_re().is_match(ip) {
            return Err(InventoryError::Invalid {
                field: "ip",
                reason: format!("{ip:?} must be a non-empty address without spaces or '='"),
            });
        }

        let group = match self.group.as_deref().map(str::trim) {
            None | Some("") => DEFAULT_GROUP,
            Some(g) => g,
        };
        if !group_re().is_match(group) {
            return Err(InventoryError::Invalid {
                field: "group",
                reason: format!("{group:?} is not a valid group name"),
            });
        }

        Ok(HostRecord::new(hostname, ip, group))
    }
}

/// Check a hostname used for add or remove, returning it trimmed.
pub fn validate_hostname(raw: &str) -> InventoryResult<String> {
    let hostname = raw.trim();
    if !hostname_re().is_match(hostname) {
        return Err(InventoryError::Invalid {
            field: "hostname",
            reason: format!("{hostname:?} is not a valid inventory hostname"),
        });
    }
    Ok(hostname.to_string())
}
