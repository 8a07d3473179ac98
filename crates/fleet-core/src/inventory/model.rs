//! INI inventory text model.
//!
//! ```text
//! # comment
//! ungrouped-host ansible_host=10.0.0.9     <- belongs to "all"
//! [web]
//! web1 ansible_host=10.0.0.1 ansible_user=deploy
//! [web]                                    <- duplicate header: a new section
//! web2
//! ```
//!
//! Parsing is line based and never fails: anything that is not blank, a
//! comment, or a `[group]` header is a host line.

use serde::{Deserialize, Serialize};

/// Group a host belongs to when no header precedes it.
pub const DEFAULT_GROUP: &str = "all";

/// `ip_or_alias` value for hosts without an `ansible_host` variable.
pub const UNKNOWN_ADDRESS: &str = "unknown";

const ADDRESS_KEY: &str = "ansible_host";

/// A host as seen by operators: name, address and owning group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostRecord {
    pub hostname: String,
    pub ip_or_alias: String,
    pub group: String,
}

impl HostRecord {
    pub fn new(
        hostname: impl Into<String>,
        ip_or_alias: impl Into<String>,
        group: impl Into<String>,
    ) -> Self {
        Self {
            hostname: hostname.into(),
            ip_or_alias: ip_or_alias.into(),
            group: group.into(),
        }
    }

    /// Text appended to the inventory file for this host.
    ///
    /// Always starts a fresh `[group]` section so an append can never change
    /// the membership of existing hosts.
    pub fn append_text(&self) -> String {
        format!(
            "\n[{}]\n{} {}={}\n",
            self.group, self.hostname, ADDRESS_KEY, self.ip_or_alias
        )
    }
}

/// One host line: the hostname plus its remaining tokens, kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostEntry {
    pub hostname: String,
    pub tokens: Vec<String>,
}

impl HostEntry {
    fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        let hostname = parts.next()?.to_string();
        Some(Self {
            hostname,
            tokens: parts.map(str::to_string).collect(),
        })
    }

    /// Value of the last `ansible_host=` token, if any.
    ///
    /// The value ends at the next `=`, so `ansible_host=a=b` yields `a`.
    pub fn address(&self) -> Option<&str> {
        self.tokens
            .iter()
            .filter(|t| t.starts_with("ansible_host="))
            .filter_map(|t| t.split('=').nth(1))
            .last()
    }

    fn to_line(&self) -> String {
        if self.tokens.is_empty() {
            self.hostname.clone()
        } else {
            format!("{} {}", self.hostname, self.tokens.join(" "))
        }
    }
}

/// Consecutive hosts under one header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupSection {
    pub name: String,
    /// `false` for the leading section of hosts that precede any header.
    pub explicit: bool,
    pub hosts: Vec<HostEntry>,
}

/// Parsed inventory: ordered sections, duplicates kept distinct.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inventory {
    pub sections: Vec<GroupSection>,
}

fn is_ignored(trimmed: &str) -> bool {
    trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';')
}

fn header_name(trimmed: &str) -> Option<&str> {
    trimmed
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
}

impl Inventory {
    pub fn parse(text: &str) -> Self {
        let mut sections: Vec<GroupSection> = Vec::new();

        for line in text.lines() {
            let trimmed = line.trim();
            if is_ignored(trimmed) {
                continue;
            }
            if let Some(name) = header_name(trimmed) {
                sections.push(GroupSection {
                    name: name.to_string(),
                    explicit: true,
                    hosts: Vec::new(),
                });
                continue;
            }
            let Some(entry) = HostEntry::parse(trimmed) else {
                continue;
            };
            if sections.is_empty() {
                sections.push(GroupSection {
                    name: DEFAULT_GROUP.to_string(),
                    explicit: false,
                    hosts: Vec::new(),
                });
            }
            if let Some(current) = sections.last_mut() {
                current.hosts.push(entry);
            }
        }

        Self { sections }
    }

    /// Every host in file order, tagged with its group.
    pub fn hosts(&self) -> Vec<HostRecord> {
        self.sections
            .iter()
            .flat_map(|section| {
                section.hosts.iter().map(move |entry| HostRecord {
                    hostname: entry.hostname.clone(),
                    ip_or_alias: entry.address().unwrap_or(UNKNOWN_ADDRESS).to_string(),
                    group: section.name.clone(),
                })
            })
            .collect()
    }

    /// Hosts of `group`, concatenated across duplicate sections.
    pub fn group(&self, group: &str) -> Vec<HostRecord> {
        self.hosts().into_iter().filter(|h| h.group == group).collect()
    }

    /// Serialize back to inventory text. Comments and blank lines are not
    /// preserved; membership, order and host variables are.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for section in &self.sections {
            if !out.is_empty() {
                out.push('\n');
            }
            if section.explicit {
                out.push_str(&format!("[{}]\n", section.name));
            }
            for host in &section.hosts {
                out.push_str(&host.to_line());
                out.push('\n');
            }
        }
        out
    }
}

/// Drop every line whose first token equals `hostname`.
///
/// All other lines are kept byte for byte, including comments, blank lines
/// and headers. Returns the new text and the number of lines removed.
pub fn remove_host_lines(text: &str, hostname: &str) -> (String, usize) {
    let mut kept = String::with_capacity(text.len());
    let mut removed = 0;
    for line in text.split_inclusive('\n') {
        let first = line.split_whitespace().next().unwrap_or("");
        if first == hostname {
            removed += 1;
        } else {
            kept.push_str(line);
        }
    }
    (kept, removed)
}
