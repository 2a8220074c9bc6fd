//! Persisted state types.
//!
//! One [`ResourceRecord`] per declared instance, keyed by its address
//! (`hcloud_server.web`), carrying the stable string identity and the last
//! observed state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Result, StateError};
use crate::resources::{ObservedState, ResourceKind};

/// Current version of the state format.
pub const STATE_VERSION: &str = "1.0";

/// Maximum number of history entries kept.
const MAX_HISTORY: usize = 100;

/// Builds the address of a declared instance.
#[must_use]
pub fn address(kind: ResourceKind, name: &str) -> String {
    format!("{kind}.{name}")
}

/// The complete persisted state of one workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceState {
    /// State format version.
    pub version: String,
    /// Workspace name.
    pub workspace: String,
    /// Records keyed by address.
    #[serde(default)]
    pub resources: BTreeMap<String, ResourceRecord>,
    /// When the state was last updated.
    pub last_updated: DateTime<Utc>,
    /// Apply history (recent entries).
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

/// State of one declared instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceRecord {
    /// Address, e.g. `hcloud_server.web`.
    pub address: String,
    /// Stable string identity.
    pub id: String,
    /// Last observed state.
    pub state: ObservedState,
    /// When the record was first written.
    pub created_at: DateTime<Utc>,
    /// When the record was last written.
    pub updated_at: DateTime<Utc>,
}

/// A single entry in the apply history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// When the run finished.
    pub timestamp: DateTime<Utc>,
    /// Type of run.
    pub operation: HistoryOperation,
    /// Addresses that were changed.
    pub resources: Vec<String>,
    /// Whether the run succeeded.
    pub success: bool,
    /// Error message of a failed run.
    #[serde(default)]
    pub error: Option<String>,
}

/// Types of runs recorded in the history.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HistoryOperation {
    /// Manifest apply.
    Apply,
    /// Import of an existing object.
    Import,
    /// Destruction of every managed resource.
    Destroy,
}

impl WorkspaceState {
    /// Creates a new empty state.
    #[must_use]
    pub fn new(workspace: &str) -> Self {
        Self {
            version: STATE_VERSION.to_string(),
            workspace: workspace.to_string(),
            resources: BTreeMap::new(),
            last_updated: Utc::now(),
            history: Vec::new(),
        }
    }

    /// Rejects state written by an incompatible format version.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::VersionMismatch`] if the major versions differ.
    pub fn check_version(&self) -> Result<()> {
        let major = |v: &str| v.split('.').next().unwrap_or_default().to_string();
        if major(&self.version) == major(STATE_VERSION) {
            Ok(())
        } else {
            Err(StateError::VersionMismatch {
                expected: STATE_VERSION.to_string(),
                found: self.version.clone(),
            }
            .into())
        }
    }

    /// Gets a record by address.
    #[must_use]
    pub fn get(&self, address: &str) -> Option<&ResourceRecord> {
        self.resources.get(address)
    }

    /// Gets the observed state of an address.
    #[must_use]
    pub fn observed(&self, address: &str) -> Option<&ObservedState> {
        self.resources.get(address).map(|r| &r.state)
    }

    /// Writes the observed state of an address, or removes the record when
    /// the state is gone.
    pub fn put(&mut self, address: &str, state: Option<ObservedState>) {
        match state {
            Some(state) => self.set(address, state),
            None => {
                self.remove(address);
            }
        }
    }

    /// Adds or updates a record.
    pub fn set(&mut self, address: &str, state: ObservedState) {
        let now = Utc::now();
        let id = state.id();
        self.resources
            .entry(address.to_string())
            .and_modify(|record| {
                record.id.clone_from(&id);
                record.state = state.clone();
                record.updated_at = now;
            })
            .or_insert_with(|| ResourceRecord {
                address: address.to_string(),
                id,
                state,
                created_at: now,
                updated_at: now,
            });
        self.last_updated = now;
    }

    /// Removes a record by address.
    pub fn remove(&mut self, address: &str) -> Option<ResourceRecord> {
        let result = self.resources.remove(address);
        if result.is_some() {
            self.last_updated = Utc::now();
        }
        result
    }

    /// Returns all addresses.
    #[must_use]
    pub fn addresses(&self) -> Vec<&str> {
        self.resources.keys().map(String::as_str).collect()
    }

    /// Returns the addresses of records of one kind.
    #[must_use]
    pub fn addresses_of(&self, kind: ResourceKind) -> Vec<String> {
        self.resources
            .values()
            .filter(|r| r.state.kind() == kind)
            .map(|r| r.address.clone())
            .collect()
    }

    /// Adds a history entry.
    pub fn add_history(&mut self, entry: HistoryEntry) {
        if self.history.len() >= MAX_HISTORY {
            self.history.remove(0);
        }
        self.history.push(entry);
    }
}

impl HistoryEntry {
    /// Creates a successful history entry.
    #[must_use]
    pub fn new(operation: HistoryOperation, resources: Vec<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            operation,
            resources,
            success: true,
            error: None,
        }
    }

    /// Creates a failed history entry.
    #[must_use]
    pub fn failed(operation: HistoryOperation, resources: Vec<String>, error: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            operation,
            resources,
            success: false,
            error: Some(error.to_string()),
        }
    }
}

impl std::fmt::Display for HistoryOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let op = match self {
            Self::Apply => "apply",
            Self::Import => "import",
            Self::Destroy => "destroy",
        };
        write!(f, "{op}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::SshKeyState;

    fn key(id: u64) -> ObservedState {
        ObservedState::SshKey(SshKeyState {
            id,
            name: String::from("admin"),
            public_key: String::from("ssh-ed25519 AAAA"),
            fingerprint: String::from("b7:2f"),
        })
    }

    #[test]
    fn test_set_keeps_created_at() {
        let mut state = WorkspaceState::new("prod");
        let addr = address(ResourceKind::SshKey, "admin");

        state.set(&addr, key(1));
        let created = state.get(&addr).unwrap().created_at;
        state.set(&addr, key(2));

        let record = state.get(&addr).unwrap();
        assert_eq!(record.id, "2");
        assert_eq!(record.created_at, created);
        assert_eq!(state.addresses_of(ResourceKind::SshKey), vec![addr]);
    }

    #[test]
    fn test_put_none_removes() {
        let mut state = WorkspaceState::new("prod");
        state.set("hcloud_ssh_key.admin", key(1));
        state.put("hcloud_ssh_key.admin", None);
        assert!(state.addresses().is_empty());
    }

    #[test]
    fn test_history_is_bounded() {
        let mut state = WorkspaceState::new("prod");
        for _ in 0..(MAX_HISTORY + 5) {
            state.add_history(HistoryEntry::new(HistoryOperation::Apply, vec![]));
        }
        assert_eq!(state.history.len(), MAX_HISTORY);
    }

    #[test]
    fn test_version_check() {
        let mut state = WorkspaceState::new("prod");
        assert!(state.check_version().is_ok());
        state.version = String::from("2.0");
        assert!(state.check_version().is_err());
    }
}
