//! Configuration types.
//!
//! [`ProviderConfig`] configures the API client and the reconciler.
//! [`Manifest`] is the YAML document a workspace applies: provider settings,
//! where state lives, data source lookups and the declared resources.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::hcloud::{DEFAULT_POLL_INTERVAL_MS, HCLOUD_API_URL, RescueType};
use crate::resources::data_source::{DataSourceKind, DataSourceQuery};
use crate::state::STATE_DIR;

/// Default HTTP request timeout.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default interval between action status polls.
pub const DEFAULT_ACTION_POLL_INTERVAL_MS: u64 = DEFAULT_POLL_INTERVAL_MS;

/// Provider configuration.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProviderConfig {
    /// API token. Usually supplied through `HCLOUD_TOKEN`.
    #[serde(default, skip_serializing)]
    pub token: String,
    /// API base URL.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// HTTP request timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Interval between action status polls in milliseconds.
    #[serde(default = "default_action_poll_interval_ms")]
    pub action_poll_interval_ms: u64,
    /// Graceful shutdown policy used before type changes.
    #[serde(default)]
    pub power_off: PowerOffPolicy,
}

/// How long to wait for a graceful shutdown before cutting power.
///
/// Exhausting the attempts is not an error; the server is powered off hard.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PowerOffPolicy {
    /// Seconds between status polls.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Number of polls.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

/// State backend configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StateConfig {
    /// State file path. Defaults to `.hcloud/state.json`.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// The manifest a workspace applies.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Manifest {
    /// Workspace name recorded in state.
    #[serde(default = "default_workspace")]
    pub workspace: String,
    /// Provider configuration.
    #[serde(default)]
    pub provider: ProviderConfig,
    /// State backend.
    #[serde(default)]
    pub state: StateConfig,
    /// Data source lookups, keyed by label.
    #[serde(default)]
    pub data: BTreeMap<String, DataSourceDecl>,
    /// SSH keys.
    #[serde(default)]
    pub ssh_keys: Vec<SshKeyDecl>,
    /// Servers.
    #[serde(default)]
    pub servers: Vec<ServerDecl>,
    /// Rescue sessions.
    #[serde(default)]
    pub rescues: Vec<RescueDecl>,
}

/// A reference to a remote object: a numeric id or a name.
///
/// Names of server types, images, locations and datacenters are resolved
/// through the matching data source. Names in `ssh_keys` and rescue
/// `server` fields refer to resources declared in the same manifest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum Reference {
    /// Numeric id.
    Id(u64),
    /// Name.
    Name(String),
}

/// A data source lookup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DataSourceDecl {
    /// Data source kind.
    pub kind: DataSourceKind,
    /// Lookup by id.
    #[serde(default)]
    pub id: Option<u64>,
    /// Lookup by name.
    #[serde(default)]
    pub name: Option<String>,
}

/// A declared SSH key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SshKeyDecl {
    /// Label, also the key name unless `key_name` is set.
    pub name: String,
    /// Name of the key in the cloud.
    #[serde(default)]
    pub key_name: Option<String>,
    /// Public key in OpenSSH format.
    pub public_key: String,
}

/// A declared server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerDecl {
    /// Label, also the server name unless `hostname` is set.
    pub name: String,
    /// Name of the server in the cloud.
    #[serde(default)]
    pub hostname: Option<String>,
    /// Server type.
    pub server_type: Reference,
    /// Image.
    pub image: Reference,
    /// Location; conflicts with `datacenter`.
    #[serde(default)]
    pub location: Option<Reference>,
    /// Datacenter; conflicts with `location`.
    #[serde(default)]
    pub datacenter: Option<Reference>,
    /// SSH keys injected at creation.
    #[serde(default)]
    pub ssh_keys: Vec<Reference>,
    /// Cloud-init user data.
    #[serde(default)]
    pub user_data: Option<String>,
    /// Reverse DNS entry of the primary IPv4 address.
    #[serde(default)]
    pub ipv4_ptr: Option<String>,
    /// Grow the disk on type changes.
    #[serde(default = "default_true")]
    pub upgrade_disk: bool,
    /// Keep backups enabled.
    #[serde(default)]
    pub backup: bool,
    /// Requested backup window.
    #[serde(default)]
    pub backup_window: String,
}

/// A declared rescue session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RescueDecl {
    /// Label.
    pub name: String,
    /// Server to put into rescue mode.
    pub server: Reference,
    /// Rescue system flavour.
    #[serde(default, rename = "type", alias = "rescue_type")]
    pub rescue_type: RescueType,
    /// SSH keys injected into the rescue system.
    #[serde(default)]
    pub ssh_keys: Vec<Reference>,
    /// Hard-reset into the rescue system.
    #[serde(default = "default_true")]
    pub reset_on_activation: bool,
    /// Soft-reboot into the rescue system.
    #[serde(default)]
    pub reboot_on_activation: bool,
    /// Hard-reset out of the rescue system.
    #[serde(default = "default_true")]
    pub reset_on_deactivation: bool,
    /// Soft-reboot out of the rescue system.
    #[serde(default)]
    pub reboot_on_deactivation: bool,
}

fn default_endpoint() -> String {
    HCLOUD_API_URL.to_string()
}

const fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

const fn default_action_poll_interval_ms() -> u64 {
    DEFAULT_ACTION_POLL_INTERVAL_MS
}

const fn default_poll_interval_secs() -> u64 {
    30
}

const fn default_max_attempts() -> u32 {
    10
}

fn default_workspace() -> String {
    String::from("default")
}

const fn default_true() -> bool {
    true
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            endpoint: default_endpoint(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            action_poll_interval_ms: DEFAULT_ACTION_POLL_INTERVAL_MS,
            power_off: PowerOffPolicy::default(),
        }
    }
}

impl ProviderConfig {
    /// Creates a configuration with the given token and defaults elsewhere.
    #[must_use]
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            ..Self::default()
        }
    }

    /// Returns the action poll interval.
    #[must_use]
    pub const fn action_poll_interval(&self) -> Duration {
        Duration::from_millis(self.action_poll_interval_ms)
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("token", &"<redacted>")
            .field("endpoint", &self.endpoint)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("action_poll_interval_ms", &self.action_poll_interval_ms)
            .field("power_off", &self.power_off)
            .finish()
    }
}

impl Default for PowerOffPolicy {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl PowerOffPolicy {
    /// Returns the interval between polls.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl StateConfig {
    /// Returns the state file path.
    #[must_use]
    pub fn path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| PathBuf::from(STATE_DIR).join("state.json"))
    }
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            workspace: default_workspace(),
            provider: ProviderConfig::default(),
            state: StateConfig::default(),
            data: BTreeMap::new(),
            ssh_keys: Vec::new(),
            servers: Vec::new(),
            rescues: Vec::new(),
        }
    }
}

impl Manifest {
    /// Finds a declared SSH key by label.
    #[must_use]
    pub fn ssh_key(&self, name: &str) -> Option<&SshKeyDecl> {
        self.ssh_keys.iter().find(|k| k.name == name)
    }

    /// Finds a declared server by label.
    #[must_use]
    pub fn server(&self, name: &str) -> Option<&ServerDecl> {
        self.servers.iter().find(|s| s.name == name)
    }

    /// Total number of declared resources.
    #[must_use]
    pub fn resource_count(&self) -> usize {
        self.ssh_keys.len() + self.servers.len() + self.rescues.len()
    }
}

impl DataSourceDecl {
    /// Converts the declaration into a lookup query.
    #[must_use]
    pub fn to_query(&self) -> DataSourceQuery {
        DataSourceQuery {
            id: self.id.map(|id| id.to_string()),
            name: self.name.clone(),
        }
    }
}

impl SshKeyDecl {
    /// Name of the key in the cloud.
    #[must_use]
    pub fn key_name(&self) -> &str {
        self.key_name.as_deref().unwrap_or(&self.name)
    }
}

impl ServerDecl {
    /// Name of the server in the cloud.
    #[must_use]
    pub fn server_name(&self) -> &str {
        self.hostname.as_deref().unwrap_or(&self.name)
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Name(name) => write!(f, "{name}"),
        }
    }
}
