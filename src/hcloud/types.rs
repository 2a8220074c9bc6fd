//! Hetzner Cloud API types and data structures.
//!
//! These mirror the JSON objects of the public REST API. Only the fields the
//! provider reads are modelled; unknown fields are ignored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A Hetzner Cloud server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    /// Unique server identifier.
    pub id: u64,
    /// Server name.
    pub name: String,
    /// Current status.
    #[serde(default)]
    pub status: ServerStatus,
    /// Creation timestamp.
    pub created: DateTime<Utc>,
    /// Public network configuration.
    pub public_net: PublicNet,
    /// Server type.
    pub server_type: ServerType,
    /// Datacenter the server runs in.
    pub datacenter: Datacenter,
    /// Image the server was created from (absent once the image is deleted).
    #[serde(default)]
    pub image: Option<Image>,
    /// Backup window, `None` when backups are disabled.
    #[serde(default)]
    pub backup_window: Option<String>,
    /// Whether rescue mode is enabled for the next boot.
    #[serde(default)]
    pub rescue_enabled: bool,
}

/// Public network configuration of a server.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PublicNet {
    /// Primary IPv4 address.
    #[serde(default)]
    pub ipv4: Option<Ipv4>,
    /// Primary IPv6 network.
    #[serde(default)]
    pub ipv6: Option<Ipv6>,
}

/// Primary IPv4 address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ipv4 {
    /// IP address.
    pub ip: String,
    /// Reverse DNS pointer.
    #[serde(default)]
    pub dns_ptr: Option<String>,
}

/// Primary IPv6 network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ipv6 {
    /// Network in CIDR notation.
    pub ip: String,
    /// Reverse DNS pointers of addresses in the network.
    #[serde(default)]
    pub dns_ptr: Vec<DnsPtr>,
}

/// A single reverse DNS entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsPtr {
    /// IP address the pointer belongs to.
    pub ip: String,
    /// Hostname the address resolves to.
    pub dns_ptr: String,
}

/// Server status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    /// Server is running.
    Running,
    /// Server is being initialized.
    Initializing,
    /// Server is starting.
    Starting,
    /// Server is stopping.
    Stopping,
    /// Server is powered off.
    Off,
    /// Server is being deleted.
    Deleting,
    /// Server is migrating.
    Migrating,
    /// Server is being rebuilt.
    Rebuilding,
    /// Unknown status.
    #[default]
    #[serde(other)]
    Unknown,
}

/// A server type (CPU/memory/disk plan).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerType {
    /// Server type identifier.
    pub id: u64,
    /// Unique name, e.g. `cx22`.
    pub name: String,
    /// Description.
    #[serde(default)]
    pub description: String,
    /// Number of cores.
    #[serde(default)]
    pub cores: u32,
    /// Memory in GB.
    #[serde(default)]
    pub memory: f64,
    /// Disk size in GB.
    #[serde(default)]
    pub disk: u64,
}

/// A datacenter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Datacenter {
    /// Datacenter identifier.
    pub id: u64,
    /// Unique name, e.g. `fsn1-dc14`.
    pub name: String,
    /// Description.
    #[serde(default)]
    pub description: String,
    /// Location of the datacenter.
    pub location: Location,
    /// Server types offered here.
    #[serde(default)]
    pub server_types: DatacenterServerTypes,
}

/// Server types of a datacenter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatacenterServerTypes {
    /// Server types supported in this datacenter.
    #[serde(default)]
    pub supported: Vec<u64>,
    /// Server types currently available for creation.
    #[serde(default)]
    pub available: Vec<u64>,
}

/// A location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    /// Location identifier.
    pub id: u64,
    /// Unique name, e.g. `fsn1`.
    pub name: String,
    /// Description.
    #[serde(default)]
    pub description: String,
    /// ISO 3166-1 alpha-2 country code.
    #[serde(default)]
    pub country: String,
    /// City name.
    #[serde(default)]
    pub city: String,
}

/// An image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Image {
    /// Image identifier.
    pub id: u64,
    /// Unique name; snapshots and backups have none.
    #[serde(default)]
    pub name: Option<String>,
    /// Description.
    #[serde(default)]
    pub description: String,
    /// Image status (`available`, `creating`, `unavailable`).
    #[serde(default)]
    pub status: String,
}

/// An SSH key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshKey {
    /// SSH key identifier.
    pub id: u64,
    /// Name of the key.
    pub name: String,
    /// MD5 fingerprint.
    pub fingerprint: String,
    /// Public key in OpenSSH format.
    pub public_key: String,
}

/// An asynchronous action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    /// Action identifier.
    pub id: u64,
    /// Command the action runs, e.g. `start_server`.
    pub command: String,
    /// Current status.
    pub status: ActionStatus,
    /// Progress in percent.
    #[serde(default)]
    pub progress: u8,
    /// Error details once the action failed.
    #[serde(default)]
    pub error: Option<ActionErrorInfo>,
}

/// Action status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    /// Still in progress.
    Running,
    /// Finished successfully.
    Success,
    /// Finished with an error.
    Error,
}

/// Error details of a failed action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionErrorInfo {
    /// Error code.
    pub code: String,
    /// Error message.
    pub message: String,
}

/// Rescue system flavour.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RescueType {
    /// 64-bit Linux.
    #[default]
    Linux64,
    /// 32-bit Linux.
    Linux32,
    /// 64-bit FreeBSD.
    Freebsd64,
}

/// Request to create a server.
#[derive(Debug, Clone, Serialize)]
pub struct CreateServerRequest {
    /// Server name.
    pub name: String,
    /// Server type id.
    pub server_type: u64,
    /// Image id.
    pub image: u64,
    /// SSH key ids to inject.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ssh_keys: Vec<u64>,
    /// Location id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<u64>,
    /// Datacenter id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub datacenter: Option<u64>,
    /// Cloud-init user data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_data: Option<String>,
}

/// Request to enable rescue mode.
#[derive(Debug, Clone, Serialize)]
pub struct EnableRescueRequest {
    /// Rescue system flavour.
    #[serde(rename = "type")]
    pub rescue_type: RescueType,
    /// SSH key ids to inject into the rescue system.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ssh_keys: Vec<u64>,
}

impl Server {
    /// Returns the primary IPv4 address, if any.
    #[must_use]
    pub fn ipv4(&self) -> Option<&str> {
        self.public_net.ipv4.as_ref().map(|v4| v4.ip.as_str())
    }

    /// Returns the IPv4 reverse DNS pointer, if any.
    #[must_use]
    pub fn ipv4_ptr(&self) -> Option<&str> {
        self.public_net
            .ipv4
            .as_ref()
            .and_then(|v4| v4.dns_ptr.as_deref())
    }

    /// Returns the IPv6 network, if any.
    #[must_use]
    pub fn ipv6(&self) -> Option<&str> {
        self.public_net.ipv6.as_ref().map(|v6| v6.ip.as_str())
    }

    /// Returns the backup window, empty when backups are disabled.
    #[must_use]
    pub fn backup_window(&self) -> &str {
        self.backup_window.as_deref().unwrap_or_default()
    }

    /// Checks if the server is powered off.
    #[must_use]
    pub const fn is_off(&self) -> bool {
        matches!(self.status, ServerStatus::Off)
    }
}

impl std::fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = match self {
            Self::Running => "running",
            Self::Initializing => "initializing",
            Self::Starting => "starting",
            Self::Stopping => "stopping",
            Self::Off => "off",
            Self::Deleting => "deleting",
            Self::Migrating => "migrating",
            Self::Rebuilding => "rebuilding",
            Self::Unknown => "unknown",
        };
        write!(f, "{status}")
    }
}

impl std::fmt::Display for RescueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Linux64 => "linux64",
            Self::Linux32 => "linux32",
            Self::Freebsd64 => "freebsd64",
        };
        write!(f, "{name}")
    }
}

impl std::str::FromStr for RescueType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "linux64" => Ok(Self::Linux64),
            "linux32" => Ok(Self::Linux32),
            "freebsd64" => Ok(Self::Freebsd64),
            other => Err(format!(
                "Invalid rescue type: {other}. Expected: linux64, linux32, or freebsd64"
            )),
        }
    }
}
