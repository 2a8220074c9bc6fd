//! Server resource.
//!
//! Replacement fields are `datacenter`, `location`, `image`, `ssh_keys` and
//! `user_data`. Everything else updates in place: `name` by rename,
//! `ipv4_ptr` by a reverse DNS change, `server_type` by a type change under
//! the power sub-protocol, and the backup policy by enabling or disabling
//! backups.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

use crate::error::{Result, ValidationError};
use crate::hcloud::{CreateServerRequest, Server, ServerStatus};
use crate::planner::Action;
use crate::schema::{AttrValue, Attributes, FieldFlags, FieldSchema, FieldType};

const REQUIRED: FieldFlags = FieldFlags::REQUIRED;
const OPTIONAL: FieldFlags = FieldFlags::OPTIONAL;
const COMPUTED: FieldFlags = FieldFlags::COMPUTED;
const OPTIONAL_COMPUTED: FieldFlags = FieldFlags::OPTIONAL.union(FieldFlags::COMPUTED);

/// Field table of `hcloud_server`.
pub const SCHEMA: &[FieldSchema] = &[
    FieldSchema::new("name", FieldType::Str, REQUIRED),
    FieldSchema::new("server_type", FieldType::Int, REQUIRED),
    FieldSchema::new(
        "datacenter",
        FieldType::Int,
        OPTIONAL_COMPUTED.union(FieldFlags::FORCE_NEW),
    )
    .with_conflicts(&["location"]),
    FieldSchema::new(
        "location",
        FieldType::Int,
        OPTIONAL_COMPUTED.union(FieldFlags::FORCE_NEW),
    )
    .with_conflicts(&["datacenter"]),
    FieldSchema::new("image", FieldType::Int, REQUIRED.union(FieldFlags::FORCE_NEW)),
    FieldSchema::new(
        "ssh_keys",
        FieldType::IntList,
        OPTIONAL.union(FieldFlags::FORCE_NEW),
    ),
    FieldSchema::new("user_data", FieldType::Str, OPTIONAL.union(FieldFlags::FORCE_NEW)),
    FieldSchema::new("status", FieldType::Str, COMPUTED),
    FieldSchema::new("created", FieldType::Timestamp, COMPUTED),
    FieldSchema::new("ipv4", FieldType::Str, COMPUTED),
    FieldSchema::new("ipv4_ptr", FieldType::Str, OPTIONAL_COMPUTED),
    FieldSchema::new("ipv6", FieldType::Str, COMPUTED),
    FieldSchema::new("ipv6_ptr", FieldType::StrMap, COMPUTED),
    FieldSchema::new(
        "root_password",
        FieldType::Str,
        COMPUTED.union(FieldFlags::SENSITIVE),
    ),
    FieldSchema::new("upgrade_disk", FieldType::Bool, OPTIONAL).with_default("true"),
    FieldSchema::new("backup", FieldType::Bool, OPTIONAL).with_default("false"),
    FieldSchema::new("backup_window", FieldType::Str, OPTIONAL).with_default(""),
    FieldSchema::new("rescue_enabled", FieldType::Bool, COMPUTED),
];

const fn default_true() -> bool {
    true
}

/// Declared server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSpec {
    /// Server name.
    pub name: String,
    /// Server type id.
    pub server_type: u64,
    /// Datacenter id; conflicts with `location`.
    #[serde(default)]
    pub datacenter: Option<u64>,
    /// Location id; conflicts with `datacenter`.
    #[serde(default)]
    pub location: Option<u64>,
    /// Image id.
    pub image: u64,
    /// SSH key ids injected at creation.
    #[serde(default)]
    pub ssh_keys: Vec<u64>,
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
    /// Requested backup window; empty lets the cloud pick.
    #[serde(default)]
    pub backup_window: String,
}

/// Observed server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerState {
    /// Server id.
    pub id: u64,
    /// Server name.
    pub name: String,
    /// Server type id.
    pub server_type: u64,
    /// Datacenter id.
    pub datacenter: u64,
    /// Location id.
    pub location: u64,
    /// Image id; `None` once the image is gone.
    #[serde(default)]
    pub image: Option<u64>,
    /// SSH key ids the server was created with.
    #[serde(default)]
    pub ssh_keys: Vec<u64>,
    /// User data the server was created with.
    #[serde(default)]
    pub user_data: Option<String>,
    /// Status at the last read.
    pub status: ServerStatus,
    /// Creation time.
    pub created: DateTime<Utc>,
    /// Primary IPv4 address.
    #[serde(default)]
    pub ipv4: Option<String>,
    /// Reverse DNS entry of the primary IPv4 address.
    #[serde(default)]
    pub ipv4_ptr: Option<String>,
    /// IPv6 network.
    #[serde(default)]
    pub ipv6: Option<String>,
    /// Reverse DNS entries in the IPv6 network.
    #[serde(default)]
    pub ipv6_ptr: BTreeMap<String, String>,
    /// Root password returned at creation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_password: Option<String>,
    /// Last applied disk upgrade policy.
    #[serde(default = "default_true")]
    pub upgrade_disk: bool,
    /// Whether backups are enabled.
    pub backup: bool,
    /// Backup window, empty when disabled.
    #[serde(default)]
    pub backup_window: String,
    /// Whether rescue mode is enabled.
    #[serde(default)]
    pub rescue_enabled: bool,
    /// A type change powered the server off and it is yet to be powered on.
    #[serde(default)]
    pub power_on_pending: bool,
}

impl ServerSpec {
    /// Checks field combinations that the API would reject.
    ///
    /// # Errors
    ///
    /// Returns a validation error when `datacenter` and `location` are both set.
    pub fn validate(&self) -> Result<()> {
        if self.datacenter.is_some() && self.location.is_some() {
            return Err(ValidationError::ConflictingFields {
                first: String::from("datacenter"),
                second: String::from("location"),
            }
            .into());
        }
        Ok(())
    }

    /// Builds the create request.
    #[must_use]
    pub fn to_create_request(&self) -> CreateServerRequest {
        CreateServerRequest {
            name: self.name.clone(),
            server_type: self.server_type,
            image: self.image,
            ssh_keys: self.ssh_keys.clone(),
            location: self.location,
            datacenter: self.datacenter,
            user_data: self.user_data.clone(),
        }
    }

    /// The backup window to request, `None` when the cloud should pick.
    #[must_use]
    pub fn requested_window(&self) -> Option<&str> {
        Some(self.backup_window.as_str()).filter(|w| !w.is_empty())
    }
}

impl ServerState {
    /// Builds state from a remote server, keeping the fields the API does not
    /// report (creation inputs, secrets, pending intents) from `previous`.
    #[must_use]
    pub fn from_remote(server: &Server, previous: Option<&Self>) -> Self {
        let ipv6_ptr = server
            .public_net
            .ipv6
            .as_ref()
            .map(|v6| {
                v6.dns_ptr
                    .iter()
                    .map(|p| (p.ip.clone(), p.dns_ptr.clone()))
                    .collect()
            })
            .unwrap_or_default();

        let backup_window = server.backup_window().to_string();

        Self {
            id: server.id,
            name: server.name.clone(),
            server_type: server.server_type.id,
            datacenter: server.datacenter.id,
            location: server.datacenter.location.id,
            image: server
                .image
                .as_ref()
                .map(|i| i.id)
                .or_else(|| previous.and_then(|p| p.image)),
            ssh_keys: previous.map(|p| p.ssh_keys.clone()).unwrap_or_default(),
            user_data: previous.and_then(|p| p.user_data.clone()),
            status: server.status,
            created: server.created,
            ipv4: server.ipv4().map(str::to_string),
            ipv4_ptr: server.ipv4_ptr().map(str::to_string),
            ipv6: server.ipv6().map(str::to_string),
            ipv6_ptr,
            root_password: previous.and_then(|p| p.root_password.clone()),
            upgrade_disk: previous.is_none_or(|p| p.upgrade_disk),
            backup: !backup_window.is_empty(),
            backup_window,
            rescue_enabled: server.rescue_enabled,
            power_on_pending: previous.is_some_and(|p| p.power_on_pending),
        }
    }

    /// Builds state for a freshly created server.
    #[must_use]
    pub fn from_created(server: &Server, spec: &ServerSpec, root_password: Option<String>) -> Self {
        let mut state = Self::from_remote(server, None);
        state.image = Some(spec.image);
        state.ssh_keys.clone_from(&spec.ssh_keys);
        state.user_data.clone_from(&spec.user_data);
        state.upgrade_disk = spec.upgrade_disk;
        state.root_password = root_password;
        state
    }
}

/// Maps mutable field differences to update actions.
///
/// Order: rename, reverse DNS, pending power-on, type change, then backups.
/// A pending power-on is folded into a planned type change, which powers
/// the server on once the new type is set.
#[must_use]
pub fn plan_updates(spec: &ServerSpec, state: &ServerState) -> Vec<Action> {
    let mut actions = Vec::new();

    if spec.name != state.name {
        actions.push(Action::Rename {
            name: spec.name.clone(),
        });
    }

    if let Some(ptr) = spec.ipv4_ptr.as_ref().filter(|p| !p.is_empty())
        && state.ipv4_ptr.as_ref() != Some(ptr)
    {
        match &state.ipv4 {
            Some(ip) => actions.push(Action::ChangeDnsPtr {
                ip: ip.clone(),
                dns_ptr: ptr.clone(),
            }),
            None => warn!(
                "Server {} has no IPv4 address, ignoring ipv4_ptr {ptr:?}",
                state.id
            ),
        }
    }

    let type_changed = spec.server_type != state.server_type;

    if state.power_on_pending && !type_changed {
        actions.push(Action::PowerOn);
    }

    if type_changed {
        actions.push(Action::ChangeType {
            server_type: spec.server_type,
            upgrade_disk: spec.upgrade_disk,
        });
    }

    if spec.backup {
        let window_moved = spec
            .requested_window()
            .is_some_and(|w| w != state.backup_window);
        if state.backup_window.is_empty() || window_moved {
            actions.push(Action::EnableBackup {
                window: spec.requested_window().map(str::to_string),
            });
        }
    } else if !state.backup_window.is_empty() {
        actions.push(Action::DisableBackup);
    }

    actions
}

impl Attributes for ServerSpec {
    fn attribute(&self, name: &str) -> AttrValue {
        match name {
            "name" => AttrValue::Str(self.name.clone()),
            "server_type" => AttrValue::Int(self.server_type),
            "datacenter" => self.datacenter.into(),
            "location" => self.location.into(),
            "image" => AttrValue::Int(self.image),
            "ssh_keys" => AttrValue::IntList(self.ssh_keys.clone()),
            "user_data" => self.user_data.as_deref().into(),
            "ipv4_ptr" => self.ipv4_ptr.as_deref().into(),
            "upgrade_disk" => AttrValue::Bool(self.upgrade_disk),
            "backup" => AttrValue::Bool(self.backup),
            "backup_window" => AttrValue::Str(self.backup_window.clone()),
            _ => AttrValue::Null,
        }
    }
}

impl Attributes for ServerState {
    fn attribute(&self, name: &str) -> AttrValue {
        match name {
            "name" => AttrValue::Str(self.name.clone()),
            "server_type" => AttrValue::Int(self.server_type),
            "datacenter" => AttrValue::Int(self.datacenter),
            "location" => AttrValue::Int(self.location),
            "image" => self.image.into(),
            "ssh_keys" => AttrValue::IntList(self.ssh_keys.clone()),
            "user_data" => self.user_data.as_deref().into(),
            "status" => AttrValue::Str(self.status.to_string()),
            "created" => AttrValue::Str(self.created.to_rfc3339()),
            "ipv4" => self.ipv4.as_deref().into(),
            "ipv4_ptr" => self.ipv4_ptr.as_deref().into(),
            "ipv6" => self.ipv6.as_deref().into(),
            "root_password" => self.root_password.as_deref().into(),
            "upgrade_disk" => AttrValue::Bool(self.upgrade_disk),
            "backup" => AttrValue::Bool(self.backup),
            "backup_window" => AttrValue::Str(self.backup_window.clone()),
            "rescue_enabled" => AttrValue::Bool(self.rescue_enabled),
            _ => AttrValue::Null,
        }
    }
}
