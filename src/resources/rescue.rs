//! Rescue-mode session resource.
//!
//! A rescue session is not a remote object. Creating one enables rescue mode
//! on a server and optionally restarts it into the rescue system; deleting
//! one disables rescue mode and optionally restarts it back. Each activation
//! gets a fresh random identity, so re-applying always activates again.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::hcloud::{EnableRescueRequest, RescueType};
use crate::schema::{AttrValue, Attributes, FieldFlags, FieldSchema, FieldType};

const OPTIONAL: FieldFlags = FieldFlags::OPTIONAL;

/// Field table of `hcloud_rescue`.
pub const SCHEMA: &[FieldSchema] = &[
    FieldSchema::new(
        "server",
        FieldType::Int,
        FieldFlags::REQUIRED.union(FieldFlags::FORCE_NEW),
    ),
    FieldSchema::new(
        "rescue_type",
        FieldType::Str,
        OPTIONAL.union(FieldFlags::FORCE_NEW),
    )
    .with_default("linux64"),
    FieldSchema::new(
        "ssh_keys",
        FieldType::IntList,
        OPTIONAL.union(FieldFlags::FORCE_NEW),
    ),
    FieldSchema::new(
        "password",
        FieldType::Str,
        FieldFlags::COMPUTED.union(FieldFlags::SENSITIVE),
    ),
    FieldSchema::new("reset_on_activation", FieldType::Bool, OPTIONAL).with_default("true"),
    FieldSchema::new("reboot_on_activation", FieldType::Bool, OPTIONAL).with_default("false"),
    FieldSchema::new("reset_on_deactivation", FieldType::Bool, OPTIONAL).with_default("true"),
    FieldSchema::new("reboot_on_deactivation", FieldType::Bool, OPTIONAL)
        .with_default("false"),
];

const fn default_true() -> bool {
    true
}

/// Declared rescue session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RescueSpec {
    /// Server id.
    pub server: u64,
    /// Rescue system flavour.
    #[serde(default, rename = "type", alias = "rescue_type")]
    pub rescue_type: RescueType,
    /// SSH key ids injected into the rescue system.
    #[serde(default)]
    pub ssh_keys: Vec<u64>,
    /// Hard-reset into the rescue system after enabling it.
    #[serde(default = "default_true")]
    pub reset_on_activation: bool,
    /// Soft-reboot into the rescue system after enabling it. Wins over reset.
    #[serde(default)]
    pub reboot_on_activation: bool,
    /// Hard-reset out of the rescue system after disabling it.
    #[serde(default = "default_true")]
    pub reset_on_deactivation: bool,
    /// Soft-reboot out of the rescue system after disabling it. Wins over reset.
    #[serde(default)]
    pub reboot_on_deactivation: bool,
}

/// Observed rescue session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RescueState {
    /// Identity of this activation.
    pub id: Uuid,
    /// The declaration the session was activated with.
    #[serde(flatten)]
    pub spec: RescueSpec,
    /// Root password of the rescue system.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// How to restart a server after toggling rescue mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Restart {
    /// Soft reboot.
    Reboot,
    /// Hard reset.
    Reset,
    /// Leave the server alone.
    None,
}

impl RescueSpec {
    /// Restart to issue after enabling rescue mode.
    #[must_use]
    pub const fn activation_restart(&self) -> Restart {
        restart(self.reboot_on_activation, self.reset_on_activation)
    }

    /// Restart to issue after disabling rescue mode.
    #[must_use]
    pub const fn deactivation_restart(&self) -> Restart {
        restart(self.reboot_on_deactivation, self.reset_on_deactivation)
    }

    /// Builds the enable request.
    #[must_use]
    pub fn to_enable_request(&self) -> EnableRescueRequest {
        EnableRescueRequest {
            rescue_type: self.rescue_type,
            ssh_keys: self.ssh_keys.clone(),
        }
    }
}

const fn restart(reboot: bool, reset: bool) -> Restart {
    if reboot {
        Restart::Reboot
    } else if reset {
        Restart::Reset
    } else {
        Restart::None
    }
}

impl RescueState {
    /// Records a new activation with a fresh identity.
    #[must_use]
    pub fn activated(spec: RescueSpec, password: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            spec,
            password,
        }
    }
}

impl Attributes for RescueSpec {
    fn attribute(&self, name: &str) -> AttrValue {
        match name {
            "server" => AttrValue::Int(self.server),
            "rescue_type" => AttrValue::Str(self.rescue_type.to_string()),
            "ssh_keys" => AttrValue::IntList(self.ssh_keys.clone()),
            "reset_on_activation" => AttrValue::Bool(self.reset_on_activation),
            "reboot_on_activation" => AttrValue::Bool(self.reboot_on_activation),
            "reset_on_deactivation" => AttrValue::Bool(self.reset_on_deactivation),
            "reboot_on_deactivation" => AttrValue::Bool(self.reboot_on_deactivation),
            _ => AttrValue::Null,
        }
    }
}

impl Attributes for RescueState {
    fn attribute(&self, name: &str) -> AttrValue {
        match name {
            "password" => self.password.as_deref().into(),
            other => self.spec.attribute(other),
        }
    }
}
