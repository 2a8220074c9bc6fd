//! Resource type modules.
//!
//! Each resource kind owns its declared spec, its observed state, its schema
//! table and the mapping from field differences to update operations.

pub mod data_source;
pub mod rescue;
pub mod server;
pub mod ssh_key;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, ValidationError};
use crate::schema::{AttrValue, Attributes};

pub use rescue::{RescueSpec, RescueState};
pub use server::{ServerSpec, ServerState};
pub use ssh_key::{SshKeySpec, SshKeyState};

/// Kind of a managed resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// A cloud server.
    Server,
    /// An SSH key.
    SshKey,
    /// A rescue-mode session on a server.
    Rescue,
}

/// Declared configuration of one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResourceSpec {
    /// Server declaration.
    Server(ServerSpec),
    /// SSH key declaration.
    SshKey(SshKeySpec),
    /// Rescue session declaration.
    Rescue(RescueSpec),
}

/// Last known remote state of one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ObservedState {
    /// Observed server.
    Server(ServerState),
    /// Observed SSH key.
    SshKey(SshKeyState),
    /// Observed rescue session.
    Rescue(RescueState),
}

impl ResourceSpec {
    /// Returns the resource kind.
    #[must_use]
    pub const fn kind(&self) -> ResourceKind {
        match self {
            Self::Server(_) => ResourceKind::Server,
            Self::SshKey(_) => ResourceKind::SshKey,
            Self::Rescue(_) => ResourceKind::Rescue,
        }
    }
}

impl ObservedState {
    /// Returns the resource kind.
    #[must_use]
    pub const fn kind(&self) -> ResourceKind {
        match self {
            Self::Server(_) => ResourceKind::Server,
            Self::SshKey(_) => ResourceKind::SshKey,
            Self::Rescue(_) => ResourceKind::Rescue,
        }
    }

    /// Returns the stable string identity stored in persisted state.
    #[must_use]
    pub fn id(&self) -> String {
        match self {
            Self::Server(s) => s.id.to_string(),
            Self::SshKey(k) => k.id.to_string(),
            Self::Rescue(r) => r.id.to_string(),
        }
    }
}

impl Attributes for ResourceSpec {
    fn attribute(&self, name: &str) -> AttrValue {
        match self {
            Self::Server(s) => s.attribute(name),
            Self::SshKey(k) => k.attribute(name),
            Self::Rescue(r) => r.attribute(name),
        }
    }
}

impl Attributes for ObservedState {
    fn attribute(&self, name: &str) -> AttrValue {
        match self {
            Self::Server(s) => s.attribute(name),
            Self::SshKey(k) => k.attribute(name),
            Self::Rescue(r) => r.attribute(name),
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Server => "hcloud_server",
            Self::SshKey => "hcloud_ssh_key",
            Self::Rescue => "hcloud_rescue",
        };
        write!(f, "{name}")
    }
}

/// Parses a stored identity string into a numeric id.
///
/// # Errors
///
/// Returns a validation error if the string is not a positive integer.
pub fn parse_id(id: &str) -> Result<u64> {
    match id.trim().parse::<u64>() {
        Ok(0) => Err(ValidationError::InvalidId {
            id: id.to_string(),
            reason: String::from("ids start at 1"),
        }
        .into()),
        Ok(value) => Ok(value),
        Err(e) => Err(ValidationError::InvalidId {
            id: id.to_string(),
            reason: e.to_string(),
        }
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;

    #[test]
    fn test_parse_id() {
        assert_eq!(parse_id("42").unwrap(), 42);
        assert!(matches!(
            parse_id("abc"),
            Err(ProviderError::Validation(ValidationError::InvalidId { .. }))
        ));
        assert!(parse_id("0").is_err());
        assert!(parse_id("").is_err());
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(ResourceKind::Server.to_string(), "hcloud_server");
        assert_eq!(ResourceKind::Rescue.to_string(), "hcloud_rescue");
    }

    #[test]
    fn test_spec_tagged_serialization() {
        let spec = ResourceSpec::SshKey(SshKeySpec {
            name: String::from("admin"),
            public_key: String::from("ssh-ed25519 AAAA admin"),
        });
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["kind"], "ssh_key");
        let back: ResourceSpec = serde_json::from_value(json).unwrap();
        assert_eq!(back.kind(), ResourceKind::SshKey);
    }
}
