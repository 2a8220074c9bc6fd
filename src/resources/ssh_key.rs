//! SSH key resource.
//!
//! Every call is synchronous. Only the name can change in place; a new public
//! key replaces the resource.

use serde::{Deserialize, Serialize};

use crate::hcloud::SshKey;
use crate::planner::Action;
use crate::schema::{AttrValue, Attributes, FieldFlags, FieldSchema, FieldType};

/// Field table of `hcloud_ssh_key`.
pub const SCHEMA: &[FieldSchema] = &[
    FieldSchema::new("name", FieldType::Str, FieldFlags::REQUIRED),
    FieldSchema::new(
        "public_key",
        FieldType::Str,
        FieldFlags::REQUIRED.union(FieldFlags::FORCE_NEW),
    ),
    FieldSchema::new("fingerprint", FieldType::Str, FieldFlags::COMPUTED),
];

/// Declared SSH key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshKeySpec {
    /// Key name.
    pub name: String,
    /// Public key in OpenSSH format.
    pub public_key: String,
}

/// Observed SSH key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshKeyState {
    /// Key id.
    pub id: u64,
    /// Key name.
    pub name: String,
    /// Public key.
    pub public_key: String,
    /// MD5 fingerprint.
    pub fingerprint: String,
}

impl From<SshKey> for SshKeyState {
    fn from(key: SshKey) -> Self {
        Self {
            id: key.id,
            name: key.name,
            public_key: key.public_key,
            fingerprint: key.fingerprint,
        }
    }
}

/// Maps mutable field differences to update actions.
#[must_use]
pub fn plan_updates(spec: &SshKeySpec, state: &SshKeyState) -> Vec<Action> {
    if spec.name == state.name {
        Vec::new()
    } else {
        vec![Action::Rename {
            name: spec.name.clone(),
        }]
    }
}

/// Reduces a public key to its type and key material, dropping the comment
/// and surrounding whitespace.
#[must_use]
pub fn key_material(public_key: &str) -> String {
    public_key
        .split_whitespace()
        .take(2)
        .collect::<Vec<_>>()
        .join(" ")
}

impl Attributes for SshKeySpec {
    fn attribute(&self, name: &str) -> AttrValue {
        match name {
            "name" => AttrValue::Str(self.name.clone()),
            "public_key" => AttrValue::Str(key_material(&self.public_key)),
            _ => AttrValue::Null,
        }
    }
}

impl Attributes for SshKeyState {
    fn attribute(&self, name: &str) -> AttrValue {
        match name {
            "name" => AttrValue::Str(self.name.clone()),
            "public_key" => AttrValue::Str(key_material(&self.public_key)),
            "fingerprint" => AttrValue::Str(self.fingerprint.clone()),
            _ => AttrValue::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> SshKeyState {
        SshKeyState {
            id: 9,
            name: String::from("admin"),
            public_key: String::from("ssh-ed25519 AAAAC3Nza admin@laptop"),
            fingerprint: String::from("b7:2f:30:a0:2f:6c:58:6c:21:04:58:61:ba:06:3b:2f"),
        }
    }

    #[test]
    fn test_rename() {
        let spec = SshKeySpec {
            name: String::from("ops"),
            public_key: state().public_key,
        };
        assert_eq!(
            plan_updates(&spec, &state()),
            vec![Action::Rename {
                name: String::from("ops")
            }]
        );
    }

    #[test]
    fn test_public_key_attribute_ignores_comment() {
        let spec = SshKeySpec {
            name: String::from("admin"),
            public_key: String::from("ssh-ed25519 AAAAC3Nza\n"),
        };
        assert_eq!(spec.attribute("public_key"), state().attribute("public_key"));
        assert_eq!(key_material("ssh-rsa AAAA  x y"), "ssh-rsa AAAA");
    }
}
