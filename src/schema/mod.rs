//! Declarative field tables for every resource and data source.
//!
//! Each resource kind exposes a static table of fields and their flags. The
//! differ consults these tables to decide which differences force a
//! replacement and which desired values are "unset, let the cloud decide".

use std::fmt;
use std::ops::BitOr;

use crate::resources::{ResourceKind, data_source::DataSourceKind, rescue, server, ssh_key};

/// Behaviour flags of a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FieldFlags(u8);

impl FieldFlags {
    /// No flags.
    pub const NONE: Self = Self(0);
    /// The field must be set.
    pub const REQUIRED: Self = Self(1);
    /// The field may be left unset.
    pub const OPTIONAL: Self = Self(1 << 1);
    /// The cloud fills the field in when it is unset.
    pub const COMPUTED: Self = Self(1 << 2);
    /// Any change replaces the resource.
    pub const FORCE_NEW: Self = Self(1 << 3);
    /// The value is a secret and must not be logged.
    pub const SENSITIVE: Self = Self(1 << 4);

    /// Combines two flag sets.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Checks whether all flags of `other` are set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for FieldFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

/// Value type of a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// Integer or numeric id.
    Int,
    /// String.
    Str,
    /// Boolean.
    Bool,
    /// List of numeric ids.
    IntList,
    /// Map of strings.
    StrMap,
    /// Timestamp.
    Timestamp,
}

/// One field of a resource or data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSchema {
    /// Attribute name.
    pub name: &'static str,
    /// Value type.
    pub field_type: FieldType,
    /// Behaviour flags.
    pub flags: FieldFlags,
    /// Default applied when the field is unset.
    pub default: Option<&'static str>,
    /// Fields that may not be set together with this one.
    pub conflicts_with: &'static [&'static str],
}

impl FieldSchema {
    /// Creates a field with no default and no conflicts.
    #[must_use]
    pub const fn new(name: &'static str, field_type: FieldType, flags: FieldFlags) -> Self {
        Self {
            name,
            field_type,
            flags,
            default: None,
            conflicts_with: &[],
        }
    }

    /// Sets the default value.
    #[must_use]
    pub const fn with_default(mut self, default: &'static str) -> Self {
        self.default = Some(default);
        self
    }

    /// Sets the conflicting fields.
    #[must_use]
    pub const fn with_conflicts(mut self, conflicts_with: &'static [&'static str]) -> Self {
        self.conflicts_with = conflicts_with;
        self
    }

    /// Any change to this field replaces the resource.
    #[must_use]
    pub const fn is_force_new(&self) -> bool {
        self.flags.contains(FieldFlags::FORCE_NEW)
    }

    /// An unset desired value means "whatever the cloud picked".
    #[must_use]
    pub const fn is_optional_computed(&self) -> bool {
        self.flags
            .contains(FieldFlags::OPTIONAL.union(FieldFlags::COMPUTED))
    }

    /// The value must not appear in logs or plan output.
    #[must_use]
    pub const fn is_sensitive(&self) -> bool {
        self.flags.contains(FieldFlags::SENSITIVE)
    }
}

/// A dynamically typed attribute value, used for schema-driven comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrValue {
    /// Unset.
    Null,
    /// Boolean.
    Bool(bool),
    /// Integer or numeric id.
    Int(u64),
    /// String.
    Str(String),
    /// List of numeric ids.
    IntList(Vec<u64>),
}

impl AttrValue {
    /// Returns true if the value is unset.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<Option<u64>> for AttrValue {
    fn from(value: Option<u64>) -> Self {
        value.map_or(Self::Null, Self::Int)
    }
}

impl From<Option<&str>> for AttrValue {
    fn from(value: Option<&str>) -> Self {
        value.map_or(Self::Null, |s| Self::Str(s.to_string()))
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "(unset)"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Str(s) => write!(f, "{s:?}"),
            Self::IntList(ids) => write!(f, "{ids:?}"),
        }
    }
}

/// Read access to attributes by schema field name.
pub trait Attributes {
    /// Returns the value of the named attribute, [`AttrValue::Null`] if unset
    /// or unknown.
    fn attribute(&self, name: &str) -> AttrValue;
}

/// Returns the field table of a resource kind.
#[must_use]
pub const fn resource_schema(kind: ResourceKind) -> &'static [FieldSchema] {
    match kind {
        ResourceKind::Server => server::SCHEMA,
        ResourceKind::SshKey => ssh_key::SCHEMA,
        ResourceKind::Rescue => rescue::SCHEMA,
    }
}

/// Returns the field table of a data source kind.
#[must_use]
pub const fn data_source_schema(kind: DataSourceKind) -> &'static [FieldSchema] {
    use crate::resources::data_source;

    match kind {
        DataSourceKind::Datacenter => data_source::DATACENTER_SCHEMA,
        DataSourceKind::Image => data_source::IMAGE_SCHEMA,
        DataSourceKind::Location => data_source::LOCATION_SCHEMA,
        DataSourceKind::ServerType => data_source::SERVER_TYPE_SCHEMA,
    }
}

/// Looks up a field by name.
#[must_use]
pub fn field(kind: ResourceKind, name: &str) -> Option<&'static FieldSchema> {
    resource_schema(kind).iter().find(|f| f.name == name)
}

/// Returns the names of fields whose change replaces the resource.
#[must_use]
pub fn force_new_fields(kind: ResourceKind) -> Vec<&'static str> {
    resource_schema(kind)
        .iter()
        .filter(|f| f.is_force_new())
        .map(|f| f.name)
        .collect()
}
