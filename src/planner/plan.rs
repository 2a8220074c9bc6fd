//! Operation plan types.
//!
//! A plan is the ordered list of remote operations that moves one resource
//! from its observed state to its declared state.

use std::fmt;

use crate::resources::{ResourceKind, ResourceSpec};

/// An ordered plan for one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationPlan {
    /// Kind of the resource the plan applies to.
    pub resource_kind: ResourceKind,
    /// Identity of the resource before the plan runs, if it exists.
    pub prior_id: Option<String>,
    /// Operations in execution order.
    pub operations: Vec<Operation>,
}

/// A single planned operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    /// Resource the operation acts on.
    pub target: Target,
    /// What to do.
    pub action: Action,
}

/// Identity of the resource an operation acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Resource kind.
    pub kind: ResourceKind,
    /// Remote identity; `None` for a resource that is yet to be created.
    pub id: Option<String>,
}

/// Operation parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Create the resource from the declaration.
    Create(Box<ResourceSpec>),
    /// Delete (or, for rescue sessions, deactivate) the resource.
    Delete,
    /// Rename the resource.
    Rename {
        /// New name.
        name: String,
    },
    /// Change the reverse DNS entry of an address.
    ChangeDnsPtr {
        /// Address the entry belongs to.
        ip: String,
        /// New pointer.
        dns_ptr: String,
    },
    /// Power the server back on after an interrupted type change.
    PowerOn,
    /// Change the server type.
    ChangeType {
        /// New server type id.
        server_type: u64,
        /// Whether to grow the disk with the new type.
        upgrade_disk: bool,
    },
    /// Enable backups or move the backup window.
    EnableBackup {
        /// Requested window; `None` lets the cloud pick one.
        window: Option<String>,
    },
    /// Disable backups.
    DisableBackup,
}

/// Kind of a remote step.
///
/// Covers every planned [`Action`] plus the steps the reconciler issues on
/// its own while sequencing them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// Create.
    Create,
    /// Delete.
    Delete,
    /// Rename.
    Rename,
    /// Change reverse DNS.
    ChangeDnsPtr,
    /// Power on.
    PowerOn,
    /// Change server type.
    ChangeType,
    /// Enable backups.
    EnableBackup,
    /// Disable backups.
    DisableBackup,
    /// ACPI shutdown.
    Shutdown,
    /// Hard power off.
    PowerOff,
    /// Soft reboot.
    Reboot,
    /// Hard reset.
    Reset,
    /// Enable rescue mode.
    EnableRescue,
    /// Disable rescue mode.
    DisableRescue,
}

impl OperationPlan {
    /// Creates an empty plan.
    #[must_use]
    pub const fn new(resource_kind: ResourceKind, prior_id: Option<String>) -> Self {
        Self {
            resource_kind,
            prior_id,
            operations: Vec::new(),
        }
    }

    /// Appends an operation on the prior resource.
    pub fn push(&mut self, action: Action) {
        let id = match action {
            Action::Create(_) => None,
            _ => self.prior_id.clone(),
        };
        self.operations.push(Operation {
            target: Target {
                kind: self.resource_kind,
                id,
            },
            action,
        });
    }

    /// Returns true if nothing needs to change.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Returns the number of operations.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.operations.len()
    }

    /// Returns the operation kinds in order.
    #[must_use]
    pub fn kinds(&self) -> Vec<OperationKind> {
        self.operations.iter().map(|op| op.action.kind()).collect()
    }

    /// Returns true if the plan replaces the resource.
    #[must_use]
    pub fn is_replacement(&self) -> bool {
        self.kinds() == [OperationKind::Delete, OperationKind::Create]
    }
}

impl Action {
    /// Returns the operation kind.
    #[must_use]
    pub const fn kind(&self) -> OperationKind {
        match self {
            Self::Create(_) => OperationKind::Create,
            Self::Delete => OperationKind::Delete,
            Self::Rename { .. } => OperationKind::Rename,
            Self::ChangeDnsPtr { .. } => OperationKind::ChangeDnsPtr,
            Self::PowerOn => OperationKind::PowerOn,
            Self::ChangeType { .. } => OperationKind::ChangeType,
            Self::EnableBackup { .. } => OperationKind::EnableBackup,
            Self::DisableBackup => OperationKind::DisableBackup,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Delete => "delete",
            Self::Rename => "rename",
            Self::ChangeDnsPtr => "change_dns_ptr",
            Self::PowerOn => "poweron",
            Self::ChangeType => "change_type",
            Self::EnableBackup => "enable_backup",
            Self::DisableBackup => "disable_backup",
            Self::Shutdown => "shutdown",
            Self::PowerOff => "poweroff",
            Self::Reboot => "reboot",
            Self::Reset => "reset",
            Self::EnableRescue => "enable_rescue",
            Self::DisableRescue => "disable_rescue",
        };
        write!(f, "{s}")
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.id {
            Some(id) => write!(f, "{}[{id}]", self.kind),
            None => write!(f, "{}[new]", self.kind),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.action.kind(), self.target)?;
        match &self.action {
            Action::Rename { name } => write!(f, " -> {name:?}"),
            Action::ChangeDnsPtr { ip, dns_ptr } => write!(f, " {ip} -> {dns_ptr}"),
            Action::ChangeType { server_type, .. } => write!(f, " -> {server_type}"),
            Action::EnableBackup {
                window: Some(window),
            } => write!(f, " window {window}"),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for OperationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.operations.is_empty() {
            return write!(f, "No changes required");
        }

        writeln!(f, "Plan ({} operations):", self.operations.len())?;
        for (i, op) in self.operations.iter().enumerate() {
            writeln!(f, "  {i}. {op}")?;
        }
        Ok(())
    }
}
