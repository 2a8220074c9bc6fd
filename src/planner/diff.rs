//! Differ for comparing declared vs observed state.
//!
//! This module computes the ordered operations that move one resource from
//! its observed state to its declaration.

use tracing::debug;

use crate::error::{PlanError, Result};
use crate::resources::{ObservedState, ResourceSpec, server, ssh_key};
use crate::schema::{AttrValue, Attributes, resource_schema};

use super::plan::{Action, OperationPlan};

/// A replacement-forcing field that differs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldChange {
    /// Field name.
    pub field: &'static str,
    /// Observed value.
    pub old_value: AttrValue,
    /// Declared value.
    pub new_value: AttrValue,
}

/// Computes operation plans.
#[derive(Debug, Default, Clone, Copy)]
pub struct Differ;

impl Differ {
    /// Creates a new differ.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Plans the operations for one resource.
    ///
    /// - No observed state: `[Create]`.
    /// - A replacement-forcing field differs: `[Delete, Create]`.
    /// - Otherwise one operation per differing mutable field. Rescue sessions
    ///   are re-activated with `[Create]`.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError::ResourceTypeMismatch`] if the declaration and the
    /// observed state are of different kinds.
    pub fn plan(
        &self,
        spec: &ResourceSpec,
        observed: Option<&ObservedState>,
    ) -> Result<OperationPlan> {
        let kind = spec.kind();

        let Some(observed) = observed else {
            debug!("{kind} has no observed state, planning create");
            let mut plan = OperationPlan::new(kind, None);
            plan.push(Action::Create(Box::new(spec.clone())));
            return Ok(plan);
        };

        if observed.kind() != kind {
            return Err(PlanError::ResourceTypeMismatch {
                desired: kind.to_string(),
                observed: observed.kind().to_string(),
            }
            .into());
        }

        let mut plan = OperationPlan::new(kind, Some(observed.id()));

        let changes = Self::force_new_changes(spec, observed);
        if !changes.is_empty() {
            for change in &changes {
                debug!(
                    "{kind}[{}] {} changes {} -> {}, replacing",
                    observed.id(),
                    change.field,
                    change.old_value,
                    change.new_value
                );
            }
            plan.push(Action::Delete);
            plan.push(Action::Create(Box::new(spec.clone())));
            return Ok(plan);
        }

        let updates = match (spec, observed) {
            (ResourceSpec::Server(spec), ObservedState::Server(state)) => {
                server::plan_updates(spec, state)
            }
            (ResourceSpec::SshKey(spec), ObservedState::SshKey(state)) => {
                ssh_key::plan_updates(spec, state)
            }
            (ResourceSpec::Rescue(_), ObservedState::Rescue(_)) => {
                vec![Action::Create(Box::new(spec.clone()))]
            }
            // Mismatched kinds were rejected above.
            _ => Vec::new(),
        };

        for action in updates {
            plan.push(action);
        }

        debug!(
            "{kind}[{}] planned {} operations",
            observed.id(),
            plan.len()
        );
        Ok(plan)
    }

    /// Plans the removal of an existing resource.
    #[must_use]
    pub fn plan_destroy(&self, observed: &ObservedState) -> OperationPlan {
        let mut plan = OperationPlan::new(observed.kind(), Some(observed.id()));
        plan.push(Action::Delete);
        plan
    }

    /// Returns the replacement-forcing fields whose declared value differs
    /// from the observed one. Unset optional computed fields never differ.
    #[must_use]
    pub fn force_new_changes(spec: &ResourceSpec, observed: &ObservedState) -> Vec<FieldChange> {
        resource_schema(spec.kind())
            .iter()
            .filter(|field| field.is_force_new())
            .filter_map(|field| {
                let new_value = spec.attribute(field.name);
                if new_value.is_null() && field.is_optional_computed() {
                    return None;
                }
                let old_value = observed.attribute(field.name);
                differs(&new_value, &old_value).then_some(FieldChange {
                    field: field.name,
                    old_value,
                    new_value,
                })
            })
            .collect()
    }
}

/// An empty list and an empty string compare equal to unset.
fn differs(new_value: &AttrValue, old_value: &AttrValue) -> bool {
    let blank = |value: &AttrValue| match value {
        AttrValue::Null => true,
        AttrValue::IntList(ids) => ids.is_empty(),
        AttrValue::Str(s) => s.is_empty(),
        _ => false,
    };
    !(blank(new_value) && blank(old_value)) && new_value != old_value
}
