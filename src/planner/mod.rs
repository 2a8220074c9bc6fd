//! Planning module for resource operations.
//!
//! This module compares declared and observed state and produces the
//! ordered operation plan the reconciler executes.

mod diff;
mod plan;

pub use diff::{Differ, FieldChange};
pub use plan::{Action, Operation, OperationKind, OperationPlan, Target};
