// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// Tests assert with unwrap and panic freely.
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Hetzner Cloud Provider
//!
//! A declarative provider for Hetzner Cloud servers, SSH keys and rescue
//! sessions.
//!
//! ## Overview
//!
//! Declarations are compared with the last observed state of each resource
//! and turned into an ordered operation plan. The reconciler runs the plan
//! one step at a time against the Hetzner Cloud API:
//!
//! - Every asynchronous action is awaited before the next call is issued
//! - Server type changes shut the server down, change the type and power it
//!   back on
//! - Rescue sessions are re-activated on every apply
//! - The first failure aborts the plan and is returned unchanged
//!
//! ## Modules
//!
//! - [`config`]: Provider configuration and the `hcloud.yaml` manifest
//! - [`hcloud`]: API client, collaborator traits and the action watcher
//! - [`planner`]: Declared-vs-observed diff and operation plans
//! - [`reconciler`]: Step-by-step plan execution
//! - [`resources`]: Per-kind specs, states and data sources
//! - [`schema`]: Field tables of every resource kind
//! - [`provider`]: Per-resource create, read, update, delete and import
//! - [`workspace`]: Whole-manifest apply with persisted state
//! - [`state`]: State storage and locking
//!
//! ## Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use hcloud_provider::{
//!     ActionWatcher, HcloudClient, Provider, ProviderConfig, ResourceKind,
//! };
//!
//! # async fn run() -> hcloud_provider::Result<()> {
//! let config = ProviderConfig::with_token("my-token");
//! let client = HcloudClient::from_config(&config)?;
//! let watcher = ActionWatcher::new(client.clone())
//!     .with_poll_interval(Duration::from_millis(config.action_poll_interval_ms));
//!
//! let provider = Provider::new(&client, &watcher)
//!     .with_power_off_policy(config.power_off);
//! let server = provider.import(ResourceKind::Server, "42").await?;
//! println!("imported server {}", server.id());
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod config;
pub mod error;
pub mod hcloud;
pub mod logging;
pub mod planner;
pub mod provider;
pub mod reconciler;
pub mod resources;
pub mod schema;
pub mod state;
pub mod workspace;

#[cfg(test)]
pub(crate) mod testing;

// ============================================================================
// Re-exports
// ============================================================================

pub use config::{ConfigParser, ConfigValidator, Manifest, PowerOffPolicy, ProviderConfig};
pub use error::{ProviderError, Result};
pub use hcloud::{ActionWatcher, CloudApi, HcloudClient, JobHandle, JobWatcher};
pub use logging::init_logging;
pub use planner::{Differ, OperationKind, OperationPlan};
pub use provider::Provider;
pub use reconciler::Reconciler;
pub use resources::{ObservedState, ResourceKind, ResourceSpec};
pub use state::{LocalStateStore, StateStore, WorkspaceState};
pub use workspace::{ApplyReport, Workspace, WorkspacePlan};
