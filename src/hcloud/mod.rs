//! Hetzner Cloud API integration module.
//!
//! This module provides the collaborator traits the reconciler drives, an
//! HTTP implementation of them, and the action watcher.

mod api;
mod client;
mod types;
mod watcher;

pub use api::{CloudApi, JobHandle, JobWatcher, RescueEnabled, ServerCreated};
#[cfg(test)]
pub use api::MockJobWatcher;
pub use client::{HCLOUD_API_URL, HcloudClient};
pub use types::{
    Action, ActionErrorInfo, ActionStatus, CreateServerRequest, Datacenter,
    DatacenterServerTypes, DnsPtr, EnableRescueRequest, Image, Ipv4, Ipv6, Location, PublicNet,
    RescueType, Server, ServerStatus, ServerType, SshKey,
};
pub use watcher::{ActionWatcher, DEFAULT_POLL_INTERVAL_MS};
