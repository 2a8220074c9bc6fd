//! In-memory cloud used by unit tests.
//!
//! `FakeCloud` implements both [`CloudApi`] and [`JobWatcher`]. Every call is
//! recorded as a short string (`"shutdown_server 42"`, `"wait shutdown_server"`)
//! so tests can assert on exact call sequences. Effects apply when the call
//! is made, unless the job was configured to fail.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use crate::config::PowerOffPolicy;
use crate::error::{ApiError, JobError, Result};
use crate::hcloud::{
    Action, ActionStatus, CloudApi, CreateServerRequest, Datacenter, DatacenterServerTypes,
    EnableRescueRequest, Image, Ipv4, Ipv6, JobHandle, JobWatcher, Location, PublicNet,
    RescueEnabled, Server, ServerCreated, ServerStatus, ServerType, SshKey,
};

/// Power-off policy that does not sleep.
pub(crate) const fn fast_power_off() -> PowerOffPolicy {
    PowerOffPolicy {
        poll_interval_secs: 0,
        max_attempts: 3,
    }
}

#[derive(Debug, Default)]
struct Inner {
    servers: BTreeMap<u64, Server>,
    ssh_keys: BTreeMap<u64, SshKey>,
    next_id: u64,
    calls: Vec<String>,
    failing: HashSet<String>,
    ignore_shutdown: bool,
    shutdown_after_polls: Option<u32>,
    // status reads left before a shut-down server reports off
    shutdown_countdown: BTreeMap<u64, u32>,
}

#[derive(Debug)]
pub(crate) struct FakeCloud {
    inner: Mutex<Inner>,
    datacenters: Vec<Datacenter>,
    images: Vec<Image>,
    locations: Vec<Location>,
    server_types: Vec<ServerType>,
}

fn location(id: u64, name: &str, city: &str) -> Location {
    Location {
        id,
        name: name.to_string(),
        description: format!("{city} DC Park"),
        country: String::from("DE"),
        city: city.to_string(),
    }
}

fn server_type(id: u64, name: &str, cores: u32) -> ServerType {
    ServerType {
        id,
        name: name.to_string(),
        description: name.to_uppercase(),
        cores,
        memory: f64::from(cores * 2),
        disk: u64::from(cores) * 40,
    }
}

fn image(id: u64, name: &str) -> Image {
    Image {
        id,
        name: Some(name.to_string()),
        description: name.to_string(),
        status: String::from("available"),
    }
}

impl FakeCloud {
    pub(crate) const ROOT_PASSWORD: &'static str = "root-secret";
    pub(crate) const RESCUE_PASSWORD: &'static str = "rescue-secret";
    pub(crate) const ASSIGNED_BACKUP_WINDOW: &'static str = "22-02";

    pub(crate) fn new() -> Self {
        let fsn1 = location(1, "fsn1", "Falkenstein");
        let nbg1 = location(2, "nbg1", "Nuremberg");

        Self {
            inner: Mutex::new(Inner {
                next_id: 1000,
                ..Inner::default()
            }),
            datacenters: vec![
                Datacenter {
                    id: 4,
                    name: String::from("fsn1-dc14"),
                    description: String::from("Falkenstein 1 DC14"),
                    location: fsn1.clone(),
                    server_types: DatacenterServerTypes {
                        supported: vec![1, 2, 3],
                        available: vec![1, 2],
                    },
                },
                Datacenter {
                    id: 5,
                    name: String::from("nbg1-dc3"),
                    description: String::from("Nuremberg 1 DC3"),
                    location: nbg1.clone(),
                    server_types: DatacenterServerTypes {
                        supported: vec![1, 2],
                        available: vec![1, 2],
                    },
                },
            ],
            images: vec![image(114, "ubuntu-24.04"), image(200, "debian-12")],
            locations: vec![fsn1, nbg1],
            server_types: vec![
                server_type(1, "cx22", 2),
                server_type(2, "cx32", 4),
                server_type(3, "cx42", 8),
            ],
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }

    fn record(&self, call: String) {
        self.lock().calls.push(call);
    }

    fn build_server(&self, id: u64, name: &str, server_type: u64, datacenter: u64, image: u64) -> Server {
        let datacenter = self
            .datacenters
            .iter()
            .find(|dc| dc.id == datacenter)
            .unwrap()
            .clone();
        Server {
            id,
            name: name.to_string(),
            status: ServerStatus::Running,
            created: DateTime::parse_from_rfc3339("2024-03-01T10:00:00+00:00")
                .unwrap()
                .with_timezone(&Utc),
            public_net: PublicNet {
                ipv4: Some(Ipv4 {
                    ip: format!("203.0.113.{}", id % 250),
                    dns_ptr: Some(format!("static.{id}.example.com")),
                }),
                ipv6: Some(Ipv6 {
                    ip: String::from("2001:db8::/64"),
                    dns_ptr: vec![],
                }),
            },
            server_type: self.server_types.iter().find(|t| t.id == server_type).unwrap().clone(),
            datacenter,
            image: self.images.iter().find(|i| i.id == image).cloned(),
            backup_window: None,
            rescue_enabled: false,
        }
    }

    /// Adds an existing server of type 1 running image 114 in `fsn1-dc14`.
    pub(crate) fn with_server(self, id: u64, name: &str, status: ServerStatus) -> Self {
        let mut server = self.build_server(id, name, 1, 4, 114);
        server.status = status;
        self.lock().servers.insert(id, server);
        self
    }

    /// Adds an existing SSH key.
    pub(crate) fn with_ssh_key(self, id: u64, name: &str, public_key: &str) -> Self {
        self.lock().ssh_keys.insert(
            id,
            SshKey {
                id,
                name: name.to_string(),
                fingerprint: format!("fp:{id}"),
                public_key: public_key.to_string(),
            },
        );
        self
    }

    /// Makes every job running `command` fail without taking effect.
    pub(crate) fn fail_job(self, command: &str) -> Self {
        self.lock().failing.insert(command.to_string());
        self
    }

    /// Makes graceful shutdowns leave the server running.
    pub(crate) fn ignore_shutdown(self) -> Self {
        self.lock().ignore_shutdown = true;
        self
    }

    /// Makes graceful shutdowns take effect only after `polls` further
    /// status reads of the server.
    pub(crate) fn shutdown_after_polls(self, polls: u32) -> Self {
        self.lock().shutdown_after_polls = Some(polls);
        self
    }

    pub(crate) fn set_backup_window(&self, id: u64, window: &str) {
        if let Some(server) = self.lock().servers.get_mut(&id) {
            server.backup_window = Some(window.to_string());
        }
    }

    pub(crate) fn set_rescue_enabled(&self, id: u64, enabled: bool) {
        if let Some(server) = self.lock().servers.get_mut(&id) {
            server.rescue_enabled = enabled;
        }
    }

    pub(crate) fn server(&self, id: u64) -> Option<Server> {
        self.lock().servers.get(&id).cloned()
    }

    pub(crate) fn ssh_key(&self, id: u64) -> Option<SshKey> {
        self.lock().ssh_keys.get(&id).cloned()
    }

    pub(crate) fn server_ids(&self) -> Vec<u64> {
        self.lock().servers.keys().copied().collect()
    }

    /// Every recorded call, reads included.
    pub(crate) fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// Recorded calls without reads.
    pub(crate) fn mutations(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| !c.starts_with("get_"))
            .collect()
    }

    pub(crate) fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Asserts that every job was awaited before the next mutating call.
    pub(crate) fn assert_jobs_awaited_in_order(&self) {
        let mutations = self.mutations();
        let mut pending: Vec<String> = Vec::new();
        for call in &mutations {
            if let Some(command) = call.strip_prefix("wait ") {
                assert_eq!(pending.first().map(String::as_str), Some(command), "{mutations:?}");
                pending.remove(0);
                continue;
            }
            assert!(pending.is_empty(), "{call} issued while {pending:?} in flight");
            let command = call.split(' ').next().unwrap_or_default();
            if !matches!(command, "rename_server" | "create_ssh_key" | "rename_ssh_key" | "delete_ssh_key") {
                pending.push(command.to_string());
                if command == "create_server" {
                    pending.push(String::from("start_server"));
                }
            }
        }
        assert!(pending.is_empty(), "jobs never awaited: {pending:?}");
    }

    fn job(&self, command: &str) -> JobHandle {
        let mut inner = self.lock();
        inner.next_id += 1;
        JobHandle::new(inner.next_id, command)
    }

    fn fails(&self, command: &str) -> bool {
        self.lock().failing.contains(command)
    }

    fn with_existing<T>(&self, id: u64, f: impl FnOnce(&mut Server) -> T) -> Result<T> {
        let mut inner = self.lock();
        let server = inner
            .servers
            .get_mut(&id)
            .ok_or_else(|| ApiError::not_found("server", id))?;
        Ok(f(server))
    }

    fn server_job(&self, command: &str, id: u64, effect: impl FnOnce(&mut Server, &Inner)) -> Result<JobHandle> {
        let skip = self.fails(command);
        let mut inner = self.lock();
        let mut server = inner
            .servers
            .remove(&id)
            .ok_or_else(|| ApiError::not_found("server", id))?;
        if !skip {
            effect(&mut server, &inner);
        }
        inner.servers.insert(id, server);
        drop(inner);
        Ok(self.job(command))
    }
}

#[async_trait]
impl CloudApi for FakeCloud {
    async fn create_server(&self, request: &CreateServerRequest) -> Result<ServerCreated> {
        self.record(format!("create_server {}", request.name));
        let datacenter = match (request.datacenter, request.location) {
            (Some(dc), _) => dc,
            (None, Some(location)) => self
                .datacenters
                .iter()
                .find(|dc| dc.location.id == location)
                .map_or(4, |dc| dc.id),
            (None, None) => 4,
        };
        let id = {
            let mut inner = self.lock();
            inner.next_id += 1;
            inner.next_id
        };
        let server = self.build_server(id, &request.name, request.server_type, datacenter, request.image);
        if !self.fails("create_server") {
            self.lock().servers.insert(id, server.clone());
        }
        Ok(ServerCreated {
            server,
            root_password: request
                .ssh_keys
                .is_empty()
                .then(|| Self::ROOT_PASSWORD.to_string()),
            job: self.job("create_server"),
            follow_up: vec![self.job("start_server")],
        })
    }

    async fn get_server(&self, id: u64) -> Result<Option<Server>> {
        self.record(format!("get_server {id}"));
        let mut inner = self.lock();
        if let Some(left) = inner.shutdown_countdown.get_mut(&id) {
            *left = left.saturating_sub(1);
            if *left == 0 {
                inner.shutdown_countdown.remove(&id);
                if let Some(server) = inner.servers.get_mut(&id) {
                    server.status = ServerStatus::Off;
                }
            }
        }
        Ok(inner.servers.get(&id).cloned())
    }

    async fn rename_server(&self, id: u64, name: &str) -> Result<Server> {
        self.record(format!("rename_server {id} {name}"));
        self.with_existing(id, |server| {
            server.name = name.to_string();
            server.clone()
        })
    }

    async fn delete_server(&self, id: u64) -> Result<JobHandle> {
        self.record(format!("delete_server {id}"));
        let skip = self.fails("delete_server");
        let mut inner = self.lock();
        if !inner.servers.contains_key(&id) {
            return Err(ApiError::not_found("server", id).into());
        }
        if !skip {
            inner.servers.remove(&id);
        }
        drop(inner);
        Ok(self.job("delete_server"))
    }

    async fn shutdown_server(&self, id: u64) -> Result<JobHandle> {
        self.record(format!("shutdown_server {id}"));
        let skip = self.fails("shutdown_server");
        let delayed = {
            let inner = self.lock();
            inner.shutdown_after_polls.filter(|_| !inner.ignore_shutdown && !skip)
        };
        let job = self.server_job("shutdown_server", id, |server, inner| {
            if !inner.ignore_shutdown && delayed.is_none() {
                server.status = ServerStatus::Off;
            }
        })?;
        if let Some(polls) = delayed {
            self.lock().shutdown_countdown.insert(id, polls);
        }
        Ok(job)
    }

    async fn power_off_server(&self, id: u64) -> Result<JobHandle> {
        self.record(format!("poweroff_server {id}"));
        self.server_job("poweroff_server", id, |server, _| server.status = ServerStatus::Off)
    }

    async fn power_on_server(&self, id: u64) -> Result<JobHandle> {
        self.record(format!("poweron_server {id}"));
        self.server_job("poweron_server", id, |server, _| {
            server.status = ServerStatus::Running;
        })
    }

    async fn reboot_server(&self, id: u64) -> Result<JobHandle> {
        self.record(format!("reboot_server {id}"));
        self.server_job("reboot_server", id, |_, _| {})
    }

    async fn reset_server(&self, id: u64) -> Result<JobHandle> {
        self.record(format!("reset_server {id}"));
        self.server_job("reset_server", id, |_, _| {})
    }

    async fn change_server_type(
        &self,
        id: u64,
        server_type: u64,
        _upgrade_disk: bool,
    ) -> Result<JobHandle> {
        self.record(format!("change_server_type {id} {server_type}"));
        if self.with_existing(id, |server| server.is_off())? {
            let new_type = self
                .server_types
                .iter()
                .find(|t| t.id == server_type)
                .cloned()
                .ok_or_else(|| ApiError::not_found("server_type", server_type))?;
            self.server_job("change_server_type", id, |server, _| {
                server.server_type = new_type;
            })
        } else {
            Err(ApiError::api_error(409, "server_not_stopped", "server must be stopped").into())
        }
    }

    async fn change_dns_ptr(&self, id: u64, ip: &str, dns_ptr: Option<&str>) -> Result<JobHandle> {
        self.record(format!("change_dns_ptr {id} {ip}"));
        let ptr = dns_ptr.map(str::to_string);
        self.server_job("change_dns_ptr", id, |server, _| {
            if let Some(v4) = server.public_net.ipv4.as_mut() {
                v4.dns_ptr = ptr;
            }
        })
    }

    async fn enable_backup(&self, id: u64, window: Option<&str>) -> Result<JobHandle> {
        self.record(format!("enable_backup {id} {}", window.unwrap_or("-")));
        let window = window.unwrap_or(Self::ASSIGNED_BACKUP_WINDOW).to_string();
        self.server_job("enable_backup", id, |server, _| {
            server.backup_window = Some(window);
        })
    }

    async fn disable_backup(&self, id: u64) -> Result<JobHandle> {
        self.record(format!("disable_backup {id}"));
        self.server_job("disable_backup", id, |server, _| server.backup_window = None)
    }

    async fn enable_rescue(&self, id: u64, request: &EnableRescueRequest) -> Result<RescueEnabled> {
        self.record(format!("enable_rescue {id} {}", request.rescue_type));
        let job = self.server_job("enable_rescue", id, |server, _| {
            server.rescue_enabled = true;
        })?;
        Ok(RescueEnabled {
            root_password: Some(Self::RESCUE_PASSWORD.to_string()),
            job,
        })
    }

    async fn disable_rescue(&self, id: u64) -> Result<JobHandle> {
        self.record(format!("disable_rescue {id}"));
        self.server_job("disable_rescue", id, |server, _| server.rescue_enabled = false)
    }

    async fn create_ssh_key(&self, name: &str, public_key: &str) -> Result<SshKey> {
        self.record(format!("create_ssh_key {name}"));
        let mut inner = self.lock();
        if inner.ssh_keys.values().any(|k| k.name == name) {
            return Err(ApiError::api_error(409, "uniqueness_error", "SSH key name is already used").into());
        }
        inner.next_id += 1;
        let key = SshKey {
            id: inner.next_id,
            name: name.to_string(),
            fingerprint: format!("fp:{}", inner.next_id),
            public_key: public_key.trim().to_string(),
        };
        inner.ssh_keys.insert(key.id, key.clone());
        Ok(key)
    }

    async fn get_ssh_key(&self, id: u64) -> Result<Option<SshKey>> {
        self.record(format!("get_ssh_key {id}"));
        Ok(self.ssh_key(id))
    }

    async fn rename_ssh_key(&self, id: u64, name: &str) -> Result<SshKey> {
        self.record(format!("rename_ssh_key {id} {name}"));
        let mut inner = self.lock();
        let key = inner
            .ssh_keys
            .get_mut(&id)
            .ok_or_else(|| ApiError::not_found("ssh_key", id))?;
        key.name = name.to_string();
        Ok(key.clone())
    }

    async fn delete_ssh_key(&self, id: u64) -> Result<()> {
        self.record(format!("delete_ssh_key {id}"));
        self.lock()
            .ssh_keys
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| ApiError::not_found("ssh_key", id).into())
    }

    async fn get_datacenter(&self, id: u64) -> Result<Option<Datacenter>> {
        self.record(format!("get_datacenter {id}"));
        Ok(self.datacenters.iter().find(|dc| dc.id == id).cloned())
    }

    async fn get_datacenter_by_name(&self, name: &str) -> Result<Option<Datacenter>> {
        self.record(format!("get_datacenter_by_name {name}"));
        Ok(self.datacenters.iter().find(|dc| dc.name == name).cloned())
    }

    async fn get_image(&self, id: u64) -> Result<Option<Image>> {
        self.record(format!("get_image {id}"));
        Ok(self.images.iter().find(|i| i.id == id).cloned())
    }

    async fn get_image_by_name(&self, name: &str) -> Result<Option<Image>> {
        self.record(format!("get_image_by_name {name}"));
        Ok(self
            .images
            .iter()
            .find(|i| i.name.as_deref() == Some(name))
            .cloned())
    }

    async fn get_location(&self, id: u64) -> Result<Option<Location>> {
        self.record(format!("get_location {id}"));
        Ok(self.locations.iter().find(|l| l.id == id).cloned())
    }

    async fn get_location_by_name(&self, name: &str) -> Result<Option<Location>> {
        self.record(format!("get_location_by_name {name}"));
        Ok(self.locations.iter().find(|l| l.name == name).cloned())
    }

    async fn get_server_type(&self, id: u64) -> Result<Option<ServerType>> {
        self.record(format!("get_server_type {id}"));
        Ok(self.server_types.iter().find(|t| t.id == id).cloned())
    }

    async fn get_server_type_by_name(&self, name: &str) -> Result<Option<ServerType>> {
        self.record(format!("get_server_type_by_name {name}"));
        Ok(self.server_types.iter().find(|t| t.name == name).cloned())
    }

    async fn get_action(&self, id: u64) -> Result<Action> {
        self.record(format!("get_action {id}"));
        Ok(Action {
            id,
            command: String::from("unknown"),
            status: ActionStatus::Success,
            progress: 100,
            error: None,
        })
    }
}

#[async_trait]
impl JobWatcher for FakeCloud {
    async fn wait(&self, job: JobHandle) -> Result<()> {
        self.record(format!("wait {}", job.command()));
        if self.fails(job.command()) {
            return Err(JobError {
                action_id: job.id(),
                command: job.command().to_string(),
                code: String::from("action_failed"),
                message: format!("{} failed", job.command()),
            }
            .into());
        }
        Ok(())
    }
}
