//! Lifecycle reconciler.
//!
//! This module executes operation plans against the cloud. Steps run
//! strictly one after another, every asynchronous action is awaited before
//! the next call is issued, and observed state is only updated once the step
//! it reflects has succeeded. The first failure aborts the plan and is
//! returned unchanged; nothing is rolled back.

use tracing::{debug, error, info, warn};

use crate::config::PowerOffPolicy;
use crate::error::{ApiError, PlanError, Result};
use crate::hcloud::{CloudApi, JobHandle, JobWatcher, Server};
use crate::planner::{Action, Operation, OperationKind, OperationPlan};
use crate::resources::rescue::Restart;
use crate::resources::{
    ObservedState, RescueSpec, RescueState, ResourceSpec, ServerSpec, ServerState, SshKeyState,
};

/// Executes operation plans.
#[derive(Debug)]
pub struct Reconciler<'a, A: ?Sized, W: ?Sized> {
    /// Cloud API.
    api: &'a A,
    /// Job watcher.
    watcher: &'a W,
    /// How long to wait for a graceful shutdown before cutting power.
    power_off: PowerOffPolicy,
}

impl<'a, A, W> Reconciler<'a, A, W>
where
    A: CloudApi + ?Sized,
    W: JobWatcher + ?Sized,
{
    /// Creates a new reconciler.
    #[must_use]
    pub fn new(api: &'a A, watcher: &'a W) -> Self {
        Self {
            api,
            watcher,
            power_off: PowerOffPolicy::default(),
        }
    }

    /// Sets the shutdown polling policy.
    #[must_use]
    pub const fn with_power_off_policy(mut self, power_off: PowerOffPolicy) -> Self {
        self.power_off = power_off;
        self
    }

    /// Executes a plan, then refreshes the resulting state with a read.
    ///
    /// # Errors
    ///
    /// Returns the first error of any step. `state` then reflects every step
    /// that succeeded before it.
    pub async fn apply(
        &self,
        plan: &OperationPlan,
        state: &mut Option<ObservedState>,
    ) -> Result<()> {
        if plan.is_empty() {
            debug!("Nothing to apply for {}", plan.resource_kind);
            return Ok(());
        }

        info!(
            "Applying {} operations to {}",
            plan.len(),
            plan.prior_id.as_deref().unwrap_or("new resource")
        );

        for operation in &plan.operations {
            info!("Executing: {operation}");
            if let Err(e) = self.execute(operation, state).await {
                error!("{operation} failed: {e}");
                return Err(e);
            }
        }

        self.refresh(state).await
    }

    /// Re-reads the remote object behind `state`.
    ///
    /// Clears `state` if the object no longer exists. Rescue sessions have
    /// nothing to read and are left untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails.
    pub async fn refresh(&self, state: &mut Option<ObservedState>) -> Result<()> {
        match state {
            Some(ObservedState::Server(current)) => {
                if let Some(server) = self.api.get_server(current.id).await? {
                    let fresh = ServerState::from_remote(&server, Some(&*current));
                    *current = fresh;
                } else {
                    warn!("Server {} no longer exists", current.id);
                    *state = None;
                }
            }
            Some(ObservedState::SshKey(current)) => {
                if let Some(key) = self.api.get_ssh_key(current.id).await? {
                    *current = key.into();
                } else {
                    warn!("SSH key {} no longer exists", current.id);
                    *state = None;
                }
            }
            Some(ObservedState::Rescue(_)) | None => {}
        }
        Ok(())
    }

    async fn execute(&self, operation: &Operation, state: &mut Option<ObservedState>) -> Result<()> {
        let kind = operation.action.kind();

        match &operation.action {
            Action::Create(spec) => match spec.as_ref() {
                ResourceSpec::Server(spec) => self.create_server(spec, state).await,
                ResourceSpec::SshKey(spec) => {
                    info!("Creating SSH key {}", spec.name);
                    let key = self.api.create_ssh_key(&spec.name, &spec.public_key).await?;
                    *state = Some(ObservedState::SshKey(key.into()));
                    Ok(())
                }
                ResourceSpec::Rescue(spec) => self.activate_rescue(spec, state).await,
            },
            Action::Delete => match state.take() {
                Some(ObservedState::Server(server)) => {
                    let result = self.delete_server(server.id).await;
                    if result.is_err() {
                        *state = Some(ObservedState::Server(server));
                    }
                    result
                }
                Some(ObservedState::SshKey(key)) => {
                    let result = self.delete_ssh_key(key.id).await;
                    if result.is_err() {
                        *state = Some(ObservedState::SshKey(key));
                    }
                    result
                }
                Some(ObservedState::Rescue(rescue)) => {
                    let result = self.deactivate_rescue(&rescue).await;
                    if result.is_err() {
                        *state = Some(ObservedState::Rescue(rescue));
                    }
                    result
                }
                None => Err(PlanError::missing_state(kind, operation.target.kind).into()),
            },
            Action::Rename { name } => match state {
                Some(ObservedState::Server(current)) => {
                    let server = self.api.rename_server(current.id, name).await?;
                    let fresh = ServerState::from_remote(&server, Some(&*current));
                    *current = fresh;
                    Ok(())
                }
                Some(ObservedState::SshKey(current)) => {
                    let key = self.api.rename_ssh_key(current.id, name).await?;
                    *current = SshKeyState::from(key);
                    Ok(())
                }
                _ => Err(PlanError::unsupported(kind, operation.target.kind).into()),
            },
            Action::ChangeDnsPtr { ip, dns_ptr } => {
                let current = server_state(state, operation)?;
                let job = self.api.change_dns_ptr(current.id, ip, Some(dns_ptr)).await?;
                self.await_job(job).await?;
                current.ipv4_ptr = Some(dns_ptr.clone());
                Ok(())
            }
            Action::PowerOn => {
                let current = server_state(state, operation)?;
                info!("Powering server {} back on", current.id);
                self.await_job(self.api.power_on_server(current.id).await?)
                    .await?;
                current.power_on_pending = false;
                Ok(())
            }
            Action::ChangeType {
                server_type,
                upgrade_disk,
            } => {
                let current = server_state(state, operation)?;
                self.change_type(current, *server_type, *upgrade_disk).await
            }
            Action::EnableBackup { window } => {
                let current = server_state(state, operation)?;
                self.enable_backup(current, window.as_deref()).await
            }
            Action::DisableBackup => {
                let current = server_state(state, operation)?;
                self.await_job(self.api.disable_backup(current.id).await?)
                    .await?;
                current.backup = false;
                current.backup_window.clear();
                Ok(())
            }
        }
    }

    async fn await_job(&self, job: JobHandle) -> Result<()> {
        debug!("Waiting for {job}");
        self.watcher.wait(job).await
    }

    /// Awaits a job issued as an internal step of a larger operation.
    async fn step(&self, kind: OperationKind, server: u64, job: JobHandle) -> Result<()> {
        debug!("Step {kind} on server {server}: waiting for {job}");
        self.watcher.wait(job).await
    }

    async fn read_server(&self, id: u64) -> Result<Server> {
        self.api
            .get_server(id)
            .await?
            .ok_or_else(|| ApiError::not_found("server", id).into())
    }

    /// Checks that every object the server refers to exists.
    async fn check_references(&self, spec: &ServerSpec) -> Result<()> {
        if self.api.get_server_type(spec.server_type).await?.is_none() {
            return Err(ApiError::not_found("server_type", spec.server_type).into());
        }
        if self.api.get_image(spec.image).await?.is_none() {
            return Err(ApiError::not_found("image", spec.image).into());
        }
        if let Some(location) = spec.location
            && self.api.get_location(location).await?.is_none()
        {
            return Err(ApiError::not_found("location", location).into());
        }
        if let Some(datacenter) = spec.datacenter
            && self.api.get_datacenter(datacenter).await?.is_none()
        {
            return Err(ApiError::not_found("datacenter", datacenter).into());
        }
        Ok(())
    }

    async fn create_server(&self, spec: &ServerSpec, state: &mut Option<ObservedState>) -> Result<()> {
        spec.validate()?;
        self.check_references(spec).await?;

        info!("Creating server {}", spec.name);
        let created = self.api.create_server(&spec.to_create_request()).await?;
        self.await_job(created.job).await?;
        for job in created.follow_up {
            self.await_job(job).await?;
        }

        let mut current = ServerState::from_created(&created.server, spec, created.root_password);
        info!("Created server {} with id {}", spec.name, current.id);
        *state = Some(ObservedState::Server(current.clone()));

        if let Some(ptr) = spec.ipv4_ptr.as_deref().filter(|p| !p.is_empty()) {
            match created.server.ipv4() {
                Some(ip) => {
                    let job = self.api.change_dns_ptr(current.id, ip, Some(ptr)).await?;
                    self.await_job(job).await?;
                    current.ipv4_ptr = Some(ptr.to_string());
                    *state = Some(ObservedState::Server(current.clone()));
                }
                None => warn!("Server {} has no IPv4 address, ignoring ipv4_ptr", current.id),
            }
        }

        if spec.backup {
            self.enable_backup(&mut current, spec.requested_window())
                .await?;
            *state = Some(ObservedState::Server(current));
        }

        Ok(())
    }

    async fn delete_server(&self, id: u64) -> Result<()> {
        info!("Deleting server {id}");
        match self.api.delete_server(id).await {
            Ok(job) => self.await_job(job).await,
            Err(e) if e.is_not_found() => {
                warn!("Server {id} was already deleted");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn delete_ssh_key(&self, id: u64) -> Result<()> {
        info!("Deleting SSH key {id}");
        match self.api.delete_ssh_key(id).await {
            Err(e) if e.is_not_found() => {
                warn!("SSH key {id} was already deleted");
                Ok(())
            }
            other => other,
        }
    }

    /// Changes the server type, powering the server down first and back up
    /// afterwards if it was running or a power-on is still pending.
    async fn change_type(
        &self,
        current: &mut ServerState,
        server_type: u64,
        upgrade_disk: bool,
    ) -> Result<()> {
        let id = current.id;
        let is_off = self.read_server(id).await?.is_off();
        let was_running = !is_off || current.power_on_pending;

        if !is_off {
            info!("Shutting down server {id} for type change");
            self.step(OperationKind::Shutdown, id, self.api.shutdown_server(id).await?)
                .await?;
            current.power_on_pending = true;

            if !self.wait_for_off(id).await? {
                warn!(
                    "Server {id} still running after {} polls, forcing power off",
                    self.power_off.max_attempts
                );
                self.step(OperationKind::PowerOff, id, self.api.power_off_server(id).await?)
                    .await?;
            }
        }

        info!("Changing type of server {id} to {server_type}");
        let job = self
            .api
            .change_server_type(id, server_type, upgrade_disk)
            .await?;
        self.await_job(job).await?;
        current.server_type = server_type;
        current.upgrade_disk = upgrade_disk;

        if was_running {
            info!("Powering server {id} back on");
            self.step(OperationKind::PowerOn, id, self.api.power_on_server(id).await?)
                .await?;
            current.power_on_pending = false;
        }

        Ok(())
    }

    /// Polls until the server reports `off`. Exhausting the attempts is not
    /// an error; the caller falls back to a hard power off.
    async fn wait_for_off(&self, id: u64) -> Result<bool> {
        for attempt in 1..=self.power_off.max_attempts {
            tokio::time::sleep(self.power_off.poll_interval()).await;

            let server = self.read_server(id).await?;
            if server.is_off() {
                debug!("Server {id} is off after {attempt} polls");
                return Ok(true);
            }
            debug!(
                "Server {id} is {} (poll {attempt}/{})",
                server.status, self.power_off.max_attempts
            );
        }
        Ok(false)
    }

    async fn enable_backup(&self, current: &mut ServerState, window: Option<&str>) -> Result<()> {
        info!("Enabling backups for server {}", current.id);
        self.await_job(self.api.enable_backup(current.id, window).await?)
            .await?;
        current.backup = true;

        match window {
            Some(window) => current.backup_window = window.to_string(),
            None => {
                let server = self.read_server(current.id).await?;
                current.backup_window = server.backup_window().to_string();
                debug!(
                    "Server {} was assigned backup window {}",
                    current.id, current.backup_window
                );
            }
        }
        Ok(())
    }

    async fn restart(&self, server: u64, restart: Restart) -> Result<()> {
        match restart {
            Restart::Reboot => {
                info!("Rebooting server {server}");
                self.step(OperationKind::Reboot, server, self.api.reboot_server(server).await?)
                    .await
            }
            Restart::Reset => {
                info!("Resetting server {server}");
                self.step(OperationKind::Reset, server, self.api.reset_server(server).await?)
                    .await
            }
            Restart::None => Ok(()),
        }
    }

    async fn activate_rescue(&self, spec: &RescueSpec, state: &mut Option<ObservedState>) -> Result<()> {
        let server = self.read_server(spec.server).await?;

        if server.rescue_enabled {
            info!("Rescue mode already enabled on server {}, disabling first", spec.server);
            let job = self.api.disable_rescue(spec.server).await?;
            self.step(OperationKind::DisableRescue, spec.server, job).await?;
        }

        info!("Enabling {} rescue mode on server {}", spec.rescue_type, spec.server);
        let enabled = self
            .api
            .enable_rescue(spec.server, &spec.to_enable_request())
            .await?;
        self.step(OperationKind::EnableRescue, spec.server, enabled.job)
            .await?;
        // The session exists once EnableRescue succeeds, so a failed restart
        // still leaves the new password in state.
        *state = Some(ObservedState::Rescue(RescueState::activated(
            spec.clone(),
            enabled.root_password,
        )));

        self.restart(spec.server, spec.activation_restart()).await
    }

    async fn deactivate_rescue(&self, rescue: &RescueState) -> Result<()> {
        let id = rescue.spec.server;
        let Some(server) = self.api.get_server(id).await? else {
            warn!("Server {id} no longer exists, nothing to deactivate");
            return Ok(());
        };

        if server.rescue_enabled {
            info!("Disabling rescue mode on server {id}");
            let job = self.api.disable_rescue(id).await?;
            self.step(OperationKind::DisableRescue, id, job).await?;
        }

        self.restart(id, rescue.spec.deactivation_restart()).await
    }
}

fn server_state<'s>(
    state: &'s mut Option<ObservedState>,
    operation: &Operation,
) -> Result<&'s mut ServerState> {
    let kind: OperationKind = operation.action.kind();
    match state {
        Some(ObservedState::Server(server)) => Ok(server),
        Some(_) => Err(PlanError::unsupported(kind, operation.target.kind).into()),
        None => Err(PlanError::missing_state(kind, operation.target.kind).into()),
    }
}
