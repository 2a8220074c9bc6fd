//! Collaborator traits at the remote API boundary.
//!
//! The reconciler never talks HTTP itself. It drives a [`CloudApi`] for
//! remote calls and a [`JobWatcher`] for asynchronous action completion, so
//! both can be swapped for in-memory fakes in tests.

use async_trait::async_trait;

use crate::error::Result;

use super::types::{
    Action, CreateServerRequest, Datacenter, EnableRescueRequest, Image, Location, Server,
    ServerType, SshKey,
};

/// Opaque reference to an in-flight asynchronous action.
///
/// A handle is not `Clone`; [`JobWatcher::wait`] consumes it, so every job is
/// resolved exactly once.
#[derive(Debug, PartialEq, Eq)]
pub struct JobHandle {
    id: u64,
    command: String,
}

impl JobHandle {
    /// Creates a handle for the action with the given id.
    #[must_use]
    pub fn new(id: u64, command: impl Into<String>) -> Self {
        Self {
            id,
            command: command.into(),
        }
    }

    /// Returns the action id.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Returns the command the action runs.
    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }
}

impl From<Action> for JobHandle {
    fn from(action: Action) -> Self {
        Self {
            id: action.id,
            command: action.command,
        }
    }
}

impl std::fmt::Display for JobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "action {} ({})", self.id, self.command)
    }
}

/// Result of a server creation request.
#[derive(Debug)]
pub struct ServerCreated {
    /// The server as returned by the create call.
    pub server: Server,
    /// Generated root password, when no SSH key was given.
    pub root_password: Option<String>,
    /// The primary `create_server` action.
    pub job: JobHandle,
    /// Follow-up actions (e.g. `start_server`) that must also finish.
    pub follow_up: Vec<JobHandle>,
}

/// Result of enabling rescue mode.
#[derive(Debug)]
pub struct RescueEnabled {
    /// Root password of the rescue system.
    pub root_password: Option<String>,
    /// The `enable_rescue` action.
    pub job: JobHandle,
}

/// Typed operations against the Hetzner Cloud API.
///
/// Getters return `Ok(None)` for objects that do not exist; every other
/// failure is an error.
#[async_trait]
pub trait CloudApi: Send + Sync {
    /// Creates a server.
    async fn create_server(&self, request: &CreateServerRequest) -> Result<ServerCreated>;

    /// Gets a server by id.
    async fn get_server(&self, id: u64) -> Result<Option<Server>>;

    /// Renames a server. Synchronous.
    async fn rename_server(&self, id: u64, name: &str) -> Result<Server>;

    /// Deletes a server.
    async fn delete_server(&self, id: u64) -> Result<JobHandle>;

    /// Sends an ACPI shutdown request.
    async fn shutdown_server(&self, id: u64) -> Result<JobHandle>;

    /// Cuts power to a server.
    async fn power_off_server(&self, id: u64) -> Result<JobHandle>;

    /// Powers a server on.
    async fn power_on_server(&self, id: u64) -> Result<JobHandle>;

    /// Soft-reboots a server.
    async fn reboot_server(&self, id: u64) -> Result<JobHandle>;

    /// Hard-resets a server.
    async fn reset_server(&self, id: u64) -> Result<JobHandle>;

    /// Changes the server type. The server must be off.
    async fn change_server_type(
        &self,
        id: u64,
        server_type: u64,
        upgrade_disk: bool,
    ) -> Result<JobHandle>;

    /// Sets or clears the reverse DNS entry of one of the server's addresses.
    async fn change_dns_ptr(&self, id: u64, ip: &str, dns_ptr: Option<&str>) -> Result<JobHandle>;

    /// Enables backups, optionally in a specific window.
    async fn enable_backup(&self, id: u64, window: Option<&str>) -> Result<JobHandle>;

    /// Disables backups.
    async fn disable_backup(&self, id: u64) -> Result<JobHandle>;

    /// Enables rescue mode for the next boot.
    async fn enable_rescue(&self, id: u64, request: &EnableRescueRequest)
    -> Result<RescueEnabled>;

    /// Disables rescue mode.
    async fn disable_rescue(&self, id: u64) -> Result<JobHandle>;

    /// Creates an SSH key. Synchronous.
    async fn create_ssh_key(&self, name: &str, public_key: &str) -> Result<SshKey>;

    /// Gets an SSH key by id.
    async fn get_ssh_key(&self, id: u64) -> Result<Option<SshKey>>;

    /// Renames an SSH key. Synchronous.
    async fn rename_ssh_key(&self, id: u64, name: &str) -> Result<SshKey>;

    /// Deletes an SSH key. Synchronous.
    async fn delete_ssh_key(&self, id: u64) -> Result<()>;

    /// Gets a datacenter by id.
    async fn get_datacenter(&self, id: u64) -> Result<Option<Datacenter>>;

    /// Gets a datacenter by name.
    async fn get_datacenter_by_name(&self, name: &str) -> Result<Option<Datacenter>>;

    /// Gets an image by id.
    async fn get_image(&self, id: u64) -> Result<Option<Image>>;

    /// Gets an image by name.
    async fn get_image_by_name(&self, name: &str) -> Result<Option<Image>>;

    /// Gets a location by id.
    async fn get_location(&self, id: u64) -> Result<Option<Location>>;

    /// Gets a location by name.
    async fn get_location_by_name(&self, name: &str) -> Result<Option<Location>>;

    /// Gets a server type by id.
    async fn get_server_type(&self, id: u64) -> Result<Option<ServerType>>;

    /// Gets a server type by name.
    async fn get_server_type_by_name(&self, name: &str) -> Result<Option<ServerType>>;

    /// Gets an action by id.
    async fn get_action(&self, id: u64) -> Result<Action>;
}

/// Resolves asynchronous actions.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobWatcher: Send + Sync {
    /// Waits until the job finishes.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::JobError`] (wrapped) if the action finished
    /// with an error, or the transport error if its status could not be read.
    async fn wait(&self, job: JobHandle) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hcloud::types::ActionStatus;

    #[test]
    fn test_handle_from_action() {
        let action = Action {
            id: 7,
            command: String::from("start_server"),
            status: ActionStatus::Running,
            progress: 0,
            error: None,
        };
        let handle = JobHandle::from(action);
        assert_eq!(handle.id(), 7);
        assert_eq!(handle.command(), "start_server");
        assert_eq!(handle.to_string(), "action 7 (start_server)");
    }

    #[tokio::test]
    async fn test_mock_watcher_consumes_handle() {
        let mut watcher = MockJobWatcher::new();
        watcher
            .expect_wait()
            .withf(|job| job.id() == 3)
            .times(1)
            .returning(|_| Ok(()));

        tokio_test::assert_ok!(watcher.wait(JobHandle::new(3, "reboot_server")).await);
    }
}
