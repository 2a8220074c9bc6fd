//! Workspace reconciliation.
//!
//! A [`Workspace`] converges a whole [`Manifest`] against the cloud. It
//! refreshes persisted state, removes orphaned resources, then converges
//! SSH keys, servers and rescue sessions in that order so later kinds can
//! refer to the ids of earlier ones. The state store's advisory lock is held
//! for the whole run and the state is saved even when the run fails.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use tracing::{debug, info, warn};

use crate::config::{ConfigValidator, Manifest, Reference, RescueDecl, ServerDecl};
use crate::error::{ApiError, Result};
use crate::hcloud::{CloudApi, JobWatcher};
use crate::planner::OperationPlan;
use crate::provider::Provider;
use crate::resources::data_source::{DataSourceKind, DataSourceQuery, DataSourceResult};
use crate::resources::{
    ObservedState, RescueSpec, ResourceKind, ResourceSpec, ServerSpec, SshKeySpec,
};
use crate::state::{
    HistoryEntry, HistoryOperation, LockInfo, StateStore, WorkspaceState, address,
    generate_holder_id,
};

/// Orphans are removed dependents first.
const DELETE_ORDER: [ResourceKind; 3] =
    [ResourceKind::Rescue, ResourceKind::Server, ResourceKind::SshKey];

/// What an apply, destroy or import changed, by address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Newly created resources.
    pub created: Vec<String>,
    /// Resources changed in place.
    pub updated: Vec<String>,
    /// Resources deleted and created again.
    pub replaced: Vec<String>,
    /// Resources removed.
    pub deleted: Vec<String>,
    /// Resources that needed no change.
    pub unchanged: Vec<String>,
    /// Data source reads by label.
    pub data: BTreeMap<String, DataSourceResult>,
}

/// The plan of one declared resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedChange {
    /// Address of the resource.
    pub address: String,
    /// Operations that would run.
    pub plan: OperationPlan,
}

/// What an apply would do.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkspacePlan {
    /// Resources with pending operations.
    pub changes: Vec<PlannedChange>,
    /// Recorded resources no longer declared.
    pub deletions: Vec<String>,
    /// Resources referring to workspace resources that do not exist yet.
    /// They are planned once those exist.
    pub deferred: Vec<String>,
    /// Resources already matching their declaration.
    pub unchanged: Vec<String>,
}

/// A reference to a workspace resource that has no recorded id.
#[derive(Debug)]
struct Unresolved {
    kind: ResourceKind,
    label: String,
}

impl From<Unresolved> for crate::error::ProviderError {
    fn from(unresolved: Unresolved) -> Self {
        ApiError::not_found(unresolved.kind.to_string(), unresolved.label).into()
    }
}

/// Converges manifests against the cloud and a state store.
#[derive(Debug)]
pub struct Workspace<'a, A: ?Sized, W: ?Sized, S: ?Sized> {
    provider: Provider<'a, A, W>,
    store: &'a S,
    name: String,
}

impl<'a, A, W, S> Workspace<'a, A, W, S>
where
    A: CloudApi + ?Sized,
    W: JobWatcher + ?Sized,
    S: StateStore + ?Sized,
{
    /// Creates a workspace named `default`.
    #[must_use]
    pub fn new(provider: Provider<'a, A, W>, store: &'a S) -> Self {
        Self {
            provider,
            store,
            name: String::from("default"),
        }
    }

    /// Sets the workspace name recorded in new state.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Returns the workspace name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Converges the cloud to the manifest.
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest is invalid, the lock is held
    /// elsewhere, or any remote step fails. Every step that succeeded before
    /// a failure is recorded in the saved state.
    pub async fn apply(&self, manifest: &Manifest) -> Result<ApplyReport> {
        ConfigValidator::new()
            .allow_missing_token()
            .validate(manifest)?;

        let lock = self.lock().await?;
        let outcome = self.apply_locked(manifest).await;
        self.unlock(&lock, outcome).await
    }

    /// Computes what [`Workspace::apply`] would do. Nothing is written.
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest is invalid or a read fails.
    pub async fn plan(&self, manifest: &Manifest) -> Result<WorkspacePlan> {
        ConfigValidator::new()
            .allow_missing_token()
            .validate(manifest)?;

        let mut state = self.load().await?;
        self.refresh(&mut state).await?;

        let declared = declared_addresses(manifest);
        let mut result = WorkspacePlan::default();

        for kind in DELETE_ORDER {
            for addr in state.addresses_of(kind) {
                if !declared.contains(&addr) {
                    result.deletions.push(addr);
                }
            }
        }

        for decl in &manifest.ssh_keys {
            let addr = address(ResourceKind::SshKey, &decl.name);
            let spec = ResourceSpec::SshKey(ssh_key_spec(decl.key_name(), &decl.public_key));
            result.push(&self.provider, addr, &spec, &state)?;
        }

        for decl in &manifest.servers {
            let addr = address(ResourceKind::Server, &decl.name);
            match self.server_spec(decl, &state).await? {
                Ok(spec) => result.push(&self.provider, addr, &ResourceSpec::Server(spec), &state)?,
                Err(unresolved) => {
                    debug!("{addr} waits for {}.{}", unresolved.kind, unresolved.label);
                    result.deferred.push(addr);
                }
            }
        }

        for decl in &manifest.rescues {
            let addr = address(ResourceKind::Rescue, &decl.name);
            match rescue_spec(decl, &state) {
                Ok(spec) => result.push(&self.provider, addr, &ResourceSpec::Rescue(spec), &state)?,
                Err(unresolved) => {
                    debug!("{addr} waits for {}.{}", unresolved.kind, unresolved.label);
                    result.deferred.push(addr);
                }
            }
        }

        Ok(result)
    }

    /// Removes every recorded resource.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is held elsewhere or a removal fails.
    pub async fn destroy(&self) -> Result<ApplyReport> {
        let lock = self.lock().await?;
        let outcome = self.destroy_locked().await;
        self.unlock(&lock, outcome).await
    }

    /// Records an existing server or SSH key under `label`.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is held elsewhere, the id is malformed
    /// or the object does not exist.
    pub async fn import(&self, kind: ResourceKind, label: &str, id: &str) -> Result<ObservedState> {
        let lock = self.lock().await?;
        let outcome = self.import_locked(kind, label, id).await;
        self.unlock(&lock, outcome).await
    }

    async fn lock(&self) -> Result<LockInfo> {
        self.store.acquire_lock(&generate_holder_id()).await
    }

    /// Releases the lock. The run's own error wins over a release error.
    async fn unlock<T>(&self, lock: &LockInfo, outcome: Result<T>) -> Result<T> {
        let released = self.store.release_lock(&lock.lock_id).await;
        let value = outcome?;
        released?;
        Ok(value)
    }

    async fn load(&self) -> Result<WorkspaceState> {
        Ok(self
            .store
            .load()
            .await?
            .unwrap_or_else(|| WorkspaceState::new(&self.name)))
    }

    /// Saves the state with a history entry for the run's outcome.
    async fn finish<T>(
        &self,
        state: &mut WorkspaceState,
        operation: HistoryOperation,
        resources: Vec<String>,
        outcome: Result<T>,
    ) -> Result<T> {
        let entry = match &outcome {
            Ok(_) => HistoryEntry::new(operation, resources),
            Err(e) => HistoryEntry::failed(operation, resources, &e.to_string()),
        };
        state.add_history(entry);
        let saved = self.store.save(state).await;
        let value = outcome?;
        saved?;
        Ok(value)
    }

    async fn apply_locked(&self, manifest: &Manifest) -> Result<ApplyReport> {
        let mut state = self.load().await?;
        let mut report = ApplyReport::default();

        info!(
            "Applying workspace {} ({} resources declared)",
            state.workspace,
            manifest.resource_count()
        );

        let outcome = self.converge(manifest, &mut state, &mut report).await;
        let touched = report.touched();
        self.finish(&mut state, HistoryOperation::Apply, touched, outcome)
            .await?;

        info!(
            "Apply complete: {} created, {} updated, {} replaced, {} deleted, {} unchanged",
            report.created.len(),
            report.updated.len(),
            report.replaced.len(),
            report.deleted.len(),
            report.unchanged.len()
        );
        Ok(report)
    }

    async fn converge(
        &self,
        manifest: &Manifest,
        state: &mut WorkspaceState,
        report: &mut ApplyReport,
    ) -> Result<()> {
        for (label, decl) in &manifest.data {
            let result = self
                .provider
                .read_data_source(decl.kind, &decl.to_query())
                .await?;
            report.data.insert(label.clone(), result);
        }

        self.refresh(state).await?;

        let declared = declared_addresses(manifest);
        for kind in DELETE_ORDER {
            for addr in state.addresses_of(kind) {
                if !declared.contains(&addr) {
                    info!("{addr} is no longer declared, removing");
                    self.remove(&addr, state, report).await?;
                }
            }
        }

        for decl in &manifest.ssh_keys {
            let addr = address(ResourceKind::SshKey, &decl.name);
            let spec = ResourceSpec::SshKey(ssh_key_spec(decl.key_name(), &decl.public_key));
            self.converge_one(&addr, &spec, state, report).await?;
        }

        for decl in &manifest.servers {
            let addr = address(ResourceKind::Server, &decl.name);
            let spec = self.server_spec(decl, state).await??;
            self.converge_one(&addr, &ResourceSpec::Server(spec), state, report)
                .await?;
        }

        for decl in &manifest.rescues {
            let addr = address(ResourceKind::Rescue, &decl.name);
            let spec = rescue_spec(decl, state)?;
            self.converge_one(&addr, &ResourceSpec::Rescue(spec), state, report)
                .await?;
        }

        Ok(())
    }

    /// Re-reads every recorded resource and drops those that are gone.
    async fn refresh(&self, state: &mut WorkspaceState) -> Result<()> {
        let recorded: Vec<(String, ObservedState)> = state
            .resources
            .values()
            .filter(|r| r.state.kind() != ResourceKind::Rescue)
            .map(|r| (r.address.clone(), r.state.clone()))
            .collect();

        for (addr, observed) in recorded {
            match self.provider.read(&observed).await? {
                Some(fresh) if fresh == observed => {}
                Some(fresh) => {
                    debug!("{addr} drifted, recording the remote state");
                    state.set(&addr, fresh);
                }
                None => {
                    warn!("{addr} no longer exists remotely, forgetting it");
                    state.remove(&addr);
                }
            }
        }
        Ok(())
    }

    async fn converge_one(
        &self,
        addr: &str,
        spec: &ResourceSpec,
        state: &mut WorkspaceState,
        report: &mut ApplyReport,
    ) -> Result<()> {
        let mut current = state.observed(addr).cloned();
        let plan = self.provider.plan(spec, current.as_ref())?;
        if plan.is_empty() {
            debug!("{addr} is up to date");
            report.unchanged.push(addr.to_string());
            return Ok(());
        }

        info!("{addr}: {} operations", plan.len());
        let outcome = self.provider.apply(&plan, &mut current).await;
        state.put(addr, current);
        outcome?;
        report.record(addr, &plan);
        Ok(())
    }

    async fn remove(
        &self,
        addr: &str,
        state: &mut WorkspaceState,
        report: &mut ApplyReport,
    ) -> Result<()> {
        let mut current = state.observed(addr).cloned();
        let outcome = self.provider.delete(&mut current).await;
        state.put(addr, current);
        outcome?;
        report.deleted.push(addr.to_string());
        Ok(())
    }

    async fn remove_all(&self, state: &mut WorkspaceState, report: &mut ApplyReport) -> Result<()> {
        for kind in DELETE_ORDER {
            for addr in state.addresses_of(kind) {
                self.remove(&addr, state, report).await?;
            }
        }
        Ok(())
    }

    async fn destroy_locked(&self) -> Result<ApplyReport> {
        let Some(mut state) = self.store.load().await? else {
            info!("No state recorded, nothing to destroy");
            return Ok(ApplyReport::default());
        };

        let mut report = ApplyReport::default();
        let outcome = self.remove_all(&mut state, &mut report).await;

        let deleted = report.deleted.clone();
        self.finish(&mut state, HistoryOperation::Destroy, deleted, outcome)
            .await?;
        info!("Destroyed {} resources", report.deleted.len());
        Ok(report)
    }

    async fn import_locked(&self, kind: ResourceKind, label: &str, id: &str) -> Result<ObservedState> {
        let mut state = self.load().await?;
        let addr = address(kind, label);
        let outcome = self.provider.import(kind, id).await;
        if let Ok(observed) = &outcome {
            state.set(&addr, observed.clone());
        }
        self.finish(&mut state, HistoryOperation::Import, vec![addr], outcome)
            .await
    }

    /// Builds the server declaration, resolving names. Catalogue names are
    /// looked up through data sources; SSH key labels through the state.
    async fn server_spec(
        &self,
        decl: &ServerDecl,
        state: &WorkspaceState,
    ) -> Result<std::result::Result<ServerSpec, Unresolved>> {
        let ssh_keys = match key_ids(&decl.ssh_keys, state) {
            Ok(ids) => ids,
            Err(unresolved) => return Ok(Err(unresolved)),
        };

        let server_type = self
            .catalogue_id(DataSourceKind::ServerType, &decl.server_type)
            .await?;
        let image = self.catalogue_id(DataSourceKind::Image, &decl.image).await?;
        let location = match &decl.location {
            Some(reference) => Some(self.catalogue_id(DataSourceKind::Location, reference).await?),
            None => None,
        };
        let datacenter = match &decl.datacenter {
            Some(reference) => {
                Some(self.catalogue_id(DataSourceKind::Datacenter, reference).await?)
            }
            None => None,
        };

        Ok(Ok(ServerSpec {
            name: decl.server_name().to_string(),
            server_type,
            datacenter,
            location,
            image,
            ssh_keys,
            user_data: decl.user_data.clone(),
            ipv4_ptr: decl.ipv4_ptr.clone(),
            upgrade_disk: decl.upgrade_disk,
            backup: decl.backup,
            backup_window: decl.backup_window.clone(),
        }))
    }

    async fn catalogue_id(&self, kind: DataSourceKind, reference: &Reference) -> Result<u64> {
        match reference {
            Reference::Id(id) => Ok(*id),
            Reference::Name(name) => self
                .provider
                .read_data_source(kind, &DataSourceQuery::by_name(name.as_str()))
                .await?
                .id()
                .ok_or_else(|| ApiError::not_found(kind.to_string(), name).into()),
        }
    }
}

impl ApplyReport {
    /// Number of resources that changed.
    #[must_use]
    pub fn changed(&self) -> usize {
        self.created.len() + self.updated.len() + self.replaced.len() + self.deleted.len()
    }

    fn record(&mut self, addr: &str, plan: &OperationPlan) {
        let bucket = if plan.prior_id.is_none() {
            &mut self.created
        } else if plan.is_replacement() {
            &mut self.replaced
        } else {
            &mut self.updated
        };
        bucket.push(addr.to_string());
    }

    fn touched(&self) -> Vec<String> {
        self.deleted
            .iter()
            .chain(&self.created)
            .chain(&self.updated)
            .chain(&self.replaced)
            .cloned()
            .collect()
    }
}

impl WorkspacePlan {
    /// Returns true if an apply would change nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty() && self.deletions.is_empty() && self.deferred.is_empty()
    }

    fn push<A, W>(
        &mut self,
        provider: &Provider<'_, A, W>,
        addr: String,
        spec: &ResourceSpec,
        state: &WorkspaceState,
    ) -> Result<()>
    where
        A: CloudApi + ?Sized,
        W: JobWatcher + ?Sized,
    {
        let plan = provider.plan(spec, state.observed(&addr))?;
        if plan.is_empty() {
            self.unchanged.push(addr);
        } else {
            self.changes.push(PlannedChange {
                address: addr,
                plan,
            });
        }
        Ok(())
    }
}

impl fmt::Display for WorkspacePlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "No changes required");
        }

        for addr in &self.deletions {
            writeln!(f, "- {addr}")?;
        }
        for change in &self.changes {
            writeln!(f, "~ {}", change.address)?;
            for op in &change.plan.operations {
                writeln!(f, "    {op}")?;
            }
        }
        for addr in &self.deferred {
            writeln!(f, "+ {addr} (after its dependencies)")?;
        }
        Ok(())
    }
}

fn declared_addresses(manifest: &Manifest) -> HashSet<String> {
    manifest
        .ssh_keys
        .iter()
        .map(|k| address(ResourceKind::SshKey, &k.name))
        .chain(
            manifest
                .servers
                .iter()
                .map(|s| address(ResourceKind::Server, &s.name)),
        )
        .chain(
            manifest
                .rescues
                .iter()
                .map(|r| address(ResourceKind::Rescue, &r.name)),
        )
        .collect()
}

fn ssh_key_spec(name: &str, public_key: &str) -> SshKeySpec {
    SshKeySpec {
        name: name.to_string(),
        public_key: public_key.to_string(),
    }
}

fn recorded_id(
    state: &WorkspaceState,
    kind: ResourceKind,
    reference: &Reference,
) -> std::result::Result<u64, Unresolved> {
    let label = match reference {
        Reference::Id(id) => return Ok(*id),
        Reference::Name(label) => label,
    };
    let id = match state.observed(&address(kind, label)) {
        Some(ObservedState::Server(server)) if kind == ResourceKind::Server => Some(server.id),
        Some(ObservedState::SshKey(key)) if kind == ResourceKind::SshKey => Some(key.id),
        _ => None,
    };
    id.ok_or_else(|| Unresolved {
        kind,
        label: label.clone(),
    })
}

fn key_ids(
    references: &[Reference],
    state: &WorkspaceState,
) -> std::result::Result<Vec<u64>, Unresolved> {
    references
        .iter()
        .map(|r| recorded_id(state, ResourceKind::SshKey, r))
        .collect()
}

fn rescue_spec(
    decl: &RescueDecl,
    state: &WorkspaceState,
) -> std::result::Result<RescueSpec, Unresolved> {
    Ok(RescueSpec {
        server: recorded_id(state, ResourceKind::Server, &decl.server)?,
        rescue_type: decl.rescue_type,
        ssh_keys: key_ids(&decl.ssh_keys, state)?,
        reset_on_activation: decl.reset_on_activation,
        reboot_on_activation: decl.reboot_on_activation,
        reset_on_deactivation: decl.reset_on_deactivation,
        reboot_on_deactivation: decl.reboot_on_deactivation,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigParser;
    use crate::error::{ProviderError, StateError};
    use crate::hcloud::{CloudApi, ServerStatus};
    use crate::state::LocalStateStore;
    use crate::testing::{FakeCloud, fast_power_off};
    use tempfile::TempDir;

    const MANIFEST: &str = r"
workspace: test
ssh_keys:
  - name: admin
    public_key: ssh-ed25519 AAAAC3Nza admin@laptop
servers:
  - name: web
    server_type: cx22
    image: ubuntu-24.04
    location: fsn1
    ssh_keys: [admin]
";

    const WITH_RESCUE: &str = r"
ssh_keys:
  - name: admin
    public_key: ssh-ed25519 AAAAC3Nza admin@laptop
servers:
  - name: web
    server_type: 1
    image: 114
    ssh_keys: [admin]
rescues:
  - name: web-rescue
    server: web
    ssh_keys: [admin]
";

    fn manifest(yaml: &str) -> Manifest {
        ConfigParser::new().parse_yaml(yaml, None).unwrap()
    }

    fn workspace<'a>(
        cloud: &'a FakeCloud,
        store: &'a LocalStateStore,
    ) -> Workspace<'a, FakeCloud, FakeCloud, LocalStateStore> {
        let provider = Provider::new(cloud, cloud).with_power_off_policy(fast_power_off());
        Workspace::new(provider, store).with_name("test")
    }

    async fn recorded_server_id(store: &LocalStateStore) -> u64 {
        let state = store.load().await.unwrap().unwrap();
        match state.observed("hcloud_server.web") {
            Some(ObservedState::Server(server)) => server.id,
            other => panic!("unexpected record: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_apply_creates_then_converges() {
        let temp = TempDir::new().unwrap();
        let store = LocalStateStore::with_base_dir(temp.path());
        let cloud = FakeCloud::new();
        let workspace = workspace(&cloud, &store);
        let manifest = manifest(MANIFEST);

        let report = workspace.apply(&manifest).await.unwrap();
        assert_eq!(
            report.created,
            vec![
                String::from("hcloud_ssh_key.admin"),
                String::from("hcloud_server.web")
            ]
        );

        let id = recorded_server_id(&store).await;
        let server = cloud.server(id).unwrap();
        assert_eq!(server.server_type.id, 1);
        assert_eq!(server.datacenter.location.id, 1);

        cloud.clear_calls();
        let again = workspace.apply(&manifest).await.unwrap();
        assert_eq!(again.changed(), 0);
        assert_eq!(again.unchanged.len(), 2);
        assert!(cloud.mutations().is_empty());

        let state = store.load().await.unwrap().unwrap();
        assert_eq!(state.history.len(), 2);
        assert!(state.history.iter().all(|h| h.success));
        assert!(!store.is_locked().await.unwrap());
    }

    #[tokio::test]
    async fn test_orphans_are_deleted() {
        let temp = TempDir::new().unwrap();
        let store = LocalStateStore::with_base_dir(temp.path());
        let cloud = FakeCloud::new();
        let workspace = workspace(&cloud, &store);
        workspace.apply(&manifest(MANIFEST)).await.unwrap();

        let keys_only = r"
ssh_keys:
  - name: admin
    public_key: ssh-ed25519 AAAAC3Nza admin@laptop
";
        let report = workspace.apply(&manifest(keys_only)).await.unwrap();

        assert_eq!(report.deleted, vec![String::from("hcloud_server.web")]);
        assert!(cloud.server_ids().is_empty());
        let state = store.load().await.unwrap().unwrap();
        assert_eq!(state.addresses(), vec!["hcloud_ssh_key.admin"]);
    }

    #[tokio::test]
    async fn test_vanished_server_is_recreated() {
        let temp = TempDir::new().unwrap();
        let store = LocalStateStore::with_base_dir(temp.path());
        let cloud = FakeCloud::new();
        let workspace = workspace(&cloud, &store);
        let manifest = manifest(MANIFEST);
        workspace.apply(&manifest).await.unwrap();

        let old_id = recorded_server_id(&store).await;
        cloud.delete_server(old_id).await.unwrap();

        let report = workspace.apply(&manifest).await.unwrap();
        assert_eq!(report.created, vec![String::from("hcloud_server.web")]);
        assert_ne!(recorded_server_id(&store).await, old_id);
    }

    #[tokio::test]
    async fn test_failure_still_saves_state() {
        let temp = TempDir::new().unwrap();
        let store = LocalStateStore::with_base_dir(temp.path());
        let cloud = FakeCloud::new().fail_job("enable_backup");
        let workspace = workspace(&cloud, &store);
        let with_backup = format!("{MANIFEST}    backup: true\n");

        let err = workspace.apply(&manifest(&with_backup)).await.unwrap_err();
        assert!(matches!(err, ProviderError::Job(_)));

        let state = store.load().await.unwrap().unwrap();
        assert!(state.observed("hcloud_server.web").is_some());
        let last = state.history.last().unwrap();
        assert!(!last.success);
        assert!(last.error.as_deref().unwrap().contains("enable_backup"));
        assert!(!store.is_locked().await.unwrap());
    }

    #[tokio::test]
    async fn test_lock_held_elsewhere() {
        let temp = TempDir::new().unwrap();
        let store = LocalStateStore::with_base_dir(temp.path());
        store.acquire_lock("someone-else").await.unwrap();
        let cloud = FakeCloud::new();

        let err = workspace(&cloud, &store)
            .apply(&manifest(MANIFEST))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ProviderError::State(StateError::LockedByOther { .. })
        ));
        assert!(cloud.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_catalogue_name() {
        let temp = TempDir::new().unwrap();
        let store = LocalStateStore::with_base_dir(temp.path());
        let cloud = FakeCloud::new();
        let yaml = MANIFEST.replace("ubuntu-24.04", "plan9");

        let err = workspace(&cloud, &store)
            .apply(&manifest(&yaml))
            .await
            .unwrap_err();

        assert!(err.is_not_found());
        assert!(cloud.server_ids().is_empty());
    }

    #[tokio::test]
    async fn test_plan_defers_dependents() {
        let temp = TempDir::new().unwrap();
        let store = LocalStateStore::with_base_dir(temp.path());
        let cloud = FakeCloud::new();
        let workspace = workspace(&cloud, &store);

        let plan = workspace.plan(&manifest(WITH_RESCUE)).await.unwrap();

        assert_eq!(plan.changes.len(), 1);
        assert_eq!(plan.changes[0].address, "hcloud_ssh_key.admin");
        assert_eq!(
            plan.deferred,
            vec![
                String::from("hcloud_server.web"),
                String::from("hcloud_rescue.web-rescue")
            ]
        );
        assert!(cloud.mutations().is_empty());
        assert!(!store.exists().await.unwrap());
    }

    #[tokio::test]
    async fn test_rescue_converges_and_destroy_removes_everything() {
        let temp = TempDir::new().unwrap();
        let store = LocalStateStore::with_base_dir(temp.path());
        let cloud = FakeCloud::new();
        let workspace = workspace(&cloud, &store);
        let manifest = manifest(WITH_RESCUE);

        workspace.apply(&manifest).await.unwrap();
        let id = recorded_server_id(&store).await;
        assert!(cloud.server(id).unwrap().rescue_enabled);

        let plan = workspace.plan(&manifest).await.unwrap();
        assert_eq!(plan.changes.len(), 1);
        assert_eq!(plan.changes[0].address, "hcloud_rescue.web-rescue");

        let report = workspace.destroy().await.unwrap();
        assert_eq!(
            report.deleted,
            vec![
                String::from("hcloud_rescue.web-rescue"),
                String::from("hcloud_server.web"),
                String::from("hcloud_ssh_key.admin"),
            ]
        );
        assert!(cloud.server_ids().is_empty());

        let state = store.load().await.unwrap().unwrap();
        assert!(state.resources.is_empty());
        assert_eq!(
            state.history.last().map(|h| h.operation),
            Some(HistoryOperation::Destroy)
        );
    }

    #[tokio::test]
    async fn test_import_records_existing_server() {
        let temp = TempDir::new().unwrap();
        let store = LocalStateStore::with_base_dir(temp.path());
        let cloud = FakeCloud::new().with_server(42, "legacy", ServerStatus::Running);

        let observed = workspace(&cloud, &store)
            .import(ResourceKind::Server, "legacy", "42")
            .await
            .unwrap();

        assert_eq!(observed.id(), "42");
        let state = store.load().await.unwrap().unwrap();
        assert_eq!(state.workspace, "test");
        assert_eq!(state.get("hcloud_server.legacy").unwrap().id, "42");
    }
}
