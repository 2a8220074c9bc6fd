//! Host-facing provider surface.
//!
//! [`Provider`] exposes the create, read, update, delete and import
//! operations per resource kind, plus data-source reads and schema lookup.
//! Each operation is a plan computed by the [`Differ`] and executed by the
//! [`Reconciler`].

use tracing::{debug, info};

use crate::config::PowerOffPolicy;
use crate::error::{ApiError, PlanError, Result};
use crate::hcloud::{CloudApi, JobWatcher};
use crate::planner::{Differ, OperationKind, OperationPlan};
use crate::reconciler::Reconciler;
use crate::resources::data_source::{self, DataSourceKind, DataSourceQuery, DataSourceResult};
use crate::resources::{ObservedState, ResourceKind, ResourceSpec, ServerState, parse_id};
use crate::schema::{FieldSchema, resource_schema};

/// The provider.
#[derive(Debug)]
pub struct Provider<'a, A: ?Sized, W: ?Sized> {
    api: &'a A,
    watcher: &'a W,
    power_off: PowerOffPolicy,
    differ: Differ,
}

impl<'a, A, W> Provider<'a, A, W>
where
    A: CloudApi + ?Sized,
    W: JobWatcher + ?Sized,
{
    /// Creates a provider over the given client and watcher.
    #[must_use]
    pub fn new(api: &'a A, watcher: &'a W) -> Self {
        Self {
            api,
            watcher,
            power_off: PowerOffPolicy::default(),
            differ: Differ::new(),
        }
    }

    /// Sets the shutdown polling policy used by type changes.
    #[must_use]
    pub const fn with_power_off_policy(mut self, power_off: PowerOffPolicy) -> Self {
        self.power_off = power_off;
        self
    }

    fn reconciler(&self) -> Reconciler<'a, A, W> {
        Reconciler::new(self.api, self.watcher).with_power_off_policy(self.power_off)
    }

    /// Returns the field table of a resource kind.
    #[must_use]
    pub const fn schema(&self, kind: ResourceKind) -> &'static [FieldSchema] {
        resource_schema(kind)
    }

    /// Plans the operations that move `observed` to `spec`.
    ///
    /// # Errors
    ///
    /// Returns an error if the declaration and the state are of different kinds.
    pub fn plan(
        &self,
        spec: &ResourceSpec,
        observed: Option<&ObservedState>,
    ) -> Result<OperationPlan> {
        self.differ.plan(spec, observed)
    }

    /// Executes a plan, updating `state` as steps succeed.
    ///
    /// # Errors
    ///
    /// Returns the first failing step's error.
    pub async fn apply(
        &self,
        plan: &OperationPlan,
        state: &mut Option<ObservedState>,
    ) -> Result<()> {
        self.reconciler().apply(plan, state).await
    }

    /// Creates a resource.
    ///
    /// # Errors
    ///
    /// Returns an error if any creation step fails.
    pub async fn create(&self, spec: &ResourceSpec) -> Result<ObservedState> {
        info!("Creating {}", spec.kind());
        let plan = self.plan(spec, None)?;
        let mut state = None;
        self.apply(&plan, &mut state).await?;
        state.ok_or_else(|| PlanError::missing_state(OperationKind::Create, spec.kind()).into())
    }

    /// Re-reads a resource. `None` means it no longer exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails.
    pub async fn read(&self, state: &ObservedState) -> Result<Option<ObservedState>> {
        let mut current = Some(state.clone());
        self.reconciler().refresh(&mut current).await?;
        Ok(current)
    }

    /// Moves an existing resource to its declaration and returns the plan
    /// that was executed.
    ///
    /// # Errors
    ///
    /// Returns an error if planning or any step fails. `state` then holds
    /// the effect of the steps that succeeded.
    pub async fn update(
        &self,
        spec: &ResourceSpec,
        state: &mut Option<ObservedState>,
    ) -> Result<OperationPlan> {
        let plan = self.plan(spec, state.as_ref())?;
        debug!("Update of {}: {} operations", spec.kind(), plan.len());
        self.apply(&plan, state).await?;
        Ok(plan)
    }

    /// Deletes a resource, or deactivates a rescue session.
    ///
    /// # Errors
    ///
    /// Returns an error if the removal fails; the state is then kept.
    pub async fn delete(&self, state: &mut Option<ObservedState>) -> Result<()> {
        let Some(observed) = state.as_ref() else {
            debug!("Nothing to delete");
            return Ok(());
        };
        info!("Deleting {}[{}]", observed.kind(), observed.id());
        let plan = self.differ.plan_destroy(observed);
        self.apply(&plan, state).await
    }

    /// Imports an existing server or SSH key by id.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a malformed id, an API error if the
    /// object does not exist, and a plan error for rescue sessions.
    pub async fn import(&self, kind: ResourceKind, id: &str) -> Result<ObservedState> {
        info!("Importing {kind}[{id}]");
        match kind {
            ResourceKind::Server => {
                let id = parse_id(id)?;
                let server = self
                    .api
                    .get_server(id)
                    .await?
                    .ok_or_else(|| ApiError::not_found("server", id))?;
                Ok(ObservedState::Server(ServerState::from_remote(&server, None)))
            }
            ResourceKind::SshKey => {
                let id = parse_id(id)?;
                let key = self
                    .api
                    .get_ssh_key(id)
                    .await?
                    .ok_or_else(|| ApiError::not_found("ssh_key", id))?;
                Ok(ObservedState::SshKey(key.into()))
            }
            ResourceKind::Rescue => Err(PlanError::unsupported("import", kind).into()),
        }
    }

    /// Reads a data source.
    ///
    /// # Errors
    ///
    /// Returns an error if the query has no key, a required object is
    /// missing, or the API call fails.
    pub async fn read_data_source(
        &self,
        kind: DataSourceKind,
        query: &DataSourceQuery,
    ) -> Result<DataSourceResult> {
        data_source::read(self.api, kind, query).await
    }
}
