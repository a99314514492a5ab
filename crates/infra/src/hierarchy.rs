//! Hierarchy resolver: validates client → department → location chains and
//! owns the multi-step hierarchy writes.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument, warn};

use printfleet_core::{
    ClientId, CompletedStep, DepartmentId, DomainError, LocationId, PartialFailure,
};
use printfleet_fleet::{
    Client, Department, DepartmentStatus, DeploymentTarget, Location, ResolvedChain, verify_chain,
};

use crate::context::CallContext;
use crate::error::EngineError;
use crate::store::HierarchyStore;

/// Name of the step that may be left pending by [`HierarchyResolver::create_department`].
pub const DEFAULT_LOCATION_STEP: &str = "default location creation";

pub struct HierarchyResolver<S> {
    store: Arc<S>,
    default_location_name: String,
}

impl<S: HierarchyStore> HierarchyResolver<S> {
    pub fn new(store: Arc<S>, default_location_name: impl Into<String>) -> Self {
        Self {
            store,
            default_location_name: default_location_name.into(),
        }
    }

    pub fn default_location_name(&self) -> &str {
        &self.default_location_name
    }

    /// Resolve a client and, optionally, one of its locations.
    ///
    /// `NotFound` if any id is missing, `Integrity` if the location does not
    /// belong to the client.
    #[instrument(skip_all, fields(client_id = %client_id, location_id = ?location_id), err)]
    pub async fn resolve(
        &self,
        client_id: ClientId,
        location_id: Option<LocationId>,
    ) -> Result<ResolvedChain, EngineError> {
        let client = self
            .store
            .get_client(client_id)
            .await?
            .ok_or_else(|| DomainError::not_found("client", client_id))?;

        let Some(location_id) = location_id else {
            return Ok(ResolvedChain::client_only(client));
        };

        let location = self
            .store
            .get_location(location_id)
            .await?
            .ok_or_else(|| DomainError::not_found("location", location_id))?;
        let department = self
            .store
            .get_department(location.department_id)
            .await?
            .ok_or_else(|| DomainError::not_found("department", location.department_id))?;

        verify_chain(client_id, &department, &location)?;

        Ok(ResolvedChain {
            client,
            department: Some(department),
            location: Some(location),
        })
    }

    /// Locations a client's units may be deployed to, ordered by department
    /// name then location name. Inactive departments are excluded.
    pub async fn list_deployment_targets(
        &self,
        client_id: ClientId,
    ) -> Result<Vec<DeploymentTarget>, EngineError> {
        if self.store.get_client(client_id).await?.is_none() {
            return Err(DomainError::not_found("client", client_id).into());
        }

        let mut departments = self.store.departments_of(client_id).await?;
        departments.retain(Department::is_active);
        departments.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));

        let mut targets = Vec::new();
        for department in departments {
            let mut locations = self.store.locations_of(department.id).await?;
            locations.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
            targets.extend(locations.into_iter().map(|location| DeploymentTarget {
                department: department.clone(),
                location,
            }));
        }
        Ok(targets)
    }

    /// Resolve `location_id` and require it to be a current deployment target.
    pub async fn ensure_deployable(
        &self,
        client_id: ClientId,
        location_id: LocationId,
    ) -> Result<ResolvedChain, EngineError> {
        let chain = self.resolve(client_id, Some(location_id)).await?;
        let targets = self.list_deployment_targets(client_id).await?;
        if !targets.iter().any(|t| t.location.id == location_id) {
            return Err(DomainError::validation(format!(
                "location {location_id} is not a deployment target of client {client_id}"
            ))
            .into());
        }
        Ok(chain)
    }

    #[instrument(skip(self, ctx, name), err)]
    pub async fn create_client(
        &self,
        ctx: &CallContext,
        name: &str,
    ) -> Result<Client, EngineError> {
        let client = Client::new(ClientId::new(), name, Utc::now())?;
        ctx.ensure_active()?;
        self.store.insert_client(client.clone()).await?;
        info!(client_id = %client.id, "client created");
        Ok(client)
    }

    /// Create a department together with its default location.
    ///
    /// Two writes. If the department commits but the location does not, the
    /// error is a `PartialFailure` naming the department, and
    /// [`Self::create_default_location`] finishes the job.
    #[instrument(skip_all, fields(client_id = %client_id), err)]
    pub async fn create_department(
        &self,
        ctx: &CallContext,
        client_id: ClientId,
        name: &str,
    ) -> Result<Department, EngineError> {
        if self.store.get_client(client_id).await?.is_none() {
            return Err(DomainError::not_found("client", client_id).into());
        }
        let department = Department::new(DepartmentId::new(), client_id, name, Utc::now())?;

        ctx.ensure_active()?;
        self.store.insert_department(department.clone()).await?;
        info!(department_id = %department.id, "department created");

        // The department is committed; a cancelled session no longer aborts.
        if let Err(err) = self.insert_default_location(department.id).await {
            warn!(department_id = %department.id, error = %err, "default location was not created");
            return Err(DomainError::PartialFailure(PartialFailure {
                completed: CompletedStep::DepartmentCreated(department.id),
                pending: DEFAULT_LOCATION_STEP,
                cause: err.to_string(),
            })
            .into());
        }

        Ok(department)
    }

    /// Finish a partially created department. Returns the existing default
    /// location if it is already there.
    #[instrument(skip_all, fields(department_id = %department_id), err)]
    pub async fn create_default_location(
        &self,
        ctx: &CallContext,
        department_id: DepartmentId,
    ) -> Result<Location, EngineError> {
        if self.store.get_department(department_id).await?.is_none() {
            return Err(DomainError::not_found("department", department_id).into());
        }
        if let Some(existing) = self
            .store
            .locations_of(department_id)
            .await?
            .into_iter()
            .find(|l| l.name == self.default_location_name)
        {
            return Ok(existing);
        }

        ctx.ensure_active()?;
        self.insert_default_location(department_id).await
    }

    pub async fn create_location(
        &self,
        ctx: &CallContext,
        department_id: DepartmentId,
        name: &str,
        address: Option<String>,
    ) -> Result<Location, EngineError> {
        let mut location = Location::new(LocationId::new(), department_id, name, Utc::now())?;
        location.address = address.filter(|a| !a.trim().is_empty());
        ctx.ensure_active()?;
        self.store.insert_location(location.clone()).await?;
        Ok(location)
    }

    pub async fn set_department_status(
        &self,
        ctx: &CallContext,
        department_id: DepartmentId,
        status: DepartmentStatus,
    ) -> Result<(), EngineError> {
        ctx.ensure_active()?;
        self.store.set_department_status(department_id, status).await?;
        info!(department_id = %department_id, ?status, "department status changed");
        Ok(())
    }

    /// Delete a client that has no active departments and owns no units.
    ///
    /// Checked up front for a clear `Validation` error, then re-checked by
    /// the store atomically with the delete (a race there is a `Conflict`).
    #[instrument(skip_all, fields(client_id = %client_id), err)]
    pub async fn delete_client(
        &self,
        ctx: &CallContext,
        client_id: ClientId,
    ) -> Result<(), EngineError> {
        if self.store.get_client(client_id).await?.is_none() {
            return Err(DomainError::not_found("client", client_id).into());
        }
        let active = self
            .store
            .departments_of(client_id)
            .await?
            .into_iter()
            .filter(Department::is_active)
            .count();
        if active > 0 {
            return Err(DomainError::validation(format!(
                "client {client_id} has {active} active department(s)"
            ))
            .into());
        }

        ctx.ensure_active()?;
        self.store.delete_client(client_id).await?;
        warn!(target: "printfleet::audit", client_id = %client_id, actor = ?ctx.actor(), "client deleted");
        Ok(())
    }

    async fn insert_default_location(
        &self,
        department_id: DepartmentId,
    ) -> Result<Location, EngineError> {
        let location = Location::new(
            LocationId::new(),
            department_id,
            self.default_location_name.as_str(),
            Utc::now(),
        )?;
        self.store.insert_location(location.clone()).await?;
        info!(department_id = %department_id, location_id = %location.id, "default location created");
        Ok(location)
    }
}
