//! Client → department → location ownership hierarchy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use printfleet_core::{ClientId, DepartmentId, DomainError, DomainResult, Entity, LocationId};

/// A client organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub id: ClientId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Client {
    pub fn new(id: ClientId, name: impl Into<String>, now: DateTime<Utc>) -> DomainResult<Self> {
        let name = non_empty(name.into(), "client name")?;
        Ok(Self {
            id,
            name,
            created_at: now,
        })
    }
}

/// Department lifecycle. Only active departments accept deployments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DepartmentStatus {
    Active,
    Inactive,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Department {
    pub id: DepartmentId,
    pub client_id: ClientId,
    pub name: String,
    pub status: DepartmentStatus,
    pub created_at: DateTime<Utc>,
}

impl Department {
    pub fn new(
        id: DepartmentId,
        client_id: ClientId,
        name: impl Into<String>,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let name = non_empty(name.into(), "department name")?;
        Ok(Self {
            id,
            client_id,
            name,
            status: DepartmentStatus::Active,
            created_at: now,
        })
    }

    pub fn is_active(&self) -> bool {
        self.status == DepartmentStatus::Active
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub id: LocationId,
    pub department_id: DepartmentId,
    pub name: String,
    pub address: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Location {
    pub fn new(
        id: LocationId,
        department_id: DepartmentId,
        name: impl Into<String>,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let name = non_empty(name.into(), "location name")?;
        Ok(Self {
            id,
            department_id,
            name,
            address: None,
            created_at: now,
        })
    }
}

impl Entity for Client {
    type Id = ClientId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

impl Entity for Department {
    type Id = DepartmentId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

impl Entity for Location {
    type Id = LocationId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

/// A place a unit can be deployed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentTarget {
    pub department: Department,
    pub location: Location,
}

/// A validated hierarchy chain.
///
/// `department` and `location` are both present or both absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedChain {
    pub client: Client,
    pub department: Option<Department>,
    pub location: Option<Location>,
}

impl ResolvedChain {
    pub fn client_only(client: Client) -> Self {
        Self {
            client,
            department: None,
            location: None,
        }
    }
}

/// Check that `location` sits under `department` and `department` under `client`.
pub fn verify_chain(client_id: ClientId, department: &Department, location: &Location) -> DomainResult<()> {
    if location.department_id != department.id {
        return Err(DomainError::integrity(format!(
            "location {} belongs to department {}, not {}",
            location.id, location.department_id, department.id
        )));
    }
    if department.client_id != client_id {
        return Err(DomainError::integrity(format!(
            "location {} belongs to client {}, not {}",
            location.id, department.client_id, client_id
        )));
    }
    Ok(())
}

fn non_empty(value: String, what: &str) -> DomainResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation(format!("{what} cannot be empty")));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_chain_accepts_matching_hierarchy() {
        let now = Utc::now();
        let client = ClientId::new();
        let dept = Department::new(DepartmentId::new(), client, "Finance", now).unwrap();
        let loc = Location::new(LocationId::new(), dept.id, "Main", now).unwrap();
        assert!(verify_chain(client, &dept, &loc).is_ok());
    }

    #[test]
    fn verify_chain_rejects_foreign_client() {
        let now = Utc::now();
        let dept = Department::new(DepartmentId::new(), ClientId::new(), "Finance", now).unwrap();
        let loc = Location::new(LocationId::new(), dept.id, "Main", now).unwrap();
        let err = verify_chain(ClientId::new(), &dept, &loc).unwrap_err();
        assert!(matches!(err, DomainError::Integrity(_)));
    }

    #[test]
    fn verify_chain_rejects_foreign_department() {
        let now = Utc::now();
        let client = ClientId::new();
        let dept = Department::new(DepartmentId::new(), client, "Finance", now).unwrap();
        let loc = Location::new(LocationId::new(), DepartmentId::new(), "Main", now).unwrap();
        assert!(matches!(
            verify_chain(client, &dept, &loc),
            Err(DomainError::Integrity(_))
        ));
    }

    #[test]
    fn names_are_trimmed_and_required() {
        let now = Utc::now();
        let c = Client::new(ClientId::new(), "  Acme  ", now).unwrap();
        assert_eq!(c.name, "Acme");
        assert!(Department::new(DepartmentId::new(), c.id, " ", now).is_err());
    }
}
