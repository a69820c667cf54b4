//! Project operations.
//!
//! Deleting a project cascades to its todos server-side, so the delete
//! outcome invalidates the todos list as well as the projects list.

use reqwest::Method;
use std::sync::Arc;

use super::{decode, decode_list, encode, MutationOutcome};
use crate::cache::QueryKey;
use crate::models::{CreateProject, Project, UpdateProject};
use crate::transport::{Transport, TransportError};

pub struct ProjectsApi {
    transport: Arc<dyn Transport>,
}

impl ProjectsApi {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    pub async fn list(&self) -> Result<Vec<Project>, TransportError> {
        let data = self
            .transport
            .send(Method::GET, "/projects", None)
            .await
            .map_err(|err| err.or_fallback("Failed to load projects"))?;
        decode_list(data)
    }

    pub async fn get(&self, id: &str) -> Result<Project, TransportError> {
        let data = self
            .transport
            .send(Method::GET, &format!("/projects/{id}"), None)
            .await
            .map_err(|err| err.or_fallback("Failed to load project"))?;
        decode(data)
    }

    pub async fn create(
        &self,
        data: CreateProject,
    ) -> Result<MutationOutcome<Project>, TransportError> {
        let value = self
            .transport
            .send(Method::POST, "/projects", Some(encode(&data)?))
            .await
            .map_err(|err| err.or_fallback("Failed to create project"))?;
        Ok(MutationOutcome {
            value: decode(value)?,
            invalidated: vec![QueryKey::Projects],
        })
    }

    pub async fn update(
        &self,
        id: &str,
        patch: UpdateProject,
    ) -> Result<MutationOutcome<Project>, TransportError> {
        let value = self
            .transport
            .send(Method::PATCH, &format!("/projects/{id}"), Some(encode(&patch)?))
            .await
            .map_err(|err| err.or_fallback("Failed to update project"))?;
        Ok(MutationOutcome {
            value: decode(value)?,
            invalidated: vec![QueryKey::Projects, QueryKey::Project(id.to_string())],
        })
    }

    pub async fn delete(&self, id: &str) -> Result<MutationOutcome<()>, TransportError> {
        self.transport
            .send(Method::DELETE, &format!("/projects/{id}"), None)
            .await
            .map_err(|err| err.or_fallback("Failed to delete project"))?;
        Ok(MutationOutcome {
            value: (),
            // Todos referencing the deleted project are now stale.
            invalidated: vec![
                QueryKey::Projects,
                QueryKey::Project(id.to_string()),
                QueryKey::Todos,
            ],
        })
    }
}
