//! Todo operations.
//!
//! `complete` is a dedicated idempotent state transition, distinct from
//! the generic partial update; there is no uncomplete. Mutations on a
//! todo that belongs to a project also stale that project's scoped
//! todo list.

use reqwest::Method;
use std::sync::Arc;

use super::{decode, decode_list, encode, MutationOutcome};
use crate::cache::QueryKey;
use crate::models::{CreateTodo, Todo, UpdateTodo};
use crate::transport::{Transport, TransportError};

pub struct TodosApi {
    transport: Arc<dyn Transport>,
}

fn todo_keys(id: &str, project_id: Option<&str>) -> Vec<QueryKey> {
    let mut keys = vec![QueryKey::Todos, QueryKey::Todo(id.to_string())];
    if let Some(project_id) = project_id {
        keys.push(QueryKey::TodosByProject(project_id.to_string()));
    }
    keys
}

impl TodosApi {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    pub async fn list(&self) -> Result<Vec<Todo>, TransportError> {
        let data = self
            .transport
            .send(Method::GET, "/todos", None)
            .await
            .map_err(|err| err.or_fallback("Failed to load todos"))?;
        decode_list(data)
    }

    pub async fn list_by_project(&self, project_id: &str) -> Result<Vec<Todo>, TransportError> {
        let data = self
            .transport
            .send(Method::GET, &format!("/projects/{project_id}/todos"), None)
            .await
            .map_err(|err| err.or_fallback("Failed to load project todos"))?;
        decode_list(data)
    }

    pub async fn get(&self, id: &str) -> Result<Todo, TransportError> {
        let data = self
            .transport
            .send(Method::GET, &format!("/todos/{id}"), None)
            .await
            .map_err(|err| err.or_fallback("Failed to load todo"))?;
        decode(data)
    }

    pub async fn create(&self, data: CreateTodo) -> Result<MutationOutcome<Todo>, TransportError> {
        let value = self
            .transport
            .send(Method::POST, "/todos", Some(encode(&data)?))
            .await
            .map_err(|err| err.or_fallback("Failed to create todo"))?;
        let todo: Todo = decode(value)?;
        let invalidated = todo_keys(&todo.id, todo.project_id.as_deref());
        Ok(MutationOutcome {
            value: todo,
            invalidated,
        })
    }

    pub async fn update(
        &self,
        id: &str,
        patch: UpdateTodo,
    ) -> Result<MutationOutcome<Todo>, TransportError> {
        let value = self
            .transport
            .send(Method::PATCH, &format!("/todos/{id}"), Some(encode(&patch)?))
            .await
            .map_err(|err| err.or_fallback("Failed to update todo"))?;
        let todo: Todo = decode(value)?;
        let invalidated = todo_keys(id, todo.project_id.as_deref());
        Ok(MutationOutcome {
            value: todo,
            invalidated,
        })
    }

    pub async fn delete(&self, id: &str) -> Result<MutationOutcome<()>, TransportError> {
        self.transport
            .send(Method::DELETE, &format!("/todos/{id}"), None)
            .await
            .map_err(|err| err.or_fallback("Failed to delete todo"))?;
        Ok(MutationOutcome {
            value: (),
            invalidated: vec![QueryKey::Todos, QueryKey::Todo(id.to_string())],
        })
    }

    /// One-way completion. Safe to call on an already-completed todo;
    /// the server keeps `completed` at true.
    pub async fn complete(
        &self,
        id: &str,
        project_id: Option<&str>,
    ) -> Result<MutationOutcome<Todo>, TransportError> {
        let value = self
            .transport
            .send(Method::PATCH, &format!("/todos/{id}/complete"), None)
            .await
            .map_err(|err| err.or_fallback("Failed to complete todo"))?;
        let todo: Todo = decode(value)?;
        let invalidated = todo_keys(id, project_id.or(todo.project_id.as_deref()));
        Ok(MutationOutcome {
            value: todo,
            invalidated,
        })
    }
}
