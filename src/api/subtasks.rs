//! Subtask operations.
//!
//! Subtasks are created relative to a parent todo but addressed by
//! their own id for delete/complete. They are only ever viewed
//! embedded in their parent, so every mutation invalidates the parent
//! todo's detail key.

use reqwest::Method;
use std::sync::Arc;

use super::{decode, encode, MutationOutcome};
use crate::cache::QueryKey;
use crate::models::{CreateSubtask, Subtask};
use crate::transport::{Transport, TransportError};

pub struct SubtasksApi {
    transport: Arc<dyn Transport>,
}

impl SubtasksApi {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    pub async fn create(
        &self,
        todo_id: &str,
        data: CreateSubtask,
    ) -> Result<MutationOutcome<Subtask>, TransportError> {
        let value = self
            .transport
            .send(
                Method::POST,
                &format!("/todos/{todo_id}/subtasks"),
                Some(encode(&data)?),
            )
            .await
            .map_err(|err| err.or_fallback("Failed to create subtask"))?;
        Ok(MutationOutcome {
            value: decode(value)?,
            invalidated: vec![QueryKey::Todo(todo_id.to_string())],
        })
    }

    pub async fn delete(
        &self,
        subtask_id: &str,
        todo_id: &str,
    ) -> Result<MutationOutcome<()>, TransportError> {
        self.transport
            .send(Method::DELETE, &format!("/subtasks/{subtask_id}"), None)
            .await
            .map_err(|err| err.or_fallback("Failed to delete subtask"))?;
        Ok(MutationOutcome {
            value: (),
            invalidated: vec![QueryKey::Todo(todo_id.to_string())],
        })
    }

    /// One-way completion, idempotent like todo completion.
    pub async fn complete(
        &self,
        subtask_id: &str,
        todo_id: &str,
    ) -> Result<MutationOutcome<Subtask>, TransportError> {
        let value = self
            .transport
            .send(
                Method::PATCH,
                &format!("/subtasks/{subtask_id}/complete"),
                None,
            )
            .await
            .map_err(|err| err.or_fallback("Failed to complete subtask"))?;
        Ok(MutationOutcome {
            value: decode(value)?,
            invalidated: vec![QueryKey::Todo(todo_id.to_string())],
        })
    }
}
