//! Domain resource clients: one module per resource family, each
//! translating a domain operation into a transport call and unwrapping
//! the response envelope.
//!
//! Mutations return a [`MutationOutcome`] carrying the confirmed value
//! together with the query keys it invalidates; the caller applies the
//! invalidation through the cache (confirm-then-invalidate, never the
//! other way around).

pub mod auth;
pub mod projects;
pub mod subtasks;
pub mod todos;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use crate::cache::{CachedValue, QueryFetcher, QueryKey};
use crate::transport::{Transport, TransportError};

pub use auth::AuthApi;
pub use projects::ProjectsApi;
pub use subtasks::SubtasksApi;
pub use todos::TodosApi;

/// A confirmed mutation result plus the cache keys it staled.
#[derive(Debug)]
pub struct MutationOutcome<T> {
    pub value: T,
    pub invalidated: Vec<QueryKey>,
}

/// All resource clients over one shared transport.
pub struct Api {
    pub auth: AuthApi,
    pub projects: ProjectsApi,
    pub todos: TodosApi,
    pub subtasks: SubtasksApi,
}

impl Api {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            auth: AuthApi::new(transport.clone()),
            projects: ProjectsApi::new(transport.clone()),
            todos: TodosApi::new(transport.clone()),
            subtasks: SubtasksApi::new(transport),
        }
    }
}

#[async_trait]
impl QueryFetcher for Api {
    async fn fetch(&self, key: &QueryKey) -> Result<CachedValue, TransportError> {
        match key {
            QueryKey::Projects => Ok(CachedValue::Projects(self.projects.list().await?)),
            QueryKey::Project(id) => Ok(CachedValue::Project(self.projects.get(id).await?)),
            QueryKey::Todos => Ok(CachedValue::Todos(self.todos.list().await?)),
            QueryKey::TodosByProject(id) => {
                Ok(CachedValue::Todos(self.todos.list_by_project(id).await?))
            }
            QueryKey::Todo(id) => Ok(CachedValue::Todo(self.todos.get(id).await?)),
        }
    }
}

/// Decode envelope `data` into a typed value.
pub(crate) fn decode<T: DeserializeOwned>(value: Value) -> Result<T, TransportError> {
    serde_json::from_value(value).map_err(|err| TransportError::Malformed(err.to_string()))
}

/// Decode a list-shaped `data` payload. Non-array payloads normalize
/// to an empty list instead of propagating a shape error.
pub(crate) fn decode_list<T: DeserializeOwned>(value: Value) -> Result<Vec<T>, TransportError> {
    match value {
        Value::Array(_) => decode(value),
        _ => Ok(Vec::new()),
    }
}

pub(crate) fn encode<T: Serialize>(value: &T) -> Result<Value, TransportError> {
    serde_json::to_value(value).map_err(|err| TransportError::Malformed(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::*;
    use crate::transport::testing::FakeTransport;
    use chrono::Utc;
    use parking_lot::Mutex;

    fn envelope(data: Value) -> Value {
        serde_json::json!({ "success": true, "data": data, "message": "" })
    }

    #[test]
    fn non_array_list_payload_normalizes_to_empty() {
        let todos: Vec<Todo> = decode_list(Value::Null).unwrap();
        assert!(todos.is_empty());
        let todos: Vec<Todo> =
            decode_list(serde_json::json!({ "unexpected": "object" })).unwrap();
        assert!(todos.is_empty());
    }

    #[test]
    fn malformed_array_element_is_a_decode_error() {
        let err = decode_list::<Todo>(serde_json::json!([{ "id": 42 }])).unwrap_err();
        assert!(matches!(err, TransportError::Malformed(_)));
    }

    fn timestamps() -> (String, String) {
        let now = Utc::now().to_rfc3339();
        (now.clone(), now)
    }

    fn project_json(id: &str, name: &str) -> Value {
        let (created, updated) = timestamps();
        serde_json::json!({
            "id": id, "name": name, "color": "#3b82f6",
            "ownerId": "u1", "createdAt": created, "updatedAt": updated
        })
    }

    fn todo_json(id: &str, title: &str, completed: bool, project_id: Option<&str>) -> Value {
        let (created, updated) = timestamps();
        let mut value = serde_json::json!({
            "id": id, "title": title, "completed": completed,
            "ownerId": "u1", "createdAt": created, "updatedAt": updated
        });
        if let Some(pid) = project_id {
            value["projectId"] = Value::String(pid.to_string());
        }
        value
    }

    /// A minimal in-memory rendition of the remote API, enough to run
    /// the create-project → create-todo → complete flow end to end.
    struct ServerState {
        projects: Vec<Value>,
        todos: Vec<Value>,
    }

    fn scenario_transport() -> Arc<FakeTransport> {
        let state = Arc::new(Mutex::new(ServerState {
            projects: Vec::new(),
            todos: Vec::new(),
        }));
        Arc::new(FakeTransport::new(move |method, path, body| {
            let mut state = state.lock();
            match (method.as_str(), path) {
                ("GET", "/projects") => Ok(envelope(Value::Array(state.projects.clone()))),
                ("POST", "/projects") => {
                    let name = body.unwrap()["name"].as_str().unwrap().to_string();
                    let project = project_json("p1", &name);
                    state.projects.push(project.clone());
                    Ok(envelope(project))
                }
                ("GET", "/todos") => Ok(envelope(Value::Array(state.todos.clone()))),
                ("POST", "/todos") => {
                    let body = body.unwrap();
                    let todo = todo_json(
                        "t1",
                        body["title"].as_str().unwrap(),
                        false,
                        body["projectId"].as_str(),
                    );
                    state.todos.push(todo.clone());
                    Ok(envelope(todo))
                }
                ("PATCH", "/todos/t1/complete") => {
                    // Idempotent one-way transition: completed never
                    // leaves true.
                    let todo = &mut state.todos[0];
                    todo["completed"] = Value::Bool(true);
                    Ok(envelope(todo.clone()))
                }
                _ => Err(TransportError::Server {
                    status: 404,
                    message: String::new(),
                }),
            }
        }))
    }

    #[tokio::test]
    async fn create_project_create_todo_complete_scenario() {
        let transport = scenario_transport();
        let api = Arc::new(Api::new(transport.clone()));
        let cache = Arc::new(crate::cache::QueryCache::new(api.clone()));

        // Create a project; the projects list refetches and includes
        // it exactly once.
        let outcome = api
            .projects
            .create(CreateProject {
                name: "Web Dev".into(),
                color: Some("#3b82f6".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(outcome.invalidated, vec![QueryKey::Projects]);
        cache.invalidate(&outcome.invalidated);
        let projects = cache
            .query(&QueryKey::Projects)
            .await
            .data
            .unwrap()
            .into_projects();
        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].name, "Web Dev");
        let project_id = projects[0].id.clone();

        // Create a todo in the project; the todos list includes it,
        // not yet completed.
        let outcome = api
            .todos
            .create(CreateTodo {
                title: "Implement auth".into(),
                project_id: Some(project_id.clone()),
                ..Default::default()
            })
            .await
            .unwrap();
        cache.invalidate(&outcome.invalidated);
        let todos = cache
            .query(&QueryKey::Todos)
            .await
            .data
            .unwrap()
            .into_todos();
        assert_eq!(todos.len(), 1);
        assert!(!todos[0].completed);

        // Complete it; the refetched list shows completed and the
        // project's progress over its todos is 1/1.
        let outcome = api.todos.complete(&todos[0].id, Some(&project_id)).await.unwrap();
        assert!(outcome.value.completed);
        cache.invalidate(&outcome.invalidated);
        let todos = cache
            .query(&QueryKey::Todos)
            .await
            .data
            .unwrap()
            .into_todos();
        assert!(todos[0].completed);

        let mut project = projects.into_iter().next().unwrap();
        project.todos = Some(todos);
        assert_eq!(project.progress(), Some(100));
    }

    #[tokio::test]
    async fn complete_is_idempotent() {
        let transport = scenario_transport();
        let api = Api::new(transport.clone());

        api.todos
            .create(CreateTodo {
                title: "once".into(),
                ..Default::default()
            })
            .await
            .unwrap();

        let first = api.todos.complete("t1", None).await.unwrap();
        assert!(first.value.completed);
        let second = api.todos.complete("t1", None).await.unwrap();
        assert!(second.value.completed, "completed never leaves true");

        let patches: Vec<_> = transport
            .calls()
            .into_iter()
            .filter(|(method, path)| method.as_str() == "PATCH" && path.ends_with("/complete"))
            .collect();
        assert_eq!(patches.len(), 2);
    }

    #[tokio::test]
    async fn completion_invalidates_list_and_detail_exactly_once() {
        let transport = scenario_transport();
        let api = Arc::new(Api::new(transport.clone()));
        let cache = Arc::new(crate::cache::QueryCache::new(api.clone()));

        api.todos
            .create(CreateTodo {
                title: "x".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        let outcome = api.todos.complete("t1", None).await.unwrap();
        assert!(outcome.invalidated.contains(&QueryKey::Todos));
        assert!(outcome.invalidated.contains(&QueryKey::Todo("t1".into())));

        cache.invalidate(&outcome.invalidated);
        assert_eq!(cache.version(&QueryKey::Todos), 1);
        assert_eq!(cache.version(&QueryKey::Todo("t1".into())), 1);
    }

    #[tokio::test]
    async fn deleting_a_project_invalidates_projects_and_todos() {
        let transport = Arc::new(FakeTransport::new(|method, path, _| {
            match (method.as_str(), path) {
                ("DELETE", "/projects/p1") => Ok(envelope(Value::Null)),
                _ => Err(TransportError::Server {
                    status: 404,
                    message: String::new(),
                }),
            }
        }));
        let api = Api::new(transport);

        let outcome = api.projects.delete("p1").await.unwrap();
        assert!(outcome.invalidated.contains(&QueryKey::Projects));
        assert!(outcome.invalidated.contains(&QueryKey::Todos));
        assert!(outcome
            .invalidated
            .contains(&QueryKey::Project("p1".into())));
    }

    #[tokio::test]
    async fn subtask_mutations_invalidate_the_parent_todo() {
        let transport = Arc::new(FakeTransport::new(|method, path, body| {
            let (created, updated) = timestamps();
            let subtask = serde_json::json!({
                "id": "s1",
                "title": body.and_then(|b| b["title"].as_str()).unwrap_or("step"),
                "completed": method.as_str() == "PATCH",
                "todoId": "t1", "createdAt": created, "updatedAt": updated
            });
            match (method.as_str(), path) {
                ("POST", "/todos/t1/subtasks") => Ok(envelope(subtask)),
                ("DELETE", "/subtasks/s1") => Ok(envelope(Value::Null)),
                ("PATCH", "/subtasks/s1/complete") => Ok(envelope(subtask)),
                _ => Err(TransportError::Server {
                    status: 404,
                    message: String::new(),
                }),
            }
        }));
        let api = Api::new(transport);

        let created = api
            .subtasks
            .create("t1", CreateSubtask { title: "step".into() })
            .await
            .unwrap();
        assert_eq!(created.invalidated, vec![QueryKey::Todo("t1".into())]);

        let completed = api.subtasks.complete("s1", "t1").await.unwrap();
        assert!(completed.value.completed);
        assert_eq!(completed.invalidated, vec![QueryKey::Todo("t1".into())]);

        let deleted = api.subtasks.delete("s1", "t1").await.unwrap();
        assert_eq!(deleted.invalidated, vec![QueryKey::Todo("t1".into())]);
    }

    #[tokio::test]
    async fn server_message_is_surfaced_with_fallback() {
        let transport = Arc::new(FakeTransport::new(|_, _, _| {
            Err(TransportError::Server {
                status: 500,
                message: String::new(),
            })
        }));
        let api = Api::new(transport);

        let err = api.projects.list().await.unwrap_err();
        assert_eq!(
            err,
            TransportError::Server {
                status: 500,
                message: "Failed to load projects".into()
            }
        );
    }
}
