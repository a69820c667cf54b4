//! Synchronized query cache.
//!
//! A keyed store of last-fetched domain values with explicit
//! invalidation. Concurrent consumers of one key share a single
//! in-flight fetch; invalidation marks the entry stale (the old value
//! stays visible until the refetch resolves) and immediately refetches
//! keys with active subscribers. A monotonic version per key guards
//! against an out-of-order hazard: a fetch that started before the
//! latest invalidation never commits its result.
//!
//! Entries are only ever updated from confirmed server responses.
//! There are no optimistic writes.

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::models::{Project, Todo};
use crate::transport::TransportError;

/// Identifier under which one cached result is stored: resource family
/// plus optional scoping parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryKey {
    Projects,
    Project(String),
    Todos,
    TodosByProject(String),
    Todo(String),
}

impl QueryKey {
    /// Keys parameterized by an identifier are only active once that
    /// identifier is known. An inactive key never issues a request.
    pub fn is_enabled(&self) -> bool {
        match self {
            QueryKey::Projects | QueryKey::Todos => true,
            QueryKey::Project(id) | QueryKey::TodosByProject(id) | QueryKey::Todo(id) => {
                !id.is_empty()
            }
        }
    }

    /// Whether invalidating `self` also stales `other`. The unscoped
    /// todos key covers every project-scoped list: any todo change can
    /// alter a scoped view, including ones scoped to projects the
    /// mutation did not name (a cascade delete, a todo moved between
    /// projects).
    fn covers(&self, other: &QueryKey) -> bool {
        self == other
            || matches!((self, other), (QueryKey::Todos, QueryKey::TodosByProject(_)))
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryKey::Projects => write!(f, "projects"),
            QueryKey::Project(id) => write!(f, "project:{id}"),
            QueryKey::Todos => write!(f, "todos"),
            QueryKey::TodosByProject(id) => write!(f, "todos:project:{id}"),
            QueryKey::Todo(id) => write!(f, "todo:{id}"),
        }
    }
}

/// A fetched value, shaped per key family.
#[derive(Debug, Clone, PartialEq)]
pub enum CachedValue {
    Projects(Vec<Project>),
    Project(Project),
    Todos(Vec<Todo>),
    Todo(Todo),
}

impl CachedValue {
    pub fn into_projects(self) -> Vec<Project> {
        match self {
            CachedValue::Projects(projects) => projects,
            _ => Vec::new(),
        }
    }

    pub fn into_todos(self) -> Vec<Todo> {
        match self {
            CachedValue::Todos(todos) => todos,
            _ => Vec::new(),
        }
    }

    pub fn into_project(self) -> Option<Project> {
        match self {
            CachedValue::Project(project) => Some(project),
            _ => None,
        }
    }

    pub fn into_todo(self) -> Option<Todo> {
        match self {
            CachedValue::Todo(todo) => Some(todo),
            _ => None,
        }
    }
}

/// Resolves a query key into its value. Implemented by the domain
/// resource client hub.
#[async_trait]
pub trait QueryFetcher: Send + Sync {
    async fn fetch(&self, key: &QueryKey) -> Result<CachedValue, TransportError>;
}

/// Observable state of one cache entry.
#[derive(Debug, Clone, Default)]
pub struct QuerySnapshot {
    pub data: Option<CachedValue>,
    pub loading: bool,
    pub error: Option<TransportError>,
    pub stale: bool,
}

type SharedFetch = Shared<BoxFuture<'static, Result<CachedValue, TransportError>>>;

struct InFlight {
    started_version: u64,
    future: SharedFetch,
}

#[derive(Default)]
struct Entry {
    value: Option<CachedValue>,
    error: Option<TransportError>,
    loading: bool,
    stale: bool,
    /// Bumped once per invalidation; a fetch commits only if the
    /// version it started under is still current.
    version: u64,
    subscribers: usize,
    inflight: Option<InFlight>,
}

pub struct QueryCache {
    fetcher: Arc<dyn QueryFetcher>,
    entries: Mutex<HashMap<QueryKey, Entry>>,
}

impl QueryCache {
    pub fn new(fetcher: Arc<dyn QueryFetcher>) -> Self {
        Self {
            fetcher,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Current state of a key without triggering a fetch.
    pub fn snapshot(&self, key: &QueryKey) -> QuerySnapshot {
        if !key.is_enabled() {
            return QuerySnapshot::default();
        }
        let entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) => QuerySnapshot {
                data: entry.value.clone(),
                loading: entry.loading,
                error: entry.error.clone(),
                stale: entry.stale,
            },
            None => QuerySnapshot::default(),
        }
    }

    /// Register an active consumer of a key. While at least one
    /// subscription is held, invalidation refetches the key
    /// immediately instead of waiting for the next read.
    pub fn subscribe(self: &Arc<Self>, key: QueryKey) -> QuerySubscription {
        if key.is_enabled() {
            let mut entries = self.entries.lock();
            entries.entry(key.clone()).or_default().subscribers += 1;
        }
        QuerySubscription {
            cache: Arc::clone(self),
            key,
        }
    }

    /// Read through the cache: returns the cached value when fresh,
    /// otherwise fetches (joining any in-flight fetch for the same
    /// key). Inactive keys resolve to a default snapshot without a
    /// request.
    pub async fn query(self: &Arc<Self>, key: &QueryKey) -> QuerySnapshot {
        if !key.is_enabled() {
            return QuerySnapshot::default();
        }
        let fresh = {
            let entries = self.entries.lock();
            entries
                .get(key)
                .map(|e| e.value.is_some() && !e.stale && e.error.is_none())
                .unwrap_or(false)
        };
        if !fresh {
            let _ = self.refresh(key).await;
        }
        self.snapshot(key)
    }

    /// Issue (or join) a fetch for a key and return its result.
    ///
    /// The result is committed to the entry only if no invalidation
    /// was issued after the fetch started; a superseded result is
    /// returned to the caller but never overwrites newer cache state.
    pub async fn refresh(self: &Arc<Self>, key: &QueryKey) -> Result<CachedValue, TransportError> {
        let shared = {
            let mut entries = self.entries.lock();
            let entry = entries.entry(key.clone()).or_default();
            match &entry.inflight {
                // Join the in-flight fetch only while it is still
                // current; a fetch started before the latest
                // invalidation must be replaced, not joined.
                Some(inflight) if inflight.started_version == entry.version => {
                    inflight.future.clone()
                }
                _ => {
                    entry.loading = true;
                    let started_version = entry.version;
                    let fetcher = Arc::clone(&self.fetcher);
                    let fetch_key = key.clone();
                    let future: SharedFetch =
                        async move { fetcher.fetch(&fetch_key).await }.boxed().shared();
                    entry.inflight = Some(InFlight {
                        started_version,
                        future: future.clone(),
                    });
                    future
                }
            }
        };

        let result = shared.clone().await;

        let mut entries = self.entries.lock();
        let entry = entries.entry(key.clone()).or_default();
        let owns_inflight = entry
            .inflight
            .as_ref()
            .map(|inflight| inflight.future.ptr_eq(&shared))
            .unwrap_or(false);
        if owns_inflight {
            let started_version = entry.inflight.take().map(|i| i.started_version).unwrap_or(0);
            entry.loading = false;
            if started_version == entry.version {
                match &result {
                    Ok(value) => {
                        entry.value = Some(value.clone());
                        entry.error = None;
                        entry.stale = false;
                    }
                    Err(err) => {
                        // The entry is marked errored but not cleared.
                        entry.error = Some(err.clone());
                        entry.stale = false;
                    }
                }
            } else {
                debug!("Dropping superseded fetch result for {key}");
            }
        }
        result
    }

    /// Mark the given keys stale and refetch any with active
    /// subscribers. The stale value remains visible until the refetch
    /// resolves. Covered keys are staled too: invalidating `Todos`
    /// reaches every `TodosByProject` entry.
    pub fn invalidate(self: &Arc<Self>, keys: &[QueryKey]) {
        let mut refetch = Vec::new();
        {
            let mut entries = self.entries.lock();
            // Named keys get an entry up front so their version
            // advances even before the first read.
            for key in keys {
                if key.is_enabled() {
                    entries.entry(key.clone()).or_default();
                }
            }
            for (entry_key, entry) in entries.iter_mut() {
                if !keys
                    .iter()
                    .any(|key| key.is_enabled() && key.covers(entry_key))
                {
                    continue;
                }
                entry.version += 1;
                if entry.value.is_some() {
                    entry.stale = true;
                }
                entry.error = None;
                debug!("Invalidated {entry_key} (v{})", entry.version);
                if entry.subscribers > 0 {
                    refetch.push(entry_key.clone());
                }
            }
        }
        for key in refetch {
            let cache = Arc::clone(self);
            tokio::spawn(async move {
                if let Err(err) = cache.refresh(&key).await {
                    debug!("Background refetch of {key} failed: {err}");
                }
            });
        }
    }

    /// Drop all cached state. Called on logout so no data leaks across
    /// identities.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    #[cfg(test)]
    pub(crate) fn version(&self, key: &QueryKey) -> u64 {
        self.entries
            .lock()
            .get(key)
            .map(|e| e.version)
            .unwrap_or(0)
    }

    fn unsubscribe(&self, key: &QueryKey) {
        if !key.is_enabled() {
            return;
        }
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get_mut(key) {
            entry.subscribers = entry.subscribers.saturating_sub(1);
        }
    }
}

/// Guard representing one active consumer of a key.
pub struct QuerySubscription {
    cache: Arc<QueryCache>,
    key: QueryKey,
}

impl Drop for QuerySubscription {
    fn drop(&mut self) {
        self.cache.unsubscribe(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    fn todo(id: &str, completed: bool) -> Todo {
        Todo {
            id: id.into(),
            title: format!("todo {id}"),
            description: None,
            completed,
            due_date: None,
            note: None,
            priority: None,
            project_id: None,
            owner_id: "u1".into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            subtasks: None,
        }
    }

    /// Fetcher that serves a programmable sequence of results and can
    /// hold a fetch open until released.
    struct ScriptedFetcher {
        calls: AtomicUsize,
        gate: Option<(usize, Arc<Notify>)>,
        results: Mutex<Vec<Result<CachedValue, TransportError>>>,
    }

    impl ScriptedFetcher {
        fn new(results: Vec<Result<CachedValue, TransportError>>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                gate: None,
                results: Mutex::new(results),
            }
        }

        /// Hold the given call (0-based) open until the gate is notified.
        fn gated(mut self, call: usize, gate: Arc<Notify>) -> Self {
            self.gate = Some((call, gate));
            self
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl QueryFetcher for ScriptedFetcher {
        async fn fetch(&self, _key: &QueryKey) -> Result<CachedValue, TransportError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some((gated_call, gate)) = &self.gate {
                if call == *gated_call {
                    gate.notified().await;
                }
            }
            let mut results = self.results.lock();
            if results.len() > 1 {
                results.remove(0)
            } else {
                results[0].clone()
            }
        }
    }

    async fn wait_for<F: Fn() -> bool>(cond: F) {
        for _ in 0..200 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn concurrent_queries_share_one_fetch() {
        let gate = Arc::new(Notify::new());
        let fetcher = Arc::new(
            ScriptedFetcher::new(vec![Ok(CachedValue::Todos(vec![todo("t1", false)]))])
                .gated(0, gate.clone()),
        );
        let cache = Arc::new(QueryCache::new(fetcher.clone()));

        let a = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.query(&QueryKey::Todos).await })
        };
        let b = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.query(&QueryKey::Todos).await })
        };
        // Both joiners are waiting on the same gated fetch.
        wait_for(|| fetcher.call_count() == 1).await;
        gate.notify_one();

        let (a, b) = (a.await.unwrap(), b.await.unwrap());
        assert_eq!(fetcher.call_count(), 1);
        assert_eq!(a.data, b.data);
        assert!(a.data.unwrap().into_todos().len() == 1);
    }

    #[tokio::test]
    async fn disabled_key_reports_no_data_and_no_fetch() {
        let fetcher = Arc::new(ScriptedFetcher::new(vec![Ok(CachedValue::Todos(vec![]))]));
        let cache = Arc::new(QueryCache::new(fetcher.clone()));

        let key = QueryKey::TodosByProject(String::new());
        let snapshot = cache.query(&key).await;
        assert!(snapshot.data.is_none());
        assert!(!snapshot.loading);
        assert!(snapshot.error.is_none());
        assert_eq!(fetcher.call_count(), 0);
    }

    #[tokio::test]
    async fn fresh_value_is_served_without_refetch() {
        let fetcher = Arc::new(ScriptedFetcher::new(vec![Ok(CachedValue::Todos(vec![todo(
            "t1", false,
        )]))]));
        let cache = Arc::new(QueryCache::new(fetcher.clone()));

        cache.query(&QueryKey::Todos).await;
        cache.query(&QueryKey::Todos).await;
        assert_eq!(fetcher.call_count(), 1);
    }

    #[tokio::test]
    async fn invalidation_refetches_subscribed_keys() {
        let fetcher = Arc::new(ScriptedFetcher::new(vec![
            Ok(CachedValue::Todos(vec![todo("t1", false)])),
            Ok(CachedValue::Todos(vec![todo("t1", true)])),
        ]));
        let cache = Arc::new(QueryCache::new(fetcher.clone()));
        let _sub = cache.subscribe(QueryKey::Todos);

        cache.query(&QueryKey::Todos).await;
        cache.invalidate(&[QueryKey::Todos]);
        wait_for(|| fetcher.call_count() == 2).await;
        wait_for(|| !cache.snapshot(&QueryKey::Todos).stale).await;

        let snapshot = cache.snapshot(&QueryKey::Todos);
        assert!(snapshot.data.unwrap().into_todos()[0].completed);
    }

    #[tokio::test]
    async fn unsubscribed_keys_refetch_lazily() {
        let fetcher = Arc::new(ScriptedFetcher::new(vec![
            Ok(CachedValue::Todos(vec![todo("t1", false)])),
            Ok(CachedValue::Todos(vec![todo("t1", true)])),
        ]));
        let cache = Arc::new(QueryCache::new(fetcher.clone()));

        cache.query(&QueryKey::Todos).await;
        cache.invalidate(&[QueryKey::Todos]);
        tokio::time::sleep(Duration::from_millis(20)).await;
        // No subscriber: nothing refetched eagerly.
        assert_eq!(fetcher.call_count(), 1);
        assert!(cache.snapshot(&QueryKey::Todos).stale);

        // The stale value is still visible before the next read.
        let stale = cache.snapshot(&QueryKey::Todos).data.unwrap();
        assert!(!stale.into_todos()[0].completed);

        let snapshot = cache.query(&QueryKey::Todos).await;
        assert_eq!(fetcher.call_count(), 2);
        assert!(snapshot.data.unwrap().into_todos()[0].completed);
    }

    #[tokio::test]
    async fn stale_value_remains_visible_during_refetch() {
        let gate = Arc::new(Notify::new());
        let fetcher = Arc::new(
            ScriptedFetcher::new(vec![
                Ok(CachedValue::Todos(vec![todo("t1", false)])),
                Ok(CachedValue::Todos(vec![todo("t1", true)])),
            ])
            .gated(1, gate.clone()),
        );
        let cache = Arc::new(QueryCache::new(fetcher.clone()));
        let _sub = cache.subscribe(QueryKey::Todos);

        cache.query(&QueryKey::Todos).await;
        cache.invalidate(&[QueryKey::Todos]);
        wait_for(|| fetcher.call_count() == 2).await;

        // The refetch is held open; the old value stays visible.
        let snapshot = cache.snapshot(&QueryKey::Todos);
        assert!(snapshot.stale);
        assert!(snapshot.data.is_some(), "stale entry must stay visible");
        assert!(!snapshot.data.unwrap().into_todos()[0].completed);

        gate.notify_one();
        wait_for(|| !cache.snapshot(&QueryKey::Todos).stale).await;
        let snapshot = cache.snapshot(&QueryKey::Todos);
        assert!(snapshot.data.unwrap().into_todos()[0].completed);
    }

    #[tokio::test]
    async fn superseded_fetch_never_commits() {
        let gate = Arc::new(Notify::new());
        let fetcher = Arc::new(
            ScriptedFetcher::new(vec![
                Ok(CachedValue::Todos(vec![todo("old", false)])),
                Ok(CachedValue::Todos(vec![todo("new", false)])),
            ])
            .gated(0, gate.clone()),
        );
        let cache = Arc::new(QueryCache::new(fetcher.clone()));

        let slow = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.refresh(&QueryKey::Todos).await })
        };
        wait_for(|| fetcher.call_count() == 1).await;

        // Invalidation issued after the fetch started supersedes it.
        cache.invalidate(&[QueryKey::Todos]);
        gate.notify_one();
        let superseded = slow.await.unwrap().unwrap();
        assert_eq!(superseded.into_todos()[0].id, "old");

        // The superseded result was not committed.
        assert!(cache.snapshot(&QueryKey::Todos).data.is_none());

        let snapshot = cache.query(&QueryKey::Todos).await;
        assert_eq!(snapshot.data.unwrap().into_todos()[0].id, "new");
    }

    #[tokio::test]
    async fn fetch_error_marks_entry_without_clearing_it() {
        let fetcher = Arc::new(ScriptedFetcher::new(vec![
            Ok(CachedValue::Todos(vec![todo("t1", false)])),
            Err(TransportError::Network("connection refused".into())),
        ]));
        let cache = Arc::new(QueryCache::new(fetcher.clone()));

        cache.query(&QueryKey::Todos).await;
        cache.invalidate(&[QueryKey::Todos]);
        let result = cache.refresh(&QueryKey::Todos).await;
        assert!(result.is_err());

        let snapshot = cache.snapshot(&QueryKey::Todos);
        assert!(snapshot.error.is_some());
        assert!(snapshot.data.is_some(), "errored entry keeps its value");
    }

    #[tokio::test]
    async fn deleting_a_todo_stales_the_project_scoped_list() {
        let fetcher = Arc::new(ScriptedFetcher::new(vec![
            Ok(CachedValue::Todos(vec![todo("t1", false)])),
            Ok(CachedValue::Todos(vec![])),
        ]));
        let cache = Arc::new(QueryCache::new(fetcher.clone()));
        let key = QueryKey::TodosByProject("p1".into());

        cache.query(&key).await;
        // A todo delete invalidates the unscoped keys only; the scoped
        // list is covered rather than named.
        cache.invalidate(&[QueryKey::Todos, QueryKey::Todo("t1".into())]);

        let snapshot = cache.snapshot(&key);
        assert!(snapshot.stale, "scoped list must not keep serving the deleted todo as fresh");

        let snapshot = cache.query(&key).await;
        assert!(snapshot.data.unwrap().into_todos().is_empty());
        assert_eq!(fetcher.call_count(), 2);
    }

    #[tokio::test]
    async fn covered_keys_are_bumped_at_most_once_per_invalidation() {
        let fetcher = Arc::new(ScriptedFetcher::new(vec![Ok(CachedValue::Todos(vec![]))]));
        let cache = Arc::new(QueryCache::new(fetcher));
        let scoped = QueryKey::TodosByProject("p1".into());

        // Named both directly and through coverage by `Todos`.
        cache.invalidate(&[QueryKey::Todos, scoped.clone()]);
        assert_eq!(cache.version(&scoped), 1);
        assert_eq!(cache.version(&QueryKey::Todos), 1);
    }

    #[tokio::test]
    async fn invalidation_bumps_version_exactly_once_per_key() {
        let fetcher = Arc::new(ScriptedFetcher::new(vec![Ok(CachedValue::Todos(vec![]))]));
        let cache = Arc::new(QueryCache::new(fetcher));

        cache.invalidate(&[QueryKey::Todos, QueryKey::Todo("t1".into())]);
        assert_eq!(cache.version(&QueryKey::Todos), 1);
        assert_eq!(cache.version(&QueryKey::Todo("t1".into())), 1);

        cache.invalidate(&[QueryKey::Todos]);
        assert_eq!(cache.version(&QueryKey::Todos), 2);
        assert_eq!(cache.version(&QueryKey::Todo("t1".into())), 1);
    }

    #[tokio::test]
    async fn clear_drops_all_entries() {
        let fetcher = Arc::new(ScriptedFetcher::new(vec![Ok(CachedValue::Todos(vec![todo(
            "t1", false,
        )]))]));
        let cache = Arc::new(QueryCache::new(fetcher));
        cache.query(&QueryKey::Todos).await;
        cache.clear();
        assert!(cache.snapshot(&QueryKey::Todos).data.is_none());
    }
}
