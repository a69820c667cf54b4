//! Durable session state: the pairing of authenticated identity and
//! bearer token.
//!
//! A session is either fully present or fully absent, never partial.
//! The in-memory snapshot is a single atomically-swapped value, so a
//! reader can never observe a token without an identity or vice versa.
//! Persistence is two key-value entries (token, serialized identity)
//! under the configured data directory, each carrying the same expiry;
//! malformed or expired persisted state is treated as absent and
//! cleared on load.

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Duration, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::SessionConfig;
use crate::models::User;

/// An established session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub user: User,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// One persisted storage entry with its expiry.
#[derive(Debug, Serialize, Deserialize)]
struct Persisted<T> {
    value: T,
    expires_at: DateTime<Utc>,
}

pub struct SessionStore {
    config: SessionConfig,
    current: ArcSwapOption<Session>,
}

impl SessionStore {
    /// Create the store and seed it from persisted state.
    pub fn new(config: SessionConfig) -> Self {
        let store = Self {
            config,
            current: ArcSwapOption::empty(),
        };
        store.load();
        store
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.config.data_dir.join(key)
    }

    /// Read persisted credential + identity. Fails soft: missing,
    /// malformed, mismatched or expired entries clear both and yield
    /// `None`.
    pub fn load(&self) -> Option<Arc<Session>> {
        let token: Persisted<String> = match self.read_entry(&self.config.token_key) {
            Some(entry) => entry,
            None => {
                self.clear();
                return None;
            }
        };
        let user: Persisted<User> = match self.read_entry(&self.config.user_key) {
            Some(entry) => entry,
            None => {
                self.clear();
                return None;
            }
        };

        let now = Utc::now();
        if token.expires_at <= now || user.expires_at <= now {
            debug!("Persisted session expired, clearing");
            self.clear();
            return None;
        }

        let session = Arc::new(Session {
            user: user.value,
            token: token.value,
            // Both entries are written together; the earlier expiry wins
            // if they ever disagree.
            expires_at: token.expires_at.min(user.expires_at),
        });
        self.current.store(Some(session.clone()));
        Some(session)
    }

    fn read_entry<T: DeserializeOwned>(&self, key: &str) -> Option<Persisted<T>> {
        let path = self.entry_path(key);
        let content = std::fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&content) {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!("Malformed session entry {}: {}", path.display(), err);
                None
            }
        }
    }

    /// Persist identity and token together with the configured TTL.
    ///
    /// On any write failure both entries are removed, so a partial
    /// session is never left behind on disk.
    pub fn establish(&self, user: User, token: String) -> std::io::Result<Session> {
        let expires_at = Utc::now() + Duration::days(self.config.ttl_days);
        let session = Session {
            user,
            token,
            expires_at,
        };

        if let Err(err) = self.write_entries(&session) {
            self.clear();
            return Err(err);
        }

        self.current.store(Some(Arc::new(session.clone())));
        debug!("Session established for {}", session.user.email);
        Ok(session)
    }

    fn write_entries(&self, session: &Session) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.config.data_dir)?;
        let token = serde_json::to_string(&Persisted {
            value: session.token.clone(),
            expires_at: session.expires_at,
        })?;
        let user = serde_json::to_string(&Persisted {
            value: session.user.clone(),
            expires_at: session.expires_at,
        })?;
        std::fs::write(self.entry_path(&self.config.user_key), user)?;
        std::fs::write(self.entry_path(&self.config.token_key), token)?;
        Ok(())
    }

    /// Remove identity and token together. Readers observe the removal
    /// as a single swap of the in-memory snapshot.
    pub fn clear(&self) {
        self.current.store(None);
        for key in [&self.config.token_key, &self.config.user_key] {
            let path = self.entry_path(key);
            if let Err(err) = std::fs::remove_file(&path) {
                if err.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to remove session entry {}: {}", path.display(), err);
                }
            }
        }
    }

    /// Snapshot of the current session, if any.
    pub fn current(&self) -> Option<Arc<Session>> {
        self.current.load_full()
    }

    /// The bearer token for outgoing requests, if a session is held.
    pub fn token(&self) -> Option<String> {
        self.current.load().as_ref().map(|s| s.token.clone())
    }

    /// True iff an identity is currently held in memory.
    pub fn is_authenticated(&self) -> bool {
        self.current.load().is_some()
    }
}
