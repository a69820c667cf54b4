pub mod api;
pub mod cache;
pub mod cli;
pub mod config;
pub mod models;
pub mod session;
pub mod transport;
pub mod validate;

use std::sync::Arc;
use thiserror::Error;

use crate::api::{Api, MutationOutcome};
use crate::cache::QueryCache;
use crate::config::Config;
use crate::models::{LoginCredentials, RegisterCredentials, User};
use crate::session::SessionStore;
use crate::transport::{HttpTransport, Navigator, NoopNavigator, Transport, TransportError};
use crate::validate::ValidationErrors;

/// A client-facing operation failure.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Input failed local schema constraints; no request was sent.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationErrors),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("failed to persist session: {0}")]
    Session(#[from] std::io::Error),
}

/// The process-wide client state, constructed once at startup and
/// passed to all consumers. Holds the session store, the resource
/// clients, and the query cache; all shared mutable state lives behind
/// these components' defined operations.
pub struct ClientContext {
    pub config: Config,
    pub session: Arc<SessionStore>,
    pub api: Arc<Api>,
    pub cache: Arc<QueryCache>,
}

impl ClientContext {
    pub fn new(config: Config) -> Self {
        Self::with_navigator(config, Arc::new(NoopNavigator))
    }

    /// Construct with a presentation-supplied navigator for the 401
    /// teardown-and-redirect contract.
    pub fn with_navigator(config: Config, navigator: Arc<dyn Navigator>) -> Self {
        let session = Arc::new(SessionStore::new(config.session.clone()));
        let transport = Arc::new(HttpTransport::new(
            config.api.base_url.clone(),
            session.clone(),
            navigator,
        ));
        Self::assemble(config, session, transport)
    }

    /// Construct over an arbitrary transport. Test harnesses use this
    /// to rebuild a fresh context per case.
    pub fn with_transport(
        config: Config,
        session: Arc<SessionStore>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self::assemble(config, session, transport)
    }

    fn assemble(config: Config, session: Arc<SessionStore>, transport: Arc<dyn Transport>) -> Self {
        let api = Arc::new(Api::new(transport));
        let cache = Arc::new(QueryCache::new(api.clone()));
        Self {
            config,
            session,
            api,
            cache,
        }
    }

    /// Apply a confirmed mutation's invalidation set to the cache and
    /// hand back its value.
    pub fn commit<T>(&self, outcome: MutationOutcome<T>) -> T {
        self.cache.invalidate(&outcome.invalidated);
        outcome.value
    }

    /// Validate credentials, authenticate, and establish the session.
    pub async fn login(&self, credentials: LoginCredentials) -> Result<User, ClientError> {
        validate::login(&credentials)?;
        let auth = self.api.auth.login(&credentials).await?;
        self.session.establish(auth.user.clone(), auth.token)?;
        Ok(auth.user)
    }

    /// Validate input, register, and establish the session for the new
    /// account.
    pub async fn register(&self, credentials: RegisterCredentials) -> Result<User, ClientError> {
        validate::register(&credentials)?;
        let auth = self.api.auth.register(&credentials).await?;
        self.session.establish(auth.user.clone(), auth.token)?;
        Ok(auth.user)
    }

    /// Tear down the session and drop all cached data so nothing leaks
    /// into the next identity.
    pub fn logout(&self) {
        self.session.clear();
        self.cache.clear();
    }
}
