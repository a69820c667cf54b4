//! HTTP transport to the remote task API.
//!
//! Every request goes through [`Transport::send`], which attaches the
//! session's bearer token, unwraps the `{success, data, message}`
//! envelope, and normalizes failures into [`TransportError`]. A 401
//! received while the application is not on the login surface tears the
//! session down and redirects through the [`Navigator`]; on the login
//! surface it stays an ordinary server error so the redirect cannot
//! loop.

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::session::SessionStore;

/// Transport failure taxonomy.
///
/// `Network` carries no status code so callers can distinguish "server
/// rejected" from "unreachable". Cloneable because in-flight query
/// results are shared between concurrent cache consumers.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TransportError {
    /// No response was received.
    #[error("network error: {0}")]
    Network(String),
    /// The server responded with a non-success status or a rejecting
    /// envelope. `message` may be empty; resource clients substitute a
    /// per-operation fallback.
    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },
    /// The response payload did not match the envelope schema.
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl TransportError {
    /// Replace an empty server message with an operation-specific
    /// fallback.
    pub fn or_fallback(self, fallback: &str) -> Self {
        match self {
            TransportError::Server { status, message } if message.is_empty() => {
                TransportError::Server {
                    status,
                    message: fallback.to_string(),
                }
            }
            other => other,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Server { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Where the presentation layer currently is, as far as auth handling
/// cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    Login,
    Other,
}

/// Presentation-side navigation hooks consumed by the transport.
pub trait Navigator: Send + Sync {
    fn current_surface(&self) -> Surface;
    fn go_to_login(&self);
}

/// Navigator for headless consumers: never on the login surface,
/// redirects are no-ops.
pub struct NoopNavigator;

impl Navigator for NoopNavigator {
    fn current_surface(&self) -> Surface {
        Surface::Other
    }

    fn go_to_login(&self) {}
}

/// The response envelope every endpoint uses.
#[derive(Debug, Deserialize)]
struct Envelope {
    success: bool,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    message: String,
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue a request and return the unwrapped envelope `data`.
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, TransportError>;
}

/// Interpret a received status + payload pair as an envelope result.
///
/// Split out of [`HttpTransport`] so the envelope rules are testable
/// without a socket.
fn interpret_response(status: u16, payload: Value) -> Result<Value, TransportError> {
    if !(200..300).contains(&status) {
        let message = payload
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        return Err(TransportError::Server { status, message });
    }

    let envelope: Envelope = serde_json::from_value(payload)
        .map_err(|err| TransportError::Malformed(err.to_string()))?;
    if !envelope.success {
        return Err(TransportError::Server {
            status,
            message: envelope.message,
        });
    }
    Ok(envelope.data)
}

/// Production transport over reqwest.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    session: Arc<SessionStore>,
    navigator: Arc<dyn Navigator>,
}

impl HttpTransport {
    pub fn new(
        base_url: impl Into<String>,
        session: Arc<SessionStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client: reqwest::Client::new(),
            base_url,
            session,
            navigator,
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, TransportError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("{} {}", method, url);

        let mut request = self.client.request(method, &url);
        if let Some(token) = self.session.token() {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request
            .send()
            .await
            .map_err(|err| TransportError::Network(err.to_string()))?;
        let status = response.status().as_u16();
        let payload: Value = response.json().await.unwrap_or(Value::Null);

        // A 401 invalidates ambient identity, not just this request.
        // The login-surface check prevents a redirect loop while the
        // user is already signing in.
        if status == 401 && self.navigator.current_surface() != Surface::Login {
            warn!("Authentication rejected, tearing down session");
            self.session.clear();
            self.navigator.go_to_login();
        }

        interpret_response(status, payload)
    }
}
