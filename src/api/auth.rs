//! Authentication operations. Both return `{user, token}` and drive
//! session establishment in the client context.

use reqwest::Method;
use std::sync::Arc;

use super::{decode, encode};
use crate::models::{AuthResponse, LoginCredentials, RegisterCredentials};
use crate::transport::{Transport, TransportError};

pub struct AuthApi {
    transport: Arc<dyn Transport>,
}

impl AuthApi {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    pub async fn login(
        &self,
        credentials: &LoginCredentials,
    ) -> Result<AuthResponse, TransportError> {
        let data = self
            .transport
            .send(Method::POST, "/auth/login", Some(encode(credentials)?))
            .await
            .map_err(|err| err.or_fallback("Login failed"))?;
        decode(data)
    }

    pub async fn register(
        &self,
        credentials: &RegisterCredentials,
    ) -> Result<AuthResponse, TransportError> {
        let data = self
            .transport
            .send(Method::POST, "/auth/register", Some(encode(credentials)?))
            .await
            .map_err(|err| err.or_fallback("Registration failed"))?;
        decode(data)
    }
}
