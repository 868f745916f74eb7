//! Authentication client for the CampusDesk REST backend.
//!
//! The session façade only needs one request: exchange a username and
//! password for a bearer token plus profile fields. `AuthBackend` abstracts
//! that request so the façade can be driven by a stub in tests; the
//! production implementation is `HttpAuthBackend`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// Path of the login endpoint, relative to the configured API base URL
const LOGIN_PATH: &str = "/auth/login";

/// HTTP request timeout in seconds.
/// Login is a single small request; 30s tolerates a cold backend.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Username/password pair submitted to the login endpoint.
#[derive(Clone, Serialize, Deserialize)]
pub struct LoginCredentials {
    pub username: String,
    pub password: String,
}

impl LoginCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for LoginCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// The authentication request consumed by the session façade.
///
/// Implementations resolve with the raw JSON payload of a successful login
/// (`{token, tenantId, userId, role, ...}`). The payload is not validated
/// here; the façade decides whether it describes a usable session.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    async fn authenticate(&self, credentials: &LoginCredentials) -> Result<Value, ApiError>;
}

/// reqwest-backed `AuthBackend`.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpAuthBackend {
    client: Client,
    base_url: String,
}

impl HttpAuthBackend {
    /// Create a client for the given API base URL (e.g. `https://school.example/api`)
    pub fn new(base_url: impl Into<String>) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn login_url(&self) -> String {
        format!("{}{}", self.base_url, LOGIN_PATH)
    }

    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::from_status(status, &body))
    }
}

#[async_trait]
impl AuthBackend for HttpAuthBackend {
    async fn authenticate(&self, credentials: &LoginCredentials) -> Result<Value, ApiError> {
        let url = self.login_url();
        debug!(url = %url, username = %credentials.username, "Sending login request");

        let response = self
            .client
            .post(&url)
            .header(header::ACCEPT, "application/json")
            .json(credentials)
            .send()
            .await?;

        let response = Self::check_response(response).await?;

        response
            .json::<Value>()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse login response: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_url_trims_trailing_slash() {
        let backend = HttpAuthBackend::new("https://school.example/api/").unwrap();
        assert_eq!(backend.login_url(), "https://school.example/api/auth/login");
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let creds = LoginCredentials::new("principal", "hunter2");
        let debug = format!("{:?}", creds);
        assert!(debug.contains("principal"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_credentials_serialize_as_login_body() {
        let creds = LoginCredentials::new("u", "p");
        let json = serde_json::to_value(&creds).unwrap();
        assert_eq!(json, serde_json::json!({"username": "u", "password": "p"}));
    }
}
