//! Shared HTTP client for agent and manager APIs.
//!
//! The client's base address and bearer token live in one [`ClientConfig`]
//! value that is only ever swapped whole. Each request reads the current
//! config once, so a concurrent swap can never produce a request with the base
//! of one agent and the token of another.

pub mod setup;

use std::sync::{Arc, RwLock};
use std::time::Duration;

use reqwest::{Client, Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::logging::redact_sensitive_detail;

/// `{ "data": T, "metadata": {...} }` wrapper used by agent and setup routes.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    pub data: T,
    #[serde(default)]
    pub metadata: Option<ResponseMetadata>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponseMetadata {
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub duration_ms: Option<f64>,
}

/// Base address and credentials for API calls.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub bearer_token: Option<SecretString>,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            bearer_token: None,
        }
    }

    pub fn with_bearer_token(mut self, token: SecretString) -> Self {
        self.bearer_token = Some(token);
        self
    }
}

/// The single API client instance shared by every component.
pub struct ApiClient {
    http: Client,
    config: RwLock<Arc<ClientConfig>>,
}

impl ApiClient {
    pub fn new(config: ClientConfig, timeout: Duration) -> Result<Self, ApiError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::ClientSetup(e.to_string()))?;
        Ok(Self {
            http,
            config: RwLock::new(Arc::new(config)),
        })
    }

    /// Current configuration snapshot.
    pub fn config(&self) -> Arc<ClientConfig> {
        let guard = self
            .config
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&guard)
    }

    pub fn base_url(&self) -> String {
        self.config().base_url.clone()
    }

    pub fn has_bearer_token(&self) -> bool {
        self.config().bearer_token.is_some()
    }

    /// Swap the whole configuration. Only selection, the auth flow and the
    /// standalone probe write here.
    pub(crate) fn replace_config(&self, next: ClientConfig) {
        let mut guard = self
            .config
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        tracing::debug!(
            base_url = %next.base_url,
            authenticated = next.bearer_token.is_some(),
            "API client reconfigured"
        );
        *guard = Arc::new(next);
    }

    /// Point the client at `base_url`, keeping the token only when the base
    /// does not change (tokens are issued per agent).
    pub(crate) fn retarget(&self, base_url: &str) {
        let current = self.config();
        let base_url = base_url.trim_end_matches('/');
        if current.base_url == base_url {
            return;
        }
        self.replace_config(ClientConfig::new(base_url));
    }

    /// Install a bearer token for the current base.
    pub(crate) fn authenticate(&self, token: SecretString) {
        let current = self.config();
        self.replace_config(ClientConfig::new(current.base_url.clone()).with_bearer_token(token));
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.request::<(), T>(Method::GET, path, None).await
    }

    /// GET a route that answers with an [`Envelope`] and unwrap it.
    pub async fn get_data<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.get::<Envelope<T>>(path).await.map(|envelope| envelope.data)
    }

    pub async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.request(Method::POST, path, Some(body)).await
    }

    pub async fn put<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.request(Method::PUT, path, Some(body)).await
    }

    /// GET an absolute URL without the client's base or credentials.
    pub async fn get_url<T: DeserializeOwned>(&self, url: &str) -> Result<T, ApiError> {
        let response = self
            .http
            .get(url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| transport_error(url, &e))?;
        decode_response(url, response).await
    }

    async fn request<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, ApiError> {
        let config = self.config();
        let url = format!("{}{}", config.base_url, path);

        let mut builder = self
            .http
            .request(method.clone(), &url)
            .header("Accept", "application/json");
        if let Some(token) = &config.bearer_token {
            builder = builder.bearer_auth(token.expose_secret());
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }

        tracing::debug!(%method, %url, "API request");
        let response = builder
            .send()
            .await
            .map_err(|e| transport_error(path, &e))?;
        decode_response(path, response).await
    }
}

fn transport_error(path: &str, error: &reqwest::Error) -> ApiError {
    ApiError::Transport {
        path: path.to_string(),
        reason: redact_sensitive_detail(&error.to_string()),
    }
}

async fn decode_response<T: DeserializeOwned>(
    path: &str,
    response: reqwest::Response,
) -> Result<T, ApiError> {
    let status = response.status();

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(ApiError::AuthenticationRequired {
            path: path.to_string(),
        });
    }

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ApiError::Status {
            path: path.to_string(),
            status: status.as_u16(),
            message: error_message_from_body(&body),
        });
    }

    response
        .json::<T>()
        .await
        .map_err(|e| ApiError::InvalidResponse {
            path: path.to_string(),
            reason: e.to_string(),
        })
}

/// Pull a human-readable message out of an error body, if it has one.
fn error_message_from_body(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return String::new();
    };

    let candidate = ["detail", "message", "error"]
        .iter()
        .find_map(|key| value.get(*key))
        .or_else(|| value.get("data").and_then(|data| data.get("message")));

    match candidate {
        Some(serde_json::Value::String(message)) => redact_sensitive_detail(message),
        Some(serde_json::Value::Object(obj)) => obj
            .get("message")
            .and_then(|m| m.as_str())
            .map(redact_sensitive_detail)
            .unwrap_or_default(),
        _ => String::new(),
    }
}
