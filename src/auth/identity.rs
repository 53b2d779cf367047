//! Credential exchange against the selected agent.

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::api::ApiClient;
use crate::error::ApiError;

pub const LOGIN_PATH: &str = "/v1/auth/login";

/// Token issued by a successful login. Login responses are not enveloped.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthSession {
    pub access_token: SecretString,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

#[async_trait]
pub trait IdentityBackend: Send + Sync {
    async fn login(&self, username: &str, password: &SecretString)
    -> Result<AuthSession, ApiError>;
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

/// Logs in through the shared client, against whatever agent it targets.
pub struct ApiIdentityBackend {
    api: Arc<ApiClient>,
}

impl ApiIdentityBackend {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl IdentityBackend for ApiIdentityBackend {
    async fn login(
        &self,
        username: &str,
        password: &SecretString,
    ) -> Result<AuthSession, ApiError> {
        let body = LoginRequest {
            username,
            password: password.expose_secret(),
        };
        self.api.post(LOGIN_PATH, &body).await
    }
}
