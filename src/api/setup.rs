//! First-run setup routes (`/v1/setup/*`).
//!
//! Every response arrives in the `data` envelope. The completion request is
//! the variant with backup-LLM fields and per-adapter configuration.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::api::ApiClient;
use crate::error::ApiError;
use crate::setup::catalog::{
    AdapterDescriptor, AgentTemplateDescriptor, LlmProviderDescriptor, map_templates,
};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SetupStatus {
    pub is_first_run: bool,
    pub config_exists: bool,
    #[serde(default)]
    pub config_path: Option<String>,
    pub setup_required: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct LlmProviderWire {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub requires_api_key: bool,
    #[serde(default)]
    pub requires_base_url: bool,
    #[serde(default)]
    pub requires_model: bool,
    #[serde(default)]
    pub default_base_url: Option<String>,
    #[serde(default)]
    pub default_model: Option<String>,
    #[serde(default)]
    pub examples: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct AgentTemplateWire {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub identity: String,
    #[serde(default)]
    pub example_use_cases: Vec<String>,
    #[serde(default)]
    pub supported_sops: Vec<String>,
    pub stewardship_tier: i64,
    #[serde(default)]
    pub creator_id: String,
    #[serde(default)]
    pub signature: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct AdapterWire {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub enabled_by_default: bool,
    #[serde(default)]
    pub required_env_vars: Vec<String>,
    #[serde(default)]
    pub optional_env_vars: Vec<String>,
}

/// Credentials sent to `/v1/setup/validate-llm`.
#[derive(Serialize)]
pub struct LlmValidationRequest {
    pub provider: String,
    pub api_key: String,
    pub base_url: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LlmValidationResponse {
    pub valid: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub error: Option<String>,
}

/// Final setup payload. Holds plaintext secrets; never log it.
#[derive(Serialize)]
pub struct SetupCompleteRequest {
    pub llm_provider: String,
    pub llm_api_key: String,
    pub llm_base_url: Option<String>,
    pub llm_model: Option<String>,
    pub backup_llm_api_key: Option<String>,
    pub backup_llm_base_url: Option<String>,
    pub backup_llm_model: Option<String>,
    pub template_id: String,
    pub enabled_adapters: Vec<String>,
    pub adapter_config: BTreeMap<String, BTreeMap<String, String>>,
    pub admin_username: String,
    pub admin_password: String,
    pub system_admin_password: Option<String>,
    pub agent_port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SetupCompleteResponse {
    pub status: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub config_path: String,
    pub username: String,
    #[serde(default)]
    pub next_steps: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SetupConfigView {
    #[serde(default)]
    pub llm_provider: Option<String>,
    #[serde(default)]
    pub llm_base_url: Option<String>,
    #[serde(default)]
    pub llm_model: Option<String>,
    #[serde(default)]
    pub llm_api_key_set: bool,
    #[serde(default)]
    pub template_id: Option<String>,
    #[serde(default)]
    pub enabled_adapters: Vec<String>,
    pub agent_port: u16,
}

/// Typed access to the setup routes over the shared client.
#[derive(Clone)]
pub struct SetupResource {
    api: Arc<ApiClient>,
}

impl SetupResource {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }

    /// Unauthenticated first-run check.
    pub async fn status(&self) -> Result<SetupStatus, ApiError> {
        self.api.get_data("/v1/setup/status").await
    }

    pub async fn providers(&self) -> Result<Vec<LlmProviderDescriptor>, ApiError> {
        let wire: Vec<LlmProviderWire> = self.api.get_data("/v1/setup/providers").await?;
        Ok(wire
            .into_iter()
            .map(LlmProviderDescriptor::from_wire)
            .collect())
    }

    pub async fn validate_llm(
        &self,
        request: &LlmValidationRequest,
    ) -> Result<LlmValidationResponse, ApiError> {
        self.api
            .post::<_, super::Envelope<LlmValidationResponse>>("/v1/setup/validate-llm", request)
            .await
            .map(|envelope| envelope.data)
    }

    pub async fn templates(&self) -> Result<Vec<AgentTemplateDescriptor>, ApiError> {
        let wire: Vec<AgentTemplateWire> = self.api.get_data("/v1/setup/templates").await?;
        Ok(map_templates(wire))
    }

    pub async fn adapters(&self) -> Result<Vec<AdapterDescriptor>, ApiError> {
        let wire: Vec<AdapterWire> = self.api.get_data("/v1/setup/adapters").await?;
        Ok(wire.into_iter().map(AdapterDescriptor::from_wire).collect())
    }

    /// Create the accounts and write the configuration. Not idempotent.
    pub async fn complete(
        &self,
        request: &SetupCompleteRequest,
    ) -> Result<SetupCompleteResponse, ApiError> {
        self.api
            .post::<_, super::Envelope<SetupCompleteResponse>>("/v1/setup/complete", request)
            .await
            .map(|envelope| envelope.data)
    }

    /// Current configuration; requires admin auth once setup is done.
    pub async fn config(&self) -> Result<SetupConfigView, ApiError> {
        self.api.get_data("/v1/setup/config").await
    }

    /// Replace the configuration. The agent must be restarted afterwards.
    pub async fn update_config(
        &self,
        request: &SetupCompleteRequest,
    ) -> Result<SetupCompleteResponse, ApiError> {
        self.api
            .put::<_, super::Envelope<SetupCompleteResponse>>("/v1/setup/config", request)
            .await
            .map(|envelope| envelope.data)
    }
}
