//! Values entered into the wizard, and the checks run at each gate.

use std::collections::BTreeMap;

use secrecy::{ExposeSecret, SecretString};
use subtle::ConstantTimeEq;

use crate::api::setup::{LlmValidationRequest, SetupCompleteRequest};
use crate::error::{FormViolation, WizardError};
use crate::setup::adapters::{API_ADAPTER_ID, find_adapter};
use crate::setup::catalog::LlmProviderDescriptor;

fn empty_secret() -> SecretString {
    SecretString::from("")
}

fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

fn secret_is_blank(value: &SecretString) -> bool {
    is_blank(value.expose_secret())
}

fn secrets_match(a: &SecretString, b: &SecretString) -> bool {
    a.expose_secret()
        .as_bytes()
        .ct_eq(b.expose_secret().as_bytes())
        .into()
}

fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[derive(Debug, Clone)]
pub struct LlmDraft {
    pub provider: Option<String>,
    pub api_key: SecretString,
    pub base_url: String,
    pub model: String,
}

impl Default for LlmDraft {
    fn default() -> Self {
        Self {
            provider: None,
            api_key: empty_secret(),
            base_url: String::new(),
            model: String::new(),
        }
    }
}

/// Optional fallback LLM, sent only when enabled.
#[derive(Debug, Clone)]
pub struct BackupLlmDraft {
    pub enabled: bool,
    pub api_key: SecretString,
    pub base_url: String,
    pub model: String,
}

impl Default for BackupLlmDraft {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: empty_secret(),
            base_url: String::new(),
            model: String::new(),
        }
    }
}

/// System admin password plus the personal account.
#[derive(Debug, Clone)]
pub struct UsersDraft {
    pub admin_password: SecretString,
    pub admin_password_confirm: SecretString,
    pub username: String,
    pub password: SecretString,
    pub password_confirm: SecretString,
}

impl Default for UsersDraft {
    fn default() -> Self {
        Self {
            admin_password: empty_secret(),
            admin_password_confirm: empty_secret(),
            username: String::new(),
            password: empty_secret(),
            password_confirm: empty_secret(),
        }
    }
}

impl UsersDraft {
    /// Gate from `users` to `template`. Confirmations are only compared here.
    pub fn check(&self) -> Result<(), FormViolation> {
        if secret_is_blank(&self.admin_password) {
            return Err(FormViolation::AdminPasswordMissing);
        }
        if !secrets_match(&self.admin_password, &self.admin_password_confirm) {
            return Err(FormViolation::AdminPasswordMismatch);
        }
        if is_blank(&self.username) {
            return Err(FormViolation::UsernameMissing);
        }
        if secret_is_blank(&self.password) {
            return Err(FormViolation::PasswordMissing);
        }
        if !secrets_match(&self.password, &self.password_confirm) {
            return Err(FormViolation::PasswordMismatch);
        }
        Ok(())
    }
}

/// Everything the user has entered so far. Survives navigation and failures.
#[derive(Debug, Clone)]
pub struct WizardDraft {
    pub llm: LlmDraft,
    pub backup: BackupLlmDraft,
    pub users: UsersDraft,
    pub template_id: Option<String>,
    /// Always contains `api`.
    pub enabled_adapters: Vec<String>,
    pub adapter_config: BTreeMap<String, BTreeMap<String, String>>,
}

impl Default for WizardDraft {
    fn default() -> Self {
        Self {
            llm: LlmDraft::default(),
            backup: BackupLlmDraft::default(),
            users: UsersDraft::default(),
            template_id: None,
            enabled_adapters: vec![API_ADAPTER_ID.to_string()],
            adapter_config: BTreeMap::new(),
        }
    }
}

impl WizardDraft {
    /// Client-side checks run before any validation request.
    ///
    /// Without a descriptor the API key is still required.
    pub fn check_llm(
        &self,
        provider: Option<&LlmProviderDescriptor>,
    ) -> Result<(), FormViolation> {
        if self.llm.provider.as_deref().is_none_or(is_blank) {
            return Err(FormViolation::ProviderMissing);
        }
        let requires_api_key = provider.is_none_or(|p| p.requires_api_key);
        if requires_api_key && secret_is_blank(&self.llm.api_key) {
            return Err(FormViolation::ApiKeyRequired);
        }
        if provider.is_some_and(|p| p.requires_base_url) && is_blank(&self.llm.base_url) {
            return Err(FormViolation::BaseUrlRequired);
        }
        if provider.is_some_and(|p| p.requires_model) && is_blank(&self.llm.model) {
            return Err(FormViolation::ModelRequired);
        }
        Ok(())
    }

    pub fn is_adapter_enabled(&self, id: &str) -> bool {
        self.enabled_adapters.iter().any(|a| a == id)
    }

    /// Required config fields of every enabled built-in adapter.
    pub fn check_adapters(&self) -> Result<(), WizardError> {
        for id in &self.enabled_adapters {
            let Some(spec) = find_adapter(id) else {
                continue;
            };
            let values = self.adapter_config.get(id);
            for field in spec.fields.iter().filter(|f| f.required) {
                let present = values
                    .and_then(|v| v.get(field.key))
                    .is_some_and(|v| !is_blank(v));
                if !present {
                    return Err(WizardError::AdapterFieldMissing {
                        adapter: spec.name.to_string(),
                        field: field.label.to_string(),
                    });
                }
            }
        }
        self.api_port_override()?;
        Ok(())
    }

    fn api_port_override(&self) -> Result<Option<u16>, WizardError> {
        let Some(raw) = self
            .adapter_config
            .get(API_ADAPTER_ID)
            .and_then(|values| values.get("port"))
            .and_then(|v| non_blank(v))
        else {
            return Ok(None);
        };
        match raw.parse::<u16>() {
            Ok(port) if port > 0 => Ok(Some(port)),
            _ => Err(WizardError::InvalidAdapterField {
                adapter: API_ADAPTER_ID.to_string(),
                field: "port".to_string(),
                reason: format!("{raw} is not a port number"),
            }),
        }
    }

    pub(crate) fn llm_validation_request(&self) -> LlmValidationRequest {
        LlmValidationRequest {
            provider: self.llm.provider.clone().unwrap_or_default(),
            api_key: self.llm.api_key.expose_secret().to_string(),
            base_url: non_blank(&self.llm.base_url),
            model: non_blank(&self.llm.model),
        }
    }

    /// Build the completion payload. Callers run the gates first.
    pub(crate) fn completion_request(
        &self,
        default_template: &str,
        default_port: u16,
    ) -> Result<SetupCompleteRequest, WizardError> {
        let backup = self.backup.enabled;
        let backup_key = backup
            .then(|| non_blank(self.backup.api_key.expose_secret()))
            .flatten();
        let backup_base = backup.then(|| non_blank(&self.backup.base_url)).flatten();
        let backup_model = backup.then(|| non_blank(&self.backup.model)).flatten();

        let mut enabled_adapters = self.enabled_adapters.clone();
        if !enabled_adapters.iter().any(|a| a == API_ADAPTER_ID) {
            enabled_adapters.insert(0, API_ADAPTER_ID.to_string());
        }

        let adapter_config = self
            .adapter_config
            .iter()
            .filter(|(id, _)| enabled_adapters.contains(*id))
            .map(|(id, values)| {
                let values: BTreeMap<String, String> = values
                    .iter()
                    .filter_map(|(k, v)| non_blank(v).map(|v| (k.clone(), v)))
                    .collect();
                (id.clone(), values)
            })
            .filter(|(_, values)| !values.is_empty())
            .collect();

        Ok(SetupCompleteRequest {
            llm_provider: self.llm.provider.clone().unwrap_or_default(),
            llm_api_key: self.llm.api_key.expose_secret().to_string(),
            llm_base_url: non_blank(&self.llm.base_url),
            llm_model: non_blank(&self.llm.model),
            backup_llm_api_key: backup_key,
            backup_llm_base_url: backup_base,
            backup_llm_model: backup_model,
            template_id: self
                .template_id
                .as_deref()
                .and_then(non_blank)
                .unwrap_or_else(|| default_template.to_string()),
            enabled_adapters,
            adapter_config,
            admin_username: self.users.username.trim().to_string(),
            admin_password: self.users.password.expose_secret().to_string(),
            system_admin_password: Some(self.users.admin_password.expose_secret().to_string()),
            agent_port: self.api_port_override()?.unwrap_or(default_port),
        })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn provider(requires_api_key: bool, requires_base_url: bool) -> LlmProviderDescriptor {
        LlmProviderDescriptor {
            id: "openai".to_string(),
            name: "OpenAI".to_string(),
            description: String::new(),
            requires_api_key,
            requires_base_url,
            requires_model: false,
            default_base_url: None,
            default_model: None,
            examples: Vec::new(),
        }
    }

    fn filled_users() -> UsersDraft {
        UsersDraft {
            admin_password: SecretString::from("root-pass"),
            admin_password_confirm: SecretString::from("root-pass"),
            username: "ada".to_string(),
            password: SecretString::from("user-pass"),
            password_confirm: SecretString::from("user-pass"),
        }
    }

    #[test]
    fn llm_checks_run_in_order() {
        let mut draft = WizardDraft::default();
        assert_eq!(draft.check_llm(None), Err(FormViolation::ProviderMissing));

        draft.llm.provider = Some("openai".to_string());
        assert_eq!(
            draft.check_llm(Some(&provider(true, false))),
            Err(FormViolation::ApiKeyRequired)
        );
        assert_eq!(draft.check_llm(None), Err(FormViolation::ApiKeyRequired));

        draft.llm.api_key = SecretString::from("sk-test");
        assert_eq!(
            draft.check_llm(Some(&provider(true, true))),
            Err(FormViolation::BaseUrlRequired)
        );
        draft.llm.base_url = "http://localhost:11434".to_string();
        assert_eq!(draft.check_llm(Some(&provider(true, true))), Ok(()));
    }

    #[test]
    fn keyless_provider_skips_api_key() {
        let mut draft = WizardDraft::default();
        draft.llm.provider = Some("local".to_string());
        assert_eq!(draft.check_llm(Some(&provider(false, false))), Ok(()));
    }

    #[test]
    fn user_gate_messages() {
        let mut users = filled_users();
        assert_eq!(users.check(), Ok(()));

        users.admin_password_confirm = SecretString::from("other");
        assert_eq!(users.check(), Err(FormViolation::AdminPasswordMismatch));
        assert_eq!(
            FormViolation::AdminPasswordMismatch.to_string(),
            "Admin passwords do not match"
        );

        users = filled_users();
        users.password_confirm = SecretString::from("user-pas");
        assert_eq!(users.check(), Err(FormViolation::PasswordMismatch));
        assert_eq!(
            FormViolation::PasswordMismatch.to_string(),
            "User passwords do not match"
        );

        users = filled_users();
        users.username = "  ".to_string();
        assert_eq!(users.check(), Err(FormViolation::UsernameMissing));
    }

    #[test]
    fn enabled_discord_needs_its_fields() {
        let mut draft = WizardDraft::default();
        draft.enabled_adapters.push("discord".to_string());
        assert!(matches!(
            draft.check_adapters(),
            Err(WizardError::AdapterFieldMissing { ref adapter, .. }) if adapter == "Discord"
        ));

        let values = draft.adapter_config.entry("discord".to_string()).or_default();
        values.insert("bot_token".to_string(), "tok".to_string());
        values.insert("channel_id".to_string(), "123".to_string());
        assert!(draft.check_adapters().is_ok());
    }

    #[test]
    fn completion_request_applies_defaults_and_backup_rules() {
        let mut draft = WizardDraft::default();
        draft.llm.provider = Some("openai".to_string());
        draft.llm.api_key = SecretString::from("sk-test");
        draft.users = filled_users();
        draft.backup.api_key = SecretString::from("sk-backup");
        draft
            .adapter_config
            .entry("discord".to_string())
            .or_default()
            .insert("bot_token".to_string(), "ignored".to_string());

        let request = draft.completion_request("general", 8080).unwrap();
        assert_eq!(request.template_id, "general");
        assert_eq!(request.enabled_adapters, vec!["api".to_string()]);
        assert!(request.adapter_config.is_empty());
        assert_eq!(request.backup_llm_api_key, None);
        assert_eq!(request.admin_username, "ada");
        assert_eq!(request.admin_password, "user-pass");
        assert_eq!(request.system_admin_password.as_deref(), Some("root-pass"));
        assert_eq!(request.agent_port, 8080);

        draft.backup.enabled = true;
        draft.template_id = Some("scout".to_string());
        draft
            .adapter_config
            .entry("api".to_string())
            .or_default()
            .insert("port".to_string(), "9090".to_string());
        let request = draft.completion_request("general", 8080).unwrap();
        assert_eq!(request.backup_llm_api_key.as_deref(), Some("sk-backup"));
        assert_eq!(request.backup_llm_model, None);
        assert_eq!(request.template_id, "scout");
        assert_eq!(request.agent_port, 9090);
        assert_eq!(request.adapter_config["api"]["port"], "9090");
    }

    #[test]
    fn invalid_api_port_is_rejected() {
        let mut draft = WizardDraft::default();
        draft
            .adapter_config
            .entry("api".to_string())
            .or_default()
            .insert("port".to_string(), "eighty".to_string());
        assert!(matches!(
            draft.check_adapters(),
            Err(WizardError::InvalidAdapterField { .. })
        ));
    }
}
