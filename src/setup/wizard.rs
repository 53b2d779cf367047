//! Setup wizard state machine.
//!
//! All state sits behind one async mutex that is never held across a network
//! call. LLM edits bump a revision counter; a validation result only counts if
//! the revision it was started with is still current. Validation and
//! submission each have an in-flight latch outside the mutex so a dropped
//! future releases them.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use secrecy::SecretString;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::api::setup::{SetupCompleteResponse, SetupResource};
use crate::config::ConsoleConfig;
use crate::error::{FormViolation, WizardError};
use crate::setup::adapters::{API_ADAPTER_ID, find_adapter};
use crate::setup::catalog::{AdapterDescriptor, AgentTemplateDescriptor, LlmProviderDescriptor};
use crate::setup::draft::WizardDraft;
use crate::setup::{WizardProgress, WizardStep};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Success,
    Error,
}

/// Short, dismissible message about the last action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

/// Read-only view for rendering.
#[derive(Debug, Clone, Serialize)]
pub struct WizardView {
    pub step: WizardStep,
    pub progress: WizardProgress,
    pub llm_validated: bool,
    pub validating: bool,
    pub submitting: bool,
    pub notice: Option<Notice>,
    pub provider: Option<String>,
    pub template_id: Option<String>,
    pub enabled_adapters: Vec<String>,
}

/// Hand-off to the credential login once setup is done.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginHandoff {
    pub username: String,
}

struct WizardState {
    step: WizardStep,
    draft: WizardDraft,
    providers: Vec<LlmProviderDescriptor>,
    templates: Vec<AgentTemplateDescriptor>,
    backend_adapters: Vec<AdapterDescriptor>,
    catalogs_loaded: bool,
    llm_revision: u64,
    validated_revision: Option<u64>,
    notice: Option<Notice>,
    completed: Option<SetupCompleteResponse>,
}

impl WizardState {
    fn new() -> Self {
        Self {
            step: WizardStep::Welcome,
            draft: WizardDraft::default(),
            providers: Vec::new(),
            templates: Vec::new(),
            backend_adapters: Vec::new(),
            catalogs_loaded: false,
            llm_revision: 0,
            validated_revision: None,
            notice: None,
            completed: None,
        }
    }

    fn llm_validated(&self) -> bool {
        self.validated_revision == Some(self.llm_revision)
    }

    fn touch_llm(&mut self) {
        self.llm_revision += 1;
        self.validated_revision = None;
    }

    fn ensure_editable(&self) -> Result<(), WizardError> {
        if self.completed.is_some() {
            Err(WizardError::AlreadyCompleted)
        } else {
            Ok(())
        }
    }

    /// Record `err` as the current notice and hand it back.
    fn fail(&mut self, err: WizardError) -> WizardError {
        self.notice = Some(Notice::error(err.to_string()));
        err
    }

    fn provider(&self, id: &str) -> Option<&LlmProviderDescriptor> {
        self.providers.iter().find(|p| p.id == id)
    }

    fn advance(&mut self) -> Result<WizardStep, WizardError> {
        let from = self.step;
        let gate: Result<(), WizardError> = match from {
            WizardStep::Complete => Err(WizardError::AlreadyCompleted),
            WizardStep::Adapters => Err(WizardError::InvalidTransition {
                from,
                to: WizardStep::Complete,
            }),
            WizardStep::Llm if !self.llm_validated() => {
                Err(FormViolation::LlmNotValidated.into())
            }
            WizardStep::Users => self.draft.users.check().map_err(Into::into),
            _ => Ok(()),
        };
        if let Err(e) = gate {
            return Err(self.fail(e));
        }

        let Some(to) = from.next() else {
            return Err(self.fail(WizardError::AlreadyCompleted));
        };
        self.step = to;
        self.notice = None;
        tracing::debug!(from = %from, to = %to, "Wizard advanced");
        Ok(to)
    }
}

/// Releases an in-flight latch when dropped.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn claim(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct SetupWizard {
    setup: SetupResource,
    config: Arc<ConsoleConfig>,
    state: Mutex<WizardState>,
    catalogs_requested: AtomicBool,
    validating: AtomicBool,
    submitting: AtomicBool,
}

impl SetupWizard {
    pub fn new(setup: SetupResource, config: Arc<ConsoleConfig>) -> Self {
        Self {
            setup,
            config,
            state: Mutex::new(WizardState::new()),
            catalogs_requested: AtomicBool::new(false),
            validating: AtomicBool::new(false),
            submitting: AtomicBool::new(false),
        }
    }

    /// Fetch the provider and template catalogs once per wizard.
    ///
    /// The first provider is preselected. The adapter listing is optional and
    /// only widens the set of adapters that can be enabled.
    pub async fn load_catalogs(&self) -> Result<(), WizardError> {
        if self
            .catalogs_requested
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(());
        }

        let (providers, templates, adapters) = tokio::join!(
            self.setup.providers(),
            self.setup.templates(),
            self.setup.adapters()
        );

        let mut state = self.state.lock().await;
        let (providers, templates) = match (providers, templates) {
            (Ok(p), Ok(t)) => (p, t),
            (Err(e), _) | (_, Err(e)) => {
                self.catalogs_requested.store(false, Ordering::Release);
                tracing::warn!("Failed to load setup catalogs: {}", e);
                return Err(state.fail(WizardError::Catalog(e)));
            }
        };
        match adapters {
            Ok(adapters) => state.backend_adapters = adapters,
            Err(e) => tracing::debug!("Adapter listing unavailable: {}", e),
        }

        tracing::info!(
            providers = providers.len(),
            templates = templates.len(),
            "Loaded setup catalogs"
        );
        state.providers = providers;
        state.templates = templates;
        state.catalogs_loaded = true;

        if state.draft.llm.provider.is_none()
            && let Some(first) = state.providers.first().cloned()
        {
            apply_provider(&mut state, &first);
        }
        Ok(())
    }

    pub async fn providers(&self) -> Vec<LlmProviderDescriptor> {
        self.state.lock().await.providers.clone()
    }

    pub async fn templates(&self) -> Vec<AgentTemplateDescriptor> {
        self.state.lock().await.templates.clone()
    }

    pub async fn backend_adapters(&self) -> Vec<AdapterDescriptor> {
        self.state.lock().await.backend_adapters.clone()
    }

    pub async fn step(&self) -> WizardStep {
        self.state.lock().await.step
    }

    pub async fn draft(&self) -> WizardDraft {
        self.state.lock().await.draft.clone()
    }

    pub async fn view(&self) -> WizardView {
        let state = self.state.lock().await;
        WizardView {
            step: state.step,
            progress: WizardProgress::at(state.step),
            llm_validated: state.llm_validated(),
            validating: self.validating.load(Ordering::Acquire),
            submitting: self.submitting.load(Ordering::Acquire),
            notice: state.notice.clone(),
            provider: state.draft.llm.provider.clone(),
            template_id: state.draft.template_id.clone(),
            enabled_adapters: state.draft.enabled_adapters.clone(),
        }
    }

    pub async fn dismiss_notice(&self) {
        self.state.lock().await.notice = None;
    }

    pub async fn select_provider(&self, provider_id: &str) -> Result<(), WizardError> {
        let mut state = self.state.lock().await;
        state.ensure_editable()?;
        match state.provider(provider_id).cloned() {
            Some(provider) => {
                apply_provider(&mut state, &provider);
                Ok(())
            }
            None if !state.catalogs_loaded => {
                state.draft.llm.provider = Some(provider_id.to_string());
                state.touch_llm();
                Ok(())
            }
            None => Err(state.fail(WizardError::UnknownProvider(provider_id.to_string()))),
        }
    }

    pub async fn set_api_key(&self, api_key: SecretString) -> Result<(), WizardError> {
        self.edit_llm(|draft| draft.llm.api_key = api_key).await
    }

    pub async fn set_base_url(&self, base_url: &str) -> Result<(), WizardError> {
        self.edit_llm(|draft| draft.llm.base_url = base_url.to_string())
            .await
    }

    pub async fn set_model(&self, model: &str) -> Result<(), WizardError> {
        self.edit_llm(|draft| draft.llm.model = model.to_string()).await
    }

    pub async fn set_backup_enabled(&self, enabled: bool) -> Result<(), WizardError> {
        self.edit(|draft| draft.backup.enabled = enabled).await
    }

    pub async fn set_backup_api_key(&self, api_key: SecretString) -> Result<(), WizardError> {
        self.edit(|draft| draft.backup.api_key = api_key).await
    }

    pub async fn set_backup_base_url(&self, base_url: &str) -> Result<(), WizardError> {
        self.edit(|draft| draft.backup.base_url = base_url.to_string())
            .await
    }

    pub async fn set_backup_model(&self, model: &str) -> Result<(), WizardError> {
        self.edit(|draft| draft.backup.model = model.to_string())
            .await
    }

    pub async fn set_admin_password(&self, password: SecretString) -> Result<(), WizardError> {
        self.edit(|draft| draft.users.admin_password = password).await
    }

    pub async fn set_admin_password_confirm(
        &self,
        password: SecretString,
    ) -> Result<(), WizardError> {
        self.edit(|draft| draft.users.admin_password_confirm = password)
            .await
    }

    pub async fn set_username(&self, username: &str) -> Result<(), WizardError> {
        self.edit(|draft| draft.users.username = username.to_string())
            .await
    }

    pub async fn set_password(&self, password: SecretString) -> Result<(), WizardError> {
        self.edit(|draft| draft.users.password = password).await
    }

    pub async fn set_password_confirm(&self, password: SecretString) -> Result<(), WizardError> {
        self.edit(|draft| draft.users.password_confirm = password)
            .await
    }

    /// Choose a template; `None` falls back to the configured default.
    pub async fn select_template(&self, template_id: Option<&str>) -> Result<(), WizardError> {
        let mut state = self.state.lock().await;
        state.ensure_editable()?;
        if let Some(id) = template_id
            && state.catalogs_loaded
            && !state.templates.iter().any(|t| t.id == id)
        {
            return Err(state.fail(WizardError::UnknownTemplate(id.to_string())));
        }
        state.draft.template_id = template_id.map(str::to_string);
        Ok(())
    }

    pub async fn set_adapter_enabled(
        &self,
        adapter_id: &str,
        enabled: bool,
    ) -> Result<(), WizardError> {
        let mut state = self.state.lock().await;
        state.ensure_editable()?;

        let known = find_adapter(adapter_id).is_some()
            || state.backend_adapters.iter().any(|a| a.id == adapter_id);
        if !known {
            return Err(state.fail(WizardError::UnknownAdapter(adapter_id.to_string())));
        }
        if adapter_id == API_ADAPTER_ID && !enabled {
            return Err(state.fail(WizardError::AdapterRequired(adapter_id.to_string())));
        }

        let adapters = &mut state.draft.enabled_adapters;
        let present = adapters.iter().any(|a| a == adapter_id);
        if enabled && !present {
            adapters.push(adapter_id.to_string());
        } else if !enabled && present {
            adapters.retain(|a| a != adapter_id);
        }
        Ok(())
    }

    pub async fn toggle_adapter(&self, adapter_id: &str) -> Result<bool, WizardError> {
        let enabled = !self
            .state
            .lock()
            .await
            .draft
            .is_adapter_enabled(adapter_id);
        self.set_adapter_enabled(adapter_id, enabled).await?;
        Ok(enabled)
    }

    pub async fn set_adapter_field(
        &self,
        adapter_id: &str,
        key: &str,
        value: &str,
    ) -> Result<(), WizardError> {
        self.edit(|draft| {
            draft
                .adapter_config
                .entry(adapter_id.to_string())
                .or_default()
                .insert(key.to_string(), value.to_string());
        })
        .await
    }

    /// Test the LLM settings against the backend.
    ///
    /// Client-side checks fail without any request. A result that arrives
    /// after the LLM fields were edited is discarded.
    pub async fn validate_llm(&self) -> Result<String, WizardError> {
        let (request, revision, _latch) = {
            let mut state = self.state.lock().await;
            state.ensure_editable()?;

            let Some(latch) = InFlight::claim(&self.validating) else {
                return Err(state.fail(WizardError::InFlight));
            };

            let provider_id = state.draft.llm.provider.clone().unwrap_or_default();
            let descriptor = state.provider(&provider_id).cloned();
            if state.catalogs_loaded && descriptor.is_none() && !provider_id.trim().is_empty() {
                return Err(state.fail(WizardError::UnknownProvider(provider_id)));
            }
            if let Err(violation) = state.draft.check_llm(descriptor.as_ref()) {
                return Err(state.fail(violation.into()));
            }

            state.validated_revision = None;
            (
                state.draft.llm_validation_request(),
                state.llm_revision,
                latch,
            )
        };

        tracing::debug!(provider = %request.provider, "Validating LLM configuration");
        let result = self.setup.validate_llm(&request).await;
        drop(request);

        let mut state = self.state.lock().await;
        if state.llm_revision != revision {
            tracing::debug!("Discarding stale LLM validation result");
            return Err(state.fail(WizardError::Validation(
                "LLM settings changed during validation; test again".to_string(),
            )));
        }

        match result {
            Ok(response) if response.valid => {
                state.validated_revision = Some(revision);
                let message = if response.message.trim().is_empty() {
                    "LLM configuration validated".to_string()
                } else {
                    response.message
                };
                state.notice = Some(Notice::success(message.clone()));
                Ok(message)
            }
            Ok(response) => {
                let message = response
                    .error
                    .filter(|e| !e.trim().is_empty())
                    .or_else(|| Some(response.message).filter(|m| !m.trim().is_empty()))
                    .unwrap_or_else(|| "LLM validation failed".to_string());
                Err(state.fail(WizardError::Validation(message)))
            }
            Err(e) => {
                tracing::warn!("LLM validation request failed: {}", e);
                Err(state.fail(WizardError::Validation(format!(
                    "Failed to validate LLM: {}",
                    e.user_message()
                ))))
            }
        }
    }

    /// Move forward one step through its gate.
    pub async fn advance(&self) -> Result<WizardStep, WizardError> {
        self.state.lock().await.advance()
    }

    /// Move back one step. Nothing entered is lost.
    pub async fn back(&self) -> Result<WizardStep, WizardError> {
        let mut state = self.state.lock().await;
        state.ensure_editable()?;
        if let Some(previous) = state.step.previous() {
            state.step = previous;
            state.notice = None;
        }
        Ok(state.step)
    }

    /// Jump to any earlier step, or to the next one through its gate.
    pub async fn go_to(&self, target: WizardStep) -> Result<WizardStep, WizardError> {
        let mut state = self.state.lock().await;
        state.ensure_editable()?;
        let from = state.step;

        if target == from {
            Ok(from)
        } else if target < from {
            state.step = target;
            state.notice = None;
            Ok(target)
        } else if Some(target) == from.next() {
            state.advance()
        } else {
            Err(state.fail(WizardError::InvalidTransition { from, to: target }))
        }
    }

    /// Send the single completion request from the adapters step.
    ///
    /// On failure the wizard stays on `adapters` with the draft intact.
    pub async fn submit(&self) -> Result<SetupCompleteResponse, WizardError> {
        let Some(_latch) = InFlight::claim(&self.submitting) else {
            return Err(self.state.lock().await.fail(WizardError::InFlight));
        };

        let request = {
            let mut state = self.state.lock().await;
            state.ensure_editable()?;
            if state.step != WizardStep::Adapters {
                let from = state.step;
                return Err(state.fail(WizardError::InvalidTransition {
                    from,
                    to: WizardStep::Complete,
                }));
            }
            if let Err(violation) = state.draft.users.check() {
                return Err(state.fail(violation.into()));
            }
            if !state.llm_validated() {
                return Err(state.fail(FormViolation::LlmNotValidated.into()));
            }
            if let Err(e) = state.draft.check_adapters() {
                return Err(state.fail(e));
            }
            match state
                .draft
                .completion_request(&self.config.default_template, self.config.agent_port)
            {
                Ok(request) => request,
                Err(e) => return Err(state.fail(e)),
            }
        };

        tracing::info!(
            template = %request.template_id,
            adapters = ?request.enabled_adapters,
            "Submitting setup"
        );
        let result = self.setup.complete(&request).await;
        drop(request);

        let mut state = self.state.lock().await;
        match result {
            Ok(response) => {
                tracing::info!(username = %response.username, "Setup completed");
                state.step = WizardStep::Complete;
                state.notice = Some(Notice::success(if response.message.is_empty() {
                    "Setup completed".to_string()
                } else {
                    response.message.clone()
                }));
                state.completed = Some(response.clone());
                Ok(response)
            }
            Err(e) => {
                tracing::warn!("Setup completion failed: {}", e);
                Err(state.fail(WizardError::Submission(format!(
                    "Setup failed: {}",
                    e.user_message()
                ))))
            }
        }
    }

    /// Username to prefill the credential login with, once setup is done.
    pub async fn login_handoff(&self) -> Option<LoginHandoff> {
        let state = self.state.lock().await;
        let completed = state.completed.as_ref()?;
        let username = if completed.username.trim().is_empty() {
            state.draft.users.username.trim().to_string()
        } else {
            completed.username.clone()
        };
        Some(LoginHandoff { username })
    }

    async fn edit(&self, apply: impl FnOnce(&mut WizardDraft)) -> Result<(), WizardError> {
        let mut state = self.state.lock().await;
        state.ensure_editable()?;
        apply(&mut state.draft);
        Ok(())
    }

    async fn edit_llm(&self, apply: impl FnOnce(&mut WizardDraft)) -> Result<(), WizardError> {
        let mut state = self.state.lock().await;
        state.ensure_editable()?;
        apply(&mut state.draft);
        state.touch_llm();
        Ok(())
    }
}

/// Select `provider`, filling empty URL and model fields with its defaults.
fn apply_provider(state: &mut WizardState, provider: &LlmProviderDescriptor) {
    let llm = &mut state.draft.llm;
    llm.provider = Some(provider.id.clone());
    if llm.base_url.trim().is_empty()
        && let Some(default) = &provider.default_base_url
    {
        llm.base_url = default.clone();
    }
    if llm.model.trim().is_empty()
        && let Some(default) = &provider.default_model
    {
        llm.model = default.clone();
    }
    state.touch_llm();
}
