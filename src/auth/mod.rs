//! Login flows gated by the detected topology.
//!
//! Credential login goes through an [`IdentityBackend`]. OAuth login records a
//! redirect intent in the session store and leaves the page through a
//! [`Navigator`]; the page that receives the callback consumes that intent with
//! [`AuthFlowController::complete_oauth_return`].

mod identity;
mod navigator;
pub mod oauth;

use std::sync::Arc;

use secrecy::SecretString;
use serde::Serialize;

use crate::api::ApiClient;
use crate::config::ConsoleConfig;
use crate::error::AuthFlowError;
use crate::selection::AgentSelection;
use crate::session::{RedirectIntent, SessionStore};
use crate::topology::{DetectionSource, DetectionState};

pub use self::identity::{ApiIdentityBackend, AuthSession, IdentityBackend, LOGIN_PATH};
pub use self::navigator::{BrowserNavigator, Navigator};

use self::oauth::{CallbackTarget, MANAGER_OAUTH_PROVIDER};

/// Login options exposed for the current topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthSurface {
    NotDetected,
    Detecting,
    /// Manager down or empty. Nothing can be logged into.
    ManagedNoAgents,
    ManagedWithAgents,
    StandaloneNoIdentity,
    StandaloneWithIdentity,
}

impl AuthSurface {
    pub fn from_state(state: &DetectionState) -> Self {
        match state.current() {
            Some(detection) => match detection.source {
                DetectionSource::Manager if !detection.agents.is_empty() => {
                    Self::ManagedWithAgents
                }
                DetectionSource::Manager | DetectionSource::ManagerUnavailable => {
                    Self::ManagedNoAgents
                }
                DetectionSource::StandaloneIdentity => Self::StandaloneWithIdentity,
                DetectionSource::StandalonePlaceholder
                | DetectionSource::StandaloneUnreachable => Self::StandaloneNoIdentity,
            },
            None if state.is_started() => Self::Detecting,
            None => Self::NotDetected,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotDetected => "not_detected",
            Self::Detecting => "detecting",
            Self::ManagedNoAgents => "managed_no_agents",
            Self::ManagedWithAgents => "managed_with_agents",
            Self::StandaloneNoIdentity => "standalone_no_identity",
            Self::StandaloneWithIdentity => "standalone_with_identity",
        }
    }

    pub fn is_resolved(self) -> bool {
        !matches!(self, Self::NotDetected | Self::Detecting)
    }

    pub fn permits_credential_login(self) -> bool {
        matches!(
            self,
            Self::StandaloneNoIdentity | Self::StandaloneWithIdentity
        )
    }

    pub fn permits_oauth_login(self) -> bool {
        matches!(
            self,
            Self::ManagedWithAgents | Self::StandaloneNoIdentity | Self::StandaloneWithIdentity
        )
    }

    pub fn permits_manager_login(self) -> bool {
        self == Self::ManagedWithAgents
    }
}

/// Result of a completed OAuth round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthReturn {
    pub provider: String,
    pub marketing_opt_in: bool,
    /// `None` for manager-level logins.
    pub agent_id: Option<String>,
}

pub struct AuthFlowController {
    config: Arc<ConsoleConfig>,
    api: Arc<ApiClient>,
    session: Arc<dyn SessionStore>,
    selection: Arc<AgentSelection>,
    detection: Arc<DetectionState>,
    identity: Arc<dyn IdentityBackend>,
    navigator: Arc<dyn Navigator>,
}

impl AuthFlowController {
    pub fn new(
        config: Arc<ConsoleConfig>,
        api: Arc<ApiClient>,
        session: Arc<dyn SessionStore>,
        selection: Arc<AgentSelection>,
        detection: Arc<DetectionState>,
        identity: Arc<dyn IdentityBackend>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self {
            config,
            api,
            session,
            selection,
            detection,
            identity,
            navigator,
        }
    }

    pub fn surface(&self) -> AuthSurface {
        AuthSurface::from_state(&self.detection)
    }

    fn require(
        &self,
        action: &'static str,
        permitted: fn(AuthSurface) -> bool,
    ) -> Result<AuthSurface, AuthFlowError> {
        let surface = self.surface();
        if permitted(surface) {
            Ok(surface)
        } else {
            Err(AuthFlowError::NotPermitted {
                action,
                surface: surface.as_str(),
            })
        }
    }

    /// Username/password login against the selected agent. Never retried.
    pub async fn login_with_credentials(
        &self,
        username: &str,
        password: &SecretString,
    ) -> Result<AuthSession, AuthFlowError> {
        self.require("Credential login", AuthSurface::permits_credential_login)?;

        if let Some(agent) = self.selection.selected().await {
            self.session
                .remember_selection(&agent.id, &agent.display_name)
                .await?;
        }

        let session = match self.identity.login(username, password).await {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(username = %username, "Credential login failed: {}", e);
                return Err(AuthFlowError::Login(e));
            }
        };

        self.api.authenticate(session.access_token.clone());
        tracing::info!(
            username = %username,
            role = session.role.as_deref().unwrap_or("-"),
            "Credential login succeeded"
        );
        Ok(session)
    }

    /// Start an OAuth login against the selected agent.
    ///
    /// Validation failures are returned before anything is written or opened.
    pub async fn begin_oauth_login(
        &self,
        provider: &str,
        marketing_opt_in: bool,
    ) -> Result<(), AuthFlowError> {
        self.require("OAuth login", AuthSurface::permits_oauth_login)?;
        let provider = oauth::validate_provider(provider)?;
        let agent = self
            .selection
            .selected()
            .await
            .ok_or(AuthFlowError::NoAgentSelected)?;
        let route = self
            .selection
            .selected_route()
            .await
            .ok_or(AuthFlowError::NoAgentSelected)?;

        if let Some(stale) = self.session.take_redirect_intent().await? {
            tracing::debug!("Cleared stale {} intent", stale.kind());
        }

        let callback =
            oauth::agent_callback_url(&self.config.origin, &agent.id, provider, marketing_opt_in);
        let login_url = oauth::agent_login_url(route.base(), provider, &callback);

        self.session
            .replace_redirect_intent(RedirectIntent::OauthLogin {
                provider: provider.to_string(),
                marketing_opt_in,
                agent_id: Some(agent.id.clone()),
            })
            .await?;

        tracing::info!(agent = %agent.id, provider = %provider, "Redirecting to OAuth login");
        self.navigate(&login_url)
    }

    /// Start a manager-level OAuth login.
    pub async fn begin_manager_oauth_login(
        &self,
        marketing_opt_in: bool,
    ) -> Result<(), AuthFlowError> {
        self.require("Manager login", AuthSurface::permits_manager_login)?;

        if let Some(stale) = self.session.take_redirect_intent().await? {
            tracing::debug!("Cleared stale {} intent", stale.kind());
        }

        let callback = oauth::manager_callback_url(&self.config.origin, marketing_opt_in);
        let login_url = oauth::manager_login_url(&self.config.origin, &callback);

        self.session
            .replace_redirect_intent(RedirectIntent::OauthLogin {
                provider: MANAGER_OAUTH_PROVIDER.to_string(),
                marketing_opt_in,
                agent_id: None,
            })
            .await?;

        tracing::info!("Redirecting to manager OAuth login");
        self.navigate(&login_url)
    }

    /// Consume the pending intent for a callback address.
    ///
    /// The intent slot is cleared whether or not the callback matches.
    pub async fn complete_oauth_return(
        &self,
        callback_url: &str,
    ) -> Result<OAuthReturn, AuthFlowError> {
        let intent = self.session.take_redirect_intent().await?;
        let parsed = oauth::parse_callback(callback_url)?;

        let (provider, intent_opt_in, intent_agent) = match intent {
            Some(RedirectIntent::OauthLogin {
                provider,
                marketing_opt_in,
                agent_id,
            }) => (provider, marketing_opt_in, agent_id),
            Some(other) => {
                return Err(AuthFlowError::CallbackMismatch(format!(
                    "pending intent is {}",
                    other.kind()
                )));
            }
            None => return Err(AuthFlowError::NoPendingIntent),
        };

        match (&parsed.target, intent_agent.as_deref()) {
            (CallbackTarget::Agent { agent_id, provider: cb_provider }, Some(expected))
                if agent_id == expected && *cb_provider == provider => {}
            (CallbackTarget::Manager, None) => {}
            (target, expected) => {
                return Err(AuthFlowError::CallbackMismatch(format!(
                    "callback {:?} does not match pending login for {}",
                    target,
                    expected.unwrap_or("the manager")
                )));
            }
        }

        let marketing_opt_in = match parsed.marketing_opt_in {
            Some(value) => {
                if value != intent_opt_in {
                    tracing::warn!("Callback marketing_opt_in differs from the recorded intent");
                }
                value
            }
            None => intent_opt_in,
        };

        tracing::info!(provider = %provider, "OAuth callback accepted");
        Ok(OAuthReturn {
            provider,
            marketing_opt_in,
            agent_id: intent_agent,
        })
    }

    fn navigate(&self, url: &str) -> Result<(), AuthFlowError> {
        self.navigator
            .navigate(url)
            .map_err(|reason| AuthFlowError::Navigation {
                url: url.to_string(),
                reason,
            })
    }
}
