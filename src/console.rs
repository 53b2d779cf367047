//! Console orchestrator: one detection per page, then selection and login.

use std::sync::Arc;

use tokio::sync::watch;

use crate::api::setup::SetupResource;
use crate::api::{ApiClient, ClientConfig};
use crate::auth::{
    ApiIdentityBackend, AuthFlowController, AuthSurface, BrowserNavigator, IdentityBackend,
    Navigator,
};
use crate::config::ConsoleConfig;
use crate::error::{ApiError, Error};
use crate::selection::AgentSelection;
use crate::session::{FileSessionStore, SessionStore};
use crate::setup::SetupWizard;
use crate::topology::{Detection, DetectionState, TopologyDetector};

pub struct Console {
    config: Arc<ConsoleConfig>,
    api: Arc<ApiClient>,
    session: Arc<dyn SessionStore>,
    detector: TopologyDetector,
    selection: Arc<AgentSelection>,
    detection: Arc<DetectionState>,
}

impl Console {
    pub fn new(config: ConsoleConfig, session: Arc<dyn SessionStore>) -> Result<Self, Error> {
        let config = Arc::new(config);
        let api = Arc::new(ApiClient::new(
            ClientConfig::new(config.origin.clone()),
            config.http_timeout,
        )?);
        let detector = TopologyDetector::new(Arc::clone(&config), Arc::clone(&api));
        let selection = Arc::new(AgentSelection::new(
            Arc::clone(&config),
            Arc::clone(&api),
            Arc::clone(&session),
        ));

        Ok(Self {
            config,
            api,
            session,
            detector,
            selection,
            detection: Arc::new(DetectionState::new()),
        })
    }

    /// Build from the environment with a file-backed session store.
    pub fn from_env() -> Result<Self, Error> {
        let config = ConsoleConfig::from_env()?;
        let session: Arc<dyn SessionStore> =
            Arc::new(FileSessionStore::new(config.session_path.clone()));
        Self::new(config, session)
    }

    /// Run detection once and return the published result.
    ///
    /// Concurrent and repeated calls never probe again; they wait for and
    /// return the same detection. A call dropped mid-probe leaves nothing
    /// published, and the next call runs detection afresh.
    pub async fn initialize(&self) -> Arc<Detection> {
        self.detection
            .get_or_publish(|| async move {
                let mut detection = self.detector.detect().await;
                let applied = self
                    .selection
                    .replace_agents(Arc::clone(&detection.agents), detection.selected.as_deref())
                    .await;
                if let Err(e) = applied {
                    tracing::warn!("Failed to apply detected selection: {}", e);
                    detection.selected = None;
                }

                tracing::info!(
                    mode = detection.mode.as_str(),
                    agents = detection.agents.len(),
                    selected = detection.selected.as_deref().unwrap_or_default(),
                    error = detection.error.as_ref().map(|e| e.to_string()).unwrap_or_default(),
                    "Topology detection published"
                );
                detection
            })
            .await
    }

    pub fn detection(&self) -> Option<Arc<Detection>> {
        self.detection.current()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<Detection>>> {
        self.detection.subscribe()
    }

    pub fn surface(&self) -> AuthSurface {
        AuthSurface::from_state(&self.detection)
    }

    pub fn config(&self) -> &Arc<ConsoleConfig> {
        &self.config
    }

    pub fn api(&self) -> &Arc<ApiClient> {
        &self.api
    }

    pub fn session(&self) -> &Arc<dyn SessionStore> {
        &self.session
    }

    pub fn selection(&self) -> &Arc<AgentSelection> {
        &self.selection
    }

    /// Auth flow with explicit collaborators.
    pub fn auth_flow_with(
        &self,
        identity: Arc<dyn IdentityBackend>,
        navigator: Arc<dyn Navigator>,
    ) -> AuthFlowController {
        AuthFlowController::new(
            Arc::clone(&self.config),
            Arc::clone(&self.api),
            Arc::clone(&self.session),
            Arc::clone(&self.selection),
            Arc::clone(&self.detection),
            identity,
            navigator,
        )
    }

    /// Auth flow logging in through the shared client and the system browser.
    pub fn auth_flow(&self) -> AuthFlowController {
        self.auth_flow_with(
            Arc::new(ApiIdentityBackend::new(Arc::clone(&self.api))),
            Arc::new(BrowserNavigator),
        )
    }

    pub fn setup_resource(&self) -> SetupResource {
        SetupResource::new(Arc::clone(&self.api))
    }

    /// Whether the current backend still needs first-run setup.
    pub async fn setup_required(&self) -> Result<bool, ApiError> {
        self.setup_resource()
            .status()
            .await
            .map(|status| status.setup_required)
    }

    pub fn setup_wizard(&self) -> SetupWizard {
        SetupWizard::new(self.setup_resource(), Arc::clone(&self.config))
    }
}
