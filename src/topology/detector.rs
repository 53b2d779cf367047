//! Ordered probes that classify the deployment.
//!
//! 1. Ask the manager on the page origin for its agent list.
//! 2. On a managed host, a dead manager ends detection.
//! 3. Otherwise ask the standalone backend who it is; a 401/403 still proves
//!    a backend is there.

use std::sync::Arc;

use crate::api::ApiClient;
use crate::config::ConsoleConfig;
use crate::error::ApiError;
use crate::topology::{
    AgentIdentityWire, AgentSnapshot, DeploymentMode, Detection, DetectionFailure,
    DetectionSource, IDENTITY_PATH, MANAGER_AGENTS_PATH, ManagerAgentList,
    PLACEHOLDER_AGENT_ID, PLACEHOLDER_AGENT_NAME, default_selection, map_identity,
    map_manager_agents, standalone_agent,
};

pub struct TopologyDetector {
    config: Arc<ConsoleConfig>,
    api: Arc<ApiClient>,
}

impl TopologyDetector {
    pub fn new(config: Arc<ConsoleConfig>, api: Arc<ApiClient>) -> Self {
        Self { config, api }
    }

    /// Run the probes once. Never fails; failures are carried in the result.
    pub async fn detect(&self) -> Detection {
        let manager_url = format!("{}{}", self.config.origin, MANAGER_AGENTS_PATH);

        match self.api.get_url::<ManagerAgentList>(&manager_url).await {
            Ok(list) => return self.managed(list),
            Err(e) => {
                tracing::debug!("Manager probe failed: {}", e);
            }
        }

        if self.config.is_managed_host() {
            tracing::warn!(
                host = %self.config.origin_host,
                "Manager unreachable on managed host; not probing for a standalone agent"
            );
            return Detection {
                mode: DeploymentMode::Managed,
                source: DetectionSource::ManagerUnavailable,
                agents: empty_snapshot(),
                selected: None,
                error: Some(DetectionFailure::ManagerUnavailable),
            };
        }

        self.standalone().await
    }

    fn managed(&self, list: ManagerAgentList) -> Detection {
        let agents = map_manager_agents(list);
        let selected = default_selection(&agents);
        tracing::info!(
            agents = agents.len(),
            selected = selected.as_deref().unwrap_or("-"),
            "Detected managed deployment"
        );
        Detection {
            mode: DeploymentMode::Managed,
            source: DetectionSource::Manager,
            agents: agents.into(),
            selected,
            error: None,
        }
    }

    async fn standalone(&self) -> Detection {
        let base = self.config.standalone_base();
        self.api.retarget(base);

        let (agent, source) = match self.api.get_data::<AgentIdentityWire>(IDENTITY_PATH).await {
            Ok(identity) => (
                map_identity(identity, base),
                DetectionSource::StandaloneIdentity,
            ),
            Err(ApiError::AuthenticationRequired { .. }) => {
                tracing::info!("Standalone agent requires auth for identity; using placeholder");
                (
                    standalone_agent(
                        PLACEHOLDER_AGENT_ID.to_string(),
                        PLACEHOLDER_AGENT_NAME.to_string(),
                        base,
                    ),
                    DetectionSource::StandalonePlaceholder,
                )
            }
            Err(e) => {
                tracing::warn!("No standalone agent at {}: {}", base, e);
                return Detection {
                    mode: DeploymentMode::Standalone,
                    source: DetectionSource::StandaloneUnreachable,
                    agents: empty_snapshot(),
                    selected: None,
                    error: Some(DetectionFailure::NoBackendReachable),
                };
            }
        };

        tracing::info!(agent = %agent.id, base = %base, "Detected standalone deployment");
        let selected = Some(agent.id.clone());
        Detection {
            mode: DeploymentMode::Standalone,
            source,
            agents: AgentSnapshot::from(vec![agent]),
            selected,
            error: None,
        }
    }
}

fn empty_snapshot() -> AgentSnapshot {
    AgentSnapshot::from(Vec::new())
}
