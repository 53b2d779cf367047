//! Current agent choice and the API base address derived from it.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::api::ApiClient;
use crate::config::ConsoleConfig;
use crate::error::SelectionError;
use crate::session::SessionStore;
use crate::topology::{AgentDescriptor, AgentSnapshot};

/// How requests reach an agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentRoute {
    /// Path-namespaced through the origin: `<origin>/api/<id>`.
    Gateway { base: String },
    /// Straight to the standalone backend.
    Direct { base: String },
}

impl AgentRoute {
    pub fn base(&self) -> &str {
        match self {
            Self::Gateway { base } | Self::Direct { base } => base,
        }
    }
}

/// Selection as remembered in the session store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RememberedAgent {
    pub agent_id: String,
    pub agent_name: Option<String>,
}

#[derive(Default)]
struct SelectionState {
    agents: Option<AgentSnapshot>,
    selected: Option<AgentDescriptor>,
}

/// Owns the selected agent and keeps the shared client pointed at it.
///
/// Writers are serialized so the retarget and the session write of one
/// selection are never interleaved with another.
pub struct AgentSelection {
    config: Arc<ConsoleConfig>,
    api: Arc<ApiClient>,
    session: Arc<dyn SessionStore>,
    state: Mutex<SelectionState>,
}

impl AgentSelection {
    pub fn new(
        config: Arc<ConsoleConfig>,
        api: Arc<ApiClient>,
        session: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            config,
            api,
            session,
            state: Mutex::new(SelectionState::default()),
        }
    }

    /// Route for `agent` given the whole agent set.
    pub fn route_for(&self, agents: &[AgentDescriptor], agent: &AgentDescriptor) -> AgentRoute {
        if agents.len() > 1 || !agent.is_standalone() {
            AgentRoute::Gateway {
                base: self.config.agent_gateway_base(&agent.id),
            }
        } else {
            AgentRoute::Direct {
                base: self.config.standalone_base().to_string(),
            }
        }
    }

    /// Install a freshly detected agent set and apply its default choice.
    ///
    /// When the choice cannot be applied the new set is still installed with
    /// nothing selected.
    pub async fn replace_agents(
        &self,
        agents: AgentSnapshot,
        selected: Option<&str>,
    ) -> Result<Option<AgentDescriptor>, SelectionError> {
        let mut state = self.state.lock().await;
        let choice = selected.and_then(|id| agents.iter().find(|a| a.id == id).cloned());
        state.agents = Some(agents);
        state.selected = None;

        match choice {
            Some(agent) => {
                self.apply(&mut state, agent.clone()).await?;
                Ok(Some(agent))
            }
            None => Ok(None),
        }
    }

    /// Switch to another agent of the current set.
    pub async fn select(&self, agent_id: &str) -> Result<AgentDescriptor, SelectionError> {
        let mut state = self.state.lock().await;
        let agent = state
            .agents
            .as_ref()
            .and_then(|agents| agents.iter().find(|a| a.id == agent_id).cloned())
            .ok_or_else(|| SelectionError::UnknownAgent(agent_id.to_string()))?;

        self.apply(&mut state, agent.clone()).await?;
        Ok(agent)
    }

    pub async fn selected(&self) -> Option<AgentDescriptor> {
        self.state.lock().await.selected.clone()
    }

    /// Route of the selected agent.
    pub async fn selected_route(&self) -> Option<AgentRoute> {
        let state = self.state.lock().await;
        let agents = state.agents.as_ref()?;
        let agent = state.selected.as_ref()?;
        Some(self.route_for(agents, agent))
    }

    pub async fn agents(&self) -> AgentSnapshot {
        self.state
            .lock()
            .await
            .agents
            .clone()
            .unwrap_or_else(|| AgentSnapshot::from(Vec::new()))
    }

    /// Selection persisted by an earlier page, for use before detection runs.
    pub async fn restore_from_session(&self) -> Result<Option<RememberedAgent>, SelectionError> {
        let facts = self.session.load().await?;
        Ok(facts.selected_agent_id.map(|agent_id| RememberedAgent {
            agent_id,
            agent_name: facts.selected_agent_name,
        }))
    }

    async fn apply(
        &self,
        state: &mut SelectionState,
        agent: AgentDescriptor,
    ) -> Result<(), SelectionError> {
        let agents = state.agents.clone().unwrap_or_else(|| AgentSnapshot::from(Vec::new()));
        let route = self.route_for(&agents, &agent);

        url::Url::parse(route.base())
            .map_err(|e| SelectionError::InvalidAddress(format!("{}: {}", route.base(), e)))?;

        // Persist before retargeting so a failed write leaves client and
        // selection untouched.
        self.session
            .remember_selection(&agent.id, &agent.display_name)
            .await?;
        self.api.retarget(route.base());

        tracing::info!(agent = %agent.id, base = %route.base(), "Selected agent");
        state.selected = Some(agent);
        Ok(())
    }
}
