//! Deployment topology model and detection.

mod detector;
mod published;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use self::detector::TopologyDetector;
pub use self::published::DetectionState;

/// Container tag carried by the agent of a standalone deployment.
pub const STANDALONE_CONTAINER_TAG: &str = "standalone";
/// Placeholder used when a standalone backend refuses anonymous identity reads.
pub const PLACEHOLDER_AGENT_ID: &str = "datum";
pub const PLACEHOLDER_AGENT_NAME: &str = "CIRIS Agent";

pub const MANAGER_AGENTS_PATH: &str = "/manager/v1/agents";
pub const IDENTITY_PATH: &str = "/v1/agent/identity";

const FALLBACK_AGENT_PORT: u16 = 8080;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentMode {
    Managed,
    Standalone,
    /// Transient state before detection finishes.
    Unresolved,
}

impl DeploymentMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Managed => "managed",
            Self::Standalone => "standalone",
            Self::Unresolved => "unresolved",
        }
    }
}

/// One reachable agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentDescriptor {
    pub id: String,
    pub display_name: String,
    pub status: String,
    pub health: Option<String>,
    pub api_endpoint: String,
    pub container_tag: String,
    pub created_at: String,
}

impl AgentDescriptor {
    pub fn is_healthy(&self) -> bool {
        self.health.as_deref() == Some("healthy")
    }

    pub fn is_standalone(&self) -> bool {
        self.container_tag == STANDALONE_CONTAINER_TAG
    }
}

/// Immutable agent set; replaced whole on re-detection.
pub type AgentSnapshot = Arc<[AgentDescriptor]>;

/// Which probe produced the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionSource {
    Manager,
    ManagerUnavailable,
    StandaloneIdentity,
    StandalonePlaceholder,
    StandaloneUnreachable,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DetectionFailure {
    #[error("CIRISManager unavailable - no agents can be accessed")]
    ManagerUnavailable,
    #[error("No CIRIS infrastructure available")]
    NoBackendReachable,
}

/// Published outcome of topology detection. The mode is always resolved.
#[derive(Debug, Clone)]
pub struct Detection {
    pub mode: DeploymentMode,
    pub source: DetectionSource,
    pub agents: AgentSnapshot,
    pub selected: Option<String>,
    pub error: Option<DetectionFailure>,
}

impl Detection {
    pub fn selected_agent(&self) -> Option<&AgentDescriptor> {
        let id = self.selected.as_deref()?;
        self.agents.iter().find(|agent| agent.id == id)
    }
}

/// Manager listing payload (`GET /manager/v1/agents`).
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ManagerAgentList {
    #[serde(default)]
    pub agents: Vec<ManagerAgentRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ManagerAgentRecord {
    pub agent_id: String,
    #[serde(default)]
    pub agent_name: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub health: Option<String>,
    #[serde(default)]
    pub api_endpoint: Option<String>,
    /// Sent as either a number or a string by different manager versions.
    #[serde(default)]
    pub api_port: Option<serde_json::Value>,
    #[serde(default)]
    pub container_name: String,
    #[serde(default)]
    pub created_at: String,
}

/// Standalone self-identity payload (`GET /v1/agent/identity`, enveloped).
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct AgentIdentityWire {
    pub agent_id: String,
    pub name: String,
}

fn parse_port(value: Option<&serde_json::Value>) -> Option<u16> {
    match value? {
        serde_json::Value::Number(n) => n.as_u64().and_then(|p| u16::try_from(p).ok()),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub(crate) fn map_manager_agent(record: ManagerAgentRecord) -> AgentDescriptor {
    let api_endpoint = match record.api_endpoint.filter(|e| !e.trim().is_empty()) {
        Some(endpoint) => endpoint,
        None => {
            let port = parse_port(record.api_port.as_ref()).unwrap_or(FALLBACK_AGENT_PORT);
            format!("http://localhost:{port}")
        }
    };

    AgentDescriptor {
        display_name: record
            .agent_name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| record.agent_id.clone()),
        id: record.agent_id,
        status: record.status,
        health: record.health,
        api_endpoint,
        container_tag: record.container_name,
        created_at: record.created_at,
    }
}

/// Map a manager listing, keeping the first record for any repeated id.
pub(crate) fn map_manager_agents(list: ManagerAgentList) -> Vec<AgentDescriptor> {
    let mut agents: Vec<AgentDescriptor> = Vec::with_capacity(list.agents.len());
    for record in list.agents {
        if agents.iter().any(|a| a.id == record.agent_id) {
            tracing::warn!("Manager listed agent {} twice; keeping the first", record.agent_id);
            continue;
        }
        agents.push(map_manager_agent(record));
    }
    agents
}

pub(crate) fn map_identity(identity: AgentIdentityWire, api_endpoint: &str) -> AgentDescriptor {
    standalone_agent(identity.agent_id, identity.name, api_endpoint)
}

pub(crate) fn standalone_agent(id: String, name: String, api_endpoint: &str) -> AgentDescriptor {
    AgentDescriptor {
        id,
        display_name: name,
        status: "running".to_string(),
        health: None,
        api_endpoint: api_endpoint.to_string(),
        container_tag: STANDALONE_CONTAINER_TAG.to_string(),
        created_at: chrono::Utc::now().to_rfc3339(),
    }
}

/// First healthy agent, else the first agent.
pub(crate) fn default_selection(agents: &[AgentDescriptor]) -> Option<String> {
    agents
        .iter()
        .find(|agent| agent.is_healthy())
        .or_else(|| agents.first())
        .map(|agent| agent.id.clone())
}
