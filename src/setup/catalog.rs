//! Read-only catalogs the wizard is built from.
//!
//! Backend payloads are mapped into these types at the fetch boundary; nothing
//! untyped travels further.

use serde::Serialize;

use crate::api::setup::{AdapterWire, AgentTemplateWire, LlmProviderWire};

/// An LLM provider and the fields it needs before validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LlmProviderDescriptor {
    pub id: String,
    pub name: String,
    pub description: String,
    pub requires_api_key: bool,
    pub requires_base_url: bool,
    pub requires_model: bool,
    pub default_base_url: Option<String>,
    pub default_model: Option<String>,
    pub examples: Vec<String>,
}

impl LlmProviderDescriptor {
    pub(crate) fn from_wire(wire: LlmProviderWire) -> Self {
        Self {
            id: wire.id,
            name: wire.name,
            description: wire.description,
            requires_api_key: wire.requires_api_key,
            requires_base_url: wire.requires_base_url,
            requires_model: wire.requires_model,
            default_base_url: wire.default_base_url.filter(|v| !v.is_empty()),
            default_model: wire.default_model.filter(|v| !v.is_empty()),
            examples: wire.examples,
        }
    }
}

/// Oversight level of a template; higher means more oversight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct StewardshipTier(u8);

impl StewardshipTier {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub fn new(value: i64) -> Option<Self> {
        u8::try_from(value)
            .ok()
            .filter(|v| (Self::MIN..=Self::MAX).contains(v))
            .map(Self)
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

/// A signed agent template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentTemplateDescriptor {
    pub id: String,
    pub name: String,
    pub description: String,
    pub identity: String,
    pub example_use_cases: Vec<String>,
    pub supported_sops: Vec<String>,
    pub stewardship_tier: StewardshipTier,
    pub creator_id: String,
    pub signature: String,
}

impl AgentTemplateDescriptor {
    /// Map a template, rejecting out-of-range stewardship tiers.
    pub(crate) fn try_from_wire(wire: AgentTemplateWire) -> Result<Self, String> {
        let stewardship_tier = StewardshipTier::new(wire.stewardship_tier).ok_or_else(|| {
            format!(
                "template {} has stewardship tier {} outside {}..={}",
                wire.id,
                wire.stewardship_tier,
                StewardshipTier::MIN,
                StewardshipTier::MAX
            )
        })?;

        Ok(Self {
            id: wire.id,
            name: wire.name,
            description: wire.description,
            identity: wire.identity,
            example_use_cases: wire.example_use_cases,
            supported_sops: wire.supported_sops,
            stewardship_tier,
            creator_id: wire.creator_id,
            signature: wire.signature,
        })
    }
}

/// Adapter availability as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdapterDescriptor {
    pub id: String,
    pub name: String,
    pub description: String,
    pub enabled_by_default: bool,
    pub required_env_vars: Vec<String>,
    pub optional_env_vars: Vec<String>,
}

impl AdapterDescriptor {
    pub(crate) fn from_wire(wire: AdapterWire) -> Self {
        Self {
            id: wire.id,
            name: wire.name,
            description: wire.description,
            enabled_by_default: wire.enabled_by_default,
            required_env_vars: wire.required_env_vars,
            optional_env_vars: wire.optional_env_vars,
        }
    }
}

/// Map a template list, dropping (and logging) entries that fail validation.
pub(crate) fn map_templates(wire: Vec<AgentTemplateWire>) -> Vec<AgentTemplateDescriptor> {
    wire.into_iter()
        .filter_map(|template| match AgentTemplateDescriptor::try_from_wire(template) {
            Ok(mapped) => Some(mapped),
            Err(reason) => {
                tracing::warn!("Skipping agent template: {}", reason);
                None
            }
        })
        .collect()
}
