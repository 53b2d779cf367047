//! Configuration for the console core.
//!
//! Values are resolved with priority: env var > `./.env` > `~/.ciris/.env` >
//! default. dotenvy never overwrites variables that are already set.

pub(crate) mod helpers;

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::error::ConfigError;

use self::helpers::{optional_env, parse_base_url, parse_host_list, parse_optional_env};

/// Hostname of the production managed deployment. Managed hosts never run a
/// standalone agent, so a dead manager there is not a reason to probe further.
pub const DEFAULT_MANAGED_HOST: &str = "agents.ciris.ai";

/// Template used when the wizard finishes without an explicit choice.
pub const DEFAULT_TEMPLATE_ID: &str = "general";

pub const DEFAULT_AGENT_PORT: u16 = 8080;

const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Path to the console-specific `.env` file: `~/.ciris/.env`.
pub fn ciris_env_path() -> PathBuf {
    ciris_dir().join(".env")
}

/// Default location of the persisted session facts.
pub fn default_session_path() -> PathBuf {
    ciris_dir().join("console_session.json")
}

fn ciris_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".ciris")
}

/// Load `./.env` and then `~/.ciris/.env` into the process environment.
pub fn load_env_files() {
    if let Err(e) = dotenvy::dotenv()
        && !e.not_found()
    {
        tracing::warn!("Failed to load ./.env: {}", e);
    }

    let path = ciris_env_path();
    if path.exists()
        && let Err(e) = dotenvy::from_path(&path)
    {
        tracing::warn!("Failed to load {}: {}", path.display(), e);
    }
}

/// Resolved console configuration.
#[derive(Debug, Clone)]
pub struct ConsoleConfig {
    /// Origin of the page hosting the console, without trailing slash.
    pub origin: String,
    /// Lowercased host of `origin`.
    pub origin_host: String,
    /// Standalone API base override (`CIRIS_API_BASE_URL`).
    pub api_base_override: Option<String>,
    /// Hosts that only ever run the managed topology.
    pub managed_hosts: Vec<String>,
    pub session_path: PathBuf,
    pub http_timeout: Duration,
    /// Port written into the completed setup configuration.
    pub agent_port: u16,
    pub default_template: String,
}

impl ConsoleConfig {
    /// Build a config for `origin` with every other value at its default.
    pub fn new(origin: &str) -> Result<Self, ConfigError> {
        let (origin, url) = parse_base_url(origin, "CIRIS_ORIGIN")?;
        Ok(Self {
            origin,
            origin_host: host_of(&url),
            api_base_override: None,
            managed_hosts: vec![DEFAULT_MANAGED_HOST.to_string()],
            session_path: default_session_path(),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            agent_port: DEFAULT_AGENT_PORT,
            default_template: DEFAULT_TEMPLATE_ID.to_string(),
        })
    }

    /// Resolve configuration from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        load_env_files();

        let origin = optional_env("CIRIS_ORIGIN")
            .ok_or_else(|| ConfigError::MissingEnvVar("CIRIS_ORIGIN".to_string()))?;
        let mut config = Self::new(&origin)?;

        if let Some(raw) = optional_env("CIRIS_API_BASE_URL") {
            config.api_base_override = Some(parse_base_url(&raw, "CIRIS_API_BASE_URL")?.0);
        }
        if let Some(raw) = optional_env("CIRIS_MANAGED_HOSTS") {
            config.managed_hosts = parse_host_list(&raw);
        }
        if let Some(path) = optional_env("CIRIS_SESSION_PATH") {
            config.session_path = PathBuf::from(path);
        }

        let timeout_secs =
            parse_optional_env("CIRIS_HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT_SECS)?;
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "CIRIS_HTTP_TIMEOUT_SECS".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        config.http_timeout = Duration::from_secs(timeout_secs);
        config.agent_port = parse_optional_env("CIRIS_AGENT_PORT", DEFAULT_AGENT_PORT)?;

        if let Some(template) = optional_env("CIRIS_DEFAULT_TEMPLATE") {
            config.default_template = template;
        }

        tracing::debug!(
            origin = %config.origin,
            override_base = config.api_base_override.as_deref().unwrap_or("-"),
            "Resolved console configuration"
        );

        Ok(config)
    }

    pub fn with_api_base_override(mut self, base: &str) -> Result<Self, ConfigError> {
        self.api_base_override = Some(parse_base_url(base, "CIRIS_API_BASE_URL")?.0);
        Ok(self)
    }

    pub fn with_managed_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.managed_hosts = hosts
            .into_iter()
            .map(|h| h.as_ref().trim().to_ascii_lowercase())
            .filter(|h| !h.is_empty())
            .collect();
        self
    }

    pub fn with_session_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.session_path = path.into();
        self
    }

    /// Base URL for direct (standalone) API access.
    pub fn standalone_base(&self) -> &str {
        self.api_base_override.as_deref().unwrap_or(&self.origin)
    }

    /// Gateway base for one agent in path-namespaced routing.
    pub fn agent_gateway_base(&self, agent_id: &str) -> String {
        format!("{}/api/{}", self.origin, agent_id)
    }

    pub fn is_managed_host(&self) -> bool {
        self.managed_hosts.iter().any(|h| h == &self.origin_host)
    }
}

fn host_of(url: &Url) -> String {
    url.host_str().unwrap_or_default().to_ascii_lowercase()
}
