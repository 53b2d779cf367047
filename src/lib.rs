//! Client core for the CIRIS console.
//!
//! Detects whether the console is served by a manager fronting many agents or
//! by a single standalone agent, keeps one shared API client pointed at the
//! selected agent, runs credential and OAuth logins, and drives the first-run
//! setup wizard.

pub mod api;
pub mod auth;
pub mod billing;
pub mod config;
pub mod console;
pub mod error;
pub mod logging;
pub mod selection;
pub mod session;
pub mod setup;
pub mod topology;

pub use api::{ApiClient, ClientConfig};
pub use auth::{AuthFlowController, AuthSurface, OAuthReturn};
pub use config::ConsoleConfig;
pub use console::Console;
pub use error::{Error, Result};
pub use selection::AgentSelection;
pub use session::{FileSessionStore, MemorySessionStore, SessionStore};
pub use setup::{SetupWizard, WizardStep};
pub use topology::{AgentDescriptor, DeploymentMode, Detection, TopologyDetector};
