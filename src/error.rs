//! Error types for the console core.

use crate::setup::WizardStep;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Session store error: {0}")]
    Session(#[from] SessionStoreError),

    #[error("Agent selection error: {0}")]
    Selection(#[from] SelectionError),

    #[error("Authentication flow error: {0}")]
    Auth(#[from] AuthFlowError),

    #[error("Setup wizard error: {0}")]
    Wizard(#[from] WizardError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Errors returned by the shared API client.
///
/// `AuthenticationRequired` is kept apart from the other failures: a 401/403
/// proves a backend is listening even though it refused the request.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Authentication required for {path}")]
    AuthenticationRequired { path: String },

    #[error("HTTP {status} from {path}: {message}")]
    Status {
        path: String,
        status: u16,
        message: String,
    },

    #[error("Request to {path} failed: {reason}")]
    Transport { path: String, reason: String },

    #[error("Invalid response from {path}: {reason}")]
    InvalidResponse { path: String, reason: String },

    #[error("HTTP client setup failed: {0}")]
    ClientSetup(String),
}

impl ApiError {
    pub fn is_authentication_required(&self) -> bool {
        matches!(self, Self::AuthenticationRequired { .. })
    }

    /// Short message suitable for a user-facing notice.
    pub fn user_message(&self) -> String {
        match self {
            Self::AuthenticationRequired { .. } => "Authentication failed".to_string(),
            Self::Status { message, .. } if !message.is_empty() => message.clone(),
            Self::Status { status, .. } => format!("Request failed with HTTP {status}"),
            Self::Transport { .. } => "Backend unreachable".to_string(),
            Self::InvalidResponse { .. } => "Unexpected response from backend".to_string(),
            Self::ClientSetup(_) => "HTTP client unavailable".to_string(),
        }
    }
}

/// Session store persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum SessionStoreError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt session data: {0}")]
    Corrupt(String),
}

/// Agent selection errors.
#[derive(Debug, thiserror::Error)]
pub enum SelectionError {
    #[error("Agent {0} is not part of the current topology")]
    UnknownAgent(String),

    #[error("Invalid agent base address: {0}")]
    InvalidAddress(String),

    #[error(transparent)]
    Session(#[from] SessionStoreError),
}

/// Credential and OAuth login errors.
#[derive(Debug, thiserror::Error)]
pub enum AuthFlowError {
    #[error("No agent selected")]
    NoAgentSelected,

    #[error("{action} is not available while {surface}")]
    NotPermitted {
        action: &'static str,
        surface: &'static str,
    },

    #[error("Unsupported OAuth provider: {0}")]
    UnsupportedProvider(String),

    #[error("Login failed: {0}")]
    Login(#[source] ApiError),

    #[error("No pending OAuth login for this callback")]
    NoPendingIntent,

    #[error("OAuth callback does not match the pending login: {0}")]
    CallbackMismatch(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Could not open {url}: {reason}")]
    Navigation { url: String, reason: String },

    #[error(transparent)]
    Session(#[from] SessionStoreError),
}

/// Form invariant that blocked a wizard gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FormViolation {
    #[error("Please select a provider")]
    ProviderMissing,
    #[error("API key is required")]
    ApiKeyRequired,
    #[error("Base URL is required")]
    BaseUrlRequired,
    #[error("Model name is required")]
    ModelRequired,
    #[error("Admin password is required")]
    AdminPasswordMissing,
    #[error("Admin passwords do not match")]
    AdminPasswordMismatch,
    #[error("Username is required")]
    UsernameMissing,
    #[error("Password is required")]
    PasswordMissing,
    #[error("User passwords do not match")]
    PasswordMismatch,
    #[error("Please validate your LLM configuration first")]
    LlmNotValidated,
}

/// Setup wizard errors. Every variant leaves the draft untouched.
#[derive(Debug, thiserror::Error)]
pub enum WizardError {
    #[error("{0}")]
    FormInvariant(#[from] FormViolation),

    #[error("{adapter} requires {field}")]
    AdapterFieldMissing { adapter: String, field: String },

    #[error("Unknown adapter: {0}")]
    UnknownAdapter(String),

    #[error("{0} adapter cannot be disabled")]
    AdapterRequired(String),

    #[error("{adapter} has an invalid {field}: {reason}")]
    InvalidAdapterField {
        adapter: String,
        field: String,
        reason: String,
    },

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("Unknown template: {0}")]
    UnknownTemplate(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Submission(String),

    #[error("Cannot move from {from} to {to}")]
    InvalidTransition { from: WizardStep, to: WizardStep },

    #[error("A request is already in progress")]
    InFlight,

    #[error("Setup is already complete")]
    AlreadyCompleted,

    #[error("Failed to load setup data: {0}")]
    Catalog(#[source] ApiError),
}

pub type Result<T> = std::result::Result<T, Error>;
