//! OAuth redirect and callback addresses.

use url::Url;

use crate::error::AuthFlowError;

/// Provider used for manager-level sign-in.
pub const MANAGER_OAUTH_PROVIDER: &str = "google";

/// Provider ids become path segments; keep them to a slug alphabet.
pub fn validate_provider(provider: &str) -> Result<&str, AuthFlowError> {
    let valid = !provider.is_empty()
        && provider.len() <= 64
        && provider
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_');
    if valid {
        Ok(provider)
    } else {
        Err(AuthFlowError::UnsupportedProvider(provider.to_string()))
    }
}

/// `<origin>/oauth/<agent>/<provider>/callback?marketing_opt_in=<bool>`
pub fn agent_callback_url(
    origin: &str,
    agent_id: &str,
    provider: &str,
    marketing_opt_in: bool,
) -> String {
    format!(
        "{}/oauth/{}/{}/callback?marketing_opt_in={}",
        origin,
        urlencoding::encode(agent_id),
        provider,
        marketing_opt_in
    )
}

/// `<base>/v1/auth/oauth/<provider>/login?redirect_uri=<callback>`
pub fn agent_login_url(route_base: &str, provider: &str, callback: &str) -> String {
    format!(
        "{}/v1/auth/oauth/{}/login?redirect_uri={}",
        route_base.trim_end_matches('/'),
        provider,
        urlencoding::encode(callback)
    )
}

pub fn manager_callback_url(origin: &str, marketing_opt_in: bool) -> String {
    format!("{origin}/manager/callback?marketing_opt_in={marketing_opt_in}")
}

pub fn manager_login_url(origin: &str, callback: &str) -> String {
    format!(
        "{}/manager/v1/oauth/login?redirect_uri={}",
        origin,
        urlencoding::encode(callback)
    )
}

/// What a callback address says about the login it completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackTarget {
    Agent { agent_id: String, provider: String },
    Manager,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCallback {
    pub target: CallbackTarget,
    pub marketing_opt_in: Option<bool>,
}

pub fn parse_callback(raw: &str) -> Result<ParsedCallback, AuthFlowError> {
    let url = Url::parse(raw).map_err(|e| AuthFlowError::InvalidUrl(format!("{raw}: {e}")))?;

    let segments: Vec<String> = url
        .path_segments()
        .map(|segments| {
            segments
                .filter(|s| !s.is_empty())
                .map(|s| {
                    urlencoding::decode(s)
                        .map(|d| d.into_owned())
                        .unwrap_or_else(|_| s.to_string())
                })
                .collect()
        })
        .unwrap_or_default();

    let target = match segments.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        ["oauth", agent_id, provider, "callback"] => CallbackTarget::Agent {
            agent_id: agent_id.to_string(),
            provider: provider.to_string(),
        },
        ["manager", "callback"] => CallbackTarget::Manager,
        _ => {
            return Err(AuthFlowError::CallbackMismatch(format!(
                "{} is not an OAuth callback path",
                url.path()
            )));
        }
    };

    let marketing_opt_in = url
        .query_pairs()
        .find(|(key, _)| key == "marketing_opt_in")
        .and_then(|(_, value)| match value.as_ref() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        });

    Ok(ParsedCallback {
        target,
        marketing_opt_in,
    })
}
