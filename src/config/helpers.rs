use url::Url;

use crate::error::ConfigError;

/// Read an env var, treating empty values as unset.
pub(crate) fn optional_env(key: &str) -> Option<String> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => Some(value.trim().to_string()),
        _ => None,
    }
}

pub(crate) fn parse_optional_env<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match optional_env(key) {
        Some(raw) => raw.parse::<T>().map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("'{raw}': {e}"),
        }),
        None => Ok(default),
    }
}

/// Parse an absolute http(s) URL and return it without a trailing slash.
pub(crate) fn parse_base_url(raw: &str, key: &str) -> Result<(String, Url), ConfigError> {
    let url = Url::parse(raw.trim()).map_err(|e| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("'{raw}' is not a URL: {e}"),
    })?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected http or https, got '{}'", url.scheme()),
        });
    }
    if url.host_str().is_none() {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("'{raw}' has no host"),
        });
    }

    let normalized = url.as_str().trim_end_matches('/').to_string();
    Ok((normalized, url))
}

pub(crate) fn parse_host_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|host| host.trim().to_ascii_lowercase())
        .filter(|host| !host.is_empty())
        .collect()
}
