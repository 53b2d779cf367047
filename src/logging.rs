//! Tracing setup and log hygiene helpers.

use std::sync::OnceLock;

use regex::Regex;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "ciris_console=info";

/// Install the global tracing subscriber.
///
/// `RUST_LOG` controls filtering; `CIRIS_LOG_FORMAT=json` switches to JSON
/// lines. Calling this more than once is harmless.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let json = std::env::var("CIRIS_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let result = if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init()
    };

    if result.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}

fn redaction_patterns() -> &'static [(Regex, &'static str)] {
    static PATTERNS: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            (r"(?i)\b(bearer)\s+[a-z0-9._\-~+/]+=*", "$1 [REDACTED]"),
            (
                r"(?i)\b(token|api[_\-]?key|secret|password)\b(\s*[:=]\s*)([^,\s]+)",
                "$1$2[REDACTED]",
            ),
            (
                r#"(?i)"(access_token|api_key|llm_api_key|backup_llm_api_key|password|admin_password|system_admin_password)"\s*:\s*"[^"]*""#,
                r#""$1":"[REDACTED]""#,
            ),
            (r"(?i)\bsk-[a-z0-9\-]{10,}\b", "sk-[REDACTED]"),
        ]
        .into_iter()
        .filter_map(|(pattern, replacement)| {
            Regex::new(pattern).ok().map(|re| (re, replacement))
        })
        .collect()
    })
}

/// Mask credentials in free-form error detail before it reaches the logs.
pub fn redact_sensitive_detail(raw: &str) -> String {
    let mut value = raw.to_string();
    for (re, replacement) in redaction_patterns() {
        value = re.replace_all(&value, *replacement).to_string();
    }
    value
}
