// src/client/error.rs
use serde_json::Value;

/// Phrases gateways use when an account or key has run out of quota.
const QUOTA_KEYWORDS: &[&str] = &[
    "额度已用尽",
    "额度不足",
    "out of quota",
    "quota exceeded",
    "insufficient quota",
    "quota exhausted",
    "no quota",
    "balance insufficient",
    "insufficient balance",
];

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Missing credentials: {0}")]
    MissingCredentials(&'static str),

    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Relay returned {status}: {message}")]
    Relay { status: u16, message: String },

    #[error("Query rejected: {0}")]
    Rejected(String),

    #[error("Unexpected response body: {0}")]
    UnexpectedBody(String),

    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ClientError {
    /// Whether the gateway refused because the account has no quota left.
    pub fn is_quota_depleted(&self) -> bool {
        match self {
            ClientError::Relay { message, .. } | ClientError::Rejected(message) => {
                is_quota_depleted_message(message)
            }
            _ => false,
        }
    }
}

/// Pull a readable message out of a failure body: a nested
/// `error.message` wins over a top-level `message`, then a bare string.
pub fn api_error_message(body: &Value) -> Option<String> {
    let message = body
        .pointer("/error/message")
        .and_then(Value::as_str)
        .filter(|m| !m.is_empty())
        .or_else(|| body.get("message").and_then(Value::as_str).filter(|m| !m.is_empty()))
        .or_else(|| body.as_str().map(str::trim).filter(|m| !m.is_empty()))?;
    Some(message.to_string())
}

/// True when `message` names a quota keyword or reports a negative
/// `RemainQuota` (`RemainQuota: -12`, `remainquota=-3`, ...).
pub fn is_quota_depleted_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    QUOTA_KEYWORDS.iter().any(|keyword| lower.contains(keyword))
        || remain_quota(message).map_or(false, |quota| quota < 0)
}

fn remain_quota(message: &str) -> Option<i64> {
    const MARKER: &str = "remainquota";

    let lower = message.to_ascii_lowercase();
    let start = lower.find(MARKER)? + MARKER.len();
    let rest = lower[start..].trim_start();
    let rest = rest
        .strip_prefix(':')
        .or_else(|| rest.strip_prefix('='))
        .unwrap_or(rest)
        .trim_start();

    let end = rest
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || (i == 0 && c == '-')))
        .map_or(rest.len(), |(i, _)| i);
    rest[..end].parse().ok()
}
