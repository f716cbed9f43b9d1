// src/relay/origin.rs
use url::Url;

use super::RelayError;

/// Upstream origin as declared by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetOrigin {
    /// Header value with surrounding whitespace and trailing slashes removed.
    /// Forwarded URLs are built by appending to this string verbatim.
    pub base: String,
    pub url: Url,
}

impl TargetOrigin {
    pub fn parse(raw: &str) -> Result<Self, RelayError> {
        let base = raw.trim().trim_end_matches('/');
        if base.is_empty() {
            return Err(RelayError::MissingTargetOrigin);
        }

        let url = Url::parse(base).map_err(|e| {
            RelayError::InvalidTargetOrigin(format!("{}: {}", base, e))
        })?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(RelayError::InvalidTargetOrigin(format!(
                "{}: unsupported scheme {}",
                base,
                url.scheme()
            )));
        }
        if url.host_str().is_none() {
            return Err(RelayError::InvalidTargetOrigin(format!("{}: missing host", base)));
        }

        Ok(Self {
            base: base.to_string(),
            url,
        })
    }
}

/// Which origins the relay is willing to contact.
#[derive(Debug, Clone, Default)]
pub struct OriginPolicy {
    allowed: Vec<Url>,
}

impl OriginPolicy {
    /// An empty list leaves the relay open to any origin.
    pub fn new(origins: &[String]) -> Result<Self, url::ParseError> {
        let allowed = origins
            .iter()
            .map(|origin| Url::parse(origin.trim()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { allowed })
    }

    pub fn is_open(&self) -> bool {
        self.allowed.is_empty()
    }

    pub fn check(&self, origin: &TargetOrigin) -> Result<(), RelayError> {
        if self.is_open() || self.allowed.iter().any(|allowed| same_origin(allowed, &origin.url)) {
            Ok(())
        } else {
            Err(RelayError::OriginNotAllowed(origin.base.clone()))
        }
    }
}

fn same_origin(a: &Url, b: &Url) -> bool {
    a.scheme() == b.scheme()
        && a.host_str().map(str::to_ascii_lowercase) == b.host_str().map(str::to_ascii_lowercase)
        && a.port_or_known_default() == b.port_or_known_default()
}
