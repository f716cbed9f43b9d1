// src/config/models.rs
use anyhow::{bail, Context, Result};
use hyper::header::HeaderName;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub relay: RelayConfig,
    pub metrics: MetricsConfig,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        self.server.addr()?;
        self.relay.validate()?;

        if self.metrics.enabled {
            if !self.metrics.path.starts_with('/') {
                bail!("metrics.path must start with '/': {}", self.metrics.path);
            }
            if self.metrics.port == self.server.port {
                bail!("metrics.port must differ from server.port ({})", self.server.port);
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl ServerConfig {
    pub fn addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid listen address {}:{}", self.host, self.port))
    }
}

/// What to do with a 3xx answer from upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedirectMode {
    /// Hand the redirect back untouched; the caller re-issues it through the relay.
    #[default]
    Passthrough,
    /// Point `Location` back at the relay under the routing prefix.
    Rewrite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Leading path segment stripped before forwarding.
    pub route_prefix: String,
    /// Header carrying the upstream origin.
    pub target_header: String,
    /// Identity header forwarded next to `authorization` and `content-type`.
    pub user_id_header: String,
    pub timeout_secs: u64,
    pub redirect_mode: RedirectMode,
    /// Empty means any origin may be targeted.
    pub allowed_origins: Vec<String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            route_prefix: "/api/proxy".to_string(),
            target_header: "x-target-baseurl".to_string(),
            user_id_header: "new-api-user".to_string(),
            timeout_secs: 30,
            redirect_mode: RedirectMode::Passthrough,
            allowed_origins: Vec::new(),
        }
    }
}

impl RelayConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.route_prefix.starts_with('/') || self.route_prefix.ends_with('/') {
            bail!(
                "relay.route_prefix must start with '/' and must not end with '/': {:?}",
                self.route_prefix
            );
        }

        if self.timeout_secs == 0 {
            bail!("relay.timeout_secs must be greater than zero");
        }

        for name in [&self.target_header, &self.user_id_header] {
            HeaderName::from_bytes(name.as_bytes())
                .with_context(|| format!("Invalid header name in relay config: {:?}", name))?;
        }

        for origin in &self.allowed_origins {
            let url = Url::parse(origin)
                .with_context(|| format!("Invalid entry in relay.allowed_origins: {}", origin))?;
            if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
                bail!("relay.allowed_origins entries must be http(s) origins: {}", origin);
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
    pub path: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 9090,
            path: "/metrics".to_string(),
        }
    }
}
