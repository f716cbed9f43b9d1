// ────────────────────────────────
// src/relay/relay.rs
// Relay component that forwards one caller request to the declared origin
// ────────────────────────────────

use anyhow::{Context, Result};
use hyper::header::{HeaderMap, CONTENT_TYPE};
use hyper::{Body, Method, Request, Response};
use std::sync::Arc;
use tracing::{error, info, info_span, warn, Instrument};
use url::Url;
use uuid::Uuid;

use super::cors::CorsHeaders;
use super::forward::{ForwardRules, ForwardSpec};
use super::origin::OriginPolicy;
use super::redirect::passthrough_location;
use super::translate::{classify, RelayBody, RelayResult};
use super::RelayError;
use crate::config::RelayConfig;
use crate::metrics::{MetricsCollector, Timer};

pub struct Relay {
    config: RelayConfig,
    rules: ForwardRules,
    origins: OriginPolicy,
    cors: CorsHeaders,
    client: reqwest::Client,
    metrics: Option<Arc<MetricsCollector>>,
}

impl Relay {
    pub fn new(config: RelayConfig, metrics: Option<Arc<MetricsCollector>>) -> Result<Self> {
        let rules = ForwardRules::new(&config).context("Invalid relay header configuration")?;
        let origins =
            OriginPolicy::new(&config.allowed_origins).context("Invalid relay.allowed_origins")?;
        let cors = CorsHeaders::new(rules.user_id_header(), rules.target_header())
            .context("Invalid CORS header configuration")?;

        // 3xx answers go back to the caller as-is; nothing is followed here.
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(config.timeout())
            .build()
            .context("Failed to create HTTP client")?;

        if origins.is_open() {
            warn!("relay.allowed_origins is empty, any target origin will be contacted");
        }

        Ok(Self {
            config,
            rules,
            origins,
            cors,
            client,
            metrics,
        })
    }

    /// Map one inbound request to one response. Never fails: every error is
    /// turned into a JSON failure body, and CORS headers are always present.
    pub async fn handle(&self, req: Request<Body>) -> Response<Body> {
        let method = req.method().clone();
        let span = info_span!("relay", request_id = %Uuid::new_v4(), %method);

        async move {
            let timer = Timer::new();
            if let Some(metrics) = &self.metrics {
                metrics.increment_active_requests();
            }

            let mut response = if method == Method::OPTIONS {
                self.cors.preflight()
            } else {
                match self.relay(req).await {
                    Ok(response) => response,
                    Err(err) => {
                        match &err {
                            RelayError::UpstreamTransport(_) | RelayError::UpstreamProtocol(_) => {
                                error!(%err, "relay request failed")
                            }
                            _ => warn!(%err, "relay request rejected"),
                        }
                        if let Some(metrics) = &self.metrics {
                            metrics.record_failure(err.kind());
                        }
                        err.into()
                    }
                }
            };

            self.cors.apply(response.headers_mut());

            if let Some(metrics) = &self.metrics {
                metrics.decrement_active_requests();
                metrics.record_request(method.as_str(), response.status().as_u16(), timer.elapsed());
            }

            response
        }
        .instrument(span)
        .await
    }

    async fn relay(&self, req: Request<Body>) -> Result<Response<Body>, RelayError> {
        let (parts, body) = req.into_parts();

        if self.rules.upstream_path(parts.uri.path()).is_none() {
            return Err(RelayError::NotFound);
        }

        let origin = self.rules.target_origin(&parts.headers)?;
        self.origins.check(&origin)?;

        let body = hyper::body::to_bytes(body)
            .await
            .map_err(|e| RelayError::InvalidRequestBody(e.to_string()))?;

        let spec = self.rules.build(&parts, &origin, body)?;
        info!("{} {} -> {}", parts.method, parts.uri, spec.target_url);

        let head = parts.method == Method::HEAD;
        let result = self.forward(spec, head).await?;
        Ok(result.into_response())
    }

    async fn forward(&self, spec: ForwardSpec, head: bool) -> Result<RelayResult, RelayError> {
        let timer = Timer::new();
        let upstream_url = Url::parse(&spec.target_url)
            .map_err(|e| RelayError::InvalidTargetOrigin(format!("{}: {}", spec.target_url, e)))?;

        let mut request = self
            .client
            .request(spec.method, upstream_url.clone())
            .headers(spec.headers);
        if let Some(body) = spec.body {
            request = request.body(body);
        }

        let response = request.send().await.map_err(|e| RelayError::transport(&e))?;
        let status = response.status();
        info!(status = status.as_u16(), "upstream responded");

        let upstream_headers = response.headers().clone();
        let bytes = response.bytes().await.map_err(|e| RelayError::transport(&e))?;

        if let Some(metrics) = &self.metrics {
            metrics.record_upstream(status.as_u16(), timer.elapsed());
        }

        let mut headers = HeaderMap::new();
        passthrough_location(
            self.config.redirect_mode,
            status,
            &upstream_headers,
            &upstream_url,
            self.rules.prefix(),
            &mut headers,
        );

        let content_type = upstream_headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok());

        // A HEAD answer has no body to negotiate; keep the declared type only.
        let body = if head {
            if let Some(content_type) = upstream_headers.get(CONTENT_TYPE) {
                headers.insert(CONTENT_TYPE, content_type.clone());
            }
            RelayBody::Empty
        } else {
            classify(status, content_type, &bytes)?
        };

        Ok(RelayResult {
            status,
            headers,
            body,
        })
    }
}
