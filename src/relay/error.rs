// src/relay/error.rs
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Body, Response, StatusCode};
use serde_json::json;
use std::error::Error as _;

/// Every way a relay call can fail before an upstream status is available.
///
/// Upstream 4xx/5xx answers are not represented here; they are reflected to
/// the caller as ordinary responses.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("missing target origin")]
    MissingTargetOrigin,

    #[error("invalid target origin: {0}")]
    InvalidTargetOrigin(String),

    #[error("target origin not allowed")]
    OriginNotAllowed(String),

    #[error("not found")]
    NotFound,

    #[error("invalid request body: {0}")]
    InvalidRequestBody(String),

    #[error("relay failed: {0}")]
    UpstreamTransport(String),

    #[error("invalid upstream JSON")]
    UpstreamProtocol(#[source] serde_json::Error),
}

impl RelayError {
    /// Wrap a client error, keeping the whole cause chain in the message.
    pub fn transport(err: &reqwest::Error) -> Self {
        let mut cause = err.to_string();
        let mut source = err.source();
        while let Some(inner) = source {
            let text = inner.to_string();
            if !cause.contains(&text) {
                cause.push_str(": ");
                cause.push_str(&text);
            }
            source = inner.source();
        }
        RelayError::UpstreamTransport(cause)
    }

    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::MissingTargetOrigin
            | RelayError::InvalidTargetOrigin(_)
            | RelayError::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            RelayError::OriginNotAllowed(_) => StatusCode::FORBIDDEN,
            RelayError::NotFound => StatusCode::NOT_FOUND,
            RelayError::UpstreamTransport(_) | RelayError::UpstreamProtocol(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::MissingTargetOrigin
            | RelayError::InvalidTargetOrigin(_)
            | RelayError::InvalidRequestBody(_) => "configuration",
            RelayError::OriginNotAllowed(_) => "forbidden",
            RelayError::NotFound => "not_found",
            RelayError::UpstreamTransport(_) => "transport",
            RelayError::UpstreamProtocol(_) => "protocol",
        }
    }
}

/// `{"success": false, "message": ...}` with the given status.
pub fn failure_response(status: StatusCode, message: &str) -> Response<Body> {
    let body = json!({ "success": false, "message": message }).to_string();
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

impl From<RelayError> for Response<Body> {
    fn from(err: RelayError) -> Self {
        failure_response(err.status(), &err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response<Body>) -> serde_json::Value {
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_missing_origin_is_bad_request() {
        let response: Response<Body> = RelayError::MissingTargetOrigin.into();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");

        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "missing target origin");
    }

    #[tokio::test]
    async fn test_transport_and_protocol_messages_differ() {
        let transport: Response<Body> =
            RelayError::UpstreamTransport("connection refused".to_string()).into();
        assert_eq!(transport.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(transport).await["message"], "relay failed: connection refused");

        let parse_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let protocol: Response<Body> = RelayError::UpstreamProtocol(parse_err).into();
        assert_eq!(protocol.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(protocol).await["message"], "invalid upstream JSON");
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            RelayError::OriginNotAllowed("https://evil.example".into()).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(RelayError::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            RelayError::InvalidTargetOrigin("nope".into()).kind(),
            "configuration"
        );
    }
}
