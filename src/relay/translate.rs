// src/relay/translate.rs
//
// Content negotiation for upstream answers. The relay and the quota client
// both go through `classify`, so they agree on how a body is interpreted.

use hyper::body::Bytes;
use hyper::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use hyper::{Body, Response, StatusCode};
use serde_json::Value;

use super::RelayError;

pub const DEFAULT_TEXT_TYPE: &str = "text/plain";

#[derive(Debug, Clone, PartialEq)]
pub enum RelayBody {
    Empty,
    Json(Value),
    Text { body: String, content_type: String },
    /// Undeclared, non-JSON bytes that are not valid UTF-8; relayed untouched.
    Binary { body: Bytes, content_type: String },
}

/// Decide how an upstream body is handed back, in priority order:
/// 204/304 are empty, a JSON content-type must parse, `text/` passes through,
/// and anything else is JSON if it parses, text if it is UTF-8 and raw bytes
/// otherwise.
pub fn classify(
    status: StatusCode,
    content_type: Option<&str>,
    body: &[u8],
) -> Result<RelayBody, RelayError> {
    if status == StatusCode::NO_CONTENT || status == StatusCode::NOT_MODIFIED {
        return Ok(RelayBody::Empty);
    }

    let content_type = content_type.unwrap_or_default();

    if content_type.contains("application/json") {
        return serde_json::from_slice(body)
            .map(RelayBody::Json)
            .map_err(RelayError::UpstreamProtocol);
    }

    if content_type.contains("text/") {
        return Ok(RelayBody::Text {
            body: String::from_utf8_lossy(body).into_owned(),
            content_type: content_type.to_string(),
        });
    }

    if let Ok(value) = serde_json::from_slice(body) {
        return Ok(RelayBody::Json(value));
    }

    let content_type = if content_type.is_empty() {
        DEFAULT_TEXT_TYPE.to_string()
    } else {
        content_type.to_string()
    };
    match std::str::from_utf8(body) {
        Ok(text) => Ok(RelayBody::Text {
            body: text.to_string(),
            content_type,
        }),
        Err(_) => Ok(RelayBody::Binary {
            body: Bytes::copy_from_slice(body),
            content_type,
        }),
    }
}

/// What goes back to the caller: upstream status, a small set of passthrough
/// headers and the classified body.
#[derive(Debug)]
pub struct RelayResult {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: RelayBody,
}

impl RelayResult {
    pub fn into_response(self) -> Response<Body> {
        let (body, content_type) = match self.body {
            RelayBody::Empty => (Body::empty(), None),
            RelayBody::Json(value) => (
                Body::from(value.to_string()),
                Some(HeaderValue::from_static("application/json")),
            ),
            RelayBody::Text { body, content_type } => {
                (Body::from(body), Some(content_type_value(&content_type)))
            }
            RelayBody::Binary { body, content_type } => {
                (Body::from(body), Some(content_type_value(&content_type)))
            }
        };

        let mut response = Response::new(body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        if let Some(content_type) = content_type {
            response.headers_mut().insert(CONTENT_TYPE, content_type);
        }
        response
    }
}

fn content_type_value(content_type: &str) -> HeaderValue {
    HeaderValue::from_str(content_type).unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_TEXT_TYPE))
}
