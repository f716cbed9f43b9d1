// src/relay/forward.rs
use hyper::body::Bytes;
use hyper::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use hyper::http::request::Parts;
use hyper::Method;

use super::{RelayError, TargetOrigin};
use crate::config::RelayConfig;

/// The request the relay sends upstream. Built fresh for every call.
#[derive(Debug, Clone)]
pub struct ForwardSpec {
    pub method: Method,
    /// Origin + path without the routing prefix + query.
    pub target_url: String,
    /// Allow-listed inbound headers only.
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

/// Routing and header rules shared by every call.
#[derive(Debug, Clone)]
pub struct ForwardRules {
    prefix: String,
    target_header: HeaderName,
    user_id_header: HeaderName,
    forwarded: Vec<HeaderName>,
}

impl ForwardRules {
    pub fn new(config: &RelayConfig) -> Result<Self, hyper::header::InvalidHeaderName> {
        let user_id_header = HeaderName::from_bytes(config.user_id_header.as_bytes())?;
        Ok(Self {
            prefix: config.route_prefix.clone(),
            target_header: HeaderName::from_bytes(config.target_header.as_bytes())?,
            forwarded: vec![AUTHORIZATION, CONTENT_TYPE, user_id_header.clone()],
            user_id_header,
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn target_header(&self) -> &HeaderName {
        &self.target_header
    }

    pub fn user_id_header(&self) -> &HeaderName {
        &self.user_id_header
    }

    /// Inbound headers that survive into the forwarded request.
    pub fn allowed_headers(&self) -> &[HeaderName] {
        &self.forwarded
    }

    /// Path relative to the routing prefix, or `None` when the request is not
    /// addressed to the relay at all.
    pub fn upstream_path<'a>(&self, path: &'a str) -> Option<&'a str> {
        strip_route_prefix(path, &self.prefix)
    }

    pub fn target_origin(&self, headers: &HeaderMap) -> Result<TargetOrigin, RelayError> {
        let raw = headers
            .get(&self.target_header)
            .ok_or(RelayError::MissingTargetOrigin)?
            .to_str()
            .map_err(|e| RelayError::InvalidTargetOrigin(e.to_string()))?;
        TargetOrigin::parse(raw)
    }

    pub fn build(
        &self,
        parts: &Parts,
        origin: &TargetOrigin,
        body: Bytes,
    ) -> Result<ForwardSpec, RelayError> {
        let path = self
            .upstream_path(parts.uri.path())
            .ok_or(RelayError::NotFound)?;

        let mut target_url = format!("{}{}", origin.base, path);
        if let Some(query) = parts.uri.query() {
            target_url.push('?');
            target_url.push_str(query);
        }

        let mut headers = HeaderMap::new();
        for name in self.allowed_headers() {
            if let Some(value) = parts.headers.get(name) {
                headers.insert(name.clone(), value.clone());
            }
        }

        let body = if carries_body(&parts.method) && !body.is_empty() {
            if !headers.contains_key(CONTENT_TYPE) {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            }
            Some(body)
        } else {
            None
        };

        Ok(ForwardSpec {
            method: parts.method.clone(),
            target_url,
            headers,
            body,
        })
    }
}

/// Strip `prefix` from `path` on a segment boundary. An exact match maps to `/`.
pub fn strip_route_prefix<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    let rest = path.strip_prefix(prefix)?;
    if rest.is_empty() {
        Some("/")
    } else if rest.starts_with('/') {
        Some(rest)
    } else {
        None
    }
}

fn carries_body(method: &Method) -> bool {
    *method != Method::GET && *method != Method::HEAD
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::{header::COOKIE, Request};

    fn rules() -> ForwardRules {
        ForwardRules::new(&RelayConfig::default()).unwrap()
    }

    fn parts(method: Method, uri: &str, headers: &[(&str, &str)]) -> Parts {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    fn origin() -> TargetOrigin {
        TargetOrigin::parse("https://api.example.com/").unwrap()
    }

    #[test]
    fn test_strip_route_prefix() {
        assert_eq!(strip_route_prefix("/api/proxy/api/user/self", "/api/proxy"), Some("/api/user/self"));
        assert_eq!(strip_route_prefix("/api/proxy", "/api/proxy"), Some("/"));
        assert_eq!(strip_route_prefix("/api/proxy/", "/api/proxy"), Some("/"));
        assert_eq!(strip_route_prefix("/api/proxyx", "/api/proxy"), None);
        assert_eq!(strip_route_prefix("/health", "/api/proxy"), None);
    }

    #[test]
    fn test_build_preserves_path_and_query() {
        let parts = parts(Method::GET, "/api/proxy/api/log/token?key=sk-1&p=2", &[]);
        let spec = rules().build(&parts, &origin(), Bytes::new()).unwrap();

        assert_eq!(spec.method, Method::GET);
        assert_eq!(spec.target_url, "https://api.example.com/api/log/token?key=sk-1&p=2");
        assert!(spec.body.is_none());
    }

    #[test]
    fn test_bare_prefix_with_query_targets_root() {
        let parts = parts(Method::GET, "/api/proxy?ping=1", &[]);
        let spec = rules().build(&parts, &origin(), Bytes::new()).unwrap();
        assert_eq!(spec.target_url, "https://api.example.com/?ping=1");
    }

    #[test]
    fn test_only_allow_listed_headers_survive() {
        let parts = parts(
            Method::GET,
            "/api/proxy/api/user/self",
            &[
                ("authorization", "Bearer abc"),
                ("new-api-user", "42"),
                ("cookie", "session=1"),
                ("host", "relay.local"),
                ("x-target-baseurl", "https://api.example.com"),
            ],
        );
        let spec = rules().build(&parts, &origin(), Bytes::new()).unwrap();

        assert_eq!(spec.headers[AUTHORIZATION], "Bearer abc");
        assert_eq!(spec.headers["new-api-user"], "42");
        assert!(!spec.headers.contains_key(COOKIE));
        assert!(!spec.headers.contains_key("host"));
        assert!(!spec.headers.contains_key("x-target-baseurl"));
        assert_eq!(spec.headers.len(), 2);
    }

    #[test]
    fn test_body_defaults_content_type_to_json() {
        let parts = parts(Method::POST, "/api/proxy/api/token", &[]);
        let spec = rules()
            .build(&parts, &origin(), Bytes::from_static(br#"{"name":"t"}"#))
            .unwrap();

        assert_eq!(spec.headers[CONTENT_TYPE], "application/json");
        assert_eq!(spec.body.as_deref(), Some(&br#"{"name":"t"}"#[..]));
    }

    #[test]
    fn test_explicit_content_type_is_kept() {
        let parts = parts(
            Method::PUT,
            "/api/proxy/api/token",
            &[("content-type", "application/x-www-form-urlencoded")],
        );
        let spec = rules()
            .build(&parts, &origin(), Bytes::from_static(b"name=t"))
            .unwrap();

        assert_eq!(spec.headers[CONTENT_TYPE], "application/x-www-form-urlencoded");
    }

    #[test]
    fn test_get_body_is_dropped() {
        let parts = parts(Method::GET, "/api/proxy/api/user/self", &[]);
        let spec = rules()
            .build(&parts, &origin(), Bytes::from_static(b"ignored"))
            .unwrap();

        assert!(spec.body.is_none());
        assert!(!spec.headers.contains_key(CONTENT_TYPE));
    }

    #[test]
    fn test_target_origin_header() {
        let rules = rules();
        let mut headers = HeaderMap::new();
        assert!(matches!(
            rules.target_origin(&headers),
            Err(RelayError::MissingTargetOrigin)
        ));

        headers.insert("x-target-baseurl", HeaderValue::from_static("https://api.example.com/"));
        assert_eq!(rules.target_origin(&headers).unwrap().base, "https://api.example.com");
    }
}
