// src/relay/cors.rs
use hyper::header::{
    HeaderMap, HeaderName, HeaderValue, InvalidHeaderValue, ACCESS_CONTROL_ALLOW_HEADERS,
    ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
};
use hyper::{Body, Response, StatusCode};

pub const ALLOW_METHODS: &str = "GET, POST, PUT, DELETE, OPTIONS";

/// CORS headers stamped on every relay response, errors included.
#[derive(Debug, Clone)]
pub struct CorsHeaders {
    allow_headers: HeaderValue,
}

impl CorsHeaders {
    /// `user_id_header` and `target_header` are advertised alongside the
    /// standard `Content-Type` and `Authorization`.
    pub fn new(
        user_id_header: &HeaderName,
        target_header: &HeaderName,
    ) -> Result<Self, InvalidHeaderValue> {
        let value = format!(
            "Content-Type, Authorization, {}, {}",
            display_name(user_id_header.as_str()),
            display_name(target_header.as_str())
        );
        Ok(Self {
            allow_headers: HeaderValue::from_str(&value)?,
        })
    }

    pub fn apply(&self, headers: &mut HeaderMap) {
        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
        headers.insert(
            ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOW_METHODS),
        );
        headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, self.allow_headers.clone());
    }

    /// Answer to an `OPTIONS` preflight: 200 with no body.
    pub fn preflight(&self) -> Response<Body> {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::OK;
        self.apply(response.headers_mut());
        response
    }
}

// new-api-user -> New-Api-User, x-target-baseurl -> X-Target-Baseurl
fn display_name(name: &str) -> String {
    name.split('-')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cors() -> CorsHeaders {
        CorsHeaders::new(
            &HeaderName::from_static("new-api-user"),
            &HeaderName::from_static("x-target-baseurl"),
        )
        .unwrap()
    }

    #[test]
    fn test_apply_cors_headers() {
        let mut headers = HeaderMap::new();
        cors().apply(&mut headers);

        assert_eq!(headers.get("access-control-allow-origin").unwrap(), "*");
        assert_eq!(
            headers.get("access-control-allow-methods").unwrap(),
            "GET, POST, PUT, DELETE, OPTIONS"
        );
        assert_eq!(
            headers.get("access-control-allow-headers").unwrap(),
            "Content-Type, Authorization, New-Api-User, X-Target-Baseurl"
        );
    }

    #[tokio::test]
    async fn test_preflight_is_empty_ok() {
        let response = cors().preflight();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(ACCESS_CONTROL_ALLOW_ORIGIN));

        let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
        assert!(body.is_empty());
    }
}
