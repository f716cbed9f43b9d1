// src/relay/redirect.rs
use hyper::header::{HeaderMap, HeaderValue, LOCATION};
use hyper::StatusCode;
use url::Url;

use crate::config::RedirectMode;

pub fn is_redirect(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::SEE_OTHER
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT
    )
}

/// Resolve `location` against the URL the relay actually called and map it
/// under the routing prefix. Absolute, rooted and relative locations all go
/// through the same join.
pub fn rewrite_location(location: &str, upstream_url: &Url, prefix: &str) -> Option<String> {
    let resolved = upstream_url.join(location).ok()?;
    let mut rewritten = format!("{}{}", prefix, resolved.path());
    if let Some(query) = resolved.query() {
        rewritten.push('?');
        rewritten.push_str(query);
    }
    Some(rewritten)
}

/// Copy `Location` from an upstream redirect into `headers`, rewritten when
/// the relay runs in rewrite mode. Unparseable locations are kept as-is.
pub fn passthrough_location(
    mode: RedirectMode,
    status: StatusCode,
    upstream: &HeaderMap,
    upstream_url: &Url,
    prefix: &str,
    headers: &mut HeaderMap,
) {
    let location = match upstream.get(LOCATION) {
        Some(location) => location,
        None => return,
    };

    if mode == RedirectMode::Rewrite && is_redirect(status) {
        let rewritten = location
            .to_str()
            .ok()
            .and_then(|raw| rewrite_location(raw, upstream_url, prefix))
            .and_then(|value| HeaderValue::from_str(&value).ok());

        match rewritten {
            Some(value) => {
                tracing::debug!(from = ?location, to = ?value, "rewrote redirect location");
                headers.insert(LOCATION, value);
                return;
            }
            None => tracing::warn!(?location, "could not rewrite redirect, keeping original"),
        }
    }

    headers.insert(LOCATION, location.clone());
}
