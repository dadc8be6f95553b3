//! Shared-token check for device upgrades.

use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;

/// Whether a device request may connect.
///
/// With no `expected` token every request passes. Otherwise the token must
/// arrive as `Authorization: Bearer <token>` or as the `token` query
/// parameter.
pub fn authorize(expected: Option<&str>, headers: &HeaderMap, query_token: Option<&str>) -> bool {
    let Some(expected) = expected else {
        return true;
    };
    let presented = bearer_token(headers).or(query_token);
    presented.is_some_and(|p| constant_time_eq(p.as_bytes(), expected.as_bytes()))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    scheme.eq_ignore_ascii_case("bearer").then(|| token.trim())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn with_auth(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let _ = headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn no_token_configured_allows_all() {
        assert!(authorize(None, &HeaderMap::new(), None));
    }

    #[test]
    fn bearer_header_accepted() {
        assert!(authorize(Some("s3cret"), &with_auth("Bearer s3cret"), None));
        assert!(authorize(Some("s3cret"), &with_auth("bearer s3cret"), None));
    }

    #[test]
    fn query_token_accepted() {
        assert!(authorize(Some("s3cret"), &HeaderMap::new(), Some("s3cret")));
    }

    #[test]
    fn wrong_or_missing_token_rejected() {
        assert!(!authorize(Some("s3cret"), &HeaderMap::new(), None));
        assert!(!authorize(Some("s3cret"), &with_auth("Bearer nope"), None));
        assert!(!authorize(Some("s3cret"), &with_auth("Basic s3cret"), None));
        assert!(!authorize(Some("s3cret"), &HeaderMap::new(), Some("s3cre")));
    }
}
