use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::warn;

use super::error::ControlApiError;
use crate::app::App;

pub const CONTROL_KEY_HEADER: &str = "x-control-key";

/// Rejects requests whose `x-control-key` header does not match the
/// configured secret, before any handler runs.
pub async fn require_control_key(State(app): State<App>, req: Request, next: Next) -> Response {
    if provided_key(req.headers())
        .is_some_and(|provided| key_matches(&app.config.control.api_key, provided))
    {
        next.run(req).await
    } else {
        warn!(
            "🔒 Rejected control request to {} {}",
            req.method(),
            req.uri().path()
        );
        ControlApiError::Unauthorized.into_response()
    }
}

pub fn provided_key(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(CONTROL_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
}

/// Constant-time comparison. An empty expected key matches nothing.
#[must_use]
pub fn key_matches(expected: &str, provided: &str) -> bool {
    if expected.is_empty() || expected.len() != provided.len() {
        return false;
    }

    expected
        .bytes()
        .zip(provided.bytes())
        .fold(0u8, |diff, (a, b)| diff | (a ^ b))
        == 0
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn test_key_matches() {
        assert!(key_matches("s3cret", "s3cret"));
        assert!(!key_matches("s3cret", "s3cre7"));
        assert!(!key_matches("s3cret", "s3cret!"));
        assert!(!key_matches("s3cret", ""));
    }

    #[test]
    fn test_empty_configured_key_rejects_everything() {
        assert!(!key_matches("", ""));
        assert!(!key_matches("", "anything"));
    }

    #[test]
    fn test_provided_key_reads_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(provided_key(&headers), None);

        headers.insert(CONTROL_KEY_HEADER, HeaderValue::from_static("abc"));
        assert_eq!(provided_key(&headers), Some("abc"));
    }
}
