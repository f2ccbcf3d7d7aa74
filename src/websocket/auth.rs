use axum::http::HeaderMap;
use serde::Deserialize;

use crate::api::control_key::provided_key;

/// Query parameters of the status stream.
#[derive(Debug, Default, Deserialize)]
pub struct WsStatusQuery {
    /// Control key, for clients that cannot set headers.
    pub key: Option<String>,
    /// Restricts the stream to one job.
    pub job: Option<String>,
}

/// Control key from the query parameter, falling back to the header.
pub fn extract_key<'a>(query: &'a WsStatusQuery, headers: &'a HeaderMap) -> Option<&'a str> {
    query.key.as_deref().or_else(|| provided_key(headers))
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;
    use crate::api::control_key::CONTROL_KEY_HEADER;

    #[test]
    fn test_query_key_wins_over_header() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTROL_KEY_HEADER, HeaderValue::from_static("from-header"));
        let query = WsStatusQuery {
            key: Some("from-query".to_string()),
            job: None,
        };

        assert_eq!(extract_key(&query, &headers), Some("from-query"));
    }

    #[test]
    fn test_header_fallback() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTROL_KEY_HEADER, HeaderValue::from_static("from-header"));

        assert_eq!(
            extract_key(&WsStatusQuery::default(), &headers),
            Some("from-header")
        );
        assert_eq!(extract_key(&WsStatusQuery::default(), &HeaderMap::new()), None);
    }
}
