//! Error types for the upstream HTTP clients.

use thiserror::Error;

/// Longest body excerpt carried in an error or warning line.
const BODY_SNIPPET_MAX: usize = 200;

/// Errors that can occur talking to an upstream server.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Transport failure: network unreachable, timeout, TLS.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with a non-success status (>= 400).
    #[error("HTTP error {0}: {1}")]
    Status(u16, String),

    /// Response body was not parseable as the expected shape.
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// Response parsed but an expected element was absent.
    #[error("missing {0} in response")]
    Missing(&'static str),
}

/// Convenient Result alias for client operations.
pub type ApiResult<T> = Result<T, ApiError>;

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

/// Maps non-success statuses to [`ApiError::Status`] with a body snippet.
///
/// Consumes the response on failure (the body is needed for the snippet);
/// passes it through untouched on success.
pub async fn check_response(response: reqwest::Response) -> ApiResult<reqwest::Response> {
    let status = response.status();
    if status.is_client_error() || status.is_server_error() {
        let body = response.text().await.unwrap_or_default();
        return Err(ApiError::Status(status.as_u16(), snippet(&body)));
    }
    Ok(response)
}

/// Truncates a response body for log lines and error messages.
#[must_use]
pub fn snippet(body: &str) -> String {
    if body.len() <= BODY_SNIPPET_MAX {
        return body.to_string();
    }
    let mut end = BODY_SNIPPET_MAX;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snippet_passes_short_bodies_through() {
        assert_eq!(snippet("not found"), "not found");
    }

    #[test]
    fn snippet_truncates_long_bodies() {
        let body = "x".repeat(500);
        let s = snippet(&body);
        assert_eq!(s.len(), BODY_SNIPPET_MAX + 3);
        assert!(s.ends_with("..."));
    }

    #[test]
    fn snippet_respects_char_boundaries() {
        let body = "é".repeat(300);
        let s = snippet(&body);
        assert!(s.ends_with("..."));
        assert!(s.len() <= BODY_SNIPPET_MAX + 3);
    }

    #[test]
    fn serde_errors_become_decode() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let api: ApiError = err.into();
        assert!(matches!(api, ApiError::Decode(_)));
    }

    #[test]
    fn status_error_displays_code_and_snippet() {
        let err = ApiError::Status(404, "Not Found".into());
        assert_eq!(err.to_string(), "HTTP error 404: Not Found");
    }
}
