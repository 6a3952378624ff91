//! MBTA client error types.

/// Errors from the MBTA v3 API client.
///
/// The client owns its own retry budget; any error surfaced here is final
/// and is propagated by the core without further retries.
#[derive(Debug, thiserror::Error)]
pub enum MbtaError {
    /// HTTP request failed (network error, timeout, etc.)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error status code
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// Failed to parse response JSON
    #[error("JSON parse error: {message}")]
    Json { message: String },

    /// Invalid API key
    #[error("unauthorized: check MBTA_API_KEY")]
    Unauthorized,

    /// Rate limited by the API
    #[error("rate limited by MBTA API")]
    RateLimited,

    /// Schedule window end precedes its start
    #[error("schedule window end must not precede start")]
    InvalidWindow,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = MbtaError::Api {
            status: 500,
            message: "Internal Server Error".into(),
        };
        assert_eq!(err.to_string(), "API error 500: Internal Server Error");

        let err = MbtaError::Json {
            message: "expected string".into(),
        };
        assert!(err.to_string().contains("JSON parse error"));

        assert_eq!(
            MbtaError::InvalidWindow.to_string(),
            "schedule window end must not precede start"
        );
    }
}
