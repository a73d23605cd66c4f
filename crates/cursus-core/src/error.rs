//! Error types for evaluation and for the insight collaborator.
//!
//! `EvaluationError` is raised at the evaluator boundary, before any
//! computation happens. `ProviderError` lives here rather than in
//! `cursus-providers` so the insight service can downcast and classify
//! failures for retry decisions without string matching.

use thiserror::Error;

/// Rejected input to the academic evaluator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvaluationError {
    /// Malformed or empty input (empty grade list, zero total weight,
    /// duplicate keys, non-finite numbers).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A value outside its scale (grade outside 0–20, rate outside 0–100).
    #[error("{field} out of range: {value} not within [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
}

impl EvaluationError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        EvaluationError::InvalidInput(message.into())
    }
}

/// Errors that can occur when talking to a text insight provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The API returned a 429 rate limit response.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Authentication failed (invalid API key).
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The requested model was not found.
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// The API returned an error response.
    #[error("API error (HTTP {status}): {message}")]
    ApiError { status: u16, message: String },

    /// The request timed out after the given number of milliseconds.
    #[error("request timed out after {0}ms")]
    Timeout(u64),

    /// A network error occurred.
    #[error("network error: {0}")]
    NetworkError(String),
}

impl ProviderError {
    /// Returns `true` if this error is permanent and should not be retried.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            ProviderError::AuthenticationFailed(_) | ProviderError::ModelNotFound(_)
        )
    }

    /// Returns the retry-after delay in milliseconds, if applicable.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            ProviderError::RateLimited { retry_after_ms } => Some(*retry_after_ms),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permanent_provider_errors() {
        assert!(ProviderError::AuthenticationFailed("bad key".into()).is_permanent());
        assert!(ProviderError::ModelNotFound("gpt-x".into()).is_permanent());
        assert!(!ProviderError::Timeout(10).is_permanent());
        assert!(!ProviderError::RateLimited { retry_after_ms: 5 }.is_permanent());
    }

    #[test]
    fn retry_hint_only_for_rate_limit() {
        assert_eq!(
            ProviderError::RateLimited {
                retry_after_ms: 2500
            }
            .retry_after_ms(),
            Some(2500)
        );
        assert_eq!(ProviderError::NetworkError("down".into()).retry_after_ms(), None);
    }

    #[test]
    fn out_of_range_message() {
        let err = EvaluationError::OutOfRange {
            field: "grade value",
            value: 21.0,
            min: 0.0,
            max: 20.0,
        };
        assert_eq!(
            err.to_string(),
            "grade value out of range: 21 not within [0, 20]"
        );
    }
}
