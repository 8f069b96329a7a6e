use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    /// A name or id the caller asked for is absent from the reference catalog.
    #[error("reference lookup error: {0}")]
    Lookup(String),

    #[error("generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("warehouse error: {0}")]
    Warehouse(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Other(String),
}

/// Failure of a single generation request.
///
/// These never abort a batch. The orchestrator records them against the
/// offending index and resolves that slot to an empty result.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("api error: status={status}, body={body}")]
    Api { status: u16, body: String },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("response contained no usable items")]
    EmptyResponse,

    #[error("unexpected failure: {0}")]
    Unexpected(String),
}

impl GenerationError {
    /// Classify a transport-level failure from the HTTP client.
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_decode() {
            Self::Malformed(err.to_string())
        } else if let Some(status) = err.status() {
            Self::from_status(status.as_u16(), err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }

    /// Classify a non-success HTTP status returned by the model API.
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        match status {
            429 => Self::RateLimited(body),
            408 | 504 => Self::Timeout(format!("status={status}, body={body}")),
            _ => Self::Api { status, body },
        }
    }

    /// Transient faults worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Network(_) | Self::RateLimited(_) => true,
            Self::Api { status, .. } => *status >= 500,
            Self::Malformed(_) | Self::EmptyResponse | Self::Unexpected(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Error, GenerationError};

    #[test]
    fn too_many_requests_is_rate_limited() {
        let err = GenerationError::from_status(429, "slow down");
        assert_eq!(err, GenerationError::RateLimited("slow down".into()));
        assert!(err.is_retryable());
    }

    #[test]
    fn gateway_timeout_is_classified_as_timeout() {
        let err = GenerationError::from_status(504, "");
        assert!(matches!(err, GenerationError::Timeout(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn client_errors_are_not_retryable() {
        let err = GenerationError::from_status(400, "bad request");
        assert_eq!(
            err,
            GenerationError::Api {
                status: 400,
                body: "bad request".into()
            }
        );
        assert!(!err.is_retryable());
    }

    #[test]
    fn server_errors_are_retryable() {
        assert!(GenerationError::from_status(503, "unavailable").is_retryable());
    }

    #[test]
    fn content_failures_are_not_retryable() {
        assert!(!GenerationError::Malformed("no json".into()).is_retryable());
        assert!(!GenerationError::EmptyResponse.is_retryable());
        assert!(!GenerationError::Unexpected("panic".into()).is_retryable());
    }

    #[test]
    fn generation_error_converts_into_error() {
        let err: Error = GenerationError::EmptyResponse.into();
        assert!(err.to_string().starts_with("generation error"));
    }
}
