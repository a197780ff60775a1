//! Error types for hpi-integrator
//!
//! Collector failures are values the orchestrator retries or records; they
//! never cross the orchestrator's public API. Validation outcomes are not
//! errors at all (see `validators`).

use thiserror::Error;

/// Failure of a single collector call
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CollectorError {
    /// Network or connection failure, including transient 5xx responses
    #[error("Connectivity error: {0}")]
    Connectivity(String),

    /// Call exceeded the collector's timeout
    #[error("Timed out after {0} ms")]
    Timeout(u64),

    /// Source rejected our credentials
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Source-imposed rate limit
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Source reported failure in its response payload
    #[error("Source reported failure: {0}")]
    SourceReported(String),

    /// Source has no data for this hospital, or no collector is registered
    #[error("Source unavailable: {0}")]
    Unavailable(String),

    /// Response could not be interpreted
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Response describes a different hospital than the one requested
    #[error("Source returned data for hospital '{found}', expected '{expected}'")]
    HospitalMismatch { expected: String, found: String },
}

impl CollectorError {
    /// Whether the orchestrator should retry the task after this error
    ///
    /// Authentication is retried up to the task's limit, then fatal for the task.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connectivity(_)
            | Self::Timeout(_)
            | Self::Authentication(_)
            | Self::QuotaExceeded(_)
            | Self::SourceReported(_) => true,
            Self::Unavailable(_) | Self::InvalidResponse(_) | Self::HospitalMismatch { .. } => {
                false
            }
        }
    }
}

/// Internal merge failure; surfaces as plan-level failure
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConsolidationError {
    /// Nothing to merge
    #[error("No validated source data to consolidate")]
    NoSourceData,

    /// A source supplied data for another hospital
    #[error("Source {source_kind} reported hospital '{found}', expected '{expected}'")]
    HospitalMismatch {
        source_kind: String,
        expected: String,
        found: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(CollectorError::Connectivity("reset".into()).is_retryable());
        assert!(CollectorError::Timeout(30_000).is_retryable());
        assert!(CollectorError::Authentication("401".into()).is_retryable());
        assert!(CollectorError::QuotaExceeded("429".into()).is_retryable());
        assert!(!CollectorError::Unavailable("404".into()).is_retryable());
        assert!(!CollectorError::InvalidResponse("not json".into()).is_retryable());
        assert!(!CollectorError::HospitalMismatch {
            expected: "H-1".into(),
            found: "H-2".into(),
        }
        .is_retryable());
    }

    #[test]
    fn test_timeout_message() {
        assert_eq!(CollectorError::Timeout(1500).to_string(), "Timed out after 1500 ms");
    }
}
