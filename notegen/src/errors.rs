//! Error types for the notegen pipeline.
//!
//! The taxonomy is deliberately small: task failures, stage degradations and
//! record rejections are *data* (see [`crate::pool::TaskResult`],
//! [`crate::refine::StageOutput`]) and never appear here. Only conditions
//! that end a run early, or faults at the crate boundary, are errors.

use thiserror::Error;

/// Why a pipeline run was halted before producing files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// Input discovery yielded no items; nothing was consumed.
    NoInput,
    /// Every extraction task failed or produced empty text.
    NoValidExtractions,
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoInput => write!(f, "no input items to process"),
            Self::NoValidExtractions => write!(f, "no task produced a valid extraction"),
        }
    }
}

/// Errors returned by a generation gateway.
///
/// A gateway never returns partial or garbled text: every failure mode is an
/// explicit variant so callers can record it and move on.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// Could not reach the generation service.
    #[error("Connection to generation service failed: {0}")]
    Connection(String),

    /// The service answered with a non-success HTTP status.
    #[error("Generation service returned HTTP {status}: {body}")]
    Http {
        /// The HTTP status code.
        status: u16,
        /// The response body, if any.
        body: String,
    },

    /// The request exceeded the configured deadline.
    #[error("Generation request timed out after {0}s")]
    Timeout(u64),

    /// The service answered but with empty or whitespace-only text.
    #[error("Generation service returned an empty response")]
    EmptyResponse,

    /// The response body could not be decoded.
    #[error("Failed to parse generation response: {0}")]
    ResponseParsing(String),
}

/// The main error type for notegen operations.
#[derive(Debug, Error)]
pub enum NotegenError {
    /// The run was halted before the refinement chain.
    #[error("Pipeline aborted: {0}")]
    Aborted(AbortReason),

    /// A gateway call failed in a context where it cannot be degraded.
    #[error("{0}")]
    Gateway(#[from] GatewayError),

    /// The run configuration could not be loaded or written.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abort_reason_display() {
        assert_eq!(AbortReason::NoInput.to_string(), "no input items to process");
        assert!(AbortReason::NoValidExtractions
            .to_string()
            .contains("valid extraction"));
    }

    #[test]
    fn test_gateway_error_display() {
        let err = GatewayError::Http {
            status: 429,
            body: "rate limited".to_string(),
        };
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("rate limited"));
    }

    #[test]
    fn test_aborted_wraps_reason() {
        let err = NotegenError::Aborted(AbortReason::NoValidExtractions);
        assert!(err.to_string().starts_with("Pipeline aborted"));
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: NotegenError = io.into();
        assert!(matches!(err, NotegenError::Io(_)));
    }
}
