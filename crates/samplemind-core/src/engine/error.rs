//! Error types for the analysis engine boundary

use std::time::Duration;
use thiserror::Error;

/// Errors produced at the analysis engine boundary
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// Engine could not be created or is no longer reachable
    #[error("Engine unavailable: {0}")]
    Unavailable(String),

    /// Engine reported a failure for this call
    #[error("Engine call failed: {0}")]
    CallFailed(String),

    /// Engine did not answer within the call timeout
    #[error("Engine call timed out after {0:?}")]
    Timeout(Duration),

    /// Engine answered with something that is not an analysis
    #[error("Malformed engine response: {0}")]
    Malformed(String),
}

/// Result type for engine calls
pub type EngineResult<T> = Result<T, EngineError>;
