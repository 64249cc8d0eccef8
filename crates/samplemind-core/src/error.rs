//! Pipeline error types
//!
//! Parameter and preset failures are returned to the caller and never abort
//! the pipeline. Engine failures are normally contained inside the analysis
//! worker; they only surface here when the engine connection itself fails
//! during `initialize`.

use thiserror::Error;

use crate::engine::EngineError;
use crate::params::ParamId;

/// Errors reported by the pipeline's host-facing operations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    /// No parameter registered under this id
    #[error("Parameter {0} not found")]
    ParameterNotFound(ParamId),

    /// A parameter with this id is already registered
    #[error("Parameter {0} is already registered")]
    DuplicateParameter(ParamId),

    /// Parameters can only be registered while the pipeline is not running
    #[error("Parameter registration is closed while the pipeline is running")]
    RegistrationClosed,

    /// Preset slot index outside [0, 128)
    #[error("Preset slot {0} out of range")]
    SlotOutOfRange(usize),

    /// Preset slot has never been saved (or was cleared)
    #[error("Preset slot {0} is empty")]
    EmptySlot(usize),

    /// The analysis engine could not be reached
    #[error("Analysis engine unavailable: {0}")]
    EngineUnavailable(String),

    /// The analysis engine failed while handling a call
    #[error("Analysis engine call failed: {0}")]
    EngineCallFailed(String),

    /// The analysis engine answered with something that is not an analysis
    #[error("Malformed analysis engine result: {0}")]
    MalformedEngineResult(String),

    /// `initialize` called while already running (benign)
    #[error("Pipeline already initialized")]
    AlreadyInitialized,

    /// Operation requires the pipeline to be running
    #[error("Pipeline not initialized")]
    NotInitialized,

    /// A persisted state document could not be applied
    #[error("Invalid plugin state: {0}")]
    InvalidState(String),
}

impl From<EngineError> for PipelineError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Unavailable(reason) => PipelineError::EngineUnavailable(reason),
            EngineError::CallFailed(reason) => PipelineError::EngineCallFailed(reason),
            EngineError::Timeout(limit) => {
                PipelineError::EngineCallFailed(format!("timed out after {:?}", limit))
            }
            EngineError::Malformed(reason) => PipelineError::MalformedEngineResult(reason),
        }
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::InvalidState(err.to_string())
    }
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;
