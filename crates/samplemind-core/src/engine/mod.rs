//! Analysis engine boundary
//!
//! The engine is the opaque subsystem that turns raw samples into musical
//! features (tempo, key, genre, mood, energy). The pipeline never relies on
//! process-wide engine state: an [`EngineConnector`] creates one explicit
//! engine handle while the pipeline initializes, the analysis worker owns it
//! while running, and the pipeline tears it down on shutdown.
//!
//! Engines answer with a JSON object; turning that into an
//! [`AnalysisResult`](crate::analysis::AnalysisResult) (and rejecting
//! malformed answers) happens on the pipeline side.

mod error;
pub mod subprocess;

pub use error::{EngineError, EngineResult};
pub use subprocess::{SubprocessConnector, SubprocessEngine};

use std::time::Duration;

use crate::types::{AudioBlock, BlockSequence, Sample};

/// One engine call: a borrowed block plus the time the engine may take
#[derive(Debug, Clone, Copy)]
pub struct AnalysisRequest<'a> {
    block: &'a AudioBlock,
    timeout: Duration,
}

impl<'a> AnalysisRequest<'a> {
    pub fn new(block: &'a AudioBlock, timeout: Duration) -> Self {
        Self { block, timeout }
    }

    pub fn block(&self) -> &'a AudioBlock {
        self.block
    }

    pub fn sequence(&self) -> BlockSequence {
        self.block.sequence()
    }

    pub fn sample_rate(&self) -> u32 {
        self.block.sample_rate()
    }

    pub fn channel_count(&self) -> usize {
        self.block.channel_count()
    }

    /// Samples per channel, left first
    pub fn channels(&self) -> Vec<&'a [Sample]> {
        self.block.channels()
    }

    /// Upper bound on how long the engine may take to answer
    ///
    /// Engines must give up (returning [`EngineError::Timeout`]) once this
    /// elapses; shutdown latency depends on it.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// A connected analysis engine
///
/// Called synchronously from the analysis worker thread, one block at a time.
pub trait AnalysisEngine: Send {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Analyze one block, returning the engine's JSON answer
    fn analyze(&mut self, request: &AnalysisRequest<'_>) -> EngineResult<serde_json::Value>;

    /// Release the engine connection
    ///
    /// Called exactly once by the pipeline during shutdown. Engines that hold
    /// nothing beyond memory can rely on the default.
    fn shutdown(&mut self) {}
}

/// Creates engine connections for the pipeline
pub trait EngineConnector: Send + Sync {
    fn connect(&self) -> EngineResult<Box<dyn AnalysisEngine>>;
}

impl<F> EngineConnector for F
where
    F: Fn() -> EngineResult<Box<dyn AnalysisEngine>> + Send + Sync,
{
    fn connect(&self) -> EngineResult<Box<dyn AnalysisEngine>> {
        self()
    }
}
