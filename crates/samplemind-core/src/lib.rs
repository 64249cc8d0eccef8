//! SampleMind Core - real-time ingestion and asynchronous analysis pipeline
//!
//! The concurrency and state-management core of the SampleMind host add-on:
//! audio blocks arrive on the hard-deadline callback thread, are handed off
//! to a background worker for content analysis, and the latest analysis plus
//! a decimated waveform are published for display. Automatable parameters
//! and a fixed bank of presets are shared with the host/automation thread.
//!
//! ```text
//! audio thread ──copy──► AnalysisQueue ──► AnalysisWorker ──► engine
//!      │                  (drop-oldest)          │
//!      │                                         ▼
//!      └──► WaveformExtractor ──► WaveformBuffer   AnalysisResultStore
//!
//! host/UI thread ──► ParameterRegistry ◄── audio thread (atomic reads)
//!                          ▲
//!                          └── PresetStore
//! ```

pub mod analysis;
pub mod config;
pub mod engine;
pub mod error;
pub mod params;
pub mod pipeline;
pub mod preset;
pub mod state;
mod sync;
pub mod types;
pub mod waveform;

pub use analysis::{AnalysisResult, AnalysisResultStore, AnalysisStats};
pub use config::PipelineConfig;
pub use engine::{AnalysisEngine, AnalysisRequest, EngineConnector, EngineError, EngineResult};
pub use error::{PipelineError, PipelineResult};
pub use params::{ParamId, Parameter, ParameterInfo, ParameterRegistry};
pub use pipeline::{Pipeline, PipelineState};
pub use preset::{PresetSlot, PresetStore, PRESET_SLOT_COUNT};
pub use types::*;
