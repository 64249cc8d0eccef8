//! Pipeline controller
//!
//! Owns every piece of shared state, wires the analysis path together and is
//! the only place that starts or stops the worker and the engine connection.
//!
//! # Threads
//!
//! | Caller | Operations |
//! |---|---|
//! | Audio thread | [`Pipeline::process`], [`Pipeline::parameter_or`] |
//! | Analysis worker | internal (queue → engine → result store) |
//! | Host / UI thread | lifecycle, parameters, presets, display reads, state |
//!
//! Configuration (parameter registration) needs `&mut self`, so it happens
//! before the pipeline is shared; everything else takes `&self` and the
//! pipeline is `Send + Sync`.
//!
//! # Usage
//!
//! ```ignore
//! let mut pipeline = Pipeline::new(PipelineConfig::default(), SubprocessConnector::new("analyzer"));
//! pipeline.register_parameter(Parameter::new(1, "Sensitivity", 0.0, 1.0, 0.5))?;
//! let pipeline = Arc::new(pipeline);
//!
//! pipeline.initialize(48000, 512)?;
//! // audio thread
//! pipeline.process(&left, Some(right.as_slice()), 512);
//! // UI thread
//! let analysis = pipeline.get_analysis();
//! pipeline.shutdown();
//! ```

mod lifecycle;

pub use lifecycle::PipelineState;

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use lifecycle::AtomicPipelineState;

use crate::analysis::{
    AnalysisQueue, AnalysisResult, AnalysisResultStore, AnalysisStats, AnalysisWorker,
    WorkerContext, WorkerHandle, WorkerSettings,
};
use crate::config::PipelineConfig;
use crate::engine::EngineConnector;
use crate::error::{PipelineError, PipelineResult};
use crate::params::{ParamId, Parameter, ParameterInfo, ParameterRegistry};
use crate::preset::{PresetSlot, PresetStore};
use crate::state::PluginState;
use crate::sync::lock;
use crate::types::{AudioBlock, Sample, DEFAULT_BLOCK_SIZE, DEFAULT_SAMPLE_RATE};
use crate::waveform::{WaveformBuffer, WaveformExtractor};

/// Real-time ingestion and asynchronous analysis pipeline
pub struct Pipeline {
    config: PipelineConfig,
    connector: Box<dyn EngineConnector>,

    state: AtomicPipelineState,
    sample_rate: AtomicU32,
    block_size: AtomicUsize,
    /// Blocks seen by `process` while running; doubles as block sequence
    blocks_processed: AtomicU64,
    analysis_enabled: AtomicBool,
    /// Latched when the engine connection fails during `initialize`
    analysis_disabled: AtomicBool,

    registry: ParameterRegistry,
    presets: Mutex<PresetStore>,

    queue: Arc<AnalysisQueue>,
    results: Arc<AnalysisResultStore>,
    stats: Arc<AnalysisStats>,
    live_workers: Arc<AtomicUsize>,

    extractor: WaveformExtractor,
    waveform: WaveformBuffer,

    /// Worker handle; the lock also serializes lifecycle transitions
    worker: Mutex<Option<WorkerHandle>>,
}

impl Pipeline {
    /// Create an uninitialized pipeline
    ///
    /// The preset bank is allocated here and lives as long as the pipeline,
    /// across any number of initialize/shutdown cycles.
    pub fn new(config: PipelineConfig, connector: impl EngineConnector + 'static) -> Self {
        let config = config.sanitized();
        Self {
            connector: Box::new(connector),
            state: AtomicPipelineState::default(),
            sample_rate: AtomicU32::new(DEFAULT_SAMPLE_RATE),
            block_size: AtomicUsize::new(DEFAULT_BLOCK_SIZE),
            blocks_processed: AtomicU64::new(0),
            analysis_enabled: AtomicBool::new(config.analysis_enabled),
            analysis_disabled: AtomicBool::new(false),
            registry: ParameterRegistry::new(),
            presets: Mutex::new(PresetStore::new()),
            queue: Arc::new(AnalysisQueue::new(config.queue_capacity)),
            results: Arc::new(AnalysisResultStore::new()),
            stats: Arc::new(AnalysisStats::new()),
            live_workers: Arc::new(AtomicUsize::new(0)),
            extractor: WaveformExtractor::new(config.waveform_points),
            waveform: WaveformBuffer::new(),
            worker: Mutex::new(None),
            config,
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────

    /// Connect the engine and start the analysis worker
    ///
    /// A no-op if already running. If the engine cannot be connected the
    /// pipeline stays `Uninitialized` and analysis is disabled for the rest
    /// of this instance's life; later calls fail fast without reconnecting.
    pub fn initialize(&self, sample_rate: u32, block_size: usize) -> PipelineResult<()> {
        let mut worker = lock(&self.worker);

        if self.state.load() == PipelineState::Running {
            log::debug!("initialize: {}", PipelineError::AlreadyInitialized);
            return Ok(());
        }
        if self.analysis_disabled.load(Ordering::Acquire) {
            return Err(PipelineError::EngineUnavailable(
                "analysis disabled after an earlier engine connection failure".to_string(),
            ));
        }

        self.state.store(PipelineState::Initializing);
        self.sample_rate.store(sample_rate, Ordering::Release);
        self.block_size.store(block_size, Ordering::Release);
        log::info!("Initializing pipeline @ {}Hz, {} frames per block", sample_rate, block_size);

        let engine = match self.connector.connect() {
            Ok(engine) => engine,
            Err(e) => {
                log::error!("Failed to connect analysis engine: {} (analysis disabled)", e);
                self.analysis_disabled.store(true, Ordering::Release);
                self.state.store(PipelineState::Uninitialized);
                return Err(e.into());
            }
        };
        log::info!("Analysis engine '{}' connected", engine.name());

        // Blocks left from a previous run belong to a stale engine session
        self.queue.drain();

        let context = WorkerContext {
            queue: Arc::clone(&self.queue),
            results: Arc::clone(&self.results),
            stats: Arc::clone(&self.stats),
            live_workers: Arc::clone(&self.live_workers),
        };
        let settings = WorkerSettings {
            poll_interval: self.config.poll_interval(),
            engine_timeout: self.config.engine_timeout(),
        };

        // On spawn failure the engine was moved into the dropped closure
        let handle = AnalysisWorker::spawn(engine, context, settings).map_err(|e| {
            log::error!("Failed to spawn analysis worker: {}", e);
            self.state.store(PipelineState::Uninitialized);
            PipelineError::EngineUnavailable(format!("failed to spawn analysis worker: {}", e))
        })?;

        *worker = Some(handle);
        self.state.store(PipelineState::Running);
        log::info!("Pipeline running");
        Ok(())
    }

    /// Stop the worker, tear down the engine and return to `Uninitialized`
    ///
    /// Waits at most one engine-call timeout plus one poll interval (see
    /// [`PipelineConfig::shutdown_bound`]). Safe to call in any state.
    pub fn shutdown(&self) {
        let mut worker = lock(&self.worker);
        let Some(handle) = worker.take() else {
            return;
        };

        self.state.store(PipelineState::ShuttingDown);
        log::info!("Shutting down pipeline");

        if let Some(mut engine) = handle.stop() {
            engine.shutdown();
            log::info!("Analysis engine '{}' disconnected", engine.name());
        }

        let discarded = self.queue.drain();
        if discarded > 0 {
            log::debug!("Discarded {} unanalyzed blocks", discarded);
        }

        self.state.store(PipelineState::Uninitialized);
        log::info!("Pipeline shut down");
    }

    /// Drain pending analysis, restore parameter defaults and clear results
    ///
    /// Only valid while running; the lifecycle state is unchanged. A block
    /// the worker is analyzing at this moment still finishes, but its result
    /// is discarded. The display waveform is cleared too.
    pub fn reset(&self) -> PipelineResult<()> {
        let _worker = lock(&self.worker);
        if self.state.load() != PipelineState::Running {
            return Err(PipelineError::NotInitialized);
        }

        let discarded = self.queue.drain();
        self.registry.reset_to_defaults();
        self.results.clear();
        self.waveform.clear();
        log::info!("Pipeline reset ({} queued blocks discarded)", discarded);
        Ok(())
    }

    pub fn state(&self) -> PipelineState {
        self.state.load()
    }

    pub fn is_running(&self) -> bool {
        self.state.load() == PipelineState::Running
    }

    /// Number of live analysis worker threads (0 or 1)
    pub fn worker_threads(&self) -> usize {
        self.live_workers.load(Ordering::Acquire)
    }

    /// False once an engine connection failure has disabled analysis
    pub fn analysis_available(&self) -> bool {
        !self.analysis_disabled.load(Ordering::Acquire)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.load(Ordering::Acquire)
    }

    pub fn block_size(&self) -> usize {
        self.block_size.load(Ordering::Acquire)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────
    // Audio thread
    // ─────────────────────────────────────────────────────────────

    /// Ingest one block from the audio callback
    ///
    /// Copies the block, queues it for analysis (dropping the oldest queued
    /// block when full) and, on the waveform cadence, refreshes the display
    /// waveform. Never blocks. A no-op unless running.
    pub fn process(&self, left: &[Sample], right: Option<&[Sample]>, num_samples: usize) {
        if self.state.load() != PipelineState::Running {
            return;
        }

        let sequence = self.blocks_processed.fetch_add(1, Ordering::Relaxed);
        let analyze = self.analysis_enabled.load(Ordering::Relaxed);
        let refresh_waveform = sequence % self.config.waveform_cadence == 0;
        if !analyze && !refresh_waveform {
            return;
        }

        let block = AudioBlock::copy_from(
            sequence,
            left,
            right,
            num_samples,
            self.sample_rate.load(Ordering::Relaxed),
        );

        if refresh_waveform && !self.waveform.try_publish(self.extractor.extract(&block)) {
            self.stats.record_waveform_skip();
        }

        if analyze {
            let outcome = self.queue.enqueue(block);
            self.stats.record_enqueue(outcome);
        }
    }

    /// Blocks handed to `process` while running, across all runs
    pub fn blocks_processed(&self) -> u64 {
        self.blocks_processed.load(Ordering::Relaxed)
    }

    /// Blocks currently waiting for the worker
    pub fn queued_blocks(&self) -> usize {
        self.queue.len()
    }

    /// Turn queueing of processed blocks for analysis on or off
    pub fn set_analysis_enabled(&self, enabled: bool) {
        self.analysis_enabled.store(enabled, Ordering::Relaxed);
        log::info!("Real-time analysis {}", if enabled { "enabled" } else { "disabled" });
    }

    pub fn analysis_enabled(&self) -> bool {
        self.analysis_enabled.load(Ordering::Relaxed)
    }

    // ─────────────────────────────────────────────────────────────
    // Parameters
    // ─────────────────────────────────────────────────────────────

    /// Register an automatable parameter
    ///
    /// Rejected while the pipeline is running.
    pub fn register_parameter(&mut self, param: Parameter) -> PipelineResult<()> {
        if self.state.load() == PipelineState::Running {
            return Err(PipelineError::RegistrationClosed);
        }
        self.registry.register(param)
    }

    /// Set a parameter (clamped to its range); returns the stored value
    pub fn set_parameter(&self, id: ParamId, value: f32) -> PipelineResult<f32> {
        self.registry.set(id, value)
    }

    /// Current value of a parameter
    pub fn get_parameter(&self, id: ParamId) -> Option<f32> {
        self.registry.get(id).ok()
    }

    /// Real-time read: current value, or `last_known` if the id is unknown
    #[inline]
    pub fn parameter_or(&self, id: ParamId, last_known: f32) -> f32 {
        self.registry.get_or(id, last_known)
    }

    pub fn get_parameter_by_name(&self, name: &str) -> Option<ParameterInfo> {
        self.registry.find_by_name(name)
    }

    /// All parameters in registration order
    pub fn parameters(&self) -> Vec<ParameterInfo> {
        self.registry.list()
    }

    pub fn registry(&self) -> &ParameterRegistry {
        &self.registry
    }

    // ─────────────────────────────────────────────────────────────
    // Presets
    // ─────────────────────────────────────────────────────────────

    /// Capture all parameters into `slot` under `name` (empty name clears it)
    pub fn save_preset(&self, slot: usize, name: &str) -> PipelineResult<()> {
        lock(&self.presets).save(slot, name, &self.registry)
    }

    /// Apply the preset in `slot`; returns the number of parameters applied
    pub fn load_preset(&self, slot: usize) -> PipelineResult<usize> {
        lock(&self.presets).load(slot, &self.registry)
    }

    pub fn preset(&self, slot: usize) -> PipelineResult<PresetSlot> {
        lock(&self.presets).slot(slot).cloned()
    }

    pub fn preset_count(&self) -> usize {
        lock(&self.presets).count()
    }

    // ─────────────────────────────────────────────────────────────
    // Display
    // ─────────────────────────────────────────────────────────────

    /// Copy of the latest analysis (zeroed before the first one completes)
    pub fn get_analysis(&self) -> AnalysisResult {
        self.results.read()
    }

    /// Changes whenever a new analysis is published or results are cleared
    pub fn analysis_generation(&self) -> u64 {
        self.results.generation()
    }

    /// Human-readable summary of the latest analysis
    pub fn analysis_display_text(&self) -> String {
        self.results.snapshot().to_string()
    }

    /// Copy of the latest display waveform
    pub fn get_waveform(&self) -> Vec<Sample> {
        self.waveform.read()
    }

    pub fn stats(&self) -> &AnalysisStats {
        &self.stats
    }

    // ─────────────────────────────────────────────────────────────
    // Persistence
    // ─────────────────────────────────────────────────────────────

    /// Serialize parameters (by name) and occupied presets as JSON
    pub fn serialize_state(&self) -> PipelineResult<String> {
        let presets = lock(&self.presets);
        PluginState::capture(&self.registry, &presets).to_json()
    }

    /// Restore a document produced by [`Pipeline::serialize_state`]
    ///
    /// Nothing is applied if the document is invalid.
    pub fn restore_state(&self, text: &str) -> PipelineResult<()> {
        let state = PluginState::from_json(text).map_err(|e| {
            log::warn!("Rejected plugin state: {}", e);
            e
        })?;
        let mut presets = lock(&self.presets);
        state.apply(&self.registry, &mut presets)?;
        Ok(())
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}
