//! Background analysis worker
//!
//! Drains the [`AnalysisQueue`] one block at a time, hands each block to the
//! engine, and publishes successful results to the [`AnalysisResultStore`].
//!
//! # Loop
//!
//! ```text
//! ┌───────────────────────────────┐
//! │ stop flag set? ── yes ──► exit│
//! │      │ no                     │
//! │ wait ≤ poll_interval for block│
//! │      │ got one                │
//! │ engine.analyze (≤ timeout)    │
//! │      ├─ ok  → publish         │
//! │      └─ err → record, keep old│
//! └───────────────────────────────┘
//! ```
//!
//! Engine failures never end the loop. Shutdown is cooperative: the stop
//! flag is checked between blocks, so shutdown latency is at most one engine
//! call timeout plus one poll interval.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::queue::{AnalysisQueue, EnqueueOutcome};
use super::result::{AnalysisResult, AnalysisResultStore};
use crate::engine::{AnalysisEngine, AnalysisRequest, EngineError, EngineResult};
use crate::sync::lock;
use crate::types::AudioBlock;

/// Counters describing pipeline analysis activity
///
/// Updated lock-free from the audio thread and the worker; the last error
/// text sits behind its own lock and is only written by the worker.
#[derive(Debug, Default)]
pub struct AnalysisStats {
    blocks_enqueued: AtomicU64,
    blocks_dropped: AtomicU64,
    blocks_rejected: AtomicU64,
    analyses_completed: AtomicU64,
    analyses_failed: AtomicU64,
    analyses_discarded: AtomicU64,
    waveform_skips: AtomicU64,
    last_error: Mutex<Option<String>>,
}

impl AnalysisStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account for one `AnalysisQueue::enqueue` call
    #[inline]
    pub fn record_enqueue(&self, outcome: EnqueueOutcome) {
        match outcome {
            EnqueueOutcome::Queued => {
                self.blocks_enqueued.fetch_add(1, Ordering::Relaxed);
            }
            EnqueueOutcome::DroppedOldest(evicted) => {
                self.blocks_enqueued.fetch_add(1, Ordering::Relaxed);
                self.blocks_dropped.fetch_add(evicted as u64, Ordering::Relaxed);
            }
            EnqueueOutcome::Rejected => {
                self.blocks_rejected.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    #[inline]
    pub fn record_waveform_skip(&self) {
        self.waveform_skips.fetch_add(1, Ordering::Relaxed);
    }

    fn record_success(&self) {
        self.analyses_completed.fetch_add(1, Ordering::Relaxed);
    }

    fn record_discard(&self) {
        self.analyses_discarded.fetch_add(1, Ordering::Relaxed);
    }

    fn record_failure(&self, error: &EngineError) {
        self.analyses_failed.fetch_add(1, Ordering::Relaxed);
        *lock(&self.last_error) = Some(error.to_string());
    }

    /// Blocks accepted into the analysis queue
    pub fn blocks_enqueued(&self) -> u64 {
        self.blocks_enqueued.load(Ordering::Relaxed)
    }

    /// Queued blocks evicted by drop-oldest backpressure
    pub fn blocks_dropped(&self) -> u64 {
        self.blocks_dropped.load(Ordering::Relaxed)
    }

    /// Blocks the queue refused outright
    pub fn blocks_rejected(&self) -> u64 {
        self.blocks_rejected.load(Ordering::Relaxed)
    }

    pub fn analyses_completed(&self) -> u64 {
        self.analyses_completed.load(Ordering::Relaxed)
    }

    pub fn analyses_failed(&self) -> u64 {
        self.analyses_failed.load(Ordering::Relaxed)
    }

    /// Results dropped because the store was cleared during their analysis
    pub fn analyses_discarded(&self) -> u64 {
        self.analyses_discarded.load(Ordering::Relaxed)
    }

    /// Waveform updates skipped because a reader held the buffer
    pub fn waveform_skips(&self) -> u64 {
        self.waveform_skips.load(Ordering::Relaxed)
    }

    /// Text of the most recent engine failure
    pub fn last_error(&self) -> Option<String> {
        lock(&self.last_error).clone()
    }
}

/// Timing knobs for the worker loop
#[derive(Debug, Clone, Copy)]
pub struct WorkerSettings {
    /// Longest single wait for a block before re-checking the stop flag
    pub poll_interval: Duration,
    /// Time budget handed to the engine for each call
    pub engine_timeout: Duration,
}

/// Shared state the worker reads from and publishes to
#[derive(Clone)]
pub struct WorkerContext {
    pub queue: Arc<AnalysisQueue>,
    pub results: Arc<AnalysisResultStore>,
    pub stats: Arc<AnalysisStats>,
    /// Live worker thread count, maintained by the worker itself
    pub live_workers: Arc<AtomicUsize>,
}

/// Decrements the live worker count when the worker thread ends
struct LiveWorker(Arc<AtomicUsize>);

impl Drop for LiveWorker {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Handle to a running worker thread
///
/// The thread hands the engine back when it exits so the owner can tear the
/// connection down explicitly.
pub struct WorkerHandle {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<Box<dyn AnalysisEngine>>>,
}

impl WorkerHandle {
    /// Signal the worker to stop and wait for it to exit
    ///
    /// Returns the engine, or `None` if the worker thread panicked.
    pub fn stop(mut self) -> Option<Box<dyn AnalysisEngine>> {
        self.stop.store(true, Ordering::Release);
        let thread = self.thread.take()?;
        match thread.join() {
            Ok(engine) => Some(engine),
            Err(_) => {
                log::error!("Analysis worker thread panicked");
                None
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().map(|h| !h.is_finished()).unwrap_or(false)
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            if let Ok(mut engine) = thread.join() {
                engine.shutdown();
            }
        }
    }
}

/// Background analysis worker
pub struct AnalysisWorker;

impl AnalysisWorker {
    /// Spawn the worker thread, handing it ownership of `engine`
    pub fn spawn(
        engine: Box<dyn AnalysisEngine>,
        context: WorkerContext,
        settings: WorkerSettings,
    ) -> std::io::Result<WorkerHandle> {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);

        // Count the worker before it starts so callers see it immediately
        context.live_workers.fetch_add(1, Ordering::AcqRel);
        let live = LiveWorker(Arc::clone(&context.live_workers));

        let spawned = thread::Builder::new()
            .name("analysis-worker".to_string())
            .spawn(move || {
                let _live = live;
                Self::run(engine, &context, settings, &thread_stop)
            });

        // On spawn failure the closure (and with it the counter guard) is
        // dropped, which undoes the increment above.
        let thread = spawned?;

        Ok(WorkerHandle {
            stop,
            thread: Some(thread),
        })
    }

    /// Main worker loop
    fn run(
        mut engine: Box<dyn AnalysisEngine>,
        context: &WorkerContext,
        settings: WorkerSettings,
        stop: &AtomicBool,
    ) -> Box<dyn AnalysisEngine> {
        log::info!("Analysis worker started (engine '{}')", engine.name());

        while !stop.load(Ordering::Acquire) {
            // Read before taking the block: a clear after this point voids
            // whatever the block produces
            let epoch = context.results.epoch();
            let Some(block) = context.queue.dequeue_timeout(settings.poll_interval) else {
                continue;
            };
            if stop.load(Ordering::Acquire) {
                break;
            }
            Self::analyze_block(engine.as_mut(), &block, epoch, context, settings.engine_timeout);
        }

        log::info!("Analysis worker stopped");
        engine
    }

    /// Analyze one block and publish or record the outcome
    fn analyze_block(
        engine: &mut dyn AnalysisEngine,
        block: &AudioBlock,
        epoch: u64,
        context: &WorkerContext,
        timeout: Duration,
    ) {
        let started = Instant::now();
        match Self::call_engine(engine, block, timeout) {
            Ok(result) => {
                log::debug!(
                    "Block {} analyzed in {:?}: {:.1} BPM, key '{}'",
                    block.sequence(),
                    started.elapsed(),
                    result.tempo_bpm,
                    result.key
                );
                if context.results.publish_if(epoch, result) {
                    context.stats.record_success();
                } else {
                    log::debug!(
                        "Results cleared while block {} was analyzed, discarding",
                        block.sequence()
                    );
                    context.stats.record_discard();
                }
            }
            Err(e) => {
                log::warn!("Analysis of block {} failed: {}", block.sequence(), e);
                context.stats.record_failure(&e);
            }
        }
    }

    fn call_engine(
        engine: &mut dyn AnalysisEngine,
        block: &AudioBlock,
        timeout: Duration,
    ) -> EngineResult<AnalysisResult> {
        let request = AnalysisRequest::new(block, timeout);
        let started = Instant::now();

        let response = panic::catch_unwind(AssertUnwindSafe(|| engine.analyze(&request)))
            .map_err(|_| EngineError::CallFailed("engine panicked".to_string()))??;

        // An engine that ignored its budget produced a result for a block
        // that is already stale relative to the queue.
        if started.elapsed() > timeout {
            return Err(EngineError::Timeout(timeout));
        }

        let mut result = AnalysisResult::from_engine_response(&response)?;
        if result.duration_seconds == 0.0 {
            result.duration_seconds = block.duration_seconds();
        }
        Ok(result)
    }
}
