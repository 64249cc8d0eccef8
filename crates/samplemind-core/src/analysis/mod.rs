//! Asynchronous analysis path
//!
//! ```text
//! ┌─────────────┐  enqueue (copy)  ┌───────────────┐  dequeue  ┌────────────────┐
//! │ Audio Thread│ ───────────────► │ AnalysisQueue │ ────────► │ AnalysisWorker │
//! └─────────────┘   drop-oldest    └───────────────┘           └────────────────┘
//!                                                                 │ engine call
//!                                                                 ▼
//!                        ┌────────────┐   read (copy)   ┌─────────────────────┐
//!                        │  UI Thread │ ◄────────────── │ AnalysisResultStore │
//!                        └────────────┘                 └─────────────────────┘
//! ```

pub mod queue;
pub mod result;
pub mod worker;

pub use queue::{AnalysisQueue, EnqueueOutcome};
pub use result::{AnalysisResult, AnalysisResultStore};
pub use worker::{AnalysisStats, AnalysisWorker, WorkerContext, WorkerHandle, WorkerSettings};
