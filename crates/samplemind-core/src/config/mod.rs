//! Pipeline configuration
//!
//! Tuning knobs for the analysis path, loaded from YAML.
//!
//! # Usage
//!
//! ```ignore
//! use samplemind_core::config::{default_config_path, PipelineConfig};
//!
//! let config = PipelineConfig::load(&default_config_path());
//! config.save(&default_config_path())?;
//! ```

mod io;

pub use io::default_config_path;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::waveform::WAVEFORM_DISPLAY_POINTS;

/// Configuration for the ingestion/analysis pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum blocks waiting for analysis before the oldest is dropped
    /// Default: 8
    pub queue_capacity: usize,

    /// Longest single wait of the worker before it re-checks for shutdown
    /// Default: 10 ms
    pub poll_interval_ms: u64,

    /// Time budget for one engine call
    /// Shutdown can take up to this plus one poll interval.
    /// Default: 5000 ms
    pub engine_timeout_ms: u64,

    /// Target waveform length for display
    /// Default: 1000
    pub waveform_points: usize,

    /// Extract the waveform on every Nth processed block
    /// Default: 64
    pub waveform_cadence: u64,

    /// Whether processed blocks are queued for analysis at all
    /// Default: true
    pub analysis_enabled: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 8,
            poll_interval_ms: 10,
            engine_timeout_ms: 5000,
            waveform_points: WAVEFORM_DISPLAY_POINTS,
            waveform_cadence: 64,
            analysis_enabled: true,
        }
    }
}

impl PipelineConfig {
    /// Copy with every zero-valued knob raised to 1
    ///
    /// A zero capacity, interval, cadence or length has no meaningful
    /// interpretation, so it is treated as the smallest valid value.
    pub fn sanitized(&self) -> Self {
        Self {
            queue_capacity: self.queue_capacity.max(1),
            poll_interval_ms: self.poll_interval_ms.max(1),
            engine_timeout_ms: self.engine_timeout_ms.max(1),
            waveform_points: self.waveform_points.max(1),
            waveform_cadence: self.waveform_cadence.max(1),
            analysis_enabled: self.analysis_enabled,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn engine_timeout(&self) -> Duration {
        Duration::from_millis(self.engine_timeout_ms)
    }

    /// Worst-case time `Pipeline::shutdown` waits for the worker
    pub fn shutdown_bound(&self) -> Duration {
        self.engine_timeout() + self.poll_interval()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.queue_capacity, 8);
        assert_eq!(config.waveform_points, 1000);
        assert_eq!(config.waveform_cadence, 64);
        assert!(config.analysis_enabled);
        assert_eq!(config.shutdown_bound(), Duration::from_millis(5010));
    }

    #[test]
    fn test_sanitized_raises_zeros() {
        let config = PipelineConfig {
            queue_capacity: 0,
            poll_interval_ms: 0,
            engine_timeout_ms: 0,
            waveform_points: 0,
            waveform_cadence: 0,
            analysis_enabled: false,
        }
        .sanitized();
        assert_eq!(config.queue_capacity, 1);
        assert_eq!(config.poll_interval_ms, 1);
        assert_eq!(config.engine_timeout_ms, 1);
        assert_eq!(config.waveform_points, 1);
        assert_eq!(config.waveform_cadence, 1);
        assert!(!config.analysis_enabled);
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let config: PipelineConfig = serde_yaml::from_str("queue_capacity: 3\n").unwrap();
        assert_eq!(config.queue_capacity, 3);
        assert_eq!(config.poll_interval_ms, 10);
    }
}
