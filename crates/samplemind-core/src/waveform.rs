//! Waveform decimation for display
//!
//! Reduces an audio block to roughly [`WAVEFORM_DISPLAY_POINTS`] amplitudes
//! by taking every `step`-th frame, where
//! `step = max(1, sample_count / display_points)`. Stereo frames are
//! averaged. The result depends only on the block itself, never on earlier
//! blocks.
//!
//! Extraction runs on the audio thread on a fixed cadence, so publishing
//! uses `try_lock`: if a reader is copying the buffer at that moment the
//! update is skipped and the next cadence tick replaces it.

use std::sync::{Mutex, TryLockError};

use crate::sync::lock;
use crate::types::{AudioBlock, Sample};

/// Target number of display points per waveform
pub const WAVEFORM_DISPLAY_POINTS: usize = 1000;

/// Decimates blocks to a display-friendly length
#[derive(Debug, Clone, Copy)]
pub struct WaveformExtractor {
    display_points: usize,
}

impl Default for WaveformExtractor {
    fn default() -> Self {
        Self::new(WAVEFORM_DISPLAY_POINTS)
    }
}

impl WaveformExtractor {
    pub fn new(display_points: usize) -> Self {
        Self {
            display_points: display_points.max(1),
        }
    }

    pub fn display_points(&self) -> usize {
        self.display_points
    }

    /// Frame stride used for a block of `sample_count` frames
    #[inline]
    pub fn step_for(&self, sample_count: usize) -> usize {
        (sample_count / self.display_points).max(1)
    }

    /// Decimate a block into `ceil(sample_count / step)` amplitudes
    pub fn extract(&self, block: &AudioBlock) -> Vec<Sample> {
        let step = self.step_for(block.sample_count());
        let left = block.left();

        match block.right() {
            Some(right) => left
                .iter()
                .zip(right)
                .step_by(step)
                .map(|(l, r)| (l + r) / 2.0)
                .collect(),
            None => left.iter().step_by(step).copied().collect(),
        }
    }
}

/// Latest published waveform
#[derive(Debug, Default)]
pub struct WaveformBuffer {
    data: Mutex<Vec<Sample>>,
}

impl WaveformBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the waveform only if the lock is free right now
    ///
    /// Returns `false` if the update was skipped.
    pub fn try_publish(&self, waveform: Vec<Sample>) -> bool {
        match self.data.try_lock() {
            Ok(mut guard) => {
                *guard = waveform;
                true
            }
            Err(TryLockError::Poisoned(poisoned)) => {
                *poisoned.into_inner() = waveform;
                true
            }
            Err(TryLockError::WouldBlock) => false,
        }
    }

    /// Copy of the current waveform
    pub fn read(&self) -> Vec<Sample> {
        lock(&self.data).clone()
    }

    pub fn clear(&self) {
        lock(&self.data).clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(len: usize) -> Vec<f32> {
        (0..len).map(|i| i as f32).collect()
    }

    #[test]
    fn test_mono_2000_samples_gives_1000_points() {
        let extractor = WaveformExtractor::default();
        let block = AudioBlock::mono(0, ramp(2000), 48000);
        let waveform = extractor.extract(&block);
        assert_eq!(extractor.step_for(2000), 2);
        assert_eq!(waveform.len(), 1000);
        assert_eq!(waveform[0], 0.0);
        assert_eq!(waveform[1], 2.0);
        assert_eq!(waveform[999], 1998.0);
    }

    #[test]
    fn test_short_block_keeps_every_frame() {
        let extractor = WaveformExtractor::default();
        let block = AudioBlock::mono(0, ramp(500), 48000);
        let waveform = extractor.extract(&block);
        assert_eq!(waveform.len(), 500);
        assert_eq!(waveform, ramp(500));
    }

    #[test]
    fn test_stereo_frames_are_averaged() {
        let extractor = WaveformExtractor::default();
        let left: Vec<f32> = (0..1000).map(|i| (i as f32 * 0.01).sin()).collect();
        let right: Vec<f32> = (0..1000).map(|i| (i as f32 * 0.03).cos()).collect();
        let block = AudioBlock::stereo(0, left.clone(), right.clone(), 48000);

        let waveform = extractor.extract(&block);
        assert_eq!(waveform.len(), 1000);
        for (i, sample) in waveform.iter().enumerate() {
            assert_eq!(*sample, (left[i] + right[i]) / 2.0);
        }
    }

    #[test]
    fn test_length_is_ceil_of_count_over_step() {
        let extractor = WaveformExtractor::new(1000);
        for count in [0usize, 1, 999, 1000, 1999, 2001, 4096, 10_000, 12_345] {
            let block = AudioBlock::mono(0, vec![0.5; count], 48000);
            let step = extractor.step_for(count);
            assert_eq!(extractor.extract(&block).len(), count.div_ceil(step), "count {}", count);
        }
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let extractor = WaveformExtractor::new(64);
        let block = AudioBlock::stereo(0, ramp(4096), ramp(4096), 44100);
        assert_eq!(extractor.extract(&block), extractor.extract(&block));
    }

    #[test]
    fn test_buffer_replace_and_skip_when_busy() {
        let buffer = WaveformBuffer::new();
        assert!(buffer.read().is_empty());

        assert!(buffer.try_publish(vec![0.1, 0.2]));
        assert_eq!(buffer.read(), vec![0.1, 0.2]);

        {
            let _reader = buffer.data.lock().unwrap();
            assert!(!buffer.try_publish(vec![9.0]));
        }
        assert_eq!(buffer.read(), vec![0.1, 0.2]);

        assert!(buffer.try_publish(vec![0.3]));
        assert_eq!(buffer.read(), vec![0.3]);

        buffer.clear();
        assert!(buffer.read().is_empty());
    }
}
