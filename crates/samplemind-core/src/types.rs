//! Common types for SampleMind
//!
//! Audio block representation handed from the real-time thread to the
//! analysis worker, plus plugin identity constants reported to the host.

/// Plugin display name reported to the host
pub const PLUGIN_NAME: &str = "SampleMind AI";

/// Plugin version reported to the host (tracks the crate version)
pub const PLUGIN_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Unique plugin identifier ("SMPA" as a big-endian u32)
pub const PLUGIN_UNIQUE_ID: u32 = 0x534D_5041;

/// Sample rate assumed until the host calls `initialize`
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

/// Block size assumed until the host calls `initialize`
pub const DEFAULT_BLOCK_SIZE: usize = 512;

/// Audio sample type
pub type Sample = f32;

/// Monotonic tag assigned to each block as it leaves the audio thread
pub type BlockSequence = u64;

/// One block of audio frames captured from the real-time callback
///
/// Blocks are immutable once built and move by ownership through the
/// pipeline: audio thread → queue → worker. Nothing ever shares a block
/// between threads.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBlock {
    sequence: BlockSequence,
    sample_rate: u32,
    left: Vec<Sample>,
    right: Option<Vec<Sample>>,
}

impl AudioBlock {
    /// Build a mono block
    pub fn mono(sequence: BlockSequence, samples: Vec<Sample>, sample_rate: u32) -> Self {
        Self {
            sequence,
            sample_rate,
            left: samples,
            right: None,
        }
    }

    /// Build a stereo block
    ///
    /// If the channels differ in length, both are truncated to the shorter one
    /// so every frame index is valid in both channels.
    pub fn stereo(
        sequence: BlockSequence,
        mut left: Vec<Sample>,
        mut right: Vec<Sample>,
        sample_rate: u32,
    ) -> Self {
        let frames = left.len().min(right.len());
        left.truncate(frames);
        right.truncate(frames);
        Self {
            sequence,
            sample_rate,
            left,
            right: Some(right),
        }
    }

    /// Copy `num_samples` frames out of host-owned channel slices
    ///
    /// `num_samples` is clamped to the length of the provided slices.
    pub fn copy_from(
        sequence: BlockSequence,
        left: &[Sample],
        right: Option<&[Sample]>,
        num_samples: usize,
        sample_rate: u32,
    ) -> Self {
        match right {
            Some(right) => {
                let frames = num_samples.min(left.len()).min(right.len());
                Self::stereo(
                    sequence,
                    left[..frames].to_vec(),
                    right[..frames].to_vec(),
                    sample_rate,
                )
            }
            None => {
                let frames = num_samples.min(left.len());
                Self::mono(sequence, left[..frames].to_vec(), sample_rate)
            }
        }
    }

    #[inline]
    pub fn sequence(&self) -> BlockSequence {
        self.sequence
    }

    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of frames in the block
    #[inline]
    pub fn sample_count(&self) -> usize {
        self.left.len()
    }

    #[inline]
    pub fn is_stereo(&self) -> bool {
        self.right.is_some()
    }

    #[inline]
    pub fn channel_count(&self) -> usize {
        if self.is_stereo() {
            2
        } else {
            1
        }
    }

    #[inline]
    pub fn left(&self) -> &[Sample] {
        &self.left
    }

    #[inline]
    pub fn right(&self) -> Option<&[Sample]> {
        self.right.as_deref()
    }

    /// Channels in order (left first)
    pub fn channels(&self) -> Vec<&[Sample]> {
        let mut channels = vec![self.left.as_slice()];
        if let Some(right) = &self.right {
            channels.push(right.as_slice());
        }
        channels
    }

    /// Block length in seconds at its own sample rate
    pub fn duration_seconds(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.sample_count() as f32 / self.sample_rate as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_id_spells_smpa() {
        assert_eq!(&PLUGIN_UNIQUE_ID.to_be_bytes(), b"SMPA");
    }

    #[test]
    fn test_stereo_truncates_to_shorter_channel() {
        let block = AudioBlock::stereo(0, vec![0.1; 10], vec![0.2; 7], 48000);
        assert_eq!(block.sample_count(), 7);
        assert_eq!(block.right().map(|r| r.len()), Some(7));
        assert_eq!(block.channel_count(), 2);
    }

    #[test]
    fn test_copy_from_clamps_count() {
        let left = [1.0f32; 4];
        let block = AudioBlock::copy_from(3, &left, None, 16, 48000);
        assert_eq!(block.sample_count(), 4);
        assert_eq!(block.sequence(), 3);
        assert!(!block.is_stereo());
    }

    #[test]
    fn test_duration() {
        let block = AudioBlock::mono(0, vec![0.0; 24000], 48000);
        assert!((block.duration_seconds() - 0.5).abs() < 1e-6);

        let silent_rate = AudioBlock::mono(0, vec![0.0; 10], 0);
        assert_eq!(silent_rate.duration_seconds(), 0.0);
    }
}
