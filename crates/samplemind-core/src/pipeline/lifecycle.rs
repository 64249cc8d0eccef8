//! Pipeline lifecycle states
//!
//! ```text
//! Uninitialized ──initialize──► Initializing ──engine ok──► Running
//!       ▲                            │                         │
//!       │◄──────── engine failed ────┘                      shutdown
//!       │                                                      ▼
//!       └─────────────────────────────────────────────── ShuttingDown
//! ```
//!
//! The state is stored in an `AtomicU8` so the audio thread can check it
//! with a single load.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle state of the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum PipelineState {
    #[default]
    Uninitialized = 0,
    Initializing = 1,
    Running = 2,
    ShuttingDown = 3,
}

impl PipelineState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => PipelineState::Initializing,
            2 => PipelineState::Running,
            3 => PipelineState::ShuttingDown,
            _ => PipelineState::Uninitialized,
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Uninitialized => "Uninitialized",
            PipelineState::Initializing => "Initializing",
            PipelineState::Running => "Running",
            PipelineState::ShuttingDown => "Shutting Down",
        };
        f.write_str(name)
    }
}

/// Lock-free cell holding a [`PipelineState`]
#[derive(Debug, Default)]
pub struct AtomicPipelineState(AtomicU8);

impl AtomicPipelineState {
    #[inline]
    pub fn load(&self) -> PipelineState {
        PipelineState::from_u8(self.0.load(Ordering::Acquire))
    }

    #[inline]
    pub fn store(&self, state: PipelineState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_roundtrip() {
        let cell = AtomicPipelineState::default();
        assert_eq!(cell.load(), PipelineState::Uninitialized);
        for state in [
            PipelineState::Initializing,
            PipelineState::Running,
            PipelineState::ShuttingDown,
            PipelineState::Uninitialized,
        ] {
            cell.store(state);
            assert_eq!(cell.load(), state);
        }
    }

    #[test]
    fn test_state_display() {
        assert_eq!(PipelineState::ShuttingDown.to_string(), "Shutting Down");
        assert_eq!(PipelineState::Running.to_string(), "Running");
    }
}
