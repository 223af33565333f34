//! Snapshot of the loop published at the end of every frame.

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::pipeline::context::{FrameContext, OperatingMode};

/// Lifecycle of the frame pump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineState {
    #[default]
    Uninitialized,
    Configured,
    Capturing(OperatingMode),
    Draining,
    Destroyed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Uninitialized => write!(f, "uninitialized"),
            PipelineState::Configured => write!(f, "configured"),
            PipelineState::Capturing(mode) => write!(f, "capturing ({})", mode),
            PipelineState::Draining => write!(f, "draining"),
            PipelineState::Destroyed => write!(f, "destroyed"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineStatus {
    pub state: PipelineState,
    /// Mode the next frame will run under.
    pub mode: OperatingMode,
    pub last_frame: Option<FrameContext>,
    pub frames_processed: u64,
    pub frames_dropped: u64,
    pub pool_starved: u64,
    pub serial_errors: u64,
}

/// Written only by the pump, read by anyone.
#[derive(Default)]
pub struct StatusBoard {
    current: ArcSwap<PipelineStatus>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&self) -> Arc<PipelineStatus> {
        self.current.load_full()
    }

    pub fn publish(&self, status: PipelineStatus) {
        self.current.store(Arc::new(status));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readers_see_latest_publish() {
        let board = StatusBoard::new();
        let before = board.load();
        assert_eq!(before.frames_processed, 0);

        board.publish(PipelineStatus {
            frames_processed: 5,
            mode: OperatingMode::LightDetection,
            ..Default::default()
        });
        assert_eq!(board.load().frames_processed, 5);
        assert_eq!(board.load().state, PipelineState::Uninitialized);
        // Earlier snapshots are unaffected
        assert_eq!(before.frames_processed, 0);
    }
}
