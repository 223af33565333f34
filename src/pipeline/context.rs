use std::fmt;

use crate::vision::{LightStatus, SteerResult};

/// Which processing path runs, selected by the controller's last byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OperatingMode {
    #[default]
    ConeTracking,
    LightDetection,
}

impl OperatingMode {
    /// `None` for bytes the controller isn't supposed to send.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(OperatingMode::ConeTracking),
            1 => Some(OperatingMode::LightDetection),
            _ => None,
        }
    }
}

impl fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperatingMode::ConeTracking => write!(f, "cone-tracking"),
            OperatingMode::LightDetection => write!(f, "light-detection"),
        }
    }
}

/// Result of one frame. Built by the processor, committed by the pump.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FrameContext {
    pub sequence: u64,
    pub mode: OperatingMode,
    pub light: LightStatus,
    pub steer: SteerResult,
    /// In-range pixel count in light mode, zero otherwise.
    pub light_pixels: usize,
}

impl FrameContext {
    pub fn new(sequence: u64, mode: OperatingMode) -> Self {
        Self {
            sequence,
            mode,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_bytes() {
        assert_eq!(OperatingMode::from_byte(0), Some(OperatingMode::ConeTracking));
        assert_eq!(
            OperatingMode::from_byte(1),
            Some(OperatingMode::LightDetection)
        );
        assert_eq!(OperatingMode::from_byte(2), None);
        assert_eq!(OperatingMode::from_byte(255), None);
    }

    #[test]
    fn new_context_sends_nothing() {
        let ctx = FrameContext::new(3, OperatingMode::LightDetection);
        assert_eq!(ctx.light, LightStatus::None);
        assert_eq!(ctx.steer, SteerResult::default());
    }
}
