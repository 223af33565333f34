pub mod capture;
pub mod error;
pub mod pipeline;
pub mod serial;
pub mod utils;
pub mod vision;

use std::path::Path;

use capture::frame::PixelFormat;
use serde::{Deserialize, Serialize};

pub use error::{ConfigError, Error};

use crate::utils::FoundDevice;

/// Smallest pool that keeps the capture source from dropping frames.
pub const MIN_BUFFER_COUNT: u32 = 3;

/// Environment prefix for configuration overrides, e.g. `CONEPILOT__SERIAL__PORT`.
const ENV_PREFIX: &str = "CONEPILOT";

/// System configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub capture: CaptureConfig,
    pub pipeline: PipelineConfig,
    pub calibration: CalibrationConfig,
    pub steering: SteeringConfig,
    pub light: LightConfig,
    pub serial: SerialConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    V4l2,
    Synthetic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    pub source: SourceKind,
    pub device: FoundDevice,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub format: PixelFormat,
    pub buffer_count: u32,
}

impl CaptureConfig {
    /// Bytes in one planar 4:2:0 frame.
    pub fn frame_len(&self) -> usize {
        let luma = self.width as usize * self.height as usize;
        luma + luma / 2
    }

    /// Working resolution: half the frame's linear dimensions.
    pub fn processing_size(&self) -> (usize, usize) {
        (self.width as usize / 2, self.height as usize / 2)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Log an FPS report every this many frames.
    pub report_interval_frames: u64,
    /// Stop capturing after this long. Zero runs until interrupted.
    pub timeout_ms: u64,
}

/// Rectangle in processing-resolution coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchRect {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationConfig {
    /// Sample the patch every frame. When false the fixed thresholds are used.
    pub enabled: bool,
    pub patch: PatchRect,
    pub default_u: f64,
    pub default_v: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SteeringConfig {
    pub near_row: usize,
    pub far_row: usize,
    pub midline_x: i32,
    pub ridge_boost: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LightConfig {
    pub lower: Rgb,
    pub upper: Rgb,
    /// A beacon is reported when strictly more pixels than this are in range.
    pub min_pixels: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Empty disables the exchange entirely.
    pub port: String,
    pub baud_rate: u32,
    pub read_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capture: CaptureConfig {
                source: SourceKind::V4l2,
                device: FoundDevice::new("/dev/video0".into(), PixelFormat::Yu12),
                width: 640,
                height: 480,
                fps: 60,
                format: PixelFormat::Yu12,
                buffer_count: MIN_BUFFER_COUNT,
            },
            pipeline: PipelineConfig {
                report_interval_frames: 60,
                timeout_ms: 0,
            },
            calibration: CalibrationConfig {
                enabled: true,
                patch: PatchRect {
                    x: 135,
                    y: 215,
                    width: 50,
                    height: 23,
                },
                default_u: 100.0,
                default_v: 160.0,
            },
            steering: SteeringConfig {
                near_row: 200,
                far_row: 100,
                midline_x: 160,
                ridge_boost: 1000.0,
            },
            light: LightConfig {
                lower: Rgb { r: 0, g: 100, b: 0 },
                upper: Rgb { r: 120, g: 255, b: 120 },
                min_pixels: 800,
            },
            serial: SerialConfig {
                port: "/dev/ttyUSB0".into(),
                baud_rate: 9600,
                read_timeout_ms: 5,
            },
        }
    }
}

impl Config {
    /// Layer defaults, an optional TOML file and `CONEPILOT__*` environment
    /// variables, then validate the result.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Config::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }

        let config: Config = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let capture = &self.capture;
        if capture.width == 0 || capture.height == 0 {
            return Err(ConfigError::Invalid("capture size must be non-zero".into()));
        }
        if capture.width % 2 != 0 || capture.height % 2 != 0 {
            return Err(ConfigError::Invalid(format!(
                "capture size {}x{} must be even for 4:2:0 planes",
                capture.width, capture.height
            )));
        }
        if capture.buffer_count < MIN_BUFFER_COUNT {
            return Err(ConfigError::Invalid(format!(
                "buffer_count {} is below the minimum of {}",
                capture.buffer_count, MIN_BUFFER_COUNT
            )));
        }
        if capture.format != PixelFormat::Yu12 {
            return Err(ConfigError::Invalid(format!(
                "pixel format {:?} is not planar 4:2:0",
                capture.format
            )));
        }

        let (_, rows) = capture.processing_size();
        for row in [self.steering.near_row, self.steering.far_row] {
            if row >= rows {
                return Err(ConfigError::Invalid(format!(
                    "steering row {} is outside the {} processing rows",
                    row, rows
                )));
            }
        }
        if self.steering.near_row == self.steering.far_row {
            return Err(ConfigError::Invalid(
                "near_row and far_row must differ".into(),
            ));
        }
        if self.pipeline.report_interval_frames == 0 {
            return Err(ConfigError::Invalid(
                "report_interval_frames must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.capture.frame_len(), 640 * 480 * 3 / 2);
        assert_eq!(config.capture.processing_size(), (320, 240));
    }

    #[test]
    fn rejects_small_pool() {
        let mut config = Config::default();
        config.capture.buffer_count = 2;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_steering_row_outside_frame() {
        let mut config = Config::default();
        config.capture.width = 320;
        config.capture.height = 240;
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_without_file_uses_defaults() {
        let config = Config::load(None).unwrap();
        assert_eq!(config.steering.midline_x, 160);
        assert_eq!(config.light.min_pixels, 800);
        assert_eq!(config.capture.source, SourceKind::V4l2);
    }
}
