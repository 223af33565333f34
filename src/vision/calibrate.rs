//! Per-frame chroma threshold calibration from a reference patch.

use crate::CalibrationConfig;

use super::image::{GrayImage, Rect};

/// Mean chroma of the calibration patch, used as mask thresholds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorSample {
    pub u_sample: f64,
    pub v_sample: f64,
}

pub struct Calibrator {
    enabled: bool,
    patch: Rect,
    defaults: ColorSample,
}

impl Calibrator {
    pub fn new(config: &CalibrationConfig) -> Self {
        Self {
            enabled: config.enabled,
            patch: config.patch.into(),
            defaults: ColorSample {
                u_sample: config.default_u,
                v_sample: config.default_v,
            },
        }
    }

    /// Measure the patch in both planes, then black it out so the reference
    /// object never shows up in the mask. Disabled calibration returns the
    /// fixed thresholds and leaves the planes alone.
    pub fn sample(&self, u: &mut GrayImage, v: &mut GrayImage) -> ColorSample {
        if !self.enabled {
            return self.defaults;
        }
        let Some(patch) = self.patch.clip(u.width, u.height) else {
            return self.defaults;
        };
        ColorSample {
            u_sample: mean_and_clear(u, patch),
            v_sample: mean_and_clear(v, patch),
        }
    }
}

fn mean_and_clear(plane: &mut GrayImage, patch: Rect) -> f64 {
    let mut sum = 0u64;
    for y in patch.y..patch.y + patch.height {
        let row = &mut plane.row_mut(y)[patch.x..patch.x + patch.width];
        sum += row.iter().map(|&p| p as u64).sum::<u64>();
        row.fill(0);
    }
    sum as f64 / patch.area() as f64
}
