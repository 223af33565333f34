//! Beacon classification by counting in-range RGB pixels.

use crate::{LightConfig, Rgb};

use super::image::RgbImage;

/// Light code sent in byte 1 of the serial frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum LightStatus {
    #[default]
    None = 0,
    /// Reserved by the receiver; never produced by [`LightClassifier`].
    Red = 1,
    Green = 2,
}

impl LightStatus {
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Inclusive per-channel range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorRange {
    pub lower: Rgb,
    pub upper: Rgb,
}

impl ColorRange {
    #[inline]
    pub fn contains(&self, [r, g, b]: [u8; 3]) -> bool {
        (self.lower.r..=self.upper.r).contains(&r)
            && (self.lower.g..=self.upper.g).contains(&g)
            && (self.lower.b..=self.upper.b).contains(&b)
    }
}

pub fn count_in_range(image: &RgbImage, range: ColorRange) -> usize {
    image.pixels().filter(|&&px| range.contains(px)).count()
}

pub struct LightClassifier {
    range: ColorRange,
    min_pixels: usize,
}

impl LightClassifier {
    pub fn new(config: &LightConfig) -> Self {
        Self {
            range: ColorRange {
                lower: config.lower,
                upper: config.upper,
            },
            min_pixels: config.min_pixels,
        }
    }

    /// Green when strictly more than `min_pixels` pixels are in range.
    pub fn classify_count(&self, count: usize) -> LightStatus {
        if count > self.min_pixels {
            LightStatus::Green
        } else {
            LightStatus::None
        }
    }

    /// Returns the status and the in-range pixel count.
    pub fn classify(&self, image: &RgbImage) -> (LightStatus, usize) {
        let count = count_in_range(image, self.range);
        (self.classify_count(count), count)
    }
}
