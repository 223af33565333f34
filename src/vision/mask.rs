//! Binary target mask from the two chroma planes.
//!
//! The target sits at low U and high V, so U is thresholded "at or below"
//! and V "above". The combined mask is inverted: target pixels come out 0 and
//! everything else 255, which makes the target the seed set of the distance
//! transform.

use super::calibrate::ColorSample;
use super::image::GrayImage;

pub const FOREGROUND: u8 = 255;

/// True when a pixel passes both chroma thresholds.
#[inline]
pub fn is_target(u: u8, v: u8, sample: ColorSample) -> bool {
    (u as f64) <= sample.u_sample && (v as f64) > sample.v_sample
}

/// Build the inverted mask `NOT(u_pass AND v_pass)` into `mask`.
pub fn build_mask(u: &GrayImage, v: &GrayImage, sample: ColorSample, mask: &mut GrayImage) {
    debug_assert!(u.same_size(v) && u.same_size(mask));
    for ((m, &pu), &pv) in mask.data.iter_mut().zip(&u.data).zip(&v.data) {
        *m = if is_target(pu, pv, sample) { 0 } else { FOREGROUND };
    }
}
