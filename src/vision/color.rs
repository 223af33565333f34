//! YCrCb to RGB conversion for the light classifier.

use super::image::{GrayImage, RgbImage};

#[inline]
fn saturate(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

/// Convert one YCrCb pixel (BT.601, 8-bit offset 128) to RGB.
#[inline]
pub fn ycrcb_to_rgb(y: u8, cr: u8, cb: u8) -> [u8; 3] {
    let y = y as f32;
    let cr = cr as f32 - 128.0;
    let cb = cb as f32 - 128.0;
    [
        saturate(y + 1.403 * cr),
        saturate(y - 0.714 * cr - 0.344 * cb),
        saturate(y + 1.773 * cb),
    ]
}

/// Merge three equally sized planes and convert to RGB.
///
/// The camera's U plane is fed as Cr and its V plane as Cb, which is the
/// channel order the light thresholds were tuned against.
pub fn merge_ycrcb_to_rgb(luma: &GrayImage, cr: &GrayImage, cb: &GrayImage, dst: &mut RgbImage) {
    debug_assert!(luma.same_size(cr) && luma.same_size(cb));
    debug_assert_eq!((dst.width, dst.height), (luma.width, luma.height));

    for (((px, &y), &r), &b) in dst
        .data
        .iter_mut()
        .zip(&luma.data)
        .zip(&cr.data)
        .zip(&cb.data)
    {
        *px = ycrcb_to_rgb(y, r, b);
    }
}
