//! Plane extraction and the per-stage working images.

use crate::capture::frame::PlaneLayout;
use crate::error::PipelineError;

use super::filter::pyr_down_size;
use super::image::{FloatImage, GrayImage, RgbImage};

/// Working images, one per stage, allocated once at startup.
///
/// Every image is fully overwritten by the stage that owns it before it is
/// read, so no image carries state from one frame into the next. Cone mode
/// writes `u`, `v`, `mask`, `distance`, `ridge` and `normalized`; light mode
/// writes `luma`, `luma_small` and `rgb`. Both start from `u_raw`/`v_raw`.
pub struct WorkingSet {
    pub layout: PlaneLayout,
    pub u_raw: GrayImage,
    pub v_raw: GrayImage,
    pub u: GrayImage,
    pub v: GrayImage,
    pub mask: GrayImage,
    pub distance: FloatImage,
    pub ridge: FloatImage,
    pub normalized: FloatImage,
    pub luma: GrayImage,
    pub luma_small: GrayImage,
    pub rgb: RgbImage,
}

impl WorkingSet {
    pub fn new(layout: PlaneLayout) -> Self {
        let (cw, ch) = layout.chroma_size();
        let (sw, sh) = pyr_down_size(layout.width, layout.height);
        Self {
            layout,
            u_raw: GrayImage::new(cw, ch),
            v_raw: GrayImage::new(cw, ch),
            u: GrayImage::new(cw, ch),
            v: GrayImage::new(cw, ch),
            mask: GrayImage::new(cw, ch),
            distance: FloatImage::new(cw, ch),
            ridge: FloatImage::new(cw, ch),
            normalized: FloatImage::new(cw, ch),
            luma: GrayImage::new(layout.width, layout.height),
            luma_small: GrayImage::new(sw, sh),
            rgb: RgbImage::new(sw, sh),
        }
    }

    /// Processing resolution.
    pub fn size(&self) -> (usize, usize) {
        self.layout.chroma_size()
    }

    /// Copy both chroma planes out of a raw frame.
    pub fn extract_chroma(&mut self, frame: &[u8]) -> Result<(), PipelineError> {
        self.u_raw
            .data
            .copy_from_slice(self.layout.chroma_u(frame)?);
        self.v_raw
            .data
            .copy_from_slice(self.layout.chroma_v(frame)?);
        Ok(())
    }

    /// Copy the full-resolution luma plane out of a raw frame.
    pub fn extract_luma(&mut self, frame: &[u8]) -> Result<(), PipelineError> {
        self.luma.data.copy_from_slice(self.layout.luma(frame)?);
        Ok(())
    }
}
