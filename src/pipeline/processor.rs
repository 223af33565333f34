//! Per-frame image pipeline for both operating modes.

use tracing::trace;

use crate::capture::frame::{FrameBuffer, PlaneLayout};
use crate::error::PipelineError;
use crate::pipeline::context::{FrameContext, OperatingMode};
use crate::vision::calibrate::{Calibrator, ColorSample};
use crate::vision::color::merge_ycrcb_to_rgb;
use crate::vision::distance::{distance_transform, normalize_min_max, trace_ridge};
use crate::vision::filter::{gaussian_blur_3x3, pyr_down};
use crate::vision::light::{LightClassifier, LightStatus};
use crate::vision::mask::build_mask;
use crate::vision::planes::WorkingSet;
use crate::vision::steer::{SteerResult, Steering};
use crate::Config;

pub struct FrameProcessor {
    work: WorkingSet,
    calibrator: Calibrator,
    steering: Steering,
    light: LightClassifier,
    ridge_boost: f32,
    last_sample: Option<ColorSample>,
}

impl FrameProcessor {
    pub fn new(config: &Config) -> Self {
        let layout = PlaneLayout::new(
            config.capture.width as usize,
            config.capture.height as usize,
        );
        Self {
            work: WorkingSet::new(layout),
            calibrator: Calibrator::new(&config.calibration),
            steering: Steering::new(&config.steering),
            light: LightClassifier::new(&config.light),
            ridge_boost: config.steering.ridge_boost,
            last_sample: None,
        }
    }

    /// Run the pipeline selected by `mode` over one filled buffer.
    pub fn process(
        &mut self,
        mode: OperatingMode,
        frame: &FrameBuffer,
    ) -> Result<FrameContext, PipelineError> {
        let mut ctx = FrameContext::new(frame.meta.sequence, mode);
        match mode {
            OperatingMode::ConeTracking => {
                ctx.steer = self.track_cones(frame.as_slice())?;
            }
            OperatingMode::LightDetection => {
                let (light, pixels) = self.detect_light(frame.as_slice())?;
                ctx.light = light;
                ctx.light_pixels = pixels;
            }
        }
        Ok(ctx)
    }

    fn track_cones(&mut self, data: &[u8]) -> Result<SteerResult, PipelineError> {
        let work = &mut self.work;
        work.extract_chroma(data)?;
        gaussian_blur_3x3(&work.u_raw, &mut work.u);
        gaussian_blur_3x3(&work.v_raw, &mut work.v);

        let sample = self.calibrator.sample(&mut work.u, &mut work.v);
        trace!(u = sample.u_sample, v = sample.v_sample, "color sample");
        self.last_sample = Some(sample);

        build_mask(&work.u, &work.v, sample, &mut work.mask);
        distance_transform(&work.mask, &mut work.distance);
        trace_ridge(&work.distance, &mut work.ridge, self.ridge_boost);
        normalize_min_max(&work.ridge, &mut work.normalized);

        self.steering.estimate(&work.ridge)
    }

    fn detect_light(&mut self, data: &[u8]) -> Result<(LightStatus, usize), PipelineError> {
        let work = &mut self.work;
        work.extract_luma(data)?;
        work.extract_chroma(data)?;
        pyr_down(&work.luma, &mut work.luma_small);
        merge_ycrcb_to_rgb(&work.luma_small, &work.u_raw, &work.v_raw, &mut work.rgb);
        Ok(self.light.classify(&work.rgb))
    }

    /// Thresholds used by the most recent cone-tracking frame.
    pub fn last_sample(&self) -> Option<ColorSample> {
        self.last_sample
    }

    pub fn working_set(&self) -> &WorkingSet {
        &self.work
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{CaptureSource, SyntheticSource};

    fn config(calibrate: bool) -> Config {
        let mut config = Config::default();
        config.calibration.enabled = calibrate;
        config
    }

    fn synthetic_frame(config: &Config, lane: Option<(usize, usize)>) -> FrameBuffer {
        let mut source = SyntheticSource::new(config.capture.width, config.capture.height);
        if let Some((center, half_width)) = lane {
            source = source.with_lane(center, half_width);
        }
        source.start().unwrap();
        source.queue(FrameBuffer::new(config.capture.frame_len())).unwrap();
        source.dequeue().unwrap().unwrap()
    }

    #[test]
    fn centered_lane_steers_straight() {
        let config = config(false);
        let mut processor = FrameProcessor::new(&config);
        let ctx = processor
            .process(OperatingMode::ConeTracking, &synthetic_frame(&config, None))
            .unwrap();

        assert_eq!(ctx.mode, OperatingMode::ConeTracking);
        assert_eq!(ctx.light, LightStatus::None);
        assert_eq!(ctx.steer.angle, 90.0);
        // Equidistant columns 159 and 160 tie; the lower one wins
        assert_eq!(ctx.steer.offset, 1.0);
    }

    #[test]
    fn shifted_lane_moves_offset() {
        let config = config(false);
        let mut processor = FrameProcessor::new(&config);
        let ctx = processor
            .process(OperatingMode::ConeTracking, &synthetic_frame(&config, Some((140, 100))))
            .unwrap();
        // Lane spans columns 40..240; columns 139 and 140 tie
        assert_eq!(ctx.steer.offset, 21.0);
        assert_eq!(ctx.steer.angle, 90.0);
    }

    #[test]
    fn calibration_blacks_out_patch() {
        let config = config(true);
        let mut processor = FrameProcessor::new(&config);
        processor
            .process(OperatingMode::ConeTracking, &synthetic_frame(&config, None))
            .unwrap();

        let sample = processor.last_sample().unwrap();
        assert_eq!(sample.u_sample, 128.0);
        assert_eq!(sample.v_sample, 128.0);
        let work = processor.working_set();
        for y in 215..238 {
            assert!(work.u.row(y)[135..185].iter().all(|&p| p == 0));
            assert!(work.v.row(y)[135..185].iter().all(|&p| p == 0));
        }
    }

    #[test]
    fn grey_scene_has_no_light() {
        let config = config(false);
        let mut processor = FrameProcessor::new(&config);
        let ctx = processor
            .process(OperatingMode::LightDetection, &synthetic_frame(&config, None))
            .unwrap();
        assert_eq!(ctx.light, LightStatus::None);
        assert_eq!(ctx.steer, SteerResult::default());
    }

    #[test]
    fn green_scene_is_detected() {
        let config = config(false);
        let mut processor = FrameProcessor::new(&config);
        let mut frame = FrameBuffer::new(config.capture.frame_len());
        let layout = PlaneLayout::new(640, 480);
        let dst = frame.writable().unwrap();
        dst[..layout.luma_len()].fill(128);
        // Low Cr and Cb: saturated green after conversion
        dst[layout.luma_len()..].fill(60);
        frame.commit(layout.frame_len(), Default::default());

        let ctx = processor
            .process(OperatingMode::LightDetection, &frame)
            .unwrap();
        assert_eq!(ctx.light, LightStatus::Green);
        assert_eq!(ctx.light_pixels, 320 * 240);
    }

    #[test]
    fn short_frame_is_an_error() {
        let config = config(false);
        let mut processor = FrameProcessor::new(&config);
        let mut frame = FrameBuffer::new(config.capture.frame_len());
        frame.commit(100, Default::default());
        assert!(matches!(
            processor.process(OperatingMode::ConeTracking, &frame),
            Err(PipelineError::ShortFrame { .. })
        ));
    }
}
