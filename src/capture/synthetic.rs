//! Generated test pattern for runs without a camera.
//!
//! Renders a neutral grey scene whose chroma columns outside a lane are
//! target-colored, so the lane's centerline sits at `lane_center`.

use std::collections::VecDeque;
use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::capture::frame::{FrameBuffer, FrameMetadata, PlaneLayout};
use crate::capture::CaptureSource;
use crate::error::{CaptureError, QueueError};

const NEUTRAL: u8 = 128;
/// Chroma of the boundary stripes: low U, high V.
const TARGET_U: u8 = 60;
const TARGET_V: u8 = 200;
/// Default width of the target band on each side, in chroma columns.
const DEFAULT_STRIPE: isize = 10;

pub struct SyntheticSource {
    layout: PlaneLayout,
    /// Lane center and half width, in chroma columns.
    lane_center: isize,
    lane_half_width: isize,
    frame_interval: Option<Duration>,
    dropout_every: Option<u64>,
    last_frame: Option<Instant>,
    sequence: u64,
    started: bool,
    /// Empty buffers waiting to be rendered, oldest first.
    pending: VecDeque<FrameBuffer>,
}

impl SyntheticSource {
    pub fn new(width: u32, height: u32) -> Self {
        let layout = PlaneLayout::new(width as usize, height as usize);
        let (cw, _) = layout.chroma_size();
        Self {
            layout,
            lane_center: cw as isize / 2,
            lane_half_width: (cw as isize / 2 - DEFAULT_STRIPE).max(0),
            frame_interval: None,
            dropout_every: None,
            last_frame: None,
            sequence: 0,
            started: false,
            pending: VecDeque::new(),
        }
    }

    /// Pace delivery to `fps` frames per second.
    pub fn with_fps(mut self, fps: u32) -> Self {
        self.frame_interval = (fps > 0).then(|| Duration::from_secs(1) / fps);
        self
    }

    /// Place the lane, in chroma columns.
    pub fn with_lane(mut self, center: usize, half_width: usize) -> Self {
        self.lane_center = center as isize;
        self.lane_half_width = half_width as isize;
        self
    }

    /// Deliver a zero-length frame every `n`th frame.
    pub fn with_dropouts(mut self, n: u64) -> Self {
        self.dropout_every = (n > 0).then_some(n);
        self
    }

    fn is_target(&self, column: usize) -> bool {
        let x = column as isize;
        x < self.lane_center - self.lane_half_width || x >= self.lane_center + self.lane_half_width
    }

    fn render(&self, dst: &mut [u8]) {
        let luma_len = self.layout.luma_len();
        let chroma_len = self.layout.chroma_len();
        let (cw, _) = self.layout.chroma_size();

        dst[..luma_len].fill(NEUTRAL);
        let (u_plane, v_plane) = dst[luma_len..luma_len + 2 * chroma_len].split_at_mut(chroma_len);
        for (i, (u, v)) in u_plane.iter_mut().zip(v_plane.iter_mut()).enumerate() {
            if self.is_target(i % cw) {
                *u = TARGET_U;
                *v = TARGET_V;
            } else {
                *u = NEUTRAL;
                *v = NEUTRAL;
            }
        }
    }

    fn pace(&mut self) {
        if let (Some(interval), Some(last)) = (self.frame_interval, self.last_frame) {
            let elapsed = last.elapsed();
            if elapsed < interval {
                thread::sleep(interval - elapsed);
            }
        }
        self.last_frame = Some(Instant::now());
    }
}

impl CaptureSource for SyntheticSource {
    fn allocate(&mut self, count: usize) -> Result<Vec<FrameBuffer>, CaptureError> {
        let frame_len = self.layout.frame_len();
        Ok((0..count).map(|_| FrameBuffer::new(frame_len)).collect())
    }

    fn start(&mut self) -> Result<(), CaptureError> {
        debug!(
            width = self.layout.width,
            height = self.layout.height,
            "synthetic source started"
        );
        self.started = true;
        Ok(())
    }

    fn queue(&mut self, mut buffer: FrameBuffer) -> Result<(), QueueError> {
        let frame_len = self.layout.frame_len();
        match buffer.writable().map(|dst| dst.len()) {
            None => Err(QueueError::new(buffer, CaptureError::ForeignBuffer)),
            Some(capacity) if capacity < frame_len => Err(QueueError::new(
                buffer,
                CaptureError::Oversized {
                    actual: frame_len,
                    capacity,
                },
            )),
            Some(_) => {
                self.pending.push_back(buffer);
                Ok(())
            }
        }
    }

    fn queued(&self) -> usize {
        self.pending.len()
    }

    fn dequeue(&mut self) -> Result<Option<FrameBuffer>, CaptureError> {
        if !self.started {
            return Err(CaptureError::NotStarted);
        }
        let Some(mut buffer) = self.pending.pop_front() else {
            return Ok(None);
        };
        self.pace();
        self.sequence += 1;

        let frame_len = self.layout.frame_len();
        let dropped = self
            .dropout_every
            .is_some_and(|n| self.sequence % n == 0);
        let len = match buffer.writable() {
            Some(dst) if !dropped => {
                self.render(&mut dst[..frame_len]);
                frame_len
            }
            _ => 0,
        };

        buffer.commit(
            len,
            FrameMetadata {
                sequence: self.sequence,
                width: self.layout.width as u32,
                height: self.layout.height as u32,
                device_timestamp: None,
                captured_at: self.last_frame,
            },
        );
        Ok(Some(buffer))
    }

    fn stop(&mut self) -> Result<Vec<FrameBuffer>, CaptureError> {
        self.started = false;
        Ok(self.pending.drain(..).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started(width: u32, height: u32) -> SyntheticSource {
        let mut source = SyntheticSource::new(width, height);
        source.start().unwrap();
        source
    }

    #[test]
    fn renders_stripes_at_both_edges() {
        let mut source = started(64, 16);
        let buffers = source.allocate(1).unwrap();
        assert_eq!(buffers[0].capacity(), 64 * 16 * 3 / 2);
        for buffer in buffers {
            source.queue(buffer).unwrap();
        }
        let buffer = source.dequeue().unwrap().unwrap();

        let layout = PlaneLayout::new(64, 16);
        let u = layout.chroma_u(buffer.as_slice()).unwrap();
        let v = layout.chroma_v(buffer.as_slice()).unwrap();
        // 32 chroma columns, stripes cover 0..10 and 22..32
        assert_eq!(u[9], TARGET_U);
        assert_eq!(v[9], TARGET_V);
        assert_eq!(u[10], NEUTRAL);
        assert_eq!(u[21], NEUTRAL);
        assert_eq!(v[22], TARGET_V);
        assert!(layout.luma(buffer.as_slice()).unwrap().iter().all(|&y| y == NEUTRAL));
    }

    #[test]
    fn dropouts_deliver_empty_frames() {
        let mut source = started(16, 16).with_dropouts(2);
        for buffer in source.allocate(2).unwrap() {
            source.queue(buffer).unwrap();
        }
        assert!(!source.dequeue().unwrap().unwrap().is_empty());
        let second = source.dequeue().unwrap().unwrap();
        assert!(second.is_empty());
        assert_eq!(second.meta.sequence, 2);
        assert!(source.dequeue().unwrap().is_none());
    }

    #[test]
    fn buffers_come_back_in_queue_order() {
        let mut source = started(16, 16);
        let mut buffers = source.allocate(3).unwrap();
        buffers[1].meta.width = 99;
        for buffer in buffers {
            source.queue(buffer).unwrap();
        }
        source.dequeue().unwrap().unwrap();
        assert_eq!(source.queued(), 2);

        // Stop hands back what was still waiting
        let held = source.stop().unwrap();
        assert_eq!(held.len(), 2);
        assert_eq!(held[0].meta.width, 99);
        assert_eq!(source.queued(), 0);
    }

    #[test]
    fn undersized_buffers_are_refused() {
        let mut source = started(16, 16);
        let err = source.queue(FrameBuffer::new(10)).unwrap_err();
        assert!(matches!(err.source, CaptureError::Oversized { capacity: 10, .. }));
        assert_eq!(err.buffer.capacity(), 10);
        assert_eq!(source.queued(), 0);
    }

    #[test]
    fn dequeue_before_start_fails() {
        let mut source = SyntheticSource::new(16, 16);
        assert!(matches!(source.dequeue(), Err(CaptureError::NotStarted)));
    }
}
