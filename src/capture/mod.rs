pub mod frame;
pub mod pool;
pub mod synthetic;
pub mod v4l2;

pub use frame::{FrameBuffer, FrameMetadata, PixelFormat, PlaneLayout};
pub use pool::BufferPool;
pub use synthetic::SyntheticSource;
pub use v4l2::V4l2Capture;

use crate::error::{CaptureError, QueueError};

/// Boundary to whatever produces raw frames.
///
/// The source supplies the buffers the pool owns, then only ever fills buffers
/// handed back to it through `queue`. Frames come out of `dequeue` in the
/// order the source filled them.
pub trait CaptureSource: Send {
    /// Buffers for the pool, created once before `start`.
    fn allocate(&mut self, count: usize) -> Result<Vec<FrameBuffer>, CaptureError>;

    /// Negotiate the format and get ready to stream.
    fn start(&mut self) -> Result<(), CaptureError>;

    /// Give an empty buffer to the source. A refused buffer comes back in
    /// the error.
    fn queue(&mut self, buffer: FrameBuffer) -> Result<(), QueueError>;

    /// Buffers currently held by the source.
    fn queued(&self) -> usize;

    /// Wait for the next filled buffer. `Ok(None)` when nothing arrived in
    /// time, so the caller can check for shutdown.
    fn dequeue(&mut self) -> Result<Option<FrameBuffer>, CaptureError>;

    /// Stop streaming and hand back every buffer still held.
    fn stop(&mut self) -> Result<Vec<FrameBuffer>, CaptureError>;
}

impl<S: CaptureSource + ?Sized> CaptureSource for Box<S> {
    fn allocate(&mut self, count: usize) -> Result<Vec<FrameBuffer>, CaptureError> {
        (**self).allocate(count)
    }

    fn start(&mut self) -> Result<(), CaptureError> {
        (**self).start()
    }

    fn queue(&mut self, buffer: FrameBuffer) -> Result<(), QueueError> {
        (**self).queue(buffer)
    }

    fn queued(&self) -> usize {
        (**self).queued()
    }

    fn dequeue(&mut self) -> Result<Option<FrameBuffer>, CaptureError> {
        (**self).dequeue()
    }

    fn stop(&mut self) -> Result<Vec<FrameBuffer>, CaptureError> {
        (**self).stop()
    }
}
