use std::fmt;
use std::time::{Duration, Instant};

use bytes::BytesMut;
use memmap2::Mmap;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Frame buffer recycled through the pool. Allocated once, never cloned.
///
/// Either heap storage a software source renders into, or one of the capture
/// driver's own buffers mapped into our address space. Mapped buffers are
/// read in place: the pipeline copies planes out of them, never whole frames.
pub struct FrameBuffer {
    storage: Storage,

    /// Bytes written by the capture source. Zero means an empty delivery.
    len: usize,

    pub meta: FrameMetadata,
}

enum Storage {
    Owned(BytesMut),
    Mapped { index: usize, map: Mmap },
}

/// Frame metadata
#[derive(Debug, Clone, Default)]
pub struct FrameMetadata {
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    pub device_timestamp: Option<Duration>, // Hardware timestamp if available
    pub captured_at: Option<Instant>,
}

/// Pixel formats we support
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    /// Planar Y, U, V at 4:2:0 (I420).
    Yu12,
}

impl PixelFormat {
    pub fn fourcc(self) -> [u8; 4] {
        match self {
            PixelFormat::Yu12 => *b"YU12",
        }
    }
}

impl FrameBuffer {
    /// Zeroed heap buffer.
    pub fn new(capacity: usize) -> Self {
        Self {
            storage: Storage::Owned(BytesMut::zeroed(capacity)),
            len: 0,
            meta: FrameMetadata::default(),
        }
    }

    /// Driver buffer `index`, already mapped.
    pub(crate) fn mapped(index: usize, map: Mmap) -> Self {
        Self {
            storage: Storage::Mapped { index, map },
            len: 0,
            meta: FrameMetadata::default(),
        }
    }

    fn bytes(&self) -> &[u8] {
        match &self.storage {
            Storage::Owned(data) => &data[..],
            Storage::Mapped { map, .. } => &map[..],
        }
    }

    pub fn capacity(&self) -> usize {
        self.bytes().len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Driver buffer index, `None` for heap buffers.
    pub fn slot(&self) -> Option<usize> {
        match self.storage {
            Storage::Owned(_) => None,
            Storage::Mapped { index, .. } => Some(index),
        }
    }

    /// Filled part of the buffer.
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes()[..self.len]
    }

    /// Whole backing storage for a software source to write into. `None`
    /// for driver buffers, which only the device writes.
    pub fn writable(&mut self) -> Option<&mut [u8]> {
        match &mut self.storage {
            Storage::Owned(data) => Some(&mut data[..]),
            Storage::Mapped { .. } => None,
        }
    }

    /// Mark `len` bytes as filled.
    pub fn commit(&mut self, len: usize, meta: FrameMetadata) {
        self.len = len.min(self.capacity());
        self.meta = meta;
    }

    /// Forget the previous frame before the buffer is reused.
    pub fn reset(&mut self) {
        self.len = 0;
        self.meta = FrameMetadata::default();
    }
}

impl fmt::Debug for FrameBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameBuffer")
            .field("slot", &self.slot())
            .field("capacity", &self.capacity())
            .field("len", &self.len)
            .field("sequence", &self.meta.sequence)
            .finish()
    }
}

/// Plane offsets of a planar 4:2:0 frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneLayout {
    pub width: usize,
    pub height: usize,
}

impl PlaneLayout {
    pub fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }

    pub fn luma_len(&self) -> usize {
        self.width * self.height
    }

    pub fn chroma_len(&self) -> usize {
        self.luma_len() / 4
    }

    pub fn frame_len(&self) -> usize {
        self.luma_len() + 2 * self.chroma_len()
    }

    pub fn chroma_size(&self) -> (usize, usize) {
        (self.width / 2, self.height / 2)
    }

    fn check(&self, data: &[u8]) -> Result<(), PipelineError> {
        if data.len() < self.frame_len() {
            return Err(PipelineError::ShortFrame {
                expected: self.frame_len(),
                actual: data.len(),
            });
        }
        Ok(())
    }

    pub fn luma<'a>(&self, data: &'a [u8]) -> Result<&'a [u8], PipelineError> {
        self.check(data)?;
        Ok(&data[..self.luma_len()])
    }

    pub fn chroma_u<'a>(&self, data: &'a [u8]) -> Result<&'a [u8], PipelineError> {
        self.check(data)?;
        let start = self.luma_len();
        Ok(&data[start..start + self.chroma_len()])
    }

    pub fn chroma_v<'a>(&self, data: &'a [u8]) -> Result<&'a [u8], PipelineError> {
        self.check(data)?;
        let start = self.luma_len() + self.chroma_len();
        Ok(&data[start..start + self.chroma_len()])
    }
}
