//! Fixed-capacity pool of frame buffers shared by capture and pipeline.

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam::queue::ArrayQueue;
use crossbeam::utils::CachePadded;
use tracing::{debug, warn};

use crate::capture::frame::FrameBuffer;
use crate::error::PoolError;
use crate::MIN_BUFFER_COUNT;

/// Every buffer is either queued here or held by exactly one stage.
pub struct BufferPool {
    available: ArrayQueue<FrameBuffer>,
    capacity: usize,
    frame_len: usize,

    /// Statistics
    stats: CachePadded<Stats>,
}

#[derive(Default)]
struct Stats {
    acquired: AtomicU64,
    released: AtomicU64,
    exhausted: AtomicU64,
}

impl BufferPool {
    /// Pool of `capacity` zeroed heap buffers.
    pub fn new(capacity: usize, frame_len: usize) -> Result<Self, PoolError> {
        Self::from_buffers((0..capacity).map(|_| FrameBuffer::new(frame_len)).collect())
    }

    /// Pool over buffers supplied by a capture source. All must share one size.
    pub fn from_buffers(buffers: Vec<FrameBuffer>) -> Result<Self, PoolError> {
        let capacity = buffers.len();
        if capacity < MIN_BUFFER_COUNT as usize {
            return Err(PoolError::TooSmall(capacity, MIN_BUFFER_COUNT as usize));
        }

        let frame_len = buffers[0].capacity();
        let available = ArrayQueue::new(capacity);
        for mut buffer in buffers {
            if buffer.capacity() != frame_len {
                return Err(PoolError::SizeMismatch {
                    expected: frame_len,
                    actual: buffer.capacity(),
                });
            }
            buffer.reset();
            // Queue has room for exactly `capacity` buffers
            let _ = available.push(buffer);
        }
        debug!(capacity, frame_len, "buffer pool allocated");

        Ok(Self {
            available,
            capacity,
            frame_len,
            stats: CachePadded::new(Stats::default()),
        })
    }

    /// Take an empty buffer. Never blocks.
    pub fn acquire_empty(&self) -> Result<FrameBuffer, PoolError> {
        match self.available.pop() {
            Some(buffer) => {
                self.stats.acquired.fetch_add(1, Ordering::Relaxed);
                Ok(buffer)
            }
            None => {
                self.stats.exhausted.fetch_add(1, Ordering::Relaxed);
                Err(PoolError::Exhausted)
            }
        }
    }

    /// Return a buffer. Must be called exactly once per acquired buffer.
    pub fn release(&self, mut buffer: FrameBuffer) -> Result<(), PoolError> {
        if buffer.capacity() != self.frame_len {
            return Err(PoolError::SizeMismatch {
                expected: self.frame_len,
                actual: buffer.capacity(),
            });
        }
        buffer.reset();
        self.available
            .push(buffer)
            .map_err(|_| PoolError::Overfilled(self.capacity))?;
        self.stats.released.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    pub fn available(&self) -> usize {
        self.available.len()
    }

    /// Buffers held by the capture source or the pipeline.
    pub fn outstanding(&self) -> usize {
        self.capacity - self.available.len()
    }

    /// (acquired, released, exhausted)
    pub fn stats(&self) -> (u64, u64, u64) {
        (
            self.stats.acquired.load(Ordering::Relaxed),
            self.stats.released.load(Ordering::Relaxed),
            self.stats.exhausted.load(Ordering::Relaxed),
        )
    }
}

impl Drop for BufferPool {
    fn drop(&mut self) {
        let outstanding = self.outstanding();
        if outstanding > 0 {
            warn!(outstanding, "buffer pool destroyed with buffers still in flight");
        }
    }
}
