//! V4L2 capture of planar 4:2:0 frames
//!
//! The driver's own buffers are mapped once and handed to the pool as
//! `FrameBuffer`s. Capturing a frame is a QBUF/DQBUF round trip on the
//! buffer's index; the frame bytes are never copied out of the mapping.

use std::io;
use std::mem;
use std::os::raw::c_void;
use std::sync::Arc;
use std::time::{Duration, Instant};

use memmap2::MmapOptions;
use tracing::{debug, info, instrument, warn};
use v4l::buffer::{Flags as BufFlags, Type};
use v4l::capability::Flags as CapFlags;
use v4l::device::Handle;
use v4l::memory::Memory;
use v4l::timestamp::Timestamp;
use v4l::v4l_sys::{v4l2_buffer, v4l2_requestbuffers};
use v4l::video::capture::Parameters;
use v4l::video::Capture;
use v4l::{v4l2, Device, FourCC};

use crate::{
    capture::frame::{FrameBuffer, FrameMetadata},
    capture::CaptureSource,
    error::{CaptureError, QueueError},
    CaptureConfig,
};

/// How long one dequeue waits before handing control back to the caller.
const DEQUEUE_TIMEOUT_MS: i32 = 100;

/// Camera capture through memory-mapped V4L2 buffers
pub struct V4l2Capture {
    /// Keeps the descriptor open; mappings held by the pool outlive it.
    handle: Arc<Handle>,
    config: CaptureConfig,
    /// Buffers currently owned by the driver, by index.
    slots: Vec<Option<FrameBuffer>>,
    queued: usize,
    started: bool,
    streaming: bool,
    sequence: u64,
}

impl V4l2Capture {
    /// Open the device and negotiate size, format and frame rate.
    pub fn new(config: CaptureConfig) -> Result<Self, CaptureError> {
        info!("Initializing V4L2 capture: {:?}", config.device);

        let device = Device::with_path(&config.device.path)?;

        // Query capabilities
        let caps = device.query_caps()?;
        info!("Device: {} ({})", caps.card, caps.driver);

        if !caps.capabilities.contains(CapFlags::VIDEO_CAPTURE) {
            return Err(CaptureError::NotCapture(config.device.path.clone()));
        }

        // Set format
        let wanted = FourCC::new(&config.format.fourcc());
        let mut fmt = device.format()?;
        fmt.width = config.width;
        fmt.height = config.height;
        fmt.fourcc = wanted;

        let actual = device.set_format(&fmt)?;
        if actual.fourcc != wanted || actual.width != config.width || actual.height != config.height
        {
            return Err(CaptureError::FormatMismatch {
                wanted: format!("{} {}x{}", wanted, config.width, config.height),
                actual: format!("{} {}x{}", actual.fourcc, actual.width, actual.height),
            });
        }

        device.set_params(&Parameters::with_fps(config.fps))?;

        Ok(Self {
            handle: device.handle(),
            config,
            slots: Vec::new(),
            queued: 0,
            started: false,
            streaming: false,
            sequence: 0,
        })
    }

    fn ioctl<T>(&self, request: v4l2::vidioc::_IOC_TYPE, arg: &mut T) -> io::Result<()> {
        // SAFETY: `arg` is the structure `request` is defined over and lives
        // for the duration of the call.
        unsafe { v4l2::ioctl(self.handle.fd(), request, arg as *mut T as *mut c_void) }
    }

    fn set_streaming(&mut self, on: bool) -> io::Result<()> {
        let mut typ = Type::VideoCapture as u32;
        let request = if on {
            v4l2::vidioc::VIDIOC_STREAMON
        } else {
            v4l2::vidioc::VIDIOC_STREAMOFF
        };
        self.ioctl(request, &mut typ)?;
        self.streaming = on;
        Ok(())
    }
}

fn buffer_desc(index: u32) -> v4l2_buffer {
    v4l2_buffer {
        index,
        type_: Type::VideoCapture as u32,
        memory: Memory::Mmap as u32,
        // SAFETY: plain C struct, all-zero is its documented initial state
        ..unsafe { mem::zeroed() }
    }
}

impl CaptureSource for V4l2Capture {
    /// Request `count` driver buffers and map each one.
    fn allocate(&mut self, count: usize) -> Result<Vec<FrameBuffer>, CaptureError> {
        let mut request = v4l2_requestbuffers {
            count: count as u32,
            type_: Type::VideoCapture as u32,
            memory: Memory::Mmap as u32,
            // SAFETY: plain C struct
            ..unsafe { mem::zeroed() }
        };
        self.ioctl(v4l2::vidioc::VIDIOC_REQBUFS, &mut request)?;
        if request.count as usize != count {
            warn!(requested = count, granted = request.count, "driver adjusted buffer count");
        }

        let mut buffers = Vec::with_capacity(request.count as usize);
        for index in 0..request.count {
            let mut desc = buffer_desc(index);
            self.ioctl(v4l2::vidioc::VIDIOC_QUERYBUF, &mut desc)?;
            // SAFETY: QUERYBUF on an MMAP buffer fills the `offset` member
            let offset = unsafe { desc.m.offset };
            // SAFETY: the mapping stays valid for as long as it exists, the
            // device only writes into it while the buffer is queued.
            let map = unsafe {
                MmapOptions::new()
                    .offset(offset as u64)
                    .len(desc.length as usize)
                    .map(self.handle.fd())?
            };
            buffers.push(FrameBuffer::mapped(index as usize, map));
        }

        self.slots = (0..buffers.len()).map(|_| None).collect();
        debug!(buffers = buffers.len(), "driver buffers mapped");
        Ok(buffers)
    }

    fn start(&mut self) -> Result<(), CaptureError> {
        if self.slots.is_empty() {
            return Err(CaptureError::NotStarted);
        }
        self.started = true;
        info!("Capture stream ready with {} buffers", self.slots.len());
        Ok(())
    }

    fn queue(&mut self, buffer: FrameBuffer) -> Result<(), QueueError> {
        let Some(index) = buffer.slot().filter(|&i| i < self.slots.len()) else {
            return Err(QueueError::new(buffer, CaptureError::ForeignBuffer));
        };
        if self.slots[index].is_some() {
            return Err(QueueError::new(buffer, CaptureError::ForeignBuffer));
        }

        let mut desc = buffer_desc(index as u32);
        if let Err(e) = self.ioctl(v4l2::vidioc::VIDIOC_QBUF, &mut desc) {
            return Err(QueueError::new(buffer, e.into()));
        }
        self.slots[index] = Some(buffer);
        self.queued += 1;
        Ok(())
    }

    fn queued(&self) -> usize {
        self.queued
    }

    #[instrument(level = "trace", skip(self))]
    fn dequeue(&mut self) -> Result<Option<FrameBuffer>, CaptureError> {
        if !self.started {
            return Err(CaptureError::NotStarted);
        }
        // Stream on once the first buffers are with the driver
        if !self.streaming {
            self.set_streaming(true)?;
        }

        if self.handle.poll(libc::POLLIN, DEQUEUE_TIMEOUT_MS)? == 0 {
            return Ok(None);
        }
        let captured_at = Instant::now();

        let mut desc = buffer_desc(0);
        self.ioctl(v4l2::vidioc::VIDIOC_DQBUF, &mut desc)?;
        let index = desc.index as usize;
        let mut buffer = self
            .slots
            .get_mut(index)
            .and_then(Option::take)
            .ok_or(CaptureError::UnknownSlot(index))?;
        self.queued -= 1;

        // Corrupt frames are delivered empty and dropped downstream
        let used = if BufFlags::from_bits_truncate(desc.flags).contains(BufFlags::ERROR) {
            0
        } else {
            desc.bytesused as usize
        };

        self.sequence += 1;
        buffer.commit(
            used,
            FrameMetadata {
                sequence: self.sequence,
                width: self.config.width,
                height: self.config.height,
                device_timestamp: Some(Duration::from(Timestamp::from(desc.timestamp))),
                captured_at: Some(captured_at),
            },
        );
        Ok(Some(buffer))
    }

    fn stop(&mut self) -> Result<Vec<FrameBuffer>, CaptureError> {
        self.started = false;
        if self.streaming {
            // STREAMOFF returns every queued buffer to us
            if let Err(e) = self.set_streaming(false) {
                warn!("Failed to stop the capture stream: {}", e);
            }
            info!("Capture stream stopped after {} frames", self.sequence);
        }
        self.queued = 0;
        Ok(self.slots.iter_mut().filter_map(Option::take).collect())
    }
}

impl Drop for V4l2Capture {
    fn drop(&mut self) {
        if self.streaming {
            let _ = self.set_streaming(false);
        }
        debug!(device = %self.config.device.path, "capture device closed");
    }
}
