//! Error types for every stage of the loop.

use thiserror::Error;

use crate::capture::FrameBuffer;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error(transparent)]
    Serial(#[from] SerialError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("capture device I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("device {0} doesn't support video capture")]
    NotCapture(String),
    #[error("device negotiated {actual}, wanted {wanted}")]
    FormatMismatch { wanted: String, actual: String },
    #[error("no suitable capture device found")]
    NoDevice,
    #[error("stream not started")]
    NotStarted,
    #[error("frame of {actual} bytes doesn't fit a {capacity} byte buffer")]
    Oversized { actual: usize, capacity: usize },
    #[error("driver returned buffer {0}, which was never queued")]
    UnknownSlot(usize),
    #[error("buffer doesn't belong to this source")]
    ForeignBuffer,
}

/// A buffer the capture source refused, handed back so it can go home.
#[derive(Debug, Error)]
#[error("failed to queue capture buffer: {source}")]
pub struct QueueError {
    pub buffer: FrameBuffer,
    #[source]
    pub source: CaptureError,
}

impl QueueError {
    pub fn new(buffer: FrameBuffer, source: CaptureError) -> Self {
        Self { buffer, source }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("buffer pool exhausted")]
    Exhausted,
    #[error("buffer pool already holds all {0} buffers")]
    Overfilled(usize),
    #[error("buffer of {actual} bytes doesn't belong to a pool of {expected} byte buffers")]
    SizeMismatch { expected: usize, actual: usize },
    #[error("pool capacity {0} is below the minimum of {1}")]
    TooSmall(usize, usize),
}

#[derive(Debug, Error)]
pub enum SerialError {
    #[error("failed to open serial port: {0}")]
    Open(#[from] serialport::Error),
    #[error("serial I/O: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("frame holds {actual} bytes, planes need {expected}")]
    ShortFrame { expected: usize, actual: usize },
    #[error("row {row} is outside an image of {height} rows")]
    RowOutOfRange { row: usize, height: usize },
}
