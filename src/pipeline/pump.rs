//! Frame pump: moves buffers between the pool, the capture thread and the
//! per-frame pipeline, and closes the loop over the serial link.
//!
//! ```text
//!            empty (bounded)               filled (bounded)
//!   pool ─▶ driver ──────────▶ capture ──────────────▶ driver ─▶ process
//!    ▲                                                   │
//!    └──────────────────── release ◀── serial exchange ◀─┘
//! ```
//!
//! Exactly one frame is processed at a time, in delivery order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use flume::{Receiver, RecvTimeoutError, Sender};
use tracing::{debug, error, info, trace, warn};

use crate::capture::{BufferPool, CaptureSource, FrameBuffer};
use crate::error::{CaptureError, ConfigError, Error};
use crate::pipeline::context::{FrameContext, OperatingMode};
use crate::pipeline::fps::FpsMeter;
use crate::pipeline::processor::FrameProcessor;
use crate::pipeline::status::{PipelineState, PipelineStatus, StatusBoard};
use crate::serial::{Link, SerialExchange};
use crate::Config;

/// How often the driver wakes up to check the stop flag.
const POLL_INTERVAL: Duration = Duration::from_millis(20);
/// Back-off after a failed capture before trying again.
const CAPTURE_RETRY_DELAY: Duration = Duration::from_millis(10);
/// Frames in the sliding FPS window.
const FPS_WINDOW: usize = 60;

/// Totals reported when the pump shuts down.
#[derive(Debug, Clone)]
pub struct PumpSummary {
    pub status: PipelineStatus,
    pub elapsed: Duration,
    pub average_fps: f64,
    /// Buffers that never made it back to the pool.
    pub leaked_buffers: usize,
}

pub struct FramePump {
    pool: Arc<BufferPool>,
    processor: FrameProcessor,
    serial: Option<SerialExchange<Box<dyn Link>>>,
    board: Arc<StatusBoard>,
    stop: Arc<AtomicBool>,
    status: PipelineStatus,
    fps: FpsMeter,
    report_interval: u64,
}

impl FramePump {
    pub fn new(
        config: &Config,
        pool: Arc<BufferPool>,
        serial: Option<SerialExchange<Box<dyn Link>>>,
        board: Arc<StatusBoard>,
        stop: Arc<AtomicBool>,
    ) -> Result<Self, Error> {
        let needed = config.capture.frame_len();
        if pool.frame_len() < needed {
            return Err(ConfigError::Invalid(format!(
                "pool buffers hold {} bytes, frames need {}",
                pool.frame_len(),
                needed
            ))
            .into());
        }

        let mut pump = Self {
            pool,
            processor: FrameProcessor::new(config),
            serial,
            board,
            stop,
            status: PipelineStatus::default(),
            fps: FpsMeter::new(FPS_WINDOW, Instant::now()),
            report_interval: config.pipeline.report_interval_frames.max(1),
        };
        pump.transition(PipelineState::Configured);
        Ok(pump)
    }

    /// Move to `next` and publish it.
    fn transition(&mut self, next: PipelineState) {
        debug!(from = %self.status.state, to = %next, "pipeline state");
        self.status.state = next;
        self.board.publish(self.status.clone());
    }

    /// Start `source`, then pump frames until the stop flag is raised or the
    /// capture thread goes away. Returns once every buffer is back in the pool.
    pub fn run<S>(mut self, mut source: S) -> Result<PumpSummary, Error>
    where
        S: CaptureSource + 'static,
    {
        source.start()?;

        let capacity = self.pool.capacity();
        let (empty_tx, empty_rx) = flume::bounded::<FrameBuffer>(capacity);
        let (filled_tx, filled_rx) = flume::bounded::<FrameBuffer>(capacity);

        let capture = spawn_capture(
            source,
            empty_rx,
            filled_tx,
            self.pool.clone(),
            self.stop.clone(),
        )?;

        // Hand every buffer to the capture thread
        for _ in 0..capacity {
            match self.pool.acquire_empty() {
                Ok(buffer) => self.send_empty(&empty_tx, buffer),
                Err(e) => {
                    error!("Unable to get a required buffer from pool: {}", e);
                    break;
                }
            }
        }

        self.fps = FpsMeter::new(FPS_WINDOW, Instant::now());
        self.transition(PipelineState::Capturing(self.status.mode));
        info!(buffers = capacity, mode = %self.status.mode, "capture started");

        while !self.stop.load(Ordering::Acquire) {
            match filled_rx.recv_timeout(POLL_INTERVAL) {
                Ok(buffer) => self.handle_frame(buffer, &empty_tx),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    warn!("capture thread ended unexpectedly");
                    break;
                }
            }
        }

        self.transition(PipelineState::Draining);
        self.stop.store(true, Ordering::Release);
        drop(empty_tx);

        // Frames still in flight are returned unprocessed
        let mut flushed = 0usize;
        for buffer in filled_rx.iter() {
            self.release(buffer);
            flushed += 1;
        }
        match capture.join() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Capture source failed to stop cleanly: {}", e),
            Err(_) => error!("capture thread panicked"),
        }

        let now = Instant::now();
        let leaked_buffers = self.pool.outstanding();
        if leaked_buffers > 0 {
            warn!(leaked_buffers, "buffers not returned to the pool");
        }
        self.transition(PipelineState::Destroyed);
        debug!(flushed, "drain complete");

        Ok(PumpSummary {
            status: self.status.clone(),
            elapsed: self.fps.elapsed(now),
            average_fps: self.fps.average_fps(now),
            leaked_buffers,
        })
    }

    fn handle_frame(&mut self, buffer: FrameBuffer, empty_tx: &Sender<FrameBuffer>) {
        if buffer.is_empty() {
            warn!(sequence = buffer.meta.sequence, "buffer null, frame dropped");
            self.status.frames_dropped += 1;
            metrics::counter!("frames_dropped").increment(1);
        } else {
            self.process_frame(&buffer);
        }

        self.release(buffer);
        self.rearm(empty_tx);
        self.board.publish(self.status.clone());
    }

    fn process_frame(&mut self, buffer: &FrameBuffer) {
        let started = Instant::now();
        let mode = self.status.mode;

        let ctx = match self.processor.process(mode, buffer) {
            Ok(ctx) => ctx,
            Err(e) => {
                warn!(sequence = buffer.meta.sequence, "frame dropped: {}", e);
                self.status.frames_dropped += 1;
                metrics::counter!("frames_dropped").increment(1);
                return;
            }
        };
        metrics::histogram!("pipeline_time_us").record(started.elapsed().as_micros() as f64);

        match ctx.mode {
            OperatingMode::ConeTracking => debug!(
                sequence = ctx.sequence,
                "Offset: {:3.2}  and  Angle: {:3.2}",
                ctx.steer.offset,
                ctx.steer.angle
            ),
            OperatingMode::LightDetection => debug!(
                sequence = ctx.sequence,
                pixels = ctx.light_pixels,
                light = ?ctx.light,
                "light check"
            ),
        }

        // Commit before talking to the controller
        self.status.last_frame = Some(ctx);
        self.status.frames_processed += 1;
        metrics::counter!("frames_processed").increment(1);

        self.exchange(&ctx);

        let now = Instant::now();
        self.fps.tick(now);
        if self.fps.frames() % self.report_interval == 0 {
            let fps = self.fps.average_fps(now);
            metrics::gauge!("capture_fps").set(fps);
            info!(
                "{:.0} seconds for {} frames : FPS = {:.2} (recent {:.2})",
                self.fps.elapsed(now).as_secs_f64(),
                self.fps.frames(),
                fps,
                self.fps.recent_fps()
            );
        }
    }

    fn exchange(&mut self, ctx: &FrameContext) {
        let Some(serial) = self.serial.as_mut() else {
            return;
        };
        match serial.exchange(ctx.light, ctx.steer) {
            Ok(Some(byte)) => self.apply_mode_byte(byte),
            Ok(None) => trace!("no mode byte received"),
            Err(e) => {
                warn!("Serial exchange failed: {}", e);
                self.status.serial_errors += 1;
                metrics::counter!("serial_errors").increment(1);
            }
        }
    }

    fn apply_mode_byte(&mut self, byte: u8) {
        match OperatingMode::from_byte(byte) {
            Some(mode) if mode != self.status.mode => {
                info!(from = %self.status.mode, to = %mode, "operating mode changed");
                self.status.mode = mode;
                self.transition(PipelineState::Capturing(mode));
            }
            Some(_) => {}
            None => warn!(byte, "ignoring unknown mode byte"),
        }
    }

    fn release(&self, buffer: FrameBuffer) {
        if let Err(e) = self.pool.release(buffer) {
            error!("Unable to return a buffer to the pool: {}", e);
        }
    }

    /// Replace the buffer just consumed so capture keeps flowing.
    fn rearm(&mut self, empty_tx: &Sender<FrameBuffer>) {
        match self.pool.acquire_empty() {
            Ok(buffer) => self.send_empty(empty_tx, buffer),
            Err(e) => {
                warn!("Unable to return a buffer to the capture source: {}", e);
                self.status.pool_starved += 1;
                metrics::counter!("pool_starved").increment(1);
            }
        }
    }

    fn send_empty(&self, empty_tx: &Sender<FrameBuffer>, buffer: FrameBuffer) {
        if let Err(e) = empty_tx.send(buffer) {
            self.release(e.into_inner());
        }
    }
}

fn spawn_capture<S>(
    source: S,
    empty_rx: Receiver<FrameBuffer>,
    filled_tx: Sender<FrameBuffer>,
    pool: Arc<BufferPool>,
    stop: Arc<AtomicBool>,
) -> Result<JoinHandle<Result<(), CaptureError>>, CaptureError>
where
    S: CaptureSource + 'static,
{
    let handle = thread::Builder::new()
        .name("capture".into())
        .spawn(move || capture_loop(source, empty_rx, filled_tx, pool, stop))?;
    Ok(handle)
}

/// Keep the source supplied with empty buffers and forward what it fills.
/// Once stop is raised, every buffer still in the capture thread's hands or
/// on its way there goes back to the pool.
fn capture_loop<S: CaptureSource>(
    mut source: S,
    empty_rx: Receiver<FrameBuffer>,
    filled_tx: Sender<FrameBuffer>,
    pool: Arc<BufferPool>,
    stop: Arc<AtomicBool>,
) -> Result<(), CaptureError> {
    let give_back = |buffer: FrameBuffer| {
        if let Err(e) = pool.release(buffer) {
            error!("Unable to return a buffer to the pool: {}", e);
        }
    };

    while !stop.load(Ordering::Acquire) {
        // With nothing queued, wait for the driver to hand a buffer over
        let first = if source.queued() == 0 {
            match empty_rx.recv_timeout(POLL_INTERVAL) {
                Ok(buffer) => Some(buffer),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        } else {
            None
        };
        for buffer in first.into_iter().chain(empty_rx.try_iter()) {
            if let Err(e) = source.queue(buffer) {
                error!("Unable to queue a capture buffer: {}", e.source);
                give_back(e.buffer);
            }
        }
        if source.queued() == 0 {
            continue;
        }

        match source.dequeue() {
            Ok(Some(buffer)) => {
                if let Err(e) = filled_tx.send(buffer) {
                    give_back(e.into_inner());
                }
            }
            Ok(None) => trace!("no frame within the dequeue timeout"),
            Err(e) => {
                error!("Capture error: {}", e);
                thread::sleep(CAPTURE_RETRY_DELAY);
            }
        }
    }

    // Runs until the driver, now draining, drops its sender
    for buffer in empty_rx.iter() {
        give_back(buffer);
    }
    for buffer in source.stop()? {
        give_back(buffer);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::SyntheticSource;
    use crate::error::QueueError;
    use std::io::{self, Read, Write};
    use std::sync::Mutex;

    fn small_config() -> Config {
        let mut config = Config::default();
        config.capture.width = 64;
        config.capture.height = 48;
        config.steering.near_row = 20;
        config.steering.far_row = 10;
        config.steering.midline_x = 16;
        config
    }

    fn pump_with(
        serial: Option<SerialExchange<Box<dyn Link>>>,
    ) -> (FramePump, Arc<StatusBoard>, Arc<AtomicBool>) {
        let config = small_config();
        let pool = Arc::new(BufferPool::new(3, config.capture.frame_len()).unwrap());
        let board = Arc::new(StatusBoard::new());
        let stop = Arc::new(AtomicBool::new(false));
        let pump = FramePump::new(&config, pool, serial, board.clone(), stop.clone()).unwrap();
        (pump, board, stop)
    }

    /// Controller whose line is dead on the read side.
    struct BrokenLink;

    impl Read for BrokenLink {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::ErrorKind::BrokenPipe.into())
        }
    }

    impl Write for BrokenLink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Synthetic source that notes the published state when it is stopped.
    struct Watched {
        inner: SyntheticSource,
        board: Arc<StatusBoard>,
        state_at_stop: Arc<Mutex<Option<PipelineState>>>,
    }

    impl CaptureSource for Watched {
        fn allocate(&mut self, count: usize) -> Result<Vec<FrameBuffer>, CaptureError> {
            self.inner.allocate(count)
        }

        fn start(&mut self) -> Result<(), CaptureError> {
            self.inner.start()
        }

        fn queue(&mut self, buffer: FrameBuffer) -> Result<(), QueueError> {
            self.inner.queue(buffer)
        }

        fn queued(&self) -> usize {
            self.inner.queued()
        }

        fn dequeue(&mut self) -> Result<Option<FrameBuffer>, CaptureError> {
            self.inner.dequeue()
        }

        fn stop(&mut self) -> Result<Vec<FrameBuffer>, CaptureError> {
            *self.state_at_stop.lock().unwrap() = Some(self.board.load().state);
            self.inner.stop()
        }
    }

    #[test]
    fn new_pump_is_configured() {
        let (_pump, board, _) = pump_with(None);
        assert_eq!(board.load().state, PipelineState::Configured);
    }

    #[test]
    fn rearm_with_empty_pool_counts_starvation() {
        let (mut pump, _, _) = pump_with(None);
        let held: Vec<_> = (0..3).map(|_| pump.pool.acquire_empty().unwrap()).collect();
        let (tx, rx) = flume::bounded(3);

        pump.rearm(&tx);
        assert_eq!(pump.status.pool_starved, 1);
        assert!(rx.is_empty());

        // Capture picks up again as soon as a buffer is back
        for buffer in held {
            pump.release(buffer);
        }
        pump.rearm(&tx);
        assert_eq!(pump.status.pool_starved, 1);
        assert_eq!(rx.len(), 1);
        for buffer in rx.try_iter() {
            pump.release(buffer);
        }
        assert_eq!(pump.pool.outstanding(), 0);
    }

    #[test]
    fn mode_bytes_switch_the_capturing_state() {
        let (mut pump, board, _) = pump_with(None);
        pump.transition(PipelineState::Capturing(OperatingMode::ConeTracking));

        pump.apply_mode_byte(1);
        assert_eq!(
            board.load().state,
            PipelineState::Capturing(OperatingMode::LightDetection)
        );
        assert_eq!(pump.status.mode, OperatingMode::LightDetection);

        pump.apply_mode_byte(9);
        assert_eq!(pump.status.mode, OperatingMode::LightDetection);

        pump.apply_mode_byte(0);
        assert_eq!(
            board.load().state,
            PipelineState::Capturing(OperatingMode::ConeTracking)
        );
    }

    #[test]
    fn serial_failure_keeps_the_mode() {
        let serial = SerialExchange::new(Box::new(BrokenLink) as Box<dyn Link>);
        let (mut pump, _, _) = pump_with(Some(serial));
        pump.apply_mode_byte(1);

        let ctx = FrameContext::new(1, OperatingMode::LightDetection);
        pump.exchange(&ctx);
        pump.exchange(&ctx);
        assert_eq!(pump.status.serial_errors, 2);
        assert_eq!(pump.status.mode, OperatingMode::LightDetection);
    }

    #[test]
    fn run_walks_the_state_machine() {
        let (pump, board, stop) = pump_with(None);
        let state_at_stop = Arc::new(Mutex::new(None));
        let source = Watched {
            inner: SyntheticSource::new(64, 48),
            board: board.clone(),
            state_at_stop: state_at_stop.clone(),
        };

        let handle = thread::spawn(move || pump.run(source));
        let deadline = Instant::now() + Duration::from_secs(10);
        while board.load().frames_processed < 3 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(
            board.load().state,
            PipelineState::Capturing(OperatingMode::ConeTracking)
        );

        stop.store(true, Ordering::Release);
        let summary = handle.join().unwrap().unwrap();

        assert_eq!(*state_at_stop.lock().unwrap(), Some(PipelineState::Draining));
        assert_eq!(board.load().state, PipelineState::Destroyed);
        assert_eq!(summary.status.state, PipelineState::Destroyed);
        assert_eq!(summary.leaked_buffers, 0);
    }
}
