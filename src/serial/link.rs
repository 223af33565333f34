//! Write-then-read exchange with the motor controller.

use std::io::{self, Read, Write};
use std::time::Duration;

use tracing::{info, instrument};

use crate::error::SerialError;
use crate::serial::frame::SerialFrame;
use crate::vision::{LightStatus, SteerResult};
use crate::SerialConfig;

/// Anything the exchange can talk through: a serial port or a test double.
pub trait Link: Read + Write + Send {}

impl<T: Read + Write + Send + ?Sized> Link for T {}

/// One outbound frame, one inbound byte, no acknowledgment or retry.
pub struct SerialExchange<L> {
    link: L,
    frame: SerialFrame,
    inbound: [u8; 1],
}

impl SerialExchange<Box<dyn Link>> {
    /// Open the configured port. The read timeout bounds the mode-byte wait.
    pub fn open(config: &SerialConfig) -> Result<Self, SerialError> {
        let port = serialport::new(&config.port, config.baud_rate)
            .timeout(Duration::from_millis(config.read_timeout_ms))
            .open()?;
        info!(port = %config.port, baud = config.baud_rate, "serial link open");
        Ok(Self::new(Box::new(port)))
    }
}

impl<L: Link> SerialExchange<L> {
    pub fn new(link: L) -> Self {
        Self {
            link,
            frame: SerialFrame::new(),
            inbound: [0],
        }
    }

    pub fn frame(&self) -> &SerialFrame {
        &self.frame
    }

    /// Send the result and read back the next mode byte.
    ///
    /// `Ok(None)` when the controller sent nothing before the read timed out.
    #[instrument(level = "trace", skip(self))]
    pub fn exchange(
        &mut self,
        light: LightStatus,
        steer: SteerResult,
    ) -> Result<Option<u8>, SerialError> {
        self.frame.encode(light, steer);
        self.link.write_all(self.frame.as_bytes())?;
        self.link.flush()?;

        match self.link.read(&mut self.inbound) {
            Ok(0) => Ok(None),
            Ok(_) => Ok(Some(self.inbound[0])),
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}
