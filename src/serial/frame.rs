//! Fixed 18-byte outbound frame.
//!
//! ```text
//! index: 0     1      2  3   4  5   6  7   8  9  ... 16 17
//! value: seq   light  1  p0  2  p1  3  p2  4  p3 ... 8  p7
//! ```
//!
//! Even bytes keep their initial value `index / 2` (byte 0 is the sequence
//! marker, 0). Byte 1 is the light code. Odd bytes 3..=17 carry the payload:
//! offset then angle, each as a little-endian `f32`.

use crate::vision::{LightStatus, SteerResult};

pub const FRAME_LEN: usize = 18;
pub const PAYLOAD_LEN: usize = 8;
const LIGHT_INDEX: usize = 1;
const PAYLOAD_START: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialFrame {
    bytes: [u8; FRAME_LEN],
}

impl Default for SerialFrame {
    fn default() -> Self {
        Self::new()
    }
}

impl SerialFrame {
    pub fn new() -> Self {
        let mut bytes = [0u8; FRAME_LEN];
        for i in (0..FRAME_LEN).step_by(2) {
            bytes[i] = (i / 2) as u8;
        }
        Self { bytes }
    }

    /// Overwrite the light code and payload. Even bytes are never touched.
    pub fn encode(&mut self, light: LightStatus, steer: SteerResult) {
        self.bytes[LIGHT_INDEX] = light.code();
        for (i, b) in payload(steer).into_iter().enumerate() {
            self.bytes[PAYLOAD_START + 2 * i] = b;
        }
    }

    pub fn as_bytes(&self) -> &[u8; FRAME_LEN] {
        &self.bytes
    }

    pub fn light_code(&self) -> u8 {
        self.bytes[LIGHT_INDEX]
    }

    /// Read the payload back out, the way the receiver does.
    pub fn decode_payload(&self) -> (f32, f32) {
        let mut raw = [0u8; PAYLOAD_LEN];
        for (i, b) in raw.iter_mut().enumerate() {
            *b = self.bytes[PAYLOAD_START + 2 * i];
        }
        let (offset, angle) = raw.split_at(4);
        (
            f32::from_le_bytes([offset[0], offset[1], offset[2], offset[3]]),
            f32::from_le_bytes([angle[0], angle[1], angle[2], angle[3]]),
        )
    }
}

fn payload(steer: SteerResult) -> [u8; PAYLOAD_LEN] {
    let mut raw = [0u8; PAYLOAD_LEN];
    raw[..4].copy_from_slice(&(steer.offset as f32).to_le_bytes());
    raw[4..].copy_from_slice(&(steer.angle as f32).to_le_bytes());
    raw
}
