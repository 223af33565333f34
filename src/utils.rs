use crate::capture::frame::PixelFormat;
use crate::error::CaptureError;
use serde::{Deserialize, Serialize};
use tracing::info;
use v4l::{capability::Flags, video::Capture, Device, FourCC};

// Detected capture device info
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoundDevice {
    pub path: String,
    pub format: PixelFormat,
}

impl FoundDevice {
    pub fn new(path: String, format: PixelFormat) -> Self {
        Self { path, format }
    }
}

/// Find the first capture device offering planar 4:2:0 frames
pub fn auto_detect_device() -> Result<FoundDevice, CaptureError> {
    use std::path::Path;

    info!("Auto-detecting capture devices...");

    let wanted = FourCC::new(&PixelFormat::Yu12.fourcc());
    for i in 0..10 {
        let path = format!("/dev/video{}", i);
        if !Path::new(&path).exists() {
            continue;
        }

        let Ok(dev) = Device::with_path(&path) else {
            continue;
        };
        let Ok(caps) = dev.query_caps() else {
            continue;
        };
        if !caps.capabilities.contains(Flags::VIDEO_CAPTURE) {
            continue;
        }
        if let Ok(formats) = dev.enum_formats() {
            if formats.iter().any(|fmt| fmt.fourcc == wanted) {
                info!("Found YU12 device: {} - {}", path, caps.card);
                return Ok(FoundDevice::new(path, PixelFormat::Yu12));
            }
        }
    }

    Err(CaptureError::NoDevice)
}
