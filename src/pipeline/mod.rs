pub mod context;
pub mod fps;
pub mod processor;
pub mod pump;
pub mod status;

pub use context::{FrameContext, OperatingMode};
pub use processor::FrameProcessor;
pub use pump::{FramePump, PumpSummary};
pub use status::{PipelineState, PipelineStatus, StatusBoard};
