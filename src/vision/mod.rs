pub mod calibrate;
pub mod color;
pub mod distance;
pub mod filter;
pub mod image;
pub mod light;
pub mod mask;
pub mod planes;
pub mod steer;

pub use calibrate::{Calibrator, ColorSample};
pub use image::{FloatImage, GrayImage, Rect, RgbImage};
pub use light::{LightClassifier, LightStatus};
pub use planes::WorkingSet;
pub use steer::{SteerResult, Steering};
