pub mod frame;
pub mod link;

pub use frame::SerialFrame;
pub use link::{Link, SerialExchange};
