mod detector;
mod input;
mod signal;


pub use detector::{ButtonLevel, LongPressDetector};
pub use input::{level_from_key_value, ButtonInputHandler};
pub use signal::ResetSignal;
