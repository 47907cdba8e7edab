mod counter;
mod sensor;

#[cfg(test)]
mod tests;

pub use counter::DebouncedTouchCounter;
pub use sensor::{FileTouchSensor, ScriptedTouchSensor, TouchSensor};
