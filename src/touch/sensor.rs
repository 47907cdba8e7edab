use crate::error::SensorError;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Source of raw capacitive readings. Lower values mean a touch.
pub trait TouchSensor: Send {
    fn read(&mut self) -> Result<u32, SensorError>;
}

/// Reads a decimal raw value from a sysfs/IIO attribute file
#[derive(Debug, Clone)]
pub struct FileTouchSensor {
    path: PathBuf,
}

impl FileTouchSensor {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TouchSensor for FileTouchSensor {
    fn read(&mut self) -> Result<u32, SensorError> {
        let raw = std::fs::read_to_string(&self.path).map_err(|e| SensorError::Read {
            source_path: self.path.display().to_string(),
            details: e.to_string(),
        })?;

        let value = raw.trim();
        value.parse::<u32>().map_err(|_| SensorError::InvalidValue {
            source_path: self.path.display().to_string(),
            value: value.to_string(),
        })
    }
}

/// Replays queued readings, then reports the idle value forever.
///
/// Clones share the queue, so a test or the simulator can keep a handle and
/// feed readings while the counter owns the sensor.
#[derive(Debug, Clone)]
pub struct ScriptedTouchSensor {
    readings: Arc<Mutex<VecDeque<Result<u32, SensorError>>>>,
    idle_value: u32,
}

impl ScriptedTouchSensor {
    pub fn new(idle_value: u32) -> Self {
        Self {
            readings: Arc::new(Mutex::new(VecDeque::new())),
            idle_value,
        }
    }

    pub fn push_reading(&self, value: u32) {
        self.readings.lock().push_back(Ok(value));
    }

    pub fn push_readings<I: IntoIterator<Item = u32>>(&self, values: I) {
        self.readings.lock().extend(values.into_iter().map(Ok));
    }

    pub fn push_failure(&self, details: &str) {
        self.readings.lock().push_back(Err(SensorError::Read {
            source_path: "scripted".to_string(),
            details: details.to_string(),
        }));
    }

    pub fn pending(&self) -> usize {
        self.readings.lock().len()
    }
}

impl TouchSensor for ScriptedTouchSensor {
    fn read(&mut self) -> Result<u32, SensorError> {
        self.readings
            .lock()
            .pop_front()
            .unwrap_or(Ok(self.idle_value))
    }
}

impl TouchSensor for Box<dyn TouchSensor> {
    fn read(&mut self) -> Result<u32, SensorError> {
        (**self).read()
    }
}
