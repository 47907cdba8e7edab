use super::*;
use crate::error::SensorError;
use crate::events::{EventBus, NodeEvent};
use crate::state::TouchState;
use std::io::Write;
use std::sync::Arc;

const THRESHOLD: u32 = 40;
const DEBOUNCE_MS: u64 = 500;

fn create_counter() -> (ScriptedTouchSensor, DebouncedTouchCounter<ScriptedTouchSensor>) {
    let sensor = ScriptedTouchSensor::new(80);
    let counter = DebouncedTouchCounter::new(sensor.clone(), THRESHOLD, DEBOUNCE_MS);
    (sensor, counter)
}

#[test]
fn test_reading_below_threshold_counts() {
    let (sensor, mut counter) = create_counter();
    let mut state = TouchState::new();

    sensor.push_readings([80, 39]);

    assert_eq!(counter.sample(0, &mut state), None);
    assert_eq!(counter.sample(10, &mut state), Some(1));
    assert_eq!(state.lifetime_count(), 1);
    assert_eq!(state.interval_count(), 1);
}

#[test]
fn test_threshold_is_strict() {
    let (sensor, mut counter) = create_counter();
    let mut state = TouchState::new();

    sensor.push_reading(THRESHOLD);

    assert_eq!(counter.sample(0, &mut state), None);
    assert_eq!(state.lifetime_count(), 0);
}

#[test]
fn test_debounce_window_skips_sensor() {
    let (sensor, mut counter) = create_counter();
    let mut state = TouchState::new();

    sensor.push_readings([10, 10, 10]);

    assert_eq!(counter.sample(1000, &mut state), Some(1));
    // Inside the window the sensor is not even read
    assert_eq!(counter.sample(1499, &mut state), None);
    assert_eq!(sensor.pending(), 2);

    assert_eq!(counter.sample(1500, &mut state), Some(2));
    assert_eq!(sensor.pending(), 1);
}

#[test]
fn test_interval_never_exceeds_lifetime() {
    let (sensor, mut counter) = create_counter();
    let mut state = TouchState::new();

    let readings = [10, 90, 5, 39, 41, 0, 100, 20, 20, 20];
    sensor.push_readings(readings);

    for step in 0..readings.len() as u64 {
        counter.sample(step * 250, &mut state);
        assert!(state.interval_count() <= state.lifetime_count());
        if step == 4 {
            state.take_interval();
        }
    }
}

#[test]
fn test_sensor_failure_reads_as_untouched() {
    let (sensor, mut counter) = create_counter();
    let mut state = TouchState::new();

    sensor.push_failure("bus error");
    sensor.push_failure("bus error");
    sensor.push_reading(0);

    assert_eq!(counter.sample(0, &mut state), None);
    assert_eq!(counter.sample(10, &mut state), None);
    assert_eq!(counter.sample(20, &mut state), Some(1));
}

#[test]
fn test_injected_touch_obeys_debounce() {
    let (_sensor, mut counter) = create_counter();
    let mut state = TouchState::new();

    assert_eq!(counter.inject(0, &mut state), Some(1));
    assert_eq!(counter.inject(100, &mut state), None);
    assert_eq!(counter.inject(600, &mut state), Some(2));

    counter.rearm();
    assert_eq!(counter.inject(601, &mut state), Some(3));
}

#[tokio::test]
async fn test_touch_publishes_event() {
    let event_bus = Arc::new(EventBus::new(10));
    let mut receiver = event_bus.subscribe();

    let sensor = ScriptedTouchSensor::new(80);
    let mut counter =
        DebouncedTouchCounter::new(sensor.clone(), THRESHOLD, DEBOUNCE_MS).with_event_bus(event_bus);
    let mut state = TouchState::new();

    sensor.push_reading(1);
    counter.sample(250, &mut state);

    assert_eq!(
        receiver.recv().await.unwrap(),
        NodeEvent::TouchDetected {
            lifetime_count: 1,
            at_ms: 250,
        }
    );
}

#[test]
fn test_file_sensor_reads_decimal_value() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "  37").unwrap();

    let mut sensor = FileTouchSensor::new(file.path());
    assert_eq!(sensor.read().unwrap(), 37);
}

#[test]
fn test_file_sensor_errors() {
    let mut missing = FileTouchSensor::new("/nonexistent/touchnode/in_voltage0_raw");
    assert!(matches!(missing.read(), Err(SensorError::Read { .. })));

    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "not-a-number").unwrap();
    let mut garbage = FileTouchSensor::new(file.path());
    assert!(matches!(garbage.read(), Err(SensorError::InvalidValue { .. })));
}
