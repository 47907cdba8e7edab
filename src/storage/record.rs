use crate::error::StorageError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One aggregation tick, persisted as `timestamp,lifetimeCount,intervalEventCount`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationRecord {
    /// Node-monotonic milliseconds at the tick
    pub timestamp_ms: u64,
    pub lifetime_count: u64,
    pub interval_events: u64,
}

impl AggregationRecord {
    pub fn new(timestamp_ms: u64, lifetime_count: u64, interval_events: u64) -> Self {
        Self {
            timestamp_ms,
            lifetime_count,
            interval_events,
        }
    }

    /// Render the on-disk line (without the newline)
    pub fn to_line(&self) -> String {
        format!(
            "{},{},{}",
            self.timestamp_ms, self.lifetime_count, self.interval_events
        )
    }

    /// Shape served to dashboards
    pub fn to_data_point(&self) -> DataPoint {
        DataPoint {
            timestamp: self.timestamp_ms,
            touch_count: self.lifetime_count,
            touch_rate: self.interval_events,
        }
    }
}

impl fmt::Display for AggregationRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_line())
    }
}

impl FromStr for AggregationRecord {
    type Err = StorageError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let trimmed = line.trim();
        let fields: Vec<&str> = trimmed.split(',').collect();
        if fields.len() != 3 {
            return Err(StorageError::malformed(
                trimmed,
                format!("expected 3 fields, found {}", fields.len()),
            ));
        }

        let parse = |name: &str, value: &str| {
            value.trim().parse::<u64>().map_err(|e| {
                StorageError::malformed(trimmed, format!("{} '{}': {}", name, value, e))
            })
        };

        Ok(Self {
            timestamp_ms: parse("timestamp", fields[0])?,
            lifetime_count: parse("lifetime count", fields[1])?,
            interval_events: parse("interval events", fields[2])?,
        })
    }
}

/// JSON record of the data-fetch response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataPoint {
    pub timestamp: u64,
    pub touch_count: u64,
    pub touch_rate: u64,
}

impl From<DataPoint> for AggregationRecord {
    fn from(point: DataPoint) -> Self {
        AggregationRecord::new(point.timestamp, point.touch_count, point.touch_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_format() {
        let record = AggregationRecord::new(60_000, 12, 4);
        assert_eq!(record.to_line(), "60000,12,4");
        assert_eq!(record.to_string(), "60000,12,4");
    }

    #[test]
    fn test_parse_tolerates_whitespace_and_carriage_return() {
        let record: AggregationRecord = " 10, 1 ,1\r".parse().unwrap();
        assert_eq!(record, AggregationRecord::new(10, 1, 1));
    }

    #[test]
    fn test_parse_rejects_malformed_lines() {
        for line in ["", "10,1", "10,1,1,1", "a,1,1", "10,-1,1", "10,,1"] {
            let result = line.parse::<AggregationRecord>();
            assert!(
                matches!(result, Err(StorageError::MalformedRecord { .. })),
                "line {:?} should be malformed",
                line
            );
        }
    }

    #[test]
    fn test_data_point_json_shape() {
        let json = serde_json::to_value(AggregationRecord::new(5, 6, 7).to_data_point()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"timestamp": 5, "touchCount": 6, "touchRate": 7})
        );
    }
}
