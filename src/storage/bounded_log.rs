use super::line_store::LineStore;
use super::record::{AggregationRecord, DataPoint};
use crate::error::StorageError;
use std::sync::Arc;
use tracing::{debug, warn};

/// Capacity-bounded, oldest-first log of aggregation records kept in a line store
#[derive(Clone)]
pub struct BoundedLog {
    store: Arc<dyn LineStore>,
    resource: String,
    max_entries: usize,
}

impl BoundedLog {
    pub fn new<S: Into<String>>(store: Arc<dyn LineStore>, resource: S, max_entries: usize) -> Self {
        Self {
            store,
            resource: resource.into(),
            max_entries: max_entries.max(1),
        }
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Append a record, then evict the oldest lines beyond capacity.
    ///
    /// Returns the number of lines retained.
    pub async fn append(&self, record: &AggregationRecord) -> Result<usize, StorageError> {
        self.push(record).await?;
        self.trim().await
    }

    /// Append a record without enforcing capacity.
    ///
    /// Once this succeeds the record is stored; a later [`trim`](Self::trim)
    /// restores the bound.
    pub async fn push(&self, record: &AggregationRecord) -> Result<(), StorageError> {
        self.store
            .append_line(&self.resource, &record.to_line())
            .await
    }

    /// Keep only the newest `max_entries` lines, rewriting the resource if needed
    pub async fn trim(&self) -> Result<usize, StorageError> {
        let lines = self.store.read_lines(&self.resource).await?;
        let count = lines.len();
        if count <= self.max_entries {
            return Ok(count);
        }

        let retained = retain_newest(lines, self.max_entries);
        self.store
            .replace_lines(&self.resource, &retained)
            .await?;

        debug!(
            "Trimmed {} from {} to {} entries",
            self.resource,
            count,
            retained.len()
        );
        Ok(retained.len())
    }

    /// Parse every stored line, skipping the ones that are not records
    pub async fn records(&self) -> Result<Vec<AggregationRecord>, StorageError> {
        let lines = self.store.read_lines(&self.resource).await?;
        let mut records = Vec::with_capacity(lines.len());

        for line in lines {
            match line.parse::<AggregationRecord>() {
                Ok(record) => records.push(record),
                Err(e) => warn!("Skipping line in {}: {}", self.resource, e),
            }
        }

        Ok(records)
    }

    /// Records as dashboard data points; an unreadable log is an empty data set
    pub async fn data_points(&self) -> Vec<DataPoint> {
        match self.records().await {
            Ok(records) => records.iter().map(AggregationRecord::to_data_point).collect(),
            Err(e) => {
                warn!("Serving empty data set: {}", e);
                Vec::new()
            }
        }
    }

    /// JSON array served by the data-fetch endpoint
    pub async fn render_json(&self) -> String {
        serde_json::to_string(&self.data_points().await).unwrap_or_else(|_| "[]".to_string())
    }

    /// Remove the whole resource; removing an absent log succeeds
    pub async fn clear(&self) -> Result<(), StorageError> {
        self.store.remove(&self.resource).await
    }
}

/// Drop the oldest lines so that at most `max_entries` remain, preserving order
pub fn retain_newest(mut lines: Vec<String>, max_entries: usize) -> Vec<String> {
    if lines.len() > max_entries {
        lines.drain(..lines.len() - max_entries);
    }
    lines
}
