//! Rolling chart history: four parallel series (timestamp label,
//! temperature, humidity, soil) that always share one length.

use std::collections::VecDeque;
use time::macros::format_description;
use time::OffsetDateTime;

/// Number of samples kept per series.
pub const HISTORY_CAPACITY: usize = 20;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

pub struct HistoryBuffer {
    capacity: usize,
    timestamps: VecDeque<String>,
    temperature: VecDeque<Option<f64>>,
    humidity: VecDeque<Option<f64>>,
    soil: VecDeque<Option<f64>>,
}

/// Ordered copy of the buffer, oldest first, handed to the chart sink.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistorySnapshot {
    pub timestamps: Vec<String>,
    pub temperature: Vec<Option<f64>>,
    pub humidity: Vec<Option<f64>>,
    pub soil: Vec<Option<f64>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub timestamp: String,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub soil_percent: Option<f64>,
}

// ---------------------------------------------------------------------------
// Buffer
// ---------------------------------------------------------------------------

impl Default for HistoryBuffer {
    fn default() -> Self {
        Self::with_capacity(HISTORY_CAPACITY)
    }
}

impl HistoryBuffer {
    /// A capacity of zero is bumped to one.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            timestamps: VecDeque::with_capacity(capacity + 1),
            temperature: VecDeque::with_capacity(capacity + 1),
            humidity: VecDeque::with_capacity(capacity + 1),
            soil: VecDeque::with_capacity(capacity + 1),
        }
    }

    /// Append one aligned sample, evicting the oldest if over capacity.
    pub fn append(
        &mut self,
        timestamp: String,
        temperature: Option<f64>,
        humidity: Option<f64>,
        soil_percent: Option<f64>,
    ) {
        self.timestamps.push_back(timestamp);
        self.temperature.push_back(temperature);
        self.humidity.push_back(humidity);
        self.soil.push_back(soil_percent);

        if self.timestamps.len() > self.capacity {
            self.timestamps.pop_front();
            self.temperature.pop_front();
            self.humidity.pop_front();
            self.soil.pop_front();
        }
    }

    pub fn snapshot(&self) -> HistorySnapshot {
        HistorySnapshot {
            timestamps: self.timestamps.iter().cloned().collect(),
            temperature: self.temperature.iter().copied().collect(),
            humidity: self.humidity.iter().copied().collect(),
            soil: self.soil.iter().copied().collect(),
        }
    }

    pub fn latest(&self) -> Option<Sample> {
        let last = self.timestamps.len().checked_sub(1)?;
        Some(Sample {
            timestamp: self.timestamps[last].clone(),
            temperature: self.temperature[last],
            humidity: self.humidity[last],
            soil_percent: self.soil[last],
        })
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Wall-clock `HH:MM:SS` label for a sample. Falls back to UTC when the
/// local offset cannot be determined.
pub fn now_label() -> String {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    now.format(format_description!("[hour]:[minute]:[second]"))
        .unwrap_or_default()
}

// ===========================================================================
// Tests
// ===========================================================================
