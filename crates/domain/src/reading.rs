//! Reading: one timestamped measurement for one device.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{LumenError, ValidationError};
use crate::id::DeviceId;
use crate::time::Timestamp;

/// Where a reading came from. Serialized as `dataSource`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReadingSource {
    #[default]
    Hardware,
    Simulated,
    /// Written by the dispatcher after a successful actuation.
    SyntheticFromActuation,
}

impl ReadingSource {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hardware => "hardware",
            Self::Simulated => "simulated",
            Self::SyntheticFromActuation => "synthetic-from-actuation",
        }
    }
}

impl fmt::Display for ReadingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    pub device_id: DeviceId,
    #[serde(rename = "lightValue")]
    pub value: f64,
    pub timestamp: Timestamp,
    #[serde(rename = "dataSource", default)]
    pub source: ReadingSource,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

impl Reading {
    /// Build a reading, rejecting non-finite values.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::NonFiniteValue`] for `NaN` or infinities.
    pub fn new(
        device_id: DeviceId,
        value: f64,
        timestamp: Timestamp,
        source: ReadingSource,
    ) -> Result<Self, LumenError> {
        if !value.is_finite() {
            return Err(ValidationError::NonFiniteValue.into());
        }
        Ok(Self {
            device_id,
            value,
            timestamp,
            source,
            metadata: None,
        })
    }

    /// Reading recorded for an actuator after a command succeeded.
    #[must_use]
    pub fn synthetic(device_id: DeviceId, level: u8, timestamp: Timestamp) -> Self {
        Self {
            device_id,
            value: f64::from(level),
            timestamp,
            source: ReadingSource::SyntheticFromActuation,
            metadata: None,
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Summary over a window of retained readings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingStats {
    pub count: usize,
    pub avg_value: Option<f64>,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub latest_value: Option<f64>,
    pub latest_timestamp: Option<Timestamp>,
}

impl ReadingStats {
    /// Summarize readings given newest first.
    #[must_use]
    pub fn from_newest_first<'a>(readings: impl IntoIterator<Item = &'a Reading>) -> Self {
        let mut stats = Self {
            count: 0,
            avg_value: None,
            min_value: None,
            max_value: None,
            latest_value: None,
            latest_timestamp: None,
        };
        let mut sum = 0.0;
        for reading in readings {
            if stats.count == 0 {
                stats.latest_value = Some(reading.value);
                stats.latest_timestamp = Some(reading.timestamp);
            }
            stats.count += 1;
            sum += reading.value;
            stats.min_value = Some(stats.min_value.map_or(reading.value, |m| m.min(reading.value)));
            stats.max_value = Some(stats.max_value.map_or(reading.value, |m| m.max(reading.value)));
        }
        if stats.count > 0 {
            #[allow(clippy::cast_precision_loss)]
            let count = stats.count as f64;
            stats.avg_value = Some(sum / count);
        }
        stats
    }
}
