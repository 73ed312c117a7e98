use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Pascals per millimetre of mercury.
pub const PASCALS_PER_MMHG: f64 = 133.322_387_415;

pub const MIN_RESOLUTION: u32 = 1;
pub const MAX_RESOLUTION: u32 = 3000;
pub const DEFAULT_RESOLUTION: u32 = 200;

/// One climate sample. Pressure is stored in mmHg, temperature in °C
/// and relative humidity in %.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub timestamp: DateTime<Utc>,
    pub pressure: f64,
    pub temperature: f64,
    pub humidity: f64,
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} pressure: {:.1} mmHg, temperature: {:.1} °C, humidity: {:.1} %",
            self.timestamp.to_rfc3339(),
            self.pressure,
            self.temperature,
            self.humidity
        )
    }
}

pub fn pascals_to_mmhg(pascals: f64) -> f64 {
    pascals / PASCALS_PER_MMHG
}

/// Time window and bucket count for an aggregated chart query.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasurementFilter {
    pub from_time: DateTime<Utc>,
    pub to_time: DateTime<Utc>,
    #[serde(
        default = "default_resolution",
        deserialize_with = "deserialize_resolution"
    )]
    pub resolution: u32,
}

impl MeasurementFilter {
    pub fn new(from_time: DateTime<Utc>, to_time: DateTime<Utc>, resolution: u32) -> Self {
        Self {
            from_time,
            to_time,
            resolution: clamp_resolution(i64::from(resolution)),
        }
    }

    /// Filter covering the last `period` up to now.
    pub fn last(period: Duration, resolution: u32) -> Self {
        let to_time = Utc::now();
        Self::new(to_time - period, to_time, resolution)
    }

    /// Copy with the endpoints ordered and the resolution clamped, which
    /// is the form every query runs against.
    pub fn normalized(&self) -> Self {
        let (from_time, to_time) = if self.from_time <= self.to_time {
            (self.from_time, self.to_time)
        } else {
            (self.to_time, self.from_time)
        };
        Self {
            from_time,
            to_time,
            resolution: clamp_resolution(i64::from(self.resolution)),
        }
    }

    /// Bucket width in whole seconds, never below one.
    pub fn time_step(&self) -> i64 {
        let filter = self.normalized();
        let duration = (filter.to_time - filter.from_time).num_seconds();
        (duration / i64::from(filter.resolution)).max(1)
    }
}

fn default_resolution() -> u32 {
    DEFAULT_RESOLUTION
}

fn clamp_resolution(raw: i64) -> u32 {
    raw.clamp(i64::from(MIN_RESOLUTION), i64::from(MAX_RESOLUTION)) as u32
}

fn deserialize_resolution<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = i64::deserialize(deserializer)?;
    Ok(clamp_resolution(raw))
}
