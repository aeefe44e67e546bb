//! Timestamp units and helpers for channel timing
//!
//! Timestamps are stored as `f64` values expressed in a channel's
//! [`TimestampResolution`]. Derived timestamps follow
//! `start + index / sampling_rate`, scaled to that resolution.

use crate::error::{BiosigError, BiosigResult};
use core::fmt;
use core::str::FromStr;
use serde::{Deserialize, Serialize};

/// Unit in which timestamp values are expressed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimestampResolution {
    Nanoseconds,
    Milliseconds,
    #[default]
    Seconds,
    Minutes,
}

impl TimestampResolution {
    /// Number of timestamp units in one second
    #[inline]
    pub fn units_per_second(&self) -> f64 {
        match self {
            TimestampResolution::Nanoseconds => 1_000_000_000.0,
            TimestampResolution::Milliseconds => 1_000.0,
            TimestampResolution::Seconds => 1.0,
            TimestampResolution::Minutes => 1.0 / 60.0,
        }
    }

    /// Convert a value in seconds into this resolution
    #[inline]
    pub fn from_secs_f64(&self, secs: f64) -> f64 {
        match self {
            TimestampResolution::Minutes => secs / 60.0,
            _ => secs * self.units_per_second(),
        }
    }

    /// Convert a value in this resolution into seconds
    #[inline]
    pub fn as_secs_f64(&self, value: f64) -> f64 {
        match self {
            TimestampResolution::Minutes => value * 60.0,
            _ => value / self.units_per_second(),
        }
    }

    /// Convert a timestamp value from this resolution into `target`
    #[inline]
    pub fn convert(&self, value: f64, target: TimestampResolution) -> f64 {
        target.from_secs_f64(self.as_secs_f64(value))
    }
}

impl fmt::Display for TimestampResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimestampResolution::Nanoseconds => write!(f, "ns"),
            TimestampResolution::Milliseconds => write!(f, "ms"),
            TimestampResolution::Seconds => write!(f, "s"),
            TimestampResolution::Minutes => write!(f, "min"),
        }
    }
}

impl FromStr for TimestampResolution {
    type Err = BiosigError;

    fn from_str(s: &str) -> BiosigResult<Self> {
        match s {
            "ns" | "nanoseconds" => Ok(TimestampResolution::Nanoseconds),
            "ms" | "milliseconds" => Ok(TimestampResolution::Milliseconds),
            "s" | "seconds" => Ok(TimestampResolution::Seconds),
            "min" | "minutes" => Ok(TimestampResolution::Minutes),
            other => Err(BiosigError::InvalidTimestamp {
                reason: format!("unknown timestamp resolution '{}'", other),
            }),
        }
    }
}

/// Which sample of each window represents the window in time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimestampPoint {
    #[default]
    Start,
    End,
    Mid,
}

impl FromStr for TimestampPoint {
    type Err = BiosigError;

    fn from_str(s: &str) -> BiosigResult<Self> {
        match s {
            "start" => Ok(TimestampPoint::Start),
            "end" => Ok(TimestampPoint::End),
            "mid" => Ok(TimestampPoint::Mid),
            other => Err(BiosigError::InvalidTimestamp {
                reason: format!("unknown timestamp point '{}', expected start, end or mid", other),
            }),
        }
    }
}

impl TimestampPoint {
    /// Pick the representative timestamp out of one window
    pub fn select(&self, window: &[f64]) -> Option<f64> {
        match self {
            TimestampPoint::Start => window.first().copied(),
            TimestampPoint::End => window.last().copied(),
            TimestampPoint::Mid => window.get(window.len() / 2).copied(),
        }
    }
}

/// Generate `count` evenly spaced timestamps starting at `start`
pub fn derive_timestamps(
    start: f64,
    count: usize,
    sampling_rate: f64,
    resolution: TimestampResolution,
) -> Vec<f64> {
    let step = resolution.from_secs_f64(1.0 / sampling_rate);
    (0..count).map(|i| start + i as f64 * step).collect()
}

/// Check that a timestamp sequence never decreases
pub fn validate_monotonic(timestamps: &[f64]) -> BiosigResult<()> {
    if let Some(position) = timestamps.windows(2).position(|w| w[1] < w[0] || w[1].is_nan()) {
        return Err(BiosigError::InvalidTimestamp {
            reason: format!(
                "timestamps decrease at index {} ({} -> {})",
                position + 1,
                timestamps[position],
                timestamps[position + 1]
            ),
        });
    }
    Ok(())
}
