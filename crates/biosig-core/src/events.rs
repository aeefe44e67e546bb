//! EventChannel: sparse occurrences referenced by timestamp

use crate::error::{BiosigError, BiosigResult};
use crate::channel::validate_sampling_rate;
use crate::timestamp::TimestampResolution;
use serde::Serialize;

/// Discrete event occurrences (detected peaks, markers, onsets)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventChannel {
    name: String,
    events: Vec<f64>,
    timestamps: Vec<f64>,
    resolution: TimestampResolution,
}

impl EventChannel {
    /// Build from explicit occurrence markers
    ///
    /// When `timestamp_data` is not aligned 1:1 with `events`, the events are
    /// treated as integer positions into `timestamp_data`.
    pub fn from_occurrences(
        name: &str,
        events: Vec<f64>,
        timestamp_data: &[f64],
        resolution: TimestampResolution,
    ) -> BiosigResult<Self> {
        if events.is_empty() {
            return Err(BiosigError::InvalidEvents {
                reason: format!("event channel '{}' has no events", name),
            });
        }

        let timestamps = if timestamp_data.len() == events.len() {
            timestamp_data.to_vec()
        } else {
            index_timestamps(&events, timestamp_data)?
        };

        Ok(EventChannel {
            name: name.to_string(),
            events,
            timestamps,
            resolution,
        })
    }

    /// Build by scanning a dense signal for samples equal to `indicator`
    ///
    /// Timestamps come from `timestamp_data` (aligned with `signal`) when
    /// given, otherwise from `index / sampling_rate`.
    pub fn from_signal(
        name: &str,
        signal: &[f64],
        indicator: f64,
        sampling_rate: Option<f64>,
        timestamp_data: Option<&[f64]>,
        resolution: TimestampResolution,
    ) -> BiosigResult<Self> {
        let positions: Vec<usize> = signal
            .iter()
            .enumerate()
            .filter(|&(_, &value)| value == indicator)
            .map(|(index, _)| index)
            .collect();

        if positions.is_empty() {
            return Err(BiosigError::InvalidEvents {
                reason: format!("no samples equal to indicator {} in '{}'", indicator, name),
            });
        }

        let timestamps = match (timestamp_data, sampling_rate) {
            (Some(timestamp_data), _) => {
                if timestamp_data.len() != signal.len() {
                    return Err(BiosigError::ShapeMismatch {
                        reason: format!(
                            "{} timestamps for a {} sample signal",
                            timestamp_data.len(),
                            signal.len()
                        ),
                    });
                }
                positions.iter().map(|&p| timestamp_data[p]).collect()
            }
            (None, Some(rate)) => {
                validate_sampling_rate(rate)?;
                positions
                    .iter()
                    .map(|&p| resolution.from_secs_f64(p as f64 / rate))
                    .collect()
            }
            (None, None) => {
                return Err(BiosigError::InvalidConfig {
                    reason: "sampling rate is required to time events found in a signal".to_string(),
                })
            }
        };

        Ok(EventChannel {
            name: name.to_string(),
            events: positions.into_iter().map(|p| p as f64).collect(),
            timestamps,
            resolution,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn events(&self) -> &[f64] {
        &self.events
    }

    /// Timestamps aligned 1:1 with [`EventChannel::events`]
    pub fn timestamps(&self) -> &[f64] {
        &self.timestamps
    }

    pub fn resolution(&self) -> TimestampResolution {
        self.resolution
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Shift every timestamp by `delta` (resolution units)
    pub fn sync_offset(&mut self, delta: f64) {
        self.timestamps.iter_mut().for_each(|t| *t += delta);
    }

    pub fn rename(&mut self, name: &str) {
        self.name = name.to_string();
    }

    /// Intervals between consecutive events, in seconds
    pub fn intervals(&self) -> Vec<f64> {
        self.timestamps
            .windows(2)
            .map(|w| self.resolution.as_secs_f64(w[1] - w[0]))
            .collect()
    }
}

fn index_timestamps(events: &[f64], timestamp_data: &[f64]) -> BiosigResult<Vec<f64>> {
    events
        .iter()
        .map(|&event| {
            let valid = event >= 0.0 && event.fract() == 0.0 && (event as usize) < timestamp_data.len();
            if valid {
                Ok(timestamp_data[event as usize])
            } else {
                Err(BiosigError::EventIndex {
                    event,
                    len: timestamp_data.len(),
                })
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_from_signal() {
        let signal = [0.0, 0.0, 1.0, 0.0, 1.0];
        let events = EventChannel::from_signal(
            "r_peaks",
            &signal,
            1.0,
            Some(1.0),
            None,
            TimestampResolution::Seconds,
        )
        .unwrap();

        assert_eq!(events.events(), &[2.0, 4.0]);
        assert_eq!(events.timestamps(), &[2.0, 4.0]);
    }

    #[test]
    fn test_events_from_signal_requires_timing() {
        let result = EventChannel::from_signal(
            "r_peaks",
            &[0.0, 1.0],
            1.0,
            None,
            None,
            TimestampResolution::Seconds,
        );
        assert!(matches!(result, Err(BiosigError::InvalidConfig { .. })));
    }

    #[test]
    fn test_events_from_signal_with_timestamps() {
        let ts = [10.0, 20.0, 30.0, 40.0];
        let events = EventChannel::from_signal(
            "marker",
            &[5.0, 0.0, 5.0, 0.0],
            5.0,
            None,
            Some(&ts),
            TimestampResolution::Milliseconds,
        )
        .unwrap();
        assert_eq!(events.timestamps(), &[10.0, 30.0]);
        assert_eq!(events.intervals(), vec![0.02]);
    }

    #[test]
    fn test_events_from_signal_without_matches() {
        let result = EventChannel::from_signal(
            "marker",
            &[0.0, 0.0],
            1.0,
            Some(10.0),
            None,
            TimestampResolution::Seconds,
        );
        assert!(matches!(result, Err(BiosigError::InvalidEvents { .. })));
    }

    #[test]
    fn test_events_aligned_occurrences() {
        let events = EventChannel::from_occurrences(
            "taps",
            vec![1.0, 1.0, 1.0],
            &[0.5, 1.5, 2.5],
            TimestampResolution::Seconds,
        )
        .unwrap();
        assert_eq!(events.timestamps(), &[0.5, 1.5, 2.5]);
    }

    #[test]
    fn test_events_indexed_occurrences() {
        let timeline = [0.0, 0.1, 0.2, 0.3, 0.4, 0.5];
        let events = EventChannel::from_occurrences(
            "peaks",
            vec![1.0, 4.0],
            &timeline,
            TimestampResolution::Seconds,
        )
        .unwrap();
        assert_eq!(events.timestamps(), &[0.1, 0.4]);

        let out_of_range = EventChannel::from_occurrences(
            "peaks",
            vec![1.0, 9.0],
            &timeline,
            TimestampResolution::Seconds,
        );
        assert_eq!(
            out_of_range.unwrap_err(),
            BiosigError::EventIndex { event: 9.0, len: 6 }
        );

        let fractional = EventChannel::from_occurrences(
            "peaks",
            vec![1.5],
            &timeline,
            TimestampResolution::Seconds,
        );
        assert!(matches!(fractional, Err(BiosigError::EventIndex { .. })));
    }

    #[test]
    fn test_empty_events_rejected() {
        let result = EventChannel::from_occurrences("none", vec![], &[], TimestampResolution::Seconds);
        assert!(matches!(result, Err(BiosigError::InvalidEvents { .. })));
    }
}
