//! Channel: core container for one sensor stream and its timing

use crate::error::{BiosigError, BiosigResult};
use crate::timestamp::{derive_timestamps, validate_monotonic, TimestampPoint, TimestampResolution};
use crate::shape_error;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Sample storage of a channel, either one continuous run or equal-length windows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SignalData {
    /// Flat sequence of samples
    Continuous(Vec<f64>),
    /// Windows x samples-per-window, every row the same length
    Windowed(Vec<Vec<f64>>),
}

impl SignalData {
    /// Check the rectangular invariant of windowed data
    pub fn validate(&self) -> BiosigResult<()> {
        if let SignalData::Windowed(windows) = self {
            let Some(first) = windows.first() else {
                return Err(shape_error!("windowed data must contain at least one window"));
            };
            if let Some(index) = windows.iter().position(|w| w.len() != first.len()) {
                return Err(shape_error!(
                    "window {} has {} samples, expected {}",
                    index,
                    windows[index].len(),
                    first.len()
                ));
            }
        }
        Ok(())
    }

    /// Number of windows (1 for continuous data)
    pub fn windows(&self) -> usize {
        match self {
            SignalData::Continuous(_) => 1,
            SignalData::Windowed(windows) => windows.len(),
        }
    }

    /// Number of samples in each window
    pub fn samples_per_window(&self) -> usize {
        match self {
            SignalData::Continuous(samples) => samples.len(),
            SignalData::Windowed(windows) => windows.first().map_or(0, Vec::len),
        }
    }

    /// Total number of samples across windows
    pub fn len(&self) -> usize {
        self.windows() * self.samples_per_window()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_windowed(&self) -> bool {
        matches!(self, SignalData::Windowed(_))
    }

    /// (windows, samples per window)
    pub fn shape(&self) -> (usize, usize) {
        (self.windows(), self.samples_per_window())
    }

    /// Borrow one window; continuous data has a single window at index 0
    pub fn window(&self, index: usize) -> Option<&[f64]> {
        match self {
            SignalData::Continuous(samples) if index == 0 => Some(samples),
            SignalData::Continuous(_) => None,
            SignalData::Windowed(windows) => windows.get(index).map(Vec::as_slice),
        }
    }

    /// Iterate over windows as slices
    pub fn iter_windows(&self) -> impl Iterator<Item = &[f64]> + '_ {
        (0..self.windows()).filter_map(move |i| self.window(i))
    }

    /// Borrow continuous samples, `None` for windowed data
    pub fn as_continuous(&self) -> Option<&[f64]> {
        match self {
            SignalData::Continuous(samples) => Some(samples),
            SignalData::Windowed(_) => None,
        }
    }

    /// Same kind and same shape
    pub fn same_shape(&self, other: &SignalData) -> bool {
        self.is_windowed() == other.is_windowed() && self.shape() == other.shape()
    }

    /// Stack per-window sample vectors into continuous or windowed data
    pub fn from_windows(mut windows: Vec<Vec<f64>>, windowed: bool) -> BiosigResult<SignalData> {
        if !windowed {
            if windows.len() != 1 {
                return Err(shape_error!(
                    "continuous data needs exactly one window, got {}",
                    windows.len()
                ));
            }
            return Ok(SignalData::Continuous(windows.remove(0)));
        }
        let data = SignalData::Windowed(windows);
        data.validate()?;
        Ok(data)
    }
}

impl From<Vec<f64>> for SignalData {
    fn from(samples: Vec<f64>) -> Self {
        SignalData::Continuous(samples)
    }
}

impl From<Vec<Vec<f64>>> for SignalData {
    fn from(windows: Vec<Vec<f64>>) -> Self {
        SignalData::Windowed(windows)
    }
}

impl From<&[f64]> for SignalData {
    fn from(samples: &[f64]) -> Self {
        SignalData::Continuous(samples.to_vec())
    }
}

/// One logical sensor stream with timing metadata
///
/// Fields are private: a channel is only changed through
/// [`Channel::replace_data`], [`Channel::sync_offset`] and [`Channel::rename`],
/// all of which keep timestamps aligned with the data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Channel {
    name: String,
    data: SignalData,
    timestamps: SignalData,
    sampling_rate: f64,
    timestamp_start: f64,
    resolution: TimestampResolution,
}

/// Builder for channels with explicit timing
#[derive(Debug, Clone)]
pub struct ChannelBuilder {
    name: String,
    data: SignalData,
    sampling_rate: f64,
    timestamps: Option<SignalData>,
    resolution: Option<TimestampResolution>,
    timestamp_start: f64,
}

impl ChannelBuilder {
    /// Create new channel builder
    pub fn new(name: &str, data: impl Into<SignalData>, sampling_rate: f64) -> Self {
        ChannelBuilder {
            name: name.to_string(),
            data: data.into(),
            sampling_rate,
            timestamps: None,
            resolution: None,
            timestamp_start: 0.0,
        }
    }

    /// Supply explicit timestamps; requires [`ChannelBuilder::resolution`]
    pub fn timestamps(mut self, timestamps: impl Into<SignalData>) -> Self {
        self.timestamps = Some(timestamps.into());
        self
    }

    pub fn resolution(mut self, resolution: TimestampResolution) -> Self {
        self.resolution = Some(resolution);
        self
    }

    /// Offset of the first derived timestamp, in resolution units
    pub fn timestamp_start(mut self, start: f64) -> Self {
        self.timestamp_start = start;
        self
    }

    /// Validate and build the channel
    pub fn build(self) -> BiosigResult<Channel> {
        validate_sampling_rate(self.sampling_rate)?;
        self.data.validate()?;
        if self.data.is_empty() {
            return Err(shape_error!("channel '{}' has no samples", self.name));
        }

        let timestamps = match self.timestamps {
            Some(timestamps) => {
                if self.resolution.is_none() {
                    return Err(BiosigError::InvalidTimestamp {
                        reason: "explicit timestamps require a timestamp resolution".to_string(),
                    });
                }
                timestamps.validate()?;
                if !timestamps.same_shape(&self.data) {
                    return Err(shape_error!(
                        "timestamps shape {:?} does not match data shape {:?}",
                        timestamps.shape(),
                        self.data.shape()
                    ));
                }
                for window in timestamps.iter_windows() {
                    validate_monotonic(window)?;
                }
                timestamps
            }
            None => derive_layout(
                &self.data,
                self.timestamp_start,
                self.sampling_rate,
                self.resolution.unwrap_or_default(),
            ),
        };

        Ok(Channel {
            name: self.name,
            data: self.data,
            timestamps,
            sampling_rate: self.sampling_rate,
            timestamp_start: self.timestamp_start,
            resolution: self.resolution.unwrap_or_default(),
        })
    }
}

impl Channel {
    /// Create a channel with timestamps derived from the sampling rate
    pub fn new(name: &str, data: impl Into<SignalData>, sampling_rate: f64) -> BiosigResult<Self> {
        ChannelBuilder::new(name, data, sampling_rate).build()
    }

    /// Start a builder for a channel with explicit timing
    pub fn builder(name: &str, data: impl Into<SignalData>, sampling_rate: f64) -> ChannelBuilder {
        ChannelBuilder::new(name, data, sampling_rate)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &SignalData {
        &self.data
    }

    pub fn timestamps(&self) -> &SignalData {
        &self.timestamps
    }

    pub fn sampling_rate(&self) -> f64 {
        self.sampling_rate
    }

    pub fn timestamp_start(&self) -> f64 {
        self.timestamp_start
    }

    pub fn resolution(&self) -> TimestampResolution {
        self.resolution
    }

    /// Number of windows (1 for unwindowed data)
    pub fn windows(&self) -> usize {
        self.data.windows()
    }

    pub fn samples_per_window(&self) -> usize {
        self.data.samples_per_window()
    }

    pub fn is_windowed(&self) -> bool {
        self.data.is_windowed()
    }

    /// Duration of one window in seconds
    pub fn signal_duration(&self) -> f64 {
        self.samples_per_window() as f64 / self.sampling_rate
    }

    /// Total sample count across windows
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Timestamps representing the channel at `point`
    ///
    /// Windowed channels yield one value per window; unwindowed channels yield
    /// the full timestamp array whatever the point.
    pub fn get_timestamp(&self, point: TimestampPoint) -> Vec<f64> {
        match &self.timestamps {
            SignalData::Continuous(timestamps) => timestamps.clone(),
            SignalData::Windowed(windows) => windows
                .iter()
                .filter_map(|window| point.select(window))
                .collect(),
        }
    }

    /// Replace sample content, keeping the window axis
    ///
    /// A different number of samples per window changes the effective
    /// sampling rate to `new_samples / signal_duration`; timestamps are then
    /// regenerated from the first timestamp of every window.
    pub fn replace_data(&mut self, data: impl Into<SignalData>) -> BiosigResult<()> {
        let data = data.into();
        data.validate()?;

        if data.is_windowed() != self.data.is_windowed() {
            return Err(shape_error!(
                "cannot replace {} data with {} data without new timing",
                kind(&self.data),
                kind(&data)
            ));
        }
        if data.windows() != self.data.windows() {
            return Err(shape_error!(
                "window count changed from {} to {} without new timing",
                self.data.windows(),
                data.windows()
            ));
        }

        if data.samples_per_window() != self.samples_per_window() {
            let duration = self.signal_duration();
            if duration <= 0.0 {
                return Err(shape_error!(
                    "cannot rescale channel '{}' with zero duration",
                    self.name
                ));
            }
            let rate = data.samples_per_window() as f64 / duration;
            validate_sampling_rate(rate)?;
            warn!(
                channel = %self.name,
                old_rate = self.sampling_rate,
                new_rate = rate,
                "sample count changed, sampling rate recomputed"
            );

            let starts = self.get_timestamp(TimestampPoint::Start);
            let windows = (0..data.windows())
                .map(|w| {
                    let start = match &self.timestamps {
                        SignalData::Continuous(ts) => ts.first().copied().unwrap_or(self.timestamp_start),
                        SignalData::Windowed(_) => starts.get(w).copied().unwrap_or(self.timestamp_start),
                    };
                    derive_timestamps(start, data.samples_per_window(), rate, self.resolution)
                })
                .collect();
            self.timestamps = SignalData::from_windows(windows, data.is_windowed())?;
            self.sampling_rate = rate;
        }

        self.data = data;
        Ok(())
    }

    /// Replace data together with new timing
    pub fn replace_data_with_timing(
        &mut self,
        data: impl Into<SignalData>,
        timestamps: impl Into<SignalData>,
        sampling_rate: f64,
    ) -> BiosigResult<()> {
        let rebuilt = Channel::builder(&self.name, data, sampling_rate)
            .timestamps(timestamps)
            .resolution(self.resolution)
            .timestamp_start(self.timestamp_start)
            .build()?;
        *self = rebuilt;
        Ok(())
    }

    /// Copy of this channel's timing carrying `data` under a new name
    pub fn derive(&self, name: &str, data: impl Into<SignalData>) -> BiosigResult<Channel> {
        let mut channel = self.clone();
        channel.name = name.to_string();
        channel.replace_data(data)?;
        Ok(channel)
    }

    /// Shift every timestamp by `delta` (resolution units)
    pub fn sync_offset(&mut self, delta: f64) {
        match &mut self.timestamps {
            SignalData::Continuous(timestamps) => {
                timestamps.iter_mut().for_each(|t| *t += delta);
            }
            SignalData::Windowed(windows) => {
                windows.iter_mut().flatten().for_each(|t| *t += delta);
            }
        }
        self.timestamp_start += delta;
    }

    pub fn rename(&mut self, name: &str) {
        self.name = name.to_string();
    }

    /// Owned variant of [`Channel::rename`]
    pub fn with_name(mut self, name: &str) -> Self {
        self.rename(name);
        self
    }
}

/// Reject non-positive or non-finite sampling rates
pub fn validate_sampling_rate(rate: f64) -> BiosigResult<()> {
    if rate > 0.0 && rate.is_finite() {
        Ok(())
    } else {
        Err(BiosigError::InvalidSamplingRate { rate })
    }
}

/// Timestamps laid out like `data`; windows are assumed contiguous
fn derive_layout(
    data: &SignalData,
    start: f64,
    sampling_rate: f64,
    resolution: TimestampResolution,
) -> SignalData {
    let per_window = data.samples_per_window();
    match data {
        SignalData::Continuous(samples) => {
            SignalData::Continuous(derive_timestamps(start, samples.len(), sampling_rate, resolution))
        }
        SignalData::Windowed(windows) => {
            let all = derive_timestamps(start, windows.len() * per_window, sampling_rate, resolution);
            SignalData::Windowed(all.chunks(per_window.max(1)).map(<[f64]>::to_vec).collect())
        }
    }
}

fn kind(data: &SignalData) -> &'static str {
    if data.is_windowed() {
        "windowed"
    } else {
        "continuous"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_creation() {
        let channel = Channel::new("ecg", vec![0.0; 1000], 250.0).unwrap();

        assert_eq!(channel.len(), 1000);
        assert_eq!(channel.windows(), 1);
        assert!(!channel.is_windowed());
        assert!((channel.signal_duration() - 4.0).abs() < 1e-12);

        let ts = channel.timestamps().as_continuous().unwrap();
        assert_eq!(ts[0], 0.0);
        assert!((ts[1] - 0.004).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_sampling_rate() {
        assert!(matches!(
            Channel::new("ecg", vec![1.0, 2.0], 0.0),
            Err(BiosigError::InvalidSamplingRate { .. })
        ));
        assert!(Channel::new("ecg", vec![1.0, 2.0], -5.0).is_err());
        assert!(Channel::new("ecg", vec![1.0, 2.0], f64::NAN).is_err());
    }

    #[test]
    fn test_windowed_channel() {
        let data = vec![vec![1.0, 2.0, 3.0, 4.0], vec![5.0, 6.0, 7.0, 8.0], vec![0.0; 4]];
        let channel = Channel::new("ppg", data, 2.0).unwrap();

        assert_eq!(channel.windows(), 3);
        assert_eq!(channel.samples_per_window(), 4);
        assert!((channel.signal_duration() - 2.0).abs() < 1e-12);
        assert_eq!(channel.get_timestamp(TimestampPoint::Start), vec![0.0, 2.0, 4.0]);
        assert_eq!(channel.get_timestamp(TimestampPoint::End), vec![1.5, 3.5, 5.5]);
        assert_eq!(channel.get_timestamp(TimestampPoint::Mid), vec![1.0, 3.0, 5.0]);
    }

    #[test]
    fn test_empty_channel_rejected() {
        assert!(matches!(
            Channel::new("ecg", Vec::<f64>::new(), 10.0),
            Err(BiosigError::ShapeMismatch { .. })
        ));
        assert!(Channel::new("ecg", vec![Vec::<f64>::new(), Vec::new()], 10.0).is_err());
    }

    #[test]
    fn test_ragged_windows_rejected() {
        let data = vec![vec![1.0, 2.0], vec![3.0]];
        assert!(matches!(
            Channel::new("eda", data, 4.0),
            Err(BiosigError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_explicit_timestamps() {
        let channel = Channel::builder("resp", vec![1.0, 2.0, 3.0], 1.0)
            .timestamps(vec![100.0, 101.0, 103.0])
            .resolution(TimestampResolution::Milliseconds)
            .build()
            .unwrap();
        assert_eq!(channel.get_timestamp(TimestampPoint::Mid), vec![100.0, 101.0, 103.0]);

        let missing_resolution = Channel::builder("resp", vec![1.0, 2.0], 1.0)
            .timestamps(vec![0.0, 1.0])
            .build();
        assert!(matches!(missing_resolution, Err(BiosigError::InvalidTimestamp { .. })));

        let wrong_shape = Channel::builder("resp", vec![1.0, 2.0], 1.0)
            .timestamps(vec![0.0, 1.0, 2.0])
            .resolution(TimestampResolution::Seconds)
            .build();
        assert!(matches!(wrong_shape, Err(BiosigError::ShapeMismatch { .. })));

        let decreasing = Channel::builder("resp", vec![1.0, 2.0], 1.0)
            .timestamps(vec![1.0, 0.0])
            .resolution(TimestampResolution::Seconds)
            .build();
        assert!(matches!(decreasing, Err(BiosigError::InvalidTimestamp { .. })));
    }

    #[test]
    fn test_timestamp_start_and_resolution() {
        let channel = Channel::builder("acc", vec![0.0; 3], 4.0)
            .resolution(TimestampResolution::Milliseconds)
            .timestamp_start(1000.0)
            .build()
            .unwrap();
        assert_eq!(channel.get_timestamp(TimestampPoint::Start), vec![1000.0, 1250.0, 1500.0]);
    }

    #[test]
    fn test_replace_data_same_length() {
        let mut channel = Channel::new("ecg", vec![1.0, 2.0, 3.0], 10.0).unwrap();
        let before = channel.timestamps().clone();

        channel.replace_data(vec![3.0, 2.0, 1.0]).unwrap();
        assert_eq!(channel.data(), &SignalData::Continuous(vec![3.0, 2.0, 1.0]));
        assert_eq!(channel.timestamps(), &before);
        assert_eq!(channel.sampling_rate(), 10.0);
    }

    #[test]
    fn test_replace_data_recomputes_rate() {
        let mut channel = Channel::new("ecg", vec![0.0; 100], 100.0).unwrap();
        channel.replace_data(vec![0.0; 50]).unwrap();

        assert!((channel.sampling_rate() - 50.0).abs() < 1e-9);
        assert_eq!(channel.len(), 50);
        assert!((channel.signal_duration() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_replace_data_rejects_window_change() {
        let mut channel = Channel::new("ecg", vec![vec![0.0; 4]; 3], 4.0).unwrap();

        assert!(channel.replace_data(vec![vec![0.0; 4]; 2]).is_err());
        assert!(channel.replace_data(vec![0.0; 12]).is_err());

        channel.replace_data(vec![vec![1.0; 2]; 3]).unwrap();
        assert_eq!(channel.get_timestamp(TimestampPoint::Start), vec![0.0, 1.0, 2.0]);
        assert!((channel.sampling_rate() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_replace_data_with_timing() {
        let mut channel = Channel::new("ecg", vec![0.0; 4], 4.0).unwrap();
        channel
            .replace_data_with_timing(vec![vec![1.0, 2.0]; 2], vec![vec![0.0, 0.5], vec![2.0, 2.5]], 2.0)
            .unwrap();
        assert_eq!(channel.windows(), 2);
        assert_eq!(channel.sampling_rate(), 2.0);
    }

    #[test]
    fn test_copy_is_independent() {
        let original = Channel::new("ecg", vec![1.0, 2.0, 3.0], 10.0).unwrap();
        let mut copy = original.clone();
        copy.replace_data(vec![9.0, 9.0, 9.0]).unwrap();
        copy.sync_offset(5.0);

        assert_eq!(original.data(), &SignalData::Continuous(vec![1.0, 2.0, 3.0]));
        assert_eq!(original.get_timestamp(TimestampPoint::Start)[0], 0.0);
    }

    #[test]
    fn test_sync_offset() {
        let mut channel = Channel::new("ecg", vec![vec![0.0; 2]; 2], 1.0).unwrap();
        channel.sync_offset(10.0);

        assert_eq!(
            channel.timestamps(),
            &SignalData::Windowed(vec![vec![10.0, 11.0], vec![12.0, 13.0]])
        );
        assert_eq!(channel.timestamp_start(), 10.0);
    }
}
