//! Sliding-window segmentation of continuous signals
//!
//! Windows start at `0, S, 2S, ...` and hold `W` samples, where
//! `W = floor(window_size * sampling_rate)` and
//! `S = floor(step_size * sampling_rate)`. Trailing samples that do not fill a
//! whole window are dropped.

use crate::error::{BiosigError, BiosigResult};
use crate::channel::validate_sampling_rate;

/// Window and step expressed in samples
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowPlan {
    pub window_samples: usize,
    pub step_samples: usize,
    pub num_windows: usize,
}

impl WindowPlan {
    /// Compute the window layout for a signal of `len` samples
    pub fn new(
        len: usize,
        window_size: f64,
        step_size: f64,
        sampling_rate: f64,
    ) -> BiosigResult<Self> {
        validate_sampling_rate(sampling_rate)?;
        if !(window_size > 0.0) {
            return Err(BiosigError::InvalidWindow {
                reason: format!("window size must be positive, got {}s", window_size),
            });
        }
        if !(step_size > 0.0) {
            return Err(BiosigError::InvalidWindow {
                reason: format!("step size must be positive, got {}s", step_size),
            });
        }
        if window_size * sampling_rate > len as f64 {
            return Err(BiosigError::InvalidWindow {
                reason: format!(
                    "window of {}s at {}Hz is longer than the {} sample signal",
                    window_size, sampling_rate, len
                ),
            });
        }

        let window_samples = (window_size * sampling_rate).floor() as usize;
        let step_samples = (step_size * sampling_rate).floor() as usize;
        if window_samples == 0 || step_samples == 0 {
            return Err(BiosigError::InvalidWindow {
                reason: format!(
                    "window ({}s) and step ({}s) must each cover at least one sample at {}Hz",
                    window_size, step_size, sampling_rate
                ),
            });
        }

        Ok(WindowPlan {
            window_samples,
            step_samples,
            num_windows: (len - window_samples) / step_samples + 1,
        })
    }

    /// Slice `signal` according to this plan
    pub fn apply(&self, signal: &[f64]) -> Vec<Vec<f64>> {
        (0..self.num_windows)
            .map(|i| {
                let start = i * self.step_samples;
                signal[start..start + self.window_samples].to_vec()
            })
            .collect()
    }
}

/// Split `signal` into overlapping or adjacent windows
pub fn segment(
    signal: &[f64],
    window_size: f64,
    step_size: f64,
    sampling_rate: f64,
) -> BiosigResult<Vec<Vec<f64>>> {
    let plan = WindowPlan::new(signal.len(), window_size, step_size, sampling_rate)?;
    Ok(plan.apply(signal))
}
