//! Reference processing functions over sample buffers

use crate::function::{FunctionOutput, Inputs, Invocation};
use crate::params::Arguments;
use biosig_core::{config_error, BiosigResult};
use std::collections::VecDeque;

/// Trailing boxcar average; the first samples average what is available
pub fn moving_average(inputs: &Inputs<'_>, arguments: &Arguments) -> BiosigResult<FunctionOutput> {
    let window = positive(arguments.get_int("window", 5), "window")?;
    let mut buffer = VecDeque::with_capacity(window + 1);
    Ok(FunctionOutput::Sequence(smooth(&mut buffer, inputs.first()?, window)))
}

/// Batch form of [`moving_average`] over every window of a channel
///
/// Windows are smoothed in one pass through a single ring buffer; the
/// window length is only reparsed when the arguments change.
pub fn moving_average_windows(windows: &[Invocation<'_>]) -> BiosigResult<Vec<FunctionOutput>> {
    let mut buffer = VecDeque::new();
    let mut parsed: Option<(&Arguments, usize)> = None;
    let mut outputs = Vec::with_capacity(windows.len());
    for call in windows {
        let window = match parsed {
            Some((arguments, window)) if arguments == &call.arguments => window,
            _ => {
                let window = positive(call.arguments.get_int("window", 5), "window")?;
                parsed = Some((&call.arguments, window));
                window
            }
        };
        outputs.push(FunctionOutput::Sequence(smooth(&mut buffer, call.inputs.first()?, window)));
    }
    Ok(outputs)
}

fn smooth(buffer: &mut VecDeque<f64>, samples: &[f64], window: usize) -> Vec<f64> {
    buffer.clear();
    let mut sum = 0.0;
    samples
        .iter()
        .map(|&sample| {
            buffer.push_back(sample);
            sum += sample;
            if buffer.len() > window {
                if let Some(oldest) = buffer.pop_front() {
                    sum -= oldest;
                }
            }
            sum / buffer.len() as f64
        })
        .collect()
}

/// Subtract the buffer mean
pub fn remove_mean(inputs: &Inputs<'_>, _arguments: &Arguments) -> BiosigResult<FunctionOutput> {
    let samples = inputs.first()?;
    let mean = samples.iter().sum::<f64>() / samples.len().max(1) as f64;
    Ok(FunctionOutput::Sequence(samples.iter().map(|x| x - mean).collect()))
}

/// Keep every `factor`-th sample
pub fn decimate(inputs: &Inputs<'_>, arguments: &Arguments) -> BiosigResult<FunctionOutput> {
    let factor = positive(arguments.get_int("factor", 2), "factor")?;
    Ok(FunctionOutput::Sequence(
        inputs.first()?.iter().step_by(factor).copied().collect(),
    ))
}

/// Local maxima at or above `threshold`, at least `distance` samples apart
///
/// When two candidates are closer than `distance` the larger one wins.
pub fn detect_peaks(inputs: &Inputs<'_>, arguments: &Arguments) -> BiosigResult<FunctionOutput> {
    let samples = inputs.first()?;
    let threshold = arguments.get_float("threshold", 0.0);
    let distance = positive(arguments.get_int("distance", 1), "distance")?;

    let mut peaks: Vec<usize> = Vec::new();
    for i in 1..samples.len().saturating_sub(1) {
        let x = samples[i];
        if x < threshold || x <= samples[i - 1] || x < samples[i + 1] {
            continue;
        }
        match peaks.last_mut() {
            Some(last) if i - *last < distance => {
                if x > samples[*last] {
                    *last = i;
                }
            }
            _ => peaks.push(i),
        }
    }
    Ok(FunctionOutput::Events(peaks))
}

/// Rectified and squared copies of one buffer, as two columns
pub fn split_quadrature(inputs: &Inputs<'_>, _arguments: &Arguments) -> BiosigResult<FunctionOutput> {
    let samples = inputs.first()?;
    Ok(FunctionOutput::table([
        ("rectified", samples.iter().map(|x| x.abs()).collect::<Vec<_>>()),
        ("squared", samples.iter().map(|x| x * x).collect()),
    ]))
}

/// Second order Butterworth lowpass
pub fn lowpass(inputs: &Inputs<'_>, arguments: &Arguments) -> BiosigResult<FunctionOutput> {
    let (cutoff, fs) = cutoff_and_rate(arguments)?;
    Ok(FunctionOutput::Sequence(Biquad::lowpass(cutoff, fs).filter(inputs.first()?)))
}

/// Second order Butterworth highpass
pub fn highpass(inputs: &Inputs<'_>, arguments: &Arguments) -> BiosigResult<FunctionOutput> {
    let (cutoff, fs) = cutoff_and_rate(arguments)?;
    Ok(FunctionOutput::Sequence(Biquad::highpass(cutoff, fs).filter(inputs.first()?)))
}

/// Powerline notch at `frequency` (default 50 Hz) with quality `quality`
pub fn notch(inputs: &Inputs<'_>, arguments: &Arguments) -> BiosigResult<FunctionOutput> {
    let fs = arguments.require_float("sampling_rate")?;
    let frequency = arguments.get_float("frequency", 50.0);
    let quality = arguments.get_float("quality", 30.0);
    if frequency <= 0.0 || frequency >= fs / 2.0 {
        return Err(config_error!(
            "notch frequency {} Hz must lie below Nyquist ({} Hz)",
            frequency,
            fs / 2.0
        ));
    }
    if quality <= 0.0 {
        return Err(config_error!("notch quality must be positive"));
    }
    Ok(FunctionOutput::Sequence(Biquad::notch(frequency, quality, fs).filter(inputs.first()?)))
}

fn cutoff_and_rate(arguments: &Arguments) -> BiosigResult<(f64, f64)> {
    let cutoff = arguments.require_float("cutoff")?;
    let fs = arguments.require_float("sampling_rate")?;
    if cutoff <= 0.0 || cutoff >= fs / 2.0 {
        return Err(config_error!(
            "cutoff {} Hz must lie between 0 and Nyquist ({} Hz)",
            cutoff,
            fs / 2.0
        ));
    }
    Ok((cutoff, fs))
}

fn positive(value: i64, name: &str) -> BiosigResult<usize> {
    usize::try_from(value)
        .ok()
        .filter(|v| *v > 0)
        .ok_or_else(|| config_error!("'{}' must be a positive integer, got {}", name, value))
}

/// Single biquad section: y[n] = b0*x[n] + b1*x[n-1] + b2*x[n-2] - a1*y[n-1] - a2*y[n-2]
#[derive(Debug, Clone, Copy)]
struct Biquad {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

impl Biquad {
    fn lowpass(cutoff: f64, fs: f64) -> Self {
        let (k2, norm, a1, a2) = Self::butterworth(cutoff, fs);
        let b0 = k2 / norm;
        Biquad { b0, b1: 2.0 * b0, b2: b0, a1, a2 }
    }

    fn highpass(cutoff: f64, fs: f64) -> Self {
        let (_, norm, a1, a2) = Self::butterworth(cutoff, fs);
        let b0 = 1.0 / norm;
        Biquad { b0, b1: -2.0 * b0, b2: b0, a1, a2 }
    }

    // Bilinear transform with pre-warped cutoff
    fn butterworth(cutoff: f64, fs: f64) -> (f64, f64, f64, f64) {
        let k = (std::f64::consts::PI * cutoff / fs).tan();
        let k2 = k * k;
        let sqrt2 = std::f64::consts::SQRT_2;
        let norm = k2 + sqrt2 * k + 1.0;
        (k2, norm, 2.0 * (k2 - 1.0) / norm, (k2 - sqrt2 * k + 1.0) / norm)
    }

    fn notch(frequency: f64, quality: f64, fs: f64) -> Self {
        let omega = 2.0 * std::f64::consts::PI * frequency / fs;
        let alpha = omega.sin() / (2.0 * quality);
        let cos_omega = omega.cos();
        let a0 = 1.0 + alpha;
        Biquad {
            b0: 1.0 / a0,
            b1: -2.0 * cos_omega / a0,
            b2: 1.0 / a0,
            a1: -2.0 * cos_omega / a0,
            a2: (1.0 - alpha) / a0,
        }
    }

    fn filter(&self, samples: &[f64]) -> Vec<f64> {
        let (mut x1, mut x2, mut y1, mut y2) = (0.0, 0.0, 0.0, 0.0);
        samples
            .iter()
            .map(|&x| {
                let y = self.b0 * x + self.b1 * x1 + self.b2 * x2 - self.a1 * y1 - self.a2 * y2;
                x2 = x1;
                x1 = x;
                y2 = y1;
                y1 = y;
                y
            })
            .collect()
    }
}
