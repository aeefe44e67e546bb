//! Reference feature functions

use crate::feature::FeatureValue;
use crate::function::Inputs;
use crate::params::Arguments;
use biosig_core::{config_error, shape_error, BiosigResult};
use rustfft::{num_complex::Complex, FftPlanner};

const HISTOGRAM_BINS: usize = 20;

fn samples<'a>(inputs: &Inputs<'a>) -> BiosigResult<&'a [f64]> {
    let data = inputs.first()?;
    if data.is_empty() {
        return Err(shape_error!("cannot compute features of an empty window"));
    }
    Ok(data)
}

/// Amplitude and waveform-shape features
pub fn time_domain(inputs: &Inputs<'_>, _arguments: &Arguments) -> BiosigResult<FeatureValue> {
    let data = samples(inputs)?;
    let n = data.len() as f64;

    let mean = data.iter().sum::<f64>() / n;
    let rms = (data.iter().map(|x| x * x).sum::<f64>() / n).sqrt();
    let mav = data.iter().map(|x| x.abs()).sum::<f64>() / n;
    let variance = data.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    let min = data.iter().fold(f64::INFINITY, |a, &b| a.min(b));
    let max = data.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));

    let zero_crossings = data
        .windows(2)
        .filter(|w| (w[0] < 0.0) != (w[1] < 0.0))
        .count();
    let waveform_length = data.windows(2).map(|w| (w[1] - w[0]).abs()).sum::<f64>();
    let slope_sign_changes = data
        .windows(3)
        .filter(|w| (w[1] > w[0]) != (w[2] > w[1]))
        .count();

    Ok(FeatureValue::series([
        ("mean", mean),
        ("rms", rms),
        ("mav", mav),
        ("variance", variance),
        ("std", variance.sqrt()),
        ("min", min),
        ("max", max),
        ("peak_to_peak", max - min),
        ("zero_crossings", zero_crossings as f64),
        ("waveform_length", waveform_length),
        ("slope_sign_changes", slope_sign_changes as f64),
    ]))
}

/// Distribution shape: skewness, excess kurtosis, histogram entropy, energy
pub fn statistical(inputs: &Inputs<'_>, _arguments: &Arguments) -> BiosigResult<FeatureValue> {
    let data = samples(inputs)?;
    let n = data.len() as f64;
    let mean = data.iter().sum::<f64>() / n;

    let (mut m2, mut m3, mut m4) = (0.0, 0.0, 0.0);
    for &x in data {
        let d = x - mean;
        m2 += d * d;
        m3 += d * d * d;
        m4 += d * d * d * d;
    }
    m2 /= n;
    m3 /= n;
    m4 /= n;
    let std = m2.sqrt();
    let (skewness, kurtosis) = if std > 0.0 {
        (m3 / std.powi(3), m4 / std.powi(4) - 3.0)
    } else {
        (0.0, 0.0)
    };

    let energy = data.iter().map(|x| x * x).sum::<f64>();

    Ok(FeatureValue::series([
        ("skewness", skewness),
        ("kurtosis", kurtosis),
        ("entropy", histogram_entropy(data)),
        ("energy", energy),
        ("power", energy / n),
    ]))
}

fn histogram_entropy(data: &[f64]) -> f64 {
    let min = data.iter().fold(f64::INFINITY, |a, &b| a.min(b));
    let max = data.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));
    let range = max - min;
    if range <= 0.0 {
        return 0.0;
    }

    let mut histogram = [0usize; HISTOGRAM_BINS];
    for &x in data {
        let bin = ((x - min) / range * (HISTOGRAM_BINS - 1) as f64) as usize;
        histogram[bin.min(HISTOGRAM_BINS - 1)] += 1;
    }
    let n = data.len() as f64;
    histogram
        .iter()
        .filter(|&&count| count > 0)
        .map(|&count| {
            let p = count as f64 / n;
            -p * p.log2()
        })
        .sum()
}

/// FFT based spectral summary
///
/// Needs `sampling_rate`. Band edges come from `bands` (ascending Hz,
/// `k + 1` edges for `k` bands); without them the band up to Nyquist is
/// split in three. Band powers are returned nested under `band_powers`.
pub fn spectral(inputs: &Inputs<'_>, arguments: &Arguments) -> BiosigResult<FeatureValue> {
    let data = samples(inputs)?;
    let fs = arguments.require_float("sampling_rate")?;
    let nyquist = fs / 2.0;
    let edges = match arguments.get("bands").and_then(|v| v.as_float_array()) {
        Some(edges) => edges.to_vec(),
        None => vec![0.0, nyquist / 4.0, nyquist / 2.0, nyquist],
    };
    if edges.len() < 2 || edges.windows(2).any(|w| w[1] <= w[0]) || edges[0] < 0.0 {
        return Err(config_error!("band edges must be ascending and non-negative"));
    }

    let fft_size = data.len().next_power_of_two().max(2);
    let mut buffer: Vec<Complex<f64>> = data.iter().map(|&x| Complex::new(x, 0.0)).collect();
    buffer.resize(fft_size, Complex::new(0.0, 0.0));
    FftPlanner::new().plan_fft_forward(fft_size).process(&mut buffer);

    let power: Vec<f64> = buffer[..fft_size / 2].iter().map(|c| c.norm_sqr()).collect();
    let resolution = fs / fft_size as f64;
    let frequency = |bin: usize| bin as f64 * resolution;
    let total_power: f64 = power.iter().sum();

    let band_powers = FeatureValue::series(edges.windows(2).enumerate().map(|(i, w)| {
        let band: f64 = power
            .iter()
            .enumerate()
            .filter(|(bin, _)| frequency(*bin) >= w[0] && frequency(*bin) < w[1])
            .map(|(_, p)| p)
            .sum();
        (format!("band_{}", i), band)
    }));

    if total_power == 0.0 {
        return Ok(FeatureValue::record([
            ("mean_frequency", FeatureValue::Scalar(0.0)),
            ("median_frequency", FeatureValue::Scalar(0.0)),
            ("peak_frequency", FeatureValue::Scalar(0.0)),
            ("spectral_centroid", FeatureValue::Scalar(0.0)),
            ("total_power", FeatureValue::Scalar(0.0)),
            ("band_powers", band_powers),
        ]));
    }

    let peak_bin = power
        .iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |best, (bin, &p)| if p > best.1 { (bin, p) } else { best })
        .0;

    let centroid = power
        .iter()
        .enumerate()
        .map(|(bin, p)| frequency(bin) * p)
        .sum::<f64>()
        / total_power;

    // DC excluded
    let ac_power: f64 = power.iter().skip(1).sum();
    let mean_frequency = if ac_power > 0.0 {
        power
            .iter()
            .enumerate()
            .skip(1)
            .map(|(bin, p)| frequency(bin) * p)
            .sum::<f64>()
            / ac_power
    } else {
        0.0
    };

    let mut cumulative = 0.0;
    let median_bin = power
        .iter()
        .position(|p| {
            cumulative += p;
            cumulative >= total_power / 2.0
        })
        .unwrap_or(0);

    Ok(FeatureValue::record([
        ("mean_frequency", FeatureValue::Scalar(mean_frequency)),
        ("median_frequency", FeatureValue::Scalar(frequency(median_bin))),
        ("peak_frequency", FeatureValue::Scalar(frequency(peak_bin))),
        ("spectral_centroid", FeatureValue::Scalar(centroid)),
        ("total_power", FeatureValue::Scalar(total_power)),
        ("band_powers", band_powers),
    ]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args;

    fn lookup(value: FeatureValue, key: &str) -> f64 {
        value
            .flatten()
            .into_iter()
            .find(|(k, _)| k.as_deref() == Some(key))
            .map(|(_, v)| v)
            .unwrap()
    }

    #[test]
    fn test_time_domain() {
        let data = [1.0, -1.0, 1.0, -1.0];
        let features = time_domain(&Inputs::single(&data), &args! {}).unwrap();
        assert_eq!(lookup(features.clone(), "mean"), 0.0);
        assert!((lookup(features.clone(), "rms") - 1.0).abs() < 1e-12);
        assert_eq!(lookup(features.clone(), "zero_crossings"), 3.0);
        assert_eq!(lookup(features.clone(), "waveform_length"), 6.0);
        assert_eq!(lookup(features.clone(), "slope_sign_changes"), 2.0);
        assert_eq!(lookup(features, "peak_to_peak"), 2.0);
    }

    #[test]
    fn test_empty_window_is_an_error() {
        let empty: [f64; 0] = [];
        assert!(time_domain(&Inputs::single(&empty), &args! {}).is_err());
        assert!(statistical(&Inputs::single(&empty), &args! {}).is_err());
    }

    #[test]
    fn test_statistical() {
        let symmetric = [1.0, 2.0, 3.0, 4.0, 5.0];
        let features = statistical(&Inputs::single(&symmetric), &args! {}).unwrap();
        assert!(lookup(features.clone(), "skewness").abs() < 1e-12);
        assert_eq!(lookup(features.clone(), "energy"), 55.0);
        assert_eq!(lookup(features.clone(), "power"), 11.0);
        assert!(lookup(features, "entropy") > 0.0);

        let flat = [2.0; 8];
        let features = statistical(&Inputs::single(&flat), &args! {}).unwrap();
        assert_eq!(lookup(features.clone(), "kurtosis"), 0.0);
        assert_eq!(lookup(features, "entropy"), 0.0);
    }

    #[test]
    fn test_spectral_peak_and_bands() {
        let fs = 64.0;
        let data: Vec<f64> = (0..256)
            .map(|i| (2.0 * std::f64::consts::PI * 8.0 * i as f64 / fs).sin())
            .collect();
        let features = spectral(&Inputs::single(&data), &args! {"sampling_rate" => fs}).unwrap();
        assert!((lookup(features.clone(), "peak_frequency") - 8.0).abs() < 1e-9);

        let flat = features.flatten();
        let names: Vec<_> = flat.iter().filter_map(|(k, _)| k.clone()).collect();
        assert!(names.contains(&"band_powers_band_0".to_string()));
        assert!(names.contains(&"band_powers_band_2".to_string()));

        // 8 Hz falls in the middle band of [0, 8, 16, 32]
        let bands = args! {"sampling_rate" => fs, "bands" => vec![0.0, 4.0, 16.0, 32.0]};
        let features = spectral(&Inputs::single(&data), &bands).unwrap();
        let middle = lookup(features.clone(), "band_powers_band_1");
        assert!(middle > 0.99 * lookup(features, "total_power"));
    }

    #[test]
    fn test_spectral_arguments() {
        let data = [0.0; 16];
        assert!(spectral(&Inputs::single(&data), &args! {}).is_err());
        let zero = spectral(&Inputs::single(&data), &args! {"sampling_rate" => 10.0}).unwrap();
        assert_eq!(lookup(zero, "total_power"), 0.0);

        let descending = args! {"sampling_rate" => 10.0, "bands" => vec![3.0, 1.0]};
        assert!(spectral(&Inputs::single(&data), &descending).is_err());
    }
}
