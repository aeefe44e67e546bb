//! Deterministic waveform shapes used by the simulator

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Noise-free signal shape as a function of time in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignalPattern {
    /// Constant level
    Constant { level: f64 },
    /// Sine around a baseline, e.g. breathing
    Sinusoidal {
        frequency: f64,
        amplitude: f64,
        baseline: f64,
    },
    /// Narrow Gaussian pulses at a fixed rate, a crude cardiac R-wave train
    PulseTrain {
        /// Pulses per minute
        rate_bpm: f64,
        amplitude: f64,
        /// Pulse standard deviation in seconds
        width: f64,
    },
    /// Linear change that holds `end_level` after `duration`
    Ramp {
        start_level: f64,
        end_level: f64,
        duration: f64,
    },
    /// On/off cycles
    Burst {
        on_duration: f64,
        off_duration: f64,
        amplitude: f64,
    },
}

impl SignalPattern {
    /// Pattern value at `time`
    pub fn value_at(&self, time: f64) -> f64 {
        match *self {
            SignalPattern::Constant { level } => level,

            SignalPattern::Sinusoidal {
                frequency,
                amplitude,
                baseline,
            } => baseline + amplitude * (2.0 * PI * frequency * time).sin(),

            SignalPattern::PulseTrain {
                rate_bpm,
                amplitude,
                width,
            } => {
                if rate_bpm <= 0.0 || width <= 0.0 {
                    return 0.0;
                }
                let period = 60.0 / rate_bpm;
                // pulse centred half a period into each beat
                let offset = time.rem_euclid(period) - period / 2.0;
                amplitude * (-0.5 * (offset / width).powi(2)).exp()
            }

            SignalPattern::Ramp {
                start_level,
                end_level,
                duration,
            } => {
                if time >= duration {
                    end_level
                } else {
                    start_level + (end_level - start_level) * (time / duration)
                }
            }

            SignalPattern::Burst {
                on_duration,
                off_duration,
                amplitude,
            } => {
                let cycle = on_duration + off_duration;
                if cycle > 0.0 && time.rem_euclid(cycle) < on_duration {
                    amplitude
                } else {
                    0.0
                }
            }
        }
    }

    /// Get pattern description
    pub fn description(&self) -> &'static str {
        match self {
            SignalPattern::Constant { .. } => "Constant level",
            SignalPattern::Sinusoidal { .. } => "Sinusoidal oscillation",
            SignalPattern::PulseTrain { .. } => "Pulse train",
            SignalPattern::Ramp { .. } => "Gradual ramp",
            SignalPattern::Burst { .. } => "Burst pattern",
        }
    }

    /// Common physiological presets
    pub fn presets() -> Vec<(&'static str, SignalPattern)> {
        vec![
            ("Resting Heart", SignalPattern::PulseTrain { rate_bpm: 60.0, amplitude: 1.0, width: 0.02 }),
            ("Exercise Heart", SignalPattern::PulseTrain { rate_bpm: 150.0, amplitude: 1.0, width: 0.015 }),
            ("Calm Breathing", SignalPattern::Sinusoidal { frequency: 0.25, amplitude: 0.5, baseline: 0.0 }),
            ("Fast Breathing", SignalPattern::Sinusoidal { frequency: 0.6, amplitude: 0.3, baseline: 0.0 }),
            ("Skin Conductance Drift", SignalPattern::Ramp { start_level: 2.0, end_level: 4.0, duration: 60.0 }),
            ("Muscle Bursts", SignalPattern::Burst { on_duration: 2.0, off_duration: 1.0, amplitude: 0.8 }),
        ]
    }
}
