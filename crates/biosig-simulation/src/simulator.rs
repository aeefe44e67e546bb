//! Seeded signal simulator producing channels and containers

use crate::signal_patterns::SignalPattern;
use biosig_core::{validate_sampling_rate, BiosigError, BiosigResult, Channel, Container, Modality};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use tracing::debug;

/// Configuration for one simulated channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Channel name
    pub name: String,
    /// Sampling rate in Hz
    pub sampling_rate: f64,
    /// Signal shape
    pub pattern: SignalPattern,
    /// Gaussian noise standard deviation (0.0 = no noise)
    pub noise_std: f64,
    /// Slow baseline wander amplitude at 0.1 Hz
    pub baseline_wander: f64,
    /// Power line interference frequency (50/60Hz)
    pub powerline_freq: Option<f64>,
    pub powerline_amplitude: f64,
    /// Random seed for reproducibility
    pub seed: Option<u64>,
}

impl SimulationConfig {
    /// Noise-free configuration
    pub fn new(name: &str, sampling_rate: f64, pattern: SignalPattern) -> Self {
        SimulationConfig {
            name: name.to_string(),
            sampling_rate,
            pattern,
            noise_std: 0.0,
            baseline_wander: 0.0,
            powerline_freq: None,
            powerline_amplitude: 0.05,
            seed: None,
        }
    }

    pub fn with_noise(mut self, noise_std: f64) -> Self {
        self.noise_std = noise_std;
        self
    }

    pub fn with_powerline(mut self, frequency: f64, amplitude: f64) -> Self {
        self.powerline_freq = Some(frequency);
        self.powerline_amplitude = amplitude;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn validate(&self) -> BiosigResult<()> {
        validate_sampling_rate(self.sampling_rate)?;
        if self.name.is_empty() {
            return Err(BiosigError::InvalidConfig {
                reason: "simulated channel needs a name".to_string(),
            });
        }
        if !(self.noise_std >= 0.0 && self.noise_std.is_finite()) {
            return Err(BiosigError::InvalidConfig {
                reason: format!("noise standard deviation must be non-negative, got {}", self.noise_std),
            });
        }
        if let Some(frequency) = self.powerline_freq {
            if frequency <= 0.0 {
                return Err(BiosigError::InvalidConfig {
                    reason: format!("powerline frequency must be positive, got {}", frequency),
                });
            }
        }
        Ok(())
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            noise_std: 0.02,
            baseline_wander: 0.05,
            ..SimulationConfig::new(
                "ecg",
                250.0,
                SignalPattern::PulseTrain {
                    rate_bpm: 60.0,
                    amplitude: 1.0,
                    width: 0.02,
                },
            )
        }
    }
}

/// Signal simulator; consecutive calls continue where the last one stopped
pub struct Simulator {
    config: SimulationConfig,
    rng: StdRng,
    noise: Normal<f64>,
    time_offset: f64,
}

impl Simulator {
    /// Create new simulator with configuration
    pub fn new(config: SimulationConfig) -> BiosigResult<Self> {
        config.validate()?;

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let noise = Normal::new(0.0, config.noise_std).map_err(|e| BiosigError::InvalidConfig {
            reason: format!("invalid noise level {}: {}", config.noise_std, e),
        })?;

        Ok(Simulator {
            config,
            rng,
            noise,
            time_offset: 0.0,
        })
    }

    /// Generate `duration` seconds as a flat channel
    ///
    /// The channel's `timestamp_start` is the simulated time reached so far.
    pub fn generate(&mut self, duration: f64) -> BiosigResult<Channel> {
        let fs = self.config.sampling_rate;
        let count = (duration * fs).floor() as usize;
        if count == 0 {
            return Err(BiosigError::InvalidConfig {
                reason: format!("{}s at {}Hz yields no samples", duration, fs),
            });
        }

        let start = self.time_offset;
        let data: Vec<f64> = (0..count)
            .map(|i| {
                let time = start + i as f64 / fs;
                self.sample(time)
            })
            .collect();
        self.time_offset += count as f64 / fs;

        debug!(
            channel = %self.config.name,
            samples = count,
            start,
            pattern = self.config.pattern.description(),
            "simulated channel"
        );

        Channel::builder(&self.config.name, data, fs)
            .timestamp_start(start)
            .build()
    }

    fn sample(&mut self, time: f64) -> f64 {
        let mut value = self.config.pattern.value_at(time);
        value += self.noise.sample(&mut self.rng);
        value += self.config.baseline_wander * (2.0 * PI * 0.1 * time).sin();
        if let Some(frequency) = self.config.powerline_freq {
            value += self.config.powerline_amplitude * (2.0 * PI * frequency * time).sin();
        }
        value
    }

    /// Restart simulated time at zero
    pub fn reset_time(&mut self) {
        self.time_offset = 0.0;
    }

    /// Get current configuration
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }
}

/// Multi-channel recording of one simulated session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recording {
    pub channels: Vec<SimulationConfig>,
    pub seed: Option<u64>,
}

impl Recording {
    pub fn new() -> Self {
        Recording {
            channels: Vec::new(),
            seed: None,
        }
    }

    /// Resting session: ecg at 250 Hz, respiration at 25 Hz, eda at 4 Hz
    pub fn resting(seed: u64) -> Self {
        let ecg = SimulationConfig::default().with_powerline(50.0, 0.05);
        let resp = SimulationConfig::new(
            "resp",
            25.0,
            SignalPattern::Sinusoidal {
                frequency: 0.25,
                amplitude: 0.5,
                baseline: 0.0,
            },
        )
        .with_noise(0.01);
        let eda = SimulationConfig::new(
            "eda",
            4.0,
            SignalPattern::Ramp {
                start_level: 2.0,
                end_level: 4.0,
                duration: 60.0,
            },
        )
        .with_noise(0.005);

        Recording {
            channels: vec![ecg, resp, eda],
            seed: Some(seed),
        }
    }

    pub fn add_channel(&mut self, config: SimulationConfig) -> &mut Self {
        self.channels.push(config);
        self
    }

    /// Simulate every channel for `duration` seconds
    ///
    /// Channel `i` is seeded with `seed + i` unless it has its own seed.
    pub fn generate(&self, duration: f64) -> BiosigResult<Container> {
        let modality = match self.channels.as_slice() {
            [single] => single.name.parse::<Modality>().ok(),
            _ => Some(Modality::Multimodal),
        };
        let rate = self.channels.first().map(|c| c.sampling_rate);
        let mut container = Container::with_metadata(rate, modality)?;

        for (index, config) in self.channels.iter().enumerate() {
            let mut config = config.clone();
            if config.seed.is_none() {
                config.seed = self.seed.map(|seed| seed.wrapping_add(index as u64));
            }
            let channel = Simulator::new(config)?.generate(duration)?;
            container.add_channel(channel, None, false)?;
        }
        Ok(container)
    }
}

impl Default for Recording {
    fn default() -> Self {
        Self::new()
    }
}
