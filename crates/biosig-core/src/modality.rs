//! Recording modality tags for containers

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Physiological modality of a recording session
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Ecg,
    Ppg,
    Eda,
    Emg,
    Imu,
    Respiration,
    /// Mixed sensors in one session
    Multimodal,
    Other(String),
}

impl Modality {
    /// Typical sampling rate in Hz for devices of this modality
    pub fn typical_sampling_rate(&self) -> Option<f64> {
        match self {
            Modality::Ecg => Some(250.0),
            Modality::Ppg => Some(64.0),
            Modality::Eda => Some(4.0),
            Modality::Emg => Some(1000.0),
            Modality::Imu => Some(32.0),
            Modality::Respiration => Some(25.0),
            Modality::Multimodal | Modality::Other(_) => None,
        }
    }
}

impl std::fmt::Display for Modality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Modality::Ecg => write!(f, "ECG"),
            Modality::Ppg => write!(f, "PPG"),
            Modality::Eda => write!(f, "EDA"),
            Modality::Emg => write!(f, "EMG"),
            Modality::Imu => write!(f, "IMU"),
            Modality::Respiration => write!(f, "Respiration"),
            Modality::Multimodal => write!(f, "Multimodal"),
            Modality::Other(tag) => write!(f, "Other({})", tag),
        }
    }
}

impl FromStr for Modality {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "ecg" => Modality::Ecg,
            "ppg" | "bvp" => Modality::Ppg,
            "eda" | "gsr" => Modality::Eda,
            "emg" => Modality::Emg,
            "imu" | "acc" | "accelerometer" => Modality::Imu,
            "resp" | "respiration" => Modality::Respiration,
            "multimodal" => Modality::Multimodal,
            _ => Modality::Other(s.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modality_parsing() {
        assert_eq!("ECG".parse::<Modality>().unwrap(), Modality::Ecg);
        assert_eq!("gsr".parse::<Modality>().unwrap(), Modality::Eda);
        assert_eq!(
            "eeg".parse::<Modality>().unwrap(),
            Modality::Other("eeg".to_string())
        );
    }

    #[test]
    fn test_modality_display() {
        assert_eq!(Modality::Ppg.to_string(), "PPG");
        assert_eq!(Modality::Other("eeg".into()).to_string(), "Other(eeg)");
        assert!(Modality::Other("eeg".into()).typical_sampling_rate().is_none());
    }
}
