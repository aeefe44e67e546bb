//! Reference function library
//!
//! Small processing and feature functions that follow the buffer contracts,
//! plus name lookup so JSON configurations can refer to them.

pub mod features;
pub mod filters;

use crate::feature::Feature;
use crate::function::Vectorized;
use crate::params::Arguments;
use crate::process::Process;
use biosig_core::{config_error, BiosigResult};

/// Names accepted by [`process_by_name`]
pub const PROCESSES: [&str; 8] = [
    "moving_average",
    "remove_mean",
    "decimate",
    "detect_peaks",
    "split_quadrature",
    "lowpass",
    "highpass",
    "notch",
];

/// Names accepted by [`feature_by_name`]
pub const FEATURES: [&str; 3] = ["time_domain", "statistical", "spectral"];

/// Build a library process with `arguments` fixed
///
/// Every argument must be a parameter the function declares.
pub fn process_by_name(name: &str, arguments: &Arguments) -> BiosigResult<Process> {
    let process = match name {
        "moving_average" => Process::with_function(
            name,
            Vectorized::new(filters::moving_average, filters::moving_average_windows),
        )
        .parameter("window"),
        "remove_mean" => Process::new(name, filters::remove_mean),
        "decimate" => Process::new(name, filters::decimate).parameter("factor"),
        "detect_peaks" => Process::new(name, filters::detect_peaks).parameters(["threshold", "distance"]),
        "split_quadrature" => Process::new(name, filters::split_quadrature),
        "lowpass" => Process::new(name, filters::lowpass).parameters(["cutoff", "sampling_rate"]),
        "highpass" => Process::new(name, filters::highpass).parameters(["cutoff", "sampling_rate"]),
        "notch" => {
            Process::new(name, filters::notch).parameters(["frequency", "quality", "sampling_rate"])
        }
        _ => {
            return Err(config_error!(
                "unknown process '{}', expected one of {:?}",
                name,
                PROCESSES
            ))
        }
    };

    arguments.keys().try_fold(process, |process, key| {
        if !process.declares(key) {
            return Err(config_error!("process '{}' has no parameter '{}'", name, key));
        }
        match arguments.get(key) {
            Some(value) => Ok(process.argument(key, value.clone())),
            None => Ok(process),
        }
    })
}

/// Build a library feature with `arguments` fixed
pub fn feature_by_name(name: &str, arguments: &Arguments) -> BiosigResult<Feature> {
    let feature = match name {
        "time_domain" => Feature::new(name, features::time_domain),
        "statistical" => Feature::new(name, features::statistical),
        "spectral" => Feature::new(name, features::spectral),
        _ => {
            return Err(config_error!(
                "unknown feature '{}', expected one of {:?}",
                name,
                FEATURES
            ))
        }
    };

    Ok(arguments.keys().fold(feature, |feature, key| match arguments.get(key) {
        Some(value) => feature.argument(key, value.clone()),
        None => feature,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args;

    #[test]
    fn test_every_listed_name_resolves() {
        for name in PROCESSES {
            assert!(process_by_name(name, &args! {}).is_ok(), "{}", name);
        }
        for name in FEATURES {
            assert!(feature_by_name(name, &args! {}).is_ok(), "{}", name);
        }
    }

    #[test]
    fn test_unknown_names_and_arguments() {
        assert!(process_by_name("fft_magic", &args! {}).is_err());
        assert!(feature_by_name("fft_magic", &args! {}).is_err());
        assert!(process_by_name("remove_mean", &args! {"window" => 3}).is_err());

        let process = process_by_name("moving_average", &args! {"window" => 3}).unwrap();
        assert_eq!(process.arguments().get_int("window", 0), 3);
        assert!(process.declares("window"));
    }

    #[test]
    fn test_filters_receive_sampling_rate() {
        let process = process_by_name("lowpass", &args! {"cutoff" => 1.0}).unwrap();
        assert!(process.declares("sampling_rate"));
    }
}
