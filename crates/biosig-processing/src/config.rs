//! Configuration management for pipelines

use crate::params::Arguments;
use crate::queue::{InputSpec, OutputSpec};
use biosig_core::{config_error, BiosigError, BiosigResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Pipeline configuration, loadable from JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pipeline name
    pub name: String,
    /// Segment the preprocessed container before the main queue
    #[serde(default)]
    pub windowed_process: bool,
    /// Window length in seconds
    #[serde(default)]
    pub window_size: Option<f64>,
    /// Hop between window starts in seconds
    #[serde(default)]
    pub step_size: Option<f64>,
    /// Worker threads for feature extraction; sequential when absent
    #[serde(default)]
    pub feature_workers: Option<usize>,
    /// Library steps run before windowing
    #[serde(default)]
    pub preprocessing: Vec<StepConfig>,
    /// Library steps run after windowing
    #[serde(default)]
    pub processing: Vec<StepConfig>,
    /// Library features
    #[serde(default)]
    pub features: Vec<FeatureStepConfig>,
}

/// A queue step naming a reference-library process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepConfig {
    pub function: String,
    pub inputs: Vec<String>,
    /// Empty keeps the names chosen by the process
    #[serde(default)]
    pub outputs: Vec<String>,
    #[serde(default)]
    pub arguments: Arguments,
}

/// A feature step naming a reference-library feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureStepConfig {
    pub function: String,
    pub inputs: Vec<String>,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub arguments: Arguments,
}

impl StepConfig {
    pub fn new(function: &str, inputs: &[&str]) -> Self {
        StepConfig {
            function: function.to_string(),
            inputs: inputs.iter().map(|s| s.to_string()).collect(),
            outputs: Vec::new(),
            arguments: Arguments::new(),
        }
    }

    pub fn input_spec(&self) -> InputSpec {
        input_spec(&self.inputs)
    }

    pub fn output_spec(&self) -> OutputSpec {
        match self.outputs.as_slice() {
            [] => OutputSpec::Inherit,
            [single] => OutputSpec::Single(single.clone()),
            many => OutputSpec::List(many.to_vec()),
        }
    }
}

impl FeatureStepConfig {
    pub fn new(function: &str, inputs: &[&str]) -> Self {
        FeatureStepConfig {
            function: function.to_string(),
            inputs: inputs.iter().map(|s| s.to_string()).collect(),
            prefix: None,
            arguments: Arguments::new(),
        }
    }

    pub fn input_spec(&self) -> InputSpec {
        input_spec(&self.inputs)
    }
}

fn input_spec(inputs: &[String]) -> InputSpec {
    match inputs {
        [single] => InputSpec::Single(single.clone()),
        many => InputSpec::Positional(many.to_vec()),
    }
}

impl PipelineConfig {
    /// Unwindowed pipeline with no steps
    pub fn new(name: &str) -> Self {
        PipelineConfig {
            name: name.to_string(),
            windowed_process: false,
            window_size: None,
            step_size: None,
            feature_workers: None,
            preprocessing: Vec::new(),
            processing: Vec::new(),
            features: Vec::new(),
        }
    }

    /// Windowed pipeline preset
    pub fn windowed(name: &str, window_size: f64, step_size: f64) -> Self {
        PipelineConfig {
            windowed_process: true,
            window_size: Some(window_size),
            step_size: Some(step_size),
            ..PipelineConfig::new(name)
        }
    }

    /// Window and step sizes when windowing is enabled
    pub fn window(&self) -> Option<(f64, f64)> {
        match (self.windowed_process, self.window_size, self.step_size) {
            (true, Some(window), Some(step)) => Some((window, step)),
            _ => None,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> BiosigResult<()> {
        if self.name.is_empty() {
            return Err(config_error!("pipeline name cannot be empty"));
        }

        if self.windowed_process && (self.window_size.is_none() || self.step_size.is_none()) {
            return Err(config_error!(
                "windowed processing requires both window_size and step_size"
            ));
        }
        for (label, size) in [("window_size", self.window_size), ("step_size", self.step_size)] {
            if let Some(size) = size {
                if !(size > 0.0 && size.is_finite()) {
                    return Err(config_error!("{} must be positive, got {}", label, size));
                }
            }
        }

        if self.feature_workers == Some(0) {
            return Err(config_error!("feature_workers must be at least 1"));
        }

        let steps = self.preprocessing.iter().chain(&self.processing);
        for step in steps {
            if step.inputs.is_empty() {
                return Err(config_error!("step '{}' has no inputs", step.function));
            }
        }
        for feature in &self.features {
            if feature.inputs.is_empty() {
                return Err(config_error!("feature '{}' has no inputs", feature.function));
            }
        }

        Ok(())
    }

    /// Export configuration to JSON
    pub fn to_json(&self) -> BiosigResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| BiosigError::SerializationError {
            reason: format!("failed to serialize pipeline configuration: {}", e),
        })
    }

    /// Parse and validate a JSON configuration
    pub fn from_json_str(json: &str) -> BiosigResult<Self> {
        let config: PipelineConfig =
            serde_json::from_str(json).map_err(|e| BiosigError::SerializationError {
                reason: format!("failed to parse pipeline configuration: {}", e),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file
    pub fn from_file(path: impl AsRef<Path>) -> BiosigResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| BiosigError::Io {
            reason: format!("cannot read {}: {}", path.display(), e),
        })?;
        Self::from_json_str(&json)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig::new("default")
    }
}
