//! Pipeline: preprocessing, optional windowing, processing and features

use crate::config::PipelineConfig;
use crate::convert::PipelineInput;
use crate::feature::{Feature, FeatureMatrix, FeatureQueue};
use crate::library::{feature_by_name, process_by_name};
use crate::params::Arguments;
use crate::process::Process;
use crate::queue::{InputSpec, OutputSpec, ProcessQueue};
use biosig_core::{BiosigError, BiosigResult, Container};
use serde::Serialize;
use std::fmt;
use std::time::Instant;
use tracing::{info, info_span};

/// Lifecycle of a pipeline; states only move forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Created,
    InputSet,
    Preprocessed,
    Windowed,
    Processed,
    FeaturesExtracted,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Created => "created",
            PipelineState::InputSet => "input_set",
            PipelineState::Preprocessed => "preprocessed",
            PipelineState::Windowed => "windowed",
            PipelineState::Processed => "processed",
            PipelineState::FeaturesExtracted => "features_extracted",
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline execution result
#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub output: Container,
    pub warnings: Vec<String>,
    pub elapsed_us: u64,
}

/// Orchestrates two process queues and a feature queue over one input
///
/// `run` goes preprocessing, then windowing when configured, then the main
/// queue. Feature extraction is a separate call on the processed container.
/// A failed call leaves the state where it was.
#[derive(Debug)]
pub struct Pipeline {
    config: PipelineConfig,
    preprocessing: ProcessQueue,
    processing: ProcessQueue,
    features: FeatureQueue,
    state: PipelineState,
    input: Option<Container>,
    output: Option<Container>,
    matrix: Option<FeatureMatrix>,
    warnings: Vec<String>,
}

/// Pipeline builder for constructing processing chains
#[derive(Debug)]
pub struct PipelineBuilder {
    config: PipelineConfig,
    preprocessing: ProcessQueue,
    processing: ProcessQueue,
    features: FeatureQueue,
}

impl Pipeline {
    /// Empty pipeline for a validated configuration
    ///
    /// Steps listed in the configuration are not added; see
    /// [`Pipeline::from_config`].
    pub fn new(config: PipelineConfig) -> BiosigResult<Self> {
        config.validate()?;
        let mut features = FeatureQueue::new();
        features.set_workers(config.feature_workers)?;
        Ok(Pipeline {
            preprocessing: ProcessQueue::new("preprocessing"),
            processing: ProcessQueue::new("processing"),
            features,
            config,
            state: PipelineState::Created,
            input: None,
            output: None,
            matrix: None,
            warnings: Vec::new(),
        })
    }

    /// Build a pipeline whose steps come from the reference library
    pub fn from_config(config: PipelineConfig) -> BiosigResult<Self> {
        let mut pipeline = Pipeline::new(config)?;
        let config = pipeline.config.clone();

        for step in &config.preprocessing {
            let process = process_by_name(&step.function, &step.arguments)?;
            pipeline
                .preprocessing
                .add_process(process, step.input_spec(), step.output_spec(), Arguments::new())?;
        }
        for step in &config.processing {
            let process = process_by_name(&step.function, &step.arguments)?;
            pipeline
                .processing
                .add_process(process, step.input_spec(), step.output_spec(), Arguments::new())?;
        }
        for step in &config.features {
            let mut feature = feature_by_name(&step.function, &step.arguments)?;
            if let Some(prefix) = &step.prefix {
                feature = feature.prefix(prefix);
            }
            pipeline.features.add_feature(feature, step.input_spec())?;
        }

        Ok(pipeline)
    }

    pub fn builder(name: &str) -> PipelineBuilder {
        PipelineBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn preprocessing(&self) -> &ProcessQueue {
        &self.preprocessing
    }

    pub fn processing(&self) -> &ProcessQueue {
        &self.processing
    }

    pub fn feature_queue(&self) -> &FeatureQueue {
        &self.features
    }

    pub fn input(&self) -> Option<&Container> {
        self.input.as_ref()
    }

    /// Container produced by the last successful run
    pub fn output(&self) -> Option<&Container> {
        self.output.as_ref()
    }

    /// Feature matrix of the last successful extraction
    pub fn features(&self) -> Option<&FeatureMatrix> {
        self.matrix.as_ref()
    }

    /// Warnings collected by the last run
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Convert and store the input; allowed once, before running
    pub fn set_input(&mut self, input: impl Into<PipelineInput>) -> BiosigResult<()> {
        self.expect_state(&[PipelineState::Created], "set_input")?;
        let container = input.into().into_container()?;
        info!(
            pipeline = %self.config.name,
            channels = ?container.channel_names(),
            "input set"
        );
        self.input = Some(container);
        self.state = PipelineState::InputSet;
        Ok(())
    }

    /// Preprocess, window when configured, then run the main queue
    pub fn run(&mut self) -> BiosigResult<PipelineResult> {
        self.expect_state(&[PipelineState::InputSet], "run")?;
        let input = self.input.as_ref().ok_or(BiosigError::InvalidState {
            current: self.state.as_str(),
            operation: "run",
        })?;

        let span = info_span!("pipeline_run", pipeline = %self.config.name);
        let _guard = span.enter();
        let start = Instant::now();

        let preprocessed = self.preprocessing.run(input)?;
        let mut warnings = preprocessed.warnings;
        let mut working = preprocessed.container;
        info!(stage = %PipelineState::Preprocessed, steps = self.preprocessing.len(), "stage finished");

        if let Some((window_size, step_size)) = self.config.window() {
            working.segment_all(window_size, step_size)?;
            info!(stage = %PipelineState::Windowed, window_size, step_size, "stage finished");
        }

        let processed = self.processing.run(&working)?;
        warnings.extend(processed.warnings);
        let elapsed_us = start.elapsed().as_micros() as u64;
        info!(
            stage = %PipelineState::Processed,
            steps = self.processing.len(),
            channels = processed.container.len(),
            warnings = warnings.len(),
            elapsed_us,
            "stage finished"
        );

        self.output = Some(processed.container.clone());
        self.warnings = warnings.clone();
        self.state = PipelineState::Processed;

        Ok(PipelineResult {
            output: processed.container,
            warnings,
            elapsed_us,
        })
    }

    /// Run the feature queue over the processed container
    ///
    /// May be repeated; each call replaces the stored matrix.
    pub fn extract_features(&mut self) -> BiosigResult<&FeatureMatrix> {
        self.expect_state(
            &[PipelineState::Processed, PipelineState::FeaturesExtracted],
            "extract_features",
        )?;
        let output = self.output.as_ref().ok_or(BiosigError::InvalidState {
            current: self.state.as_str(),
            operation: "extract_features",
        })?;

        let span = info_span!("pipeline_features", pipeline = %self.config.name);
        let _guard = span.enter();

        let matrix = self.features.run(output)?;
        info!(
            stage = %PipelineState::FeaturesExtracted,
            rows = matrix.n_rows(),
            columns = matrix.n_columns(),
            "stage finished"
        );

        self.state = PipelineState::FeaturesExtracted;
        Ok(&*self.matrix.insert(matrix))
    }

    fn expect_state(&self, allowed: &[PipelineState], operation: &'static str) -> BiosigResult<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(BiosigError::InvalidState {
                current: self.state.as_str(),
                operation,
            })
        }
    }
}

impl PipelineBuilder {
    /// Create new pipeline builder
    pub fn new(name: &str) -> Self {
        PipelineBuilder {
            config: PipelineConfig::new(name),
            preprocessing: ProcessQueue::new("preprocessing"),
            processing: ProcessQueue::new("processing"),
            features: FeatureQueue::new(),
        }
    }

    /// Segment after preprocessing with these sizes in seconds
    pub fn window(&mut self, window_size: f64, step_size: f64) -> &mut Self {
        self.config.windowed_process = true;
        self.config.window_size = Some(window_size);
        self.config.step_size = Some(step_size);
        self
    }

    pub fn feature_workers(&mut self, workers: usize) -> &mut Self {
        self.config.feature_workers = Some(workers);
        self
    }

    /// Add a step to the queue run before windowing
    pub fn add_preprocessing(
        &mut self,
        process: Process,
        inputs: impl Into<InputSpec>,
        outputs: impl Into<OutputSpec>,
        kwargs: Arguments,
    ) -> BiosigResult<&mut Self> {
        self.preprocessing.add_process(process, inputs, outputs, kwargs)?;
        Ok(self)
    }

    /// Add a step to the main queue
    pub fn add_process(
        &mut self,
        process: Process,
        inputs: impl Into<InputSpec>,
        outputs: impl Into<OutputSpec>,
        kwargs: Arguments,
    ) -> BiosigResult<&mut Self> {
        self.processing.add_process(process, inputs, outputs, kwargs)?;
        Ok(self)
    }

    pub fn add_feature(&mut self, feature: Feature, inputs: impl Into<InputSpec>) -> BiosigResult<&mut Self> {
        self.features.add_feature(feature, inputs)?;
        Ok(self)
    }

    /// Validate the configuration and build the pipeline
    pub fn build(self) -> BiosigResult<Pipeline> {
        let mut pipeline = Pipeline::new(self.config)?;
        let workers = pipeline.features.workers();
        pipeline.preprocessing = self.preprocessing;
        pipeline.processing = self.processing;
        pipeline.features = self.features;
        pipeline.features.set_workers(workers)?;
        Ok(pipeline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args;
    use crate::config::{FeatureStepConfig, StepConfig};
    use crate::feature::FeatureValue;
    use crate::function::{FunctionOutput, Inputs};

    fn double(inputs: &Inputs<'_>, _arguments: &Arguments) -> BiosigResult<FunctionOutput> {
        Ok(FunctionOutput::Sequence(inputs.first()?.iter().map(|x| x * 2.0).collect()))
    }

    fn mean(inputs: &Inputs<'_>, _arguments: &Arguments) -> BiosigResult<FeatureValue> {
        let data = inputs.first()?;
        Ok(FeatureValue::Scalar(data.iter().sum::<f64>() / data.len() as f64))
    }

    fn ramp(n: usize) -> PipelineInput {
        PipelineInput::samples("ecg", (0..n).map(|i| i as f64).collect(), 10.0)
    }

    #[test]
    fn test_state_order_is_enforced() {
        let mut pipeline = Pipeline::builder("p").build().unwrap();
        assert_eq!(pipeline.state(), PipelineState::Created);
        assert!(matches!(
            pipeline.run(),
            Err(BiosigError::InvalidState { current: "created", operation: "run" })
        ));
        assert!(pipeline.extract_features().is_err());

        pipeline.set_input(ramp(20)).unwrap();
        assert_eq!(pipeline.state(), PipelineState::InputSet);
        assert!(pipeline.set_input(ramp(20)).is_err());
        assert!(pipeline.extract_features().is_err());
    }

    #[test]
    fn test_windowed_run_and_features() {
        let mut builder = Pipeline::builder("p");
        builder
            .window(1.0, 0.5)
            .add_preprocessing(Process::new("double", double), "ecg", "ecg", args! {})
            .unwrap()
            .add_feature(Feature::new("mean", mean), "ecg")
            .unwrap();
        let mut pipeline = builder.build().unwrap();

        pipeline.set_input(ramp(20)).unwrap();
        let result = pipeline.run().unwrap();
        let ecg = result.output.channel("ecg").unwrap();
        assert_eq!(ecg.windows(), 3);
        assert_eq!(ecg.data().window(1).unwrap()[0], 10.0);
        assert_eq!(pipeline.state(), PipelineState::Processed);
        // the stored input is untouched
        assert_eq!(pipeline.input().unwrap().channel("ecg").unwrap().windows(), 1);

        let matrix = pipeline.extract_features().unwrap();
        assert_eq!(matrix.columns(), ["mean_0"]);
        assert_eq!(matrix.index(), [0.0, 0.5, 1.0]);
        assert_eq!(matrix.value(0, "mean_0"), Some(9.0));
        assert_eq!(pipeline.state(), PipelineState::FeaturesExtracted);
        assert!(pipeline.extract_features().is_ok());
    }

    #[test]
    fn test_failed_run_keeps_state() {
        let mut builder = Pipeline::builder("p");
        builder.window(5.0, 1.0);
        let mut pipeline = builder.build().unwrap();
        pipeline.set_input(ramp(20)).unwrap();

        assert!(matches!(pipeline.run(), Err(BiosigError::InvalidWindow { .. })));
        assert_eq!(pipeline.state(), PipelineState::InputSet);
        assert!(pipeline.output().is_none());
    }

    #[test]
    fn test_empty_feature_queue_fails() {
        let mut pipeline = Pipeline::builder("p").build().unwrap();
        pipeline.set_input(ramp(20)).unwrap();
        pipeline.run().unwrap();
        assert!(pipeline.extract_features().is_err());
        assert_eq!(pipeline.state(), PipelineState::Processed);
    }

    #[test]
    fn test_builder_validates() {
        let mut zero_workers = Pipeline::builder("p");
        zero_workers.feature_workers(0);
        assert!(zero_workers.build().is_err());

        let mut negative = Pipeline::builder("p");
        negative.window(-1.0, 1.0);
        assert!(negative.build().is_err());

        let mut workers = Pipeline::builder("p");
        workers.feature_workers(2);
        assert_eq!(workers.build().unwrap().feature_queue().workers(), Some(2));
    }

    #[test]
    fn test_from_config() {
        let mut config = PipelineConfig::windowed("lib", 1.0, 1.0);
        config.preprocessing.push(StepConfig::new("remove_mean", &["ecg"]));
        let mut smooth = StepConfig::new("moving_average", &["ecg"]);
        smooth.arguments.set("window", 2);
        smooth.outputs = vec!["smooth".into()];
        config.processing.push(smooth);
        let mut feature = FeatureStepConfig::new("time_domain", &["smooth"]);
        feature.prefix = Some("s_".into());
        config.features.push(feature);

        let mut pipeline = Pipeline::from_config(config).unwrap();
        assert_eq!(pipeline.preprocessing().len(), 1);
        assert_eq!(pipeline.processing().len(), 1);
        pipeline.set_input(ramp(20)).unwrap();
        let result = pipeline.run().unwrap();
        assert_eq!(result.output.channel_names(), vec!["ecg", "smooth"]);
        assert!(result.warnings.is_empty());

        let matrix = pipeline.extract_features().unwrap();
        assert_eq!(matrix.n_rows(), 2);
        assert!(matrix.columns().iter().all(|c| c.starts_with("s_")));
        assert!(matrix.column("s_rms").is_some());
    }

    #[test]
    fn test_from_config_rejects_unknown_steps() {
        let mut config = PipelineConfig::new("lib");
        config.processing.push(StepConfig::new("does_not_exist", &["ecg"]));
        assert!(Pipeline::from_config(config).is_err());
    }
}
