//! biosig-processing: composable processing pipelines over biosignal containers
//!
//! A [`Process`] wraps a function over sample buffers (or whole channels) and
//! folds whatever it returns back into channels. Processes are chained in a
//! [`ProcessQueue`], features are reduced to a [`FeatureMatrix`] by a
//! [`FeatureQueue`], and a [`Pipeline`] runs both over one input.

pub mod config;
pub mod convert;
pub mod feature;
pub mod function;
pub mod library;
mod normalize;
pub mod params;
pub mod pipeline;
pub mod process;
pub mod queue;

pub use config::{FeatureStepConfig, PipelineConfig, StepConfig};
pub use convert::PipelineInput;
pub use feature::{Feature, FeatureFunction, FeatureMatrix, FeatureQueue, FeatureValue};
pub use function::{
    ChannelFunction, ChannelInputs, FunctionOutput, Inputs, Invocation, SignalFunction, Vectorized,
};
pub use normalize::OutputKey;
pub use params::{Arguments, ParameterValue};
pub use pipeline::{Pipeline, PipelineBuilder, PipelineResult, PipelineState};
pub use process::{Process, ProcessOutcome, ProcessOutput, CHANNEL_ATTRIBUTES};
pub use queue::{InputSpec, OutputSpec, ProcessQueue, QueueEntry, QueueOutcome};
