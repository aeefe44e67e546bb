//! Process: a processing function bound to fixed arguments and naming rules

use crate::function::{
    ChannelFunction, ChannelInputs, FunctionOutput, Inputs, Invocation, SignalFunction,
};
use crate::normalize::{passthrough, reconcile, select, OutputKey, Reconciled};
use crate::params::{Arguments, ParameterValue};
use biosig_core::{BiosigError, BiosigResult, Channel, Container, Signal};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Channel attributes that can be forwarded to a function as arguments
pub const CHANNEL_ATTRIBUTES: [&str; 4] = ["sampling_rate", "timestamp_start", "timestamp", "name"];

#[derive(Clone)]
enum Callable {
    Buffers(Arc<dyn SignalFunction>),
    Channels(Arc<dyn ChannelFunction>),
}

/// A processing function plus everything needed to call it on channels
///
/// Arguments reach the function only if their name is declared: either
/// through [`Process::argument`], [`Process::parameter`] or
/// [`Process::map_attribute`]. Undeclared keys are dropped silently.
#[derive(Clone)]
pub struct Process {
    name: String,
    callable: Callable,
    arguments: Arguments,
    parameters: BTreeSet<String>,
    /// channel attribute -> parameter name
    attributes: BTreeMap<String, String>,
    prefix: Option<String>,
    return_index: Option<usize>,
}

/// One signal produced by a process
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessOutput {
    /// Column, key or input name the output came from
    pub key: String,
    pub signal: Signal,
}

/// Result of applying a process once
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessOutcome {
    pub outputs: Vec<ProcessOutput>,
    pub warnings: Vec<String>,
}

impl ProcessOutcome {
    pub fn names(&self) -> Vec<&str> {
        self.outputs.iter().map(|o| o.signal.name()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&Signal> {
        self.outputs
            .iter()
            .map(|o| &o.signal)
            .find(|signal| signal.name() == name)
    }

    /// Collect the outputs into a fresh container
    pub fn into_container(self) -> BiosigResult<Container> {
        Container::from_signals(self.outputs.into_iter().map(|o| o.signal))
    }
}

impl Process {
    /// Wrap a function over sample buffers
    pub fn new<F>(name: &str, function: F) -> Self
    where
        F: Fn(&Inputs<'_>, &Arguments) -> BiosigResult<FunctionOutput> + Send + Sync + 'static,
    {
        Self::with_function(name, function)
    }

    /// Wrap any [`SignalFunction`], e.g. a [`crate::function::Vectorized`] pair
    pub fn with_function(name: &str, function: impl SignalFunction + 'static) -> Self {
        Self::from_callable(name, Callable::Buffers(Arc::new(function)))
    }

    /// Wrap a function that consumes and returns whole channels
    pub fn native<F>(name: &str, function: F) -> Self
    where
        F: Fn(&ChannelInputs<'_>, &Arguments) -> BiosigResult<FunctionOutput> + Send + Sync + 'static,
    {
        Self::from_callable(name, Callable::Channels(Arc::new(function)))
    }

    fn from_callable(name: &str, callable: Callable) -> Self {
        Process {
            name: name.to_string(),
            callable,
            arguments: Arguments::new(),
            parameters: BTreeSet::new(),
            attributes: CHANNEL_ATTRIBUTES
                .iter()
                .map(|a| (a.to_string(), a.to_string()))
                .collect(),
            prefix: None,
            return_index: None,
        }
    }

    /// Fix an argument value; the key is declared as a parameter
    pub fn argument(mut self, key: &str, value: impl Into<ParameterValue>) -> Self {
        self.arguments.set(key, value);
        self.parameters.insert(key.to_string());
        self
    }

    /// Declare a parameter the function accepts
    pub fn parameter(mut self, key: &str) -> Self {
        self.parameters.insert(key.to_string());
        self
    }

    pub fn parameters<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parameters.extend(keys.into_iter().map(Into::into));
        self
    }

    /// Forward a channel attribute under a different parameter name
    pub fn map_attribute(mut self, attribute: &str, parameter: &str) -> BiosigResult<Self> {
        if !CHANNEL_ATTRIBUTES.contains(&attribute) {
            return Err(BiosigError::InvalidConfig {
                reason: format!(
                    "unknown channel attribute '{}', expected one of {:?}",
                    attribute, CHANNEL_ATTRIBUTES
                ),
            });
        }
        self.attributes.insert(attribute.to_string(), parameter.to_string());
        self.parameters.insert(parameter.to_string());
        Ok(self)
    }

    /// Prefix for output names; replaces the input name in derived names
    pub fn prefix(mut self, prefix: &str) -> Self {
        self.prefix = Some(prefix.to_string());
        self
    }

    /// Element to keep when the function returns a tuple
    pub fn return_index(mut self, index: usize) -> Self {
        self.return_index = Some(index);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arguments(&self) -> &Arguments {
        &self.arguments
    }

    pub fn declares(&self, parameter: &str) -> bool {
        self.parameters.contains(parameter)
    }

    pub fn is_native(&self) -> bool {
        matches!(self.callable, Callable::Channels(_))
    }

    /// Apply to a single channel
    pub fn apply_channel(&self, channel: &Channel, kwargs: &Arguments) -> BiosigResult<ProcessOutcome> {
        let signal = Signal::Channel(channel.clone());
        self.apply(&ChannelInputs::single(&signal), kwargs)
    }

    /// Call the function on `inputs` and turn its result into named signals
    ///
    /// The first input provides the timing and the base name of the outputs.
    pub fn apply(&self, inputs: &ChannelInputs<'_>, kwargs: &Arguments) -> BiosigResult<ProcessOutcome> {
        let primary = inputs.primary()?;
        let input_name = primary.name();

        let reconciled = match &self.callable {
            Callable::Channels(function) => {
                let arguments = self.assemble(primary, None, kwargs);
                let output = select(function.call(inputs, &arguments)?, self.return_index, &self.name)?;
                Reconciled {
                    outputs: passthrough(output)?,
                    warnings: Vec::new(),
                }
            }
            Callable::Buffers(function) => self.apply_buffers(function.as_ref(), inputs, kwargs)?,
        };

        let mut outcome = ProcessOutcome {
            outputs: Vec::with_capacity(reconciled.outputs.len()),
            warnings: reconciled.warnings,
        };
        for (key, mut signal) in reconciled.outputs {
            let name = self.output_name(&key, input_name);
            if outcome.outputs.iter().any(|o| o.signal.name() == name) {
                return Err(BiosigError::DuplicateChannel { name });
            }
            signal.rename(&name);
            outcome.outputs.push(ProcessOutput {
                key: key.label(input_name).to_string(),
                signal,
            });
        }

        debug!(
            process = %self.name,
            input = input_name,
            outputs = outcome.outputs.len(),
            "process applied"
        );
        Ok(outcome)
    }

    fn apply_buffers(
        &self,
        function: &dyn SignalFunction,
        inputs: &ChannelInputs<'_>,
        kwargs: &Arguments,
    ) -> BiosigResult<Reconciled> {
        let primary = inputs.primary()?;
        let reference = inputs.primary_channel()?;
        let channels = inputs.sampled()?;

        let window_inputs = |window: usize| {
            let mut call = Inputs::new();
            for (parameter, channel) in &channels {
                let samples = channel.data().window(window).unwrap_or(&[]);
                match parameter {
                    Some(parameter) => call.push_named(parameter, samples),
                    None => call.push(samples),
                }
            }
            call
        };

        let mut warnings = Vec::new();
        let outputs = if reference.is_windowed() {
            let invocations: Vec<Invocation<'_>> = (0..reference.windows())
                .map(|window| Invocation {
                    inputs: window_inputs(window),
                    arguments: self.assemble(primary, Some(window), kwargs),
                })
                .collect();
            self.call_windowed(function, &invocations, &mut warnings)?
        } else {
            let arguments = self.assemble(primary, Some(0), kwargs);
            vec![function.call(&window_inputs(0), &arguments)?]
        };

        let outputs = outputs
            .into_iter()
            .map(|output| select(output, self.return_index, &self.name))
            .collect::<BiosigResult<Vec<_>>>()?;

        let mut reconciled = reconcile(outputs, reference)?;
        warnings.append(&mut reconciled.warnings);
        reconciled.warnings = warnings;
        Ok(reconciled)
    }

    /// Vectorized call over every window, falling back to one call per window
    fn call_windowed(
        &self,
        function: &dyn SignalFunction,
        invocations: &[Invocation<'_>],
        warnings: &mut Vec<String>,
    ) -> BiosigResult<Vec<FunctionOutput>> {
        let failure = match function.call_windows(invocations) {
            None => None,
            Some(Ok(outputs)) if outputs.len() == invocations.len() => return Ok(outputs),
            Some(Ok(outputs)) => Some(format!(
                "returned {} results for {} windows",
                outputs.len(),
                invocations.len()
            )),
            Some(Err(error)) => Some(error.to_string()),
        };

        if let Some(reason) = failure {
            warn!(
                process = %self.name,
                windows = invocations.len(),
                %reason,
                "vectorized call failed, falling back to per-window calls"
            );
            warnings.push(format!(
                "process '{}' fell back to per-window calls: {}",
                self.name, reason
            ));
        }

        invocations
            .iter()
            .map(|invocation| function.call(&invocation.inputs, &invocation.arguments))
            .collect()
    }

    /// Channel attributes, then fixed arguments, then bound arguments,
    /// filtered to declared parameters
    fn assemble(&self, primary: &Signal, window: Option<usize>, kwargs: &Arguments) -> Arguments {
        let mut arguments = Arguments::new();

        for (attribute, parameter) in &self.attributes {
            if !self.parameters.contains(parameter) {
                continue;
            }
            let value: ParameterValue = match (attribute.as_str(), primary) {
                ("name", signal) => signal.name().into(),
                ("sampling_rate", Signal::Channel(channel)) => channel.sampling_rate().into(),
                ("timestamp_start", Signal::Channel(channel)) => channel.timestamp_start().into(),
                ("timestamp", Signal::Channel(channel)) => match window {
                    Some(window) => channel.timestamps().window(window).unwrap_or(&[]).to_vec().into(),
                    None => channel
                        .timestamps()
                        .iter_windows()
                        .flatten()
                        .copied()
                        .collect::<Vec<f64>>()
                        .into(),
                },
                ("timestamp", Signal::Events(events)) => events.timestamps().to_vec().into(),
                _ => continue,
            };
            arguments.set(parameter, value);
        }

        arguments.merge(&self.arguments);
        arguments.merge(kwargs);

        let dropped = arguments.retain_declared(&self.parameters);
        if !dropped.is_empty() {
            trace!(process = %self.name, ?dropped, "undeclared arguments dropped");
        }
        arguments
    }

    fn output_name(&self, key: &OutputKey, input: &str) -> String {
        match (key, &self.prefix) {
            (OutputKey::Inherit, Some(prefix)) => format!("{}{}", prefix, input),
            (OutputKey::Inherit, None) => input.to_string(),
            (OutputKey::Column(column), Some(prefix)) => format!("{}{}", prefix, column),
            (OutputKey::Column(column), None) => format!("{}_{}", input, column),
            (OutputKey::Named(name), Some(prefix)) => format!("{}{}", prefix, name),
            (OutputKey::Named(name), None) => name.clone(),
        }
    }
}

impl fmt::Debug for Process {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Process")
            .field("name", &self.name)
            .field("native", &self.is_native())
            .field("arguments", &self.arguments)
            .field("parameters", &self.parameters)
            .field("prefix", &self.prefix)
            .field("return_index", &self.return_index)
            .finish()
    }
}
