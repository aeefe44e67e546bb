//! Calling contracts for processing functions and their tagged results

use crate::params::Arguments;
use biosig_core::{shape_error, BiosigError, BiosigResult, Channel, Container, Signal};

/// Sample buffers handed to a processing function for one call
///
/// For windowed channels every buffer is a single window.
#[derive(Debug, Clone, Default)]
pub struct Inputs<'a> {
    positional: Vec<&'a [f64]>,
    named: Vec<(String, &'a [f64])>,
}

impl<'a> Inputs<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inputs holding exactly one positional buffer
    pub fn single(samples: &'a [f64]) -> Self {
        Inputs {
            positional: vec![samples],
            named: Vec::new(),
        }
    }

    pub fn push(&mut self, samples: &'a [f64]) {
        self.positional.push(samples);
    }

    pub fn push_named(&mut self, parameter: &str, samples: &'a [f64]) {
        self.named.push((parameter.to_string(), samples));
    }

    /// First buffer, positional before named
    pub fn first(&self) -> BiosigResult<&'a [f64]> {
        self.positional
            .first()
            .copied()
            .or_else(|| self.named.first().map(|(_, samples)| *samples))
            .ok_or_else(|| BiosigError::InvalidConfig {
                reason: "function called without input buffers".to_string(),
            })
    }

    pub fn get(&self, index: usize) -> Option<&'a [f64]> {
        self.positional.get(index).copied()
    }

    pub fn named(&self, parameter: &str) -> Option<&'a [f64]> {
        self.named
            .iter()
            .find(|(name, _)| name == parameter)
            .map(|(_, samples)| *samples)
    }

    /// Named buffer that must be present
    pub fn require(&self, parameter: &str) -> BiosigResult<&'a [f64]> {
        self.named(parameter).ok_or_else(|| BiosigError::InvalidConfig {
            reason: format!("missing input '{}'", parameter),
        })
    }

    pub fn positional(&self) -> &[&'a [f64]] {
        &self.positional
    }

    pub fn len(&self) -> usize {
        self.positional.len() + self.named.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Whole signals handed to a channel-native function
#[derive(Debug, Clone, Default)]
pub struct ChannelInputs<'a> {
    positional: Vec<&'a Signal>,
    named: Vec<(String, &'a Signal)>,
}

impl<'a> ChannelInputs<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(signal: &'a Signal) -> Self {
        ChannelInputs {
            positional: vec![signal],
            named: Vec::new(),
        }
    }

    pub fn push(&mut self, signal: &'a Signal) {
        self.positional.push(signal);
    }

    pub fn push_named(&mut self, parameter: &str, signal: &'a Signal) {
        self.named.push((parameter.to_string(), signal));
    }

    /// The signal whose name and timing outputs inherit
    pub fn primary(&self) -> BiosigResult<&'a Signal> {
        self.positional
            .first()
            .copied()
            .or_else(|| self.named.first().map(|(_, signal)| *signal))
            .ok_or_else(|| BiosigError::InvalidConfig {
                reason: "process called without input channels".to_string(),
            })
    }

    /// Primary input as a sampled channel
    pub fn primary_channel(&self) -> BiosigResult<&'a Channel> {
        let signal = self.primary()?;
        signal.as_channel().ok_or_else(|| BiosigError::InvalidConfig {
            reason: format!("'{}' is an {}, expected a sampled channel", signal.name(), signal.kind()),
        })
    }

    /// Every input as a sampled channel sharing the window layout of the primary
    pub fn sampled(&self) -> BiosigResult<Vec<(Option<&str>, &'a Channel)>> {
        let reference = self.primary_channel()?;
        let mut channels = Vec::with_capacity(self.len());
        for (parameter, signal) in self.iter() {
            let channel = signal.as_channel().ok_or_else(|| BiosigError::InvalidConfig {
                reason: format!("'{}' is an {}, expected a sampled channel", signal.name(), signal.kind()),
            })?;
            if channel.is_windowed() != reference.is_windowed() || channel.windows() != reference.windows() {
                return Err(shape_error!(
                    "input '{}' has {} windows but '{}' has {}",
                    channel.name(),
                    channel.windows(),
                    reference.name(),
                    reference.windows()
                ));
            }
            channels.push((parameter, channel));
        }
        Ok(channels)
    }

    pub fn get(&self, index: usize) -> Option<&'a Signal> {
        self.positional.get(index).copied()
    }

    pub fn named(&self, parameter: &str) -> Option<&'a Signal> {
        self.named
            .iter()
            .find(|(name, _)| name == parameter)
            .map(|(_, signal)| *signal)
    }

    /// Every input in binding order with its parameter name, if any
    pub fn iter(&self) -> impl Iterator<Item = (Option<&str>, &'a Signal)> + '_ {
        self.positional
            .iter()
            .map(|signal| (None, *signal))
            .chain(self.named.iter().map(|(name, signal)| (Some(name.as_str()), *signal)))
    }

    pub fn len(&self) -> usize {
        self.positional.len() + self.named.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Tagged union of everything a processing function may return
#[derive(Debug, Clone, PartialEq)]
pub enum FunctionOutput {
    Scalar(f64),
    Sequence(Vec<f64>),
    /// Equal-length named columns
    Table(Vec<(String, Vec<f64>)>),
    /// Named sequences of independent lengths
    Mapping(Vec<(String, Vec<f64>)>),
    Tuple(Vec<FunctionOutput>),
    /// Sample positions into the input buffer
    Events(Vec<usize>),
    Channel(Channel),
    Container(Container),
}

impl FunctionOutput {
    /// Variant name used in error messages
    pub fn kind(&self) -> &'static str {
        match self {
            FunctionOutput::Scalar(_) => "scalar",
            FunctionOutput::Sequence(_) => "sequence",
            FunctionOutput::Table(_) => "table",
            FunctionOutput::Mapping(_) => "mapping",
            FunctionOutput::Tuple(_) => "tuple",
            FunctionOutput::Events(_) => "events",
            FunctionOutput::Channel(_) => "channel",
            FunctionOutput::Container(_) => "container",
        }
    }

    /// Build a table from `(column, values)` pairs
    pub fn table<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = (S, Vec<f64>)>,
        S: Into<String>,
    {
        FunctionOutput::Table(columns.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Build a mapping from `(key, values)` pairs
    pub fn mapping<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, Vec<f64>)>,
        S: Into<String>,
    {
        FunctionOutput::Mapping(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl From<Vec<f64>> for FunctionOutput {
    fn from(samples: Vec<f64>) -> Self {
        FunctionOutput::Sequence(samples)
    }
}

impl From<f64> for FunctionOutput {
    fn from(value: f64) -> Self {
        FunctionOutput::Scalar(value)
    }
}

impl From<Channel> for FunctionOutput {
    fn from(channel: Channel) -> Self {
        FunctionOutput::Channel(channel)
    }
}

impl From<Container> for FunctionOutput {
    fn from(container: Container) -> Self {
        FunctionOutput::Container(container)
    }
}

/// One prepared per-window call
#[derive(Debug, Clone)]
pub struct Invocation<'a> {
    pub inputs: Inputs<'a>,
    pub arguments: Arguments,
}

/// Function over raw sample buffers
pub trait SignalFunction: Send + Sync {
    /// Process one buffer set (a whole flat channel, or one window)
    fn call(&self, inputs: &Inputs<'_>, arguments: &Arguments) -> BiosigResult<FunctionOutput>;

    /// Process every window in one call
    ///
    /// `None` means the function has no vectorized form. An `Err` makes the
    /// caller fall back to [`SignalFunction::call`] per window.
    fn call_windows(&self, _windows: &[Invocation<'_>]) -> Option<BiosigResult<Vec<FunctionOutput>>> {
        None
    }
}

impl<F> SignalFunction for F
where
    F: Fn(&Inputs<'_>, &Arguments) -> BiosigResult<FunctionOutput> + Send + Sync,
{
    fn call(&self, inputs: &Inputs<'_>, arguments: &Arguments) -> BiosigResult<FunctionOutput> {
        self(inputs, arguments)
    }
}

/// Function that consumes whole channels and returns channels
pub trait ChannelFunction: Send + Sync {
    fn call(&self, inputs: &ChannelInputs<'_>, arguments: &Arguments) -> BiosigResult<FunctionOutput>;
}

impl<F> ChannelFunction for F
where
    F: Fn(&ChannelInputs<'_>, &Arguments) -> BiosigResult<FunctionOutput> + Send + Sync,
{
    fn call(&self, inputs: &ChannelInputs<'_>, arguments: &Arguments) -> BiosigResult<FunctionOutput> {
        self(inputs, arguments)
    }
}

/// Pairs a per-call function with a batch form over all windows
pub struct Vectorized<F, V> {
    single: F,
    batch: V,
}

impl<F, V> Vectorized<F, V>
where
    F: Fn(&Inputs<'_>, &Arguments) -> BiosigResult<FunctionOutput> + Send + Sync,
    V: Fn(&[Invocation<'_>]) -> BiosigResult<Vec<FunctionOutput>> + Send + Sync,
{
    pub fn new(single: F, batch: V) -> Self {
        Vectorized { single, batch }
    }
}

impl<F, V> SignalFunction for Vectorized<F, V>
where
    F: Fn(&Inputs<'_>, &Arguments) -> BiosigResult<FunctionOutput> + Send + Sync,
    V: Fn(&[Invocation<'_>]) -> BiosigResult<Vec<FunctionOutput>> + Send + Sync,
{
    fn call(&self, inputs: &Inputs<'_>, arguments: &Arguments) -> BiosigResult<FunctionOutput> {
        (self.single)(inputs, arguments)
    }

    fn call_windows(&self, windows: &[Invocation<'_>]) -> Option<BiosigResult<Vec<FunctionOutput>>> {
        Some((self.batch)(windows))
    }
}
