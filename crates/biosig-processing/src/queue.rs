//! ProcessQueue: ordered process bindings run against a container copy

use crate::function::ChannelInputs;
use crate::params::Arguments;
use crate::process::{Process, ProcessOutcome, ProcessOutput};
use biosig_core::{config_error, BiosigError, BiosigResult, Container, Signal};
use std::collections::BTreeSet;
use tracing::debug;

/// Which container channels feed a process
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSpec {
    Single(String),
    /// Passed positionally, in order
    Positional(Vec<String>),
    /// `(parameter, channel)` pairs passed by name
    Named(Vec<(String, String)>),
}

/// Where process outputs are stored
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum OutputSpec {
    /// Names chosen by the process (input name, prefix, column)
    #[default]
    Inherit,
    /// One name; several outputs become `{name}_{key}`
    Single(String),
    /// Names assigned to outputs in order
    List(Vec<String>),
    /// `(output key, channel)` pairs
    Map(Vec<(String, String)>),
}

impl InputSpec {
    pub fn named<I, P, C>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (P, C)>,
        P: Into<String>,
        C: Into<String>,
    {
        InputSpec::Named(pairs.into_iter().map(|(p, c)| (p.into(), c.into())).collect())
    }

    /// Channel names referenced, in binding order
    pub fn channels(&self) -> Vec<&str> {
        match self {
            InputSpec::Single(name) => vec![name.as_str()],
            InputSpec::Positional(names) => names.iter().map(String::as_str).collect(),
            InputSpec::Named(pairs) => pairs.iter().map(|(_, c)| c.as_str()).collect(),
        }
    }

    /// Check the binding is well formed
    pub fn validate(&self) -> BiosigResult<()> {
        match self {
            InputSpec::Single(name) => non_empty(name, "input"),
            InputSpec::Positional(names) => {
                if names.is_empty() {
                    return Err(config_error!("positional input list is empty"));
                }
                names.iter().try_for_each(|n| non_empty(n, "input"))
            }
            InputSpec::Named(pairs) => {
                if pairs.is_empty() {
                    return Err(config_error!("named input map is empty"));
                }
                for (parameter, channel) in pairs {
                    non_empty(parameter, "input parameter")?;
                    non_empty(channel, "input")?;
                }
                unique(pairs.iter().map(|(p, _)| p.as_str()), "input parameter")
            }
        }
    }

    /// Look up the bound signals in `container`
    pub fn resolve<'a>(&self, container: &'a Container) -> BiosigResult<ChannelInputs<'a>> {
        let mut inputs = ChannelInputs::new();
        match self {
            InputSpec::Single(name) => inputs.push(container.get(name)?),
            InputSpec::Positional(names) => {
                for name in names {
                    inputs.push(container.get(name)?);
                }
            }
            InputSpec::Named(pairs) => {
                for (parameter, channel) in pairs {
                    inputs.push_named(parameter, container.get(channel)?);
                }
            }
        }
        Ok(inputs)
    }
}

impl OutputSpec {
    pub fn map<I, K, C>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, C)>,
        K: Into<String>,
        C: Into<String>,
    {
        OutputSpec::Map(pairs.into_iter().map(|(k, c)| (k.into(), c.into())).collect())
    }

    pub fn validate(&self) -> BiosigResult<()> {
        match self {
            OutputSpec::Inherit => Ok(()),
            OutputSpec::Single(name) => non_empty(name, "output"),
            OutputSpec::List(names) => {
                if names.is_empty() {
                    return Err(config_error!("output name list is empty"));
                }
                names.iter().try_for_each(|n| non_empty(n, "output"))?;
                unique(names.iter().map(String::as_str), "output")
            }
            OutputSpec::Map(pairs) => {
                if pairs.is_empty() {
                    return Err(config_error!("output name map is empty"));
                }
                for (key, channel) in pairs {
                    non_empty(key, "output key")?;
                    non_empty(channel, "output")?;
                }
                unique(pairs.iter().map(|(k, _)| k.as_str()), "output key")?;
                unique(pairs.iter().map(|(_, c)| c.as_str()), "output")
            }
        }
    }

    /// Rename process outputs according to this binding
    pub fn bind(&self, outputs: Vec<ProcessOutput>) -> BiosigResult<Vec<Signal>> {
        match self {
            OutputSpec::Inherit => Ok(outputs.into_iter().map(|o| o.signal).collect()),
            OutputSpec::Single(name) if outputs.len() == 1 => Ok(outputs
                .into_iter()
                .map(|mut o| {
                    o.signal.rename(name);
                    o.signal
                })
                .collect()),
            OutputSpec::Single(name) => Ok(outputs
                .into_iter()
                .map(|mut o| {
                    o.signal.rename(&format!("{}_{}", name, o.key));
                    o.signal
                })
                .collect()),
            OutputSpec::List(names) => {
                if outputs.len() > names.len() {
                    return Err(config_error!(
                        "process produced {} outputs but only {} names are bound",
                        outputs.len(),
                        names.len()
                    ));
                }
                Ok(outputs
                    .into_iter()
                    .zip(names)
                    .map(|(mut o, name)| {
                        o.signal.rename(name);
                        o.signal
                    })
                    .collect())
            }
            OutputSpec::Map(pairs) => outputs
                .into_iter()
                .map(|mut o| -> BiosigResult<Signal> {
                    let (_, name) = pairs.iter().find(|(key, _)| *key == o.key).ok_or_else(|| {
                        config_error!(
                            "output '{}' has no name bound; bound keys are {:?}",
                            o.key,
                            pairs.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>()
                        )
                    })?;
                    o.signal.rename(name);
                    Ok(o.signal)
                })
                .collect(),
        }
    }
}

impl From<&str> for InputSpec {
    fn from(name: &str) -> Self {
        InputSpec::Single(name.to_string())
    }
}

impl From<String> for InputSpec {
    fn from(name: String) -> Self {
        InputSpec::Single(name)
    }
}

impl From<Vec<&str>> for InputSpec {
    fn from(names: Vec<&str>) -> Self {
        InputSpec::Positional(names.into_iter().map(str::to_string).collect())
    }
}

impl From<Vec<String>> for InputSpec {
    fn from(names: Vec<String>) -> Self {
        InputSpec::Positional(names)
    }
}

impl From<&str> for OutputSpec {
    fn from(name: &str) -> Self {
        OutputSpec::Single(name.to_string())
    }
}

impl From<String> for OutputSpec {
    fn from(name: String) -> Self {
        OutputSpec::Single(name)
    }
}

impl From<Vec<&str>> for OutputSpec {
    fn from(names: Vec<&str>) -> Self {
        OutputSpec::List(names.into_iter().map(str::to_string).collect())
    }
}

impl From<Vec<String>> for OutputSpec {
    fn from(names: Vec<String>) -> Self {
        OutputSpec::List(names)
    }
}

impl From<Option<&str>> for OutputSpec {
    fn from(name: Option<&str>) -> Self {
        name.map_or(OutputSpec::Inherit, OutputSpec::from)
    }
}

/// One registered step
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub process: Process,
    pub inputs: InputSpec,
    pub outputs: OutputSpec,
    pub kwargs: Arguments,
}

/// Result of running a queue
#[derive(Debug, Clone)]
pub struct QueueOutcome {
    pub container: Container,
    pub warnings: Vec<String>,
}

/// Ordered process bindings executed sequentially
#[derive(Debug, Clone, Default)]
pub struct ProcessQueue {
    name: String,
    entries: Vec<QueueEntry>,
}

impl ProcessQueue {
    pub fn new(name: &str) -> Self {
        ProcessQueue {
            name: name.to_string(),
            entries: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[QueueEntry] {
        &self.entries
    }

    /// Register a step; bindings and bound arguments are checked here
    pub fn add_process(
        &mut self,
        process: Process,
        inputs: impl Into<InputSpec>,
        outputs: impl Into<OutputSpec>,
        kwargs: Arguments,
    ) -> BiosigResult<&mut Self> {
        let inputs = inputs.into();
        let outputs = outputs.into();
        inputs.validate()?;
        outputs.validate()?;

        if let Some(key) = kwargs.keys().find(|key| !process.declares(key)) {
            return Err(config_error!(
                "argument '{}' is not a parameter of process '{}'",
                key,
                process.name()
            ));
        }

        self.entries.push(QueueEntry {
            process,
            inputs,
            outputs,
            kwargs,
        });
        Ok(self)
    }

    /// Run every step in order against a copy of `container`
    pub fn run(&self, container: &Container) -> BiosigResult<QueueOutcome> {
        let mut working = container.clone();
        let mut warnings = Vec::new();

        for (index, entry) in self.entries.iter().enumerate() {
            let ProcessOutcome {
                outputs,
                warnings: mut step_warnings,
            } = {
                let inputs = entry.inputs.resolve(&working)?;
                entry.process.apply(&inputs, &entry.kwargs)?
            };

            let signals = entry.outputs.bind(outputs)?;
            let names: Vec<String> = signals.iter().map(|s| s.name().to_string()).collect();
            for signal in signals {
                working.add_channel(signal, None, true)?;
            }

            debug!(
                queue = %self.name,
                step = index,
                process = entry.process.name(),
                inputs = ?entry.inputs.channels(),
                outputs = ?names,
                "queue step finished"
            );
            warnings.append(&mut step_warnings);
        }

        Ok(QueueOutcome {
            container: working,
            warnings,
        })
    }
}

fn non_empty(name: &str, what: &str) -> BiosigResult<()> {
    if name.is_empty() {
        Err(config_error!("{} name cannot be empty", what))
    } else {
        Ok(())
    }
}

fn unique<'a>(names: impl Iterator<Item = &'a str>, what: &str) -> BiosigResult<()> {
    let mut seen = BTreeSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(BiosigError::InvalidConfig {
                reason: format!("{} name '{}' is bound twice", what, name),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args;
    use crate::function::FunctionOutput;
    use biosig_core::{Channel, SignalData};

    fn container() -> Container {
        Container::from_signals([
            Channel::new("ecg", vec![1.0, 2.0, 3.0], 10.0).unwrap(),
            Channel::new("ppg", vec![3.0, 2.0, 1.0], 10.0).unwrap(),
        ])
        .unwrap()
    }

    fn add_one() -> Process {
        Process::new("add_one", |inputs, _| {
            Ok(inputs.first()?.iter().map(|x| x + 1.0).collect::<Vec<_>>().into())
        })
    }

    fn split() -> Process {
        Process::new("split", |inputs, _| {
            let samples = inputs.first()?.to_vec();
            Ok(FunctionOutput::table([("low", samples.clone()), ("high", samples)]))
        })
    }

    fn data(container: &Container, name: &str) -> SignalData {
        container.channel(name).unwrap().data().clone()
    }

    #[test]
    fn test_steps_run_in_order() {
        let mut queue = ProcessQueue::new("main");
        queue
            .add_process(add_one(), "ecg", "x", Arguments::new())
            .unwrap()
            .add_process(add_one(), "x", "y", Arguments::new())
            .unwrap();

        let input = container();
        let outcome = queue.run(&input).unwrap();

        assert_eq!(outcome.container.channel_names(), vec!["ecg", "ppg", "x", "y"]);
        assert_eq!(data(&outcome.container, "y"), SignalData::Continuous(vec![3.0, 4.0, 5.0]));
        assert_eq!(input.channel_names(), vec!["ecg", "ppg"]);
    }

    #[test]
    fn test_reversed_order_fails_lookup() {
        let mut queue = ProcessQueue::new("main");
        queue.add_process(add_one(), "x", "y", Arguments::new()).unwrap();
        queue.add_process(add_one(), "ecg", "x", Arguments::new()).unwrap();

        assert_eq!(
            queue.run(&container()).unwrap_err(),
            BiosigError::ChannelNotFound { name: "x".to_string() }
        );
    }

    #[test]
    fn test_inherit_replaces_in_place() {
        let mut queue = ProcessQueue::new("main");
        queue.add_process(add_one(), "ecg", OutputSpec::Inherit, Arguments::new()).unwrap();

        let outcome = queue.run(&container()).unwrap();
        assert_eq!(outcome.container.channel_names(), vec!["ecg", "ppg"]);
        assert_eq!(data(&outcome.container, "ecg"), SignalData::Continuous(vec![2.0, 3.0, 4.0]));
    }

    #[test]
    fn test_output_bindings() {
        let mut queue = ProcessQueue::new("bindings");
        queue
            .add_process(split(), "ecg", "band", Arguments::new())
            .unwrap()
            .add_process(split(), "ppg", vec!["p_low", "p_high"], Arguments::new())
            .unwrap()
            .add_process(split(), "ecg", OutputSpec::map([("low", "l"), ("high", "h")]), Arguments::new())
            .unwrap();

        let names = queue.run(&container()).unwrap().container;
        assert_eq!(
            names.channel_names(),
            vec!["ecg", "ppg", "band_low", "band_high", "p_low", "p_high", "l", "h"]
        );
    }

    #[test]
    fn test_too_many_outputs_for_list() {
        let mut queue = ProcessQueue::new("main");
        queue.add_process(split(), "ecg", vec!["only"], Arguments::new()).unwrap();
        assert!(matches!(
            queue.run(&container()),
            Err(BiosigError::InvalidConfig { .. })
        ));
    }

    fn fan_out() -> Process {
        Process::native("fan_out", |inputs, _| {
            let channel = inputs.primary_channel()?;
            let container = Container::from_signals(
                ["x", "y", "z"].map(|name| channel.clone().with_name(name)),
            )?;
            Ok(container.into())
        })
    }

    #[test]
    fn test_container_result_exceeds_list_binding() {
        let mut queue = ProcessQueue::new("main");
        queue.add_process(fan_out(), "ecg", vec!["a", "b"], Arguments::new()).unwrap();
        assert!(matches!(
            queue.run(&container()),
            Err(BiosigError::InvalidConfig { .. })
        ));

        let mut queue = ProcessQueue::new("main");
        queue.add_process(fan_out(), "ecg", vec!["a", "b", "c"], Arguments::new()).unwrap();
        let outcome = queue.run(&container()).unwrap();
        assert_eq!(outcome.container.channel_names(), vec!["ecg", "ppg", "a", "b", "c"]);
    }

    #[test]
    fn test_unmapped_output_fails() {
        let mut queue = ProcessQueue::new("main");
        queue
            .add_process(split(), "ecg", OutputSpec::map([("low", "l")]), Arguments::new())
            .unwrap();
        assert!(queue.run(&container()).is_err());
    }

    #[test]
    fn test_registration_validation() {
        let mut queue = ProcessQueue::new("main");
        assert!(queue.add_process(add_one(), "", "x", Arguments::new()).is_err());
        assert!(queue
            .add_process(add_one(), Vec::<String>::new(), "x", Arguments::new())
            .is_err());
        assert!(queue
            .add_process(add_one(), "ecg", vec!["a", "a"], Arguments::new())
            .is_err());
        assert!(queue
            .add_process(add_one(), "ecg", "x", args! { "gain" => 2.0 })
            .is_err());
        assert!(queue
            .add_process(add_one().parameter("gain"), "ecg", "x", args! { "gain" => 2.0 })
            .is_ok());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_named_inputs() {
        let difference = Process::new("difference", |inputs, _| {
            let a = inputs.require("minuend")?;
            let b = inputs.require("subtrahend")?;
            Ok(a.iter().zip(b).map(|(x, y)| x - y).collect::<Vec<_>>().into())
        });

        let mut queue = ProcessQueue::new("main");
        queue
            .add_process(
                difference,
                InputSpec::named([("minuend", "ecg"), ("subtrahend", "ppg")]),
                "diff",
                Arguments::new(),
            )
            .unwrap();

        let outcome = queue.run(&container()).unwrap();
        assert_eq!(
            data(&outcome.container, "diff"),
            SignalData::Continuous(vec![-2.0, 0.0, 2.0])
        );
    }

    #[test]
    fn test_warnings_are_collected() {
        let halve = Process::new("halve", |inputs, _| {
            Ok(inputs.first()?.iter().step_by(2).copied().collect::<Vec<_>>().into())
        });
        let mut queue = ProcessQueue::new("main");
        queue.add_process(halve, "ecg", "half", Arguments::new()).unwrap();

        let outcome = queue.run(&container()).unwrap();
        assert_eq!(outcome.warnings.len(), 1);
        let half = outcome.container.channel("half").unwrap();
        assert!((half.sampling_rate() - 2.0 / 0.3).abs() < 1e-9);
    }
}
