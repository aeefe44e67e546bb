//! Reconcile function results with the timing of the channel they came from

use crate::function::FunctionOutput;
use biosig_core::{shape_error, BiosigError, BiosigResult, Channel, EventChannel, Signal, SignalData};
use std::collections::BTreeMap;

/// How an output is named before any queue binding
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputKey {
    /// Replaces the input channel
    Inherit,
    /// One column of a table or one key of a mapping
    Column(String),
    /// A channel that carries its own name
    Named(String),
}

impl OutputKey {
    /// Key used by name-mapped output bindings
    pub fn label<'a>(&'a self, input: &'a str) -> &'a str {
        match self {
            OutputKey::Inherit => input,
            OutputKey::Column(column) | OutputKey::Named(column) => column,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct Reconciled {
    pub outputs: Vec<(OutputKey, Signal)>,
    pub warnings: Vec<String>,
}

/// Resolve tuple results through `return_index`
pub(crate) fn select(
    output: FunctionOutput,
    return_index: Option<usize>,
    function: &str,
) -> BiosigResult<FunctionOutput> {
    let FunctionOutput::Tuple(mut values) = output else {
        return Ok(output);
    };
    let Some(index) = return_index else {
        return Err(BiosigError::AmbiguousResult {
            reason: format!(
                "'{}' returned a tuple of {} values and no return index is set",
                function,
                values.len()
            ),
        });
    };
    if index >= values.len() {
        return Err(BiosigError::InvalidConfig {
            reason: format!(
                "return index {} out of range for a tuple of {} values from '{}'",
                index,
                values.len(),
                function
            ),
        });
    }
    match values.swap_remove(index) {
        FunctionOutput::Tuple(_) => Err(BiosigError::AmbiguousResult {
            reason: format!("'{}' returned a nested tuple at index {}", function, index),
        }),
        selected => Ok(selected),
    }
}

/// Turn one result per window of `reference` into signals
///
/// Flat references take exactly one result. Sequences that keep the
/// samples-per-window reuse the reference timing; other lengths get a
/// recomputed sampling rate and a warning.
pub(crate) fn reconcile(outputs: Vec<FunctionOutput>, reference: &Channel) -> BiosigResult<Reconciled> {
    if outputs.len() != reference.windows() {
        return Err(shape_error!(
            "{} results for {} windows of '{}'",
            outputs.len(),
            reference.windows(),
            reference.name()
        ));
    }
    let mut outputs = outputs.into_iter();
    let Some(first) = outputs.next() else {
        return Err(shape_error!("no results for '{}'", reference.name()));
    };

    let mut reconciled = Reconciled::default();
    match first {
        FunctionOutput::Sequence(samples) => {
            let windows = gather(samples, outputs, "sequence", |output| match output {
                FunctionOutput::Sequence(samples) => Ok(samples),
                other => Err(other),
            })?;
            let channel = stack(reference, reference.name(), windows, &mut reconciled.warnings)?;
            reconciled.outputs.push((OutputKey::Inherit, channel.into()));
        }
        FunctionOutput::Table(columns) => {
            let tables = gather(columns, outputs, "table", |output| match output {
                FunctionOutput::Table(columns) => Ok(columns),
                other => Err(other),
            })?;
            for (index, table) in tables.iter().enumerate() {
                check_table(index, table)?;
            }
            for (column, windows) in transpose(tables)? {
                let channel = stack(reference, &column, windows, &mut reconciled.warnings)?;
                reconciled.outputs.push((OutputKey::Column(column), channel.into()));
            }
        }
        FunctionOutput::Mapping(entries) => {
            let mappings = gather(entries, outputs, "mapping", |output| match output {
                FunctionOutput::Mapping(entries) => Ok(entries),
                other => Err(other),
            })?;
            for (key, windows) in transpose(mappings)? {
                let channel = stack(reference, &key, windows, &mut reconciled.warnings)?;
                reconciled.outputs.push((OutputKey::Column(key), channel.into()));
            }
        }
        FunctionOutput::Events(positions) => {
            let per_window = gather(positions, outputs, "events", |output| match output {
                FunctionOutput::Events(positions) => Ok(positions),
                other => Err(other),
            })?;
            let events = locate_events(reference, per_window)?;
            reconciled.outputs.push((OutputKey::Inherit, events.into()));
        }
        FunctionOutput::Channel(_) | FunctionOutput::Container(_) if reference.is_windowed() => {
            return Err(BiosigError::UnsupportedResult {
                kind: "per-window channel",
            });
        }
        output @ (FunctionOutput::Channel(_) | FunctionOutput::Container(_)) => {
            reconciled.outputs = passthrough(output)?;
        }
        FunctionOutput::Tuple(_) => {
            return Err(BiosigError::AmbiguousResult {
                reason: format!("tuple result for '{}' was not resolved", reference.name()),
            });
        }
        FunctionOutput::Scalar(_) => return Err(BiosigError::UnsupportedResult { kind: "scalar" }),
    }
    Ok(reconciled)
}

/// Collect the payload of every window; all windows must share window 0's variant
fn gather<T>(
    first: T,
    rest: impl Iterator<Item = FunctionOutput>,
    expected: &'static str,
    extract: impl Fn(FunctionOutput) -> Result<T, FunctionOutput>,
) -> BiosigResult<Vec<T>> {
    let mut payloads = vec![first];
    for (offset, output) in rest.enumerate() {
        match extract(output) {
            Ok(payload) => payloads.push(payload),
            Err(other) => {
                return Err(shape_error!(
                    "window {} returned a {} but window 0 returned a {}",
                    offset + 1,
                    other.kind(),
                    expected
                ))
            }
        }
    }
    Ok(payloads)
}

/// Channels and containers returned as-is keep their own names
pub(crate) fn passthrough(output: FunctionOutput) -> BiosigResult<Vec<(OutputKey, Signal)>> {
    match output {
        FunctionOutput::Channel(channel) => {
            Ok(vec![(OutputKey::Named(channel.name().to_string()), channel.into())])
        }
        FunctionOutput::Container(container) => Ok(container
            .into_iter()
            .map(|signal| (OutputKey::Named(signal.name().to_string()), signal))
            .collect()),
        other => Err(BiosigError::UnsupportedResult { kind: other.kind() }),
    }
}

fn stack(
    reference: &Channel,
    name: &str,
    windows: Vec<Vec<f64>>,
    warnings: &mut Vec<String>,
) -> BiosigResult<Channel> {
    if windows.iter().any(Vec::is_empty) {
        return Err(shape_error!("'{}' produced an empty result", name));
    }
    let data = SignalData::from_windows(windows, reference.is_windowed())?;
    let channel = reference.derive(name, data)?;
    if channel.sampling_rate() != reference.sampling_rate() {
        warnings.push(format!(
            "sampling rate of '{}' changed from {} Hz to {} Hz",
            name,
            reference.sampling_rate(),
            channel.sampling_rate()
        ));
    }
    Ok(channel)
}

fn check_table(window: usize, columns: &[(String, Vec<f64>)]) -> BiosigResult<()> {
    let Some((_, first)) = columns.first() else {
        return Err(shape_error!("window {} returned an empty table", window));
    };
    match columns.iter().find(|(_, values)| values.len() != first.len()) {
        Some((name, values)) => Err(shape_error!(
            "table column '{}' has {} rows, expected {}",
            name,
            values.len(),
            first.len()
        )),
        None => Ok(()),
    }
}

/// Regroup per-window `(key, values)` lists into per-key window lists
fn transpose(windows: Vec<Vec<(String, Vec<f64>)>>) -> BiosigResult<Vec<(String, Vec<Vec<f64>>)>> {
    let mut windows = windows.into_iter();
    let Some(first) = windows.next() else {
        return Ok(Vec::new());
    };
    if first.is_empty() {
        return Err(shape_error!("result has no columns"));
    }
    let mut grouped: Vec<(String, Vec<Vec<f64>>)> =
        first.into_iter().map(|(key, values)| (key, vec![values])).collect();

    for (offset, window) in windows.enumerate() {
        let same_keys = window.len() == grouped.len()
            && window.iter().zip(&grouped).all(|((a, _), (b, _))| a == b);
        if !same_keys {
            return Err(shape_error!(
                "window {} returned keys {:?}, expected {:?}",
                offset + 1,
                window.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>(),
                grouped.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>()
            ));
        }
        for ((_, values), (_, target)) in window.into_iter().zip(grouped.iter_mut()) {
            target.push(values);
        }
    }
    Ok(grouped)
}

/// Map per-window sample positions back onto the source sample axis
///
/// Window offsets come from each window's first timestamp, so overlapping
/// windows that see the same sample yield a single event.
fn locate_events(reference: &Channel, per_window: Vec<Vec<usize>>) -> BiosigResult<EventChannel> {
    let samples_per_window = reference.samples_per_window();
    let resolution = reference.resolution();
    let windows: Vec<&[f64]> = reference.timestamps().iter_windows().collect();
    let origin = windows.first().and_then(|w| w.first()).copied().unwrap_or(0.0);

    let mut located = BTreeMap::new();
    for (window, events) in per_window.into_iter().enumerate() {
        let timestamps = windows.get(window).copied().unwrap_or(&[]);
        let offset = timestamps.first().map_or(0, |&start| {
            (resolution.as_secs_f64(start - origin) * reference.sampling_rate()).round() as usize
        });
        for position in events {
            let Some(&timestamp) = timestamps.get(position) else {
                return Err(BiosigError::EventIndex {
                    event: position as f64,
                    len: samples_per_window,
                });
            };
            located.entry(offset + position).or_insert(timestamp);
        }
    }

    let (positions, timestamps): (Vec<f64>, Vec<f64>) = located
        .into_iter()
        .map(|(position, timestamp)| (position as f64, timestamp))
        .unzip();
    EventChannel::from_occurrences(reference.name(), positions, &timestamps, reference.resolution())
}
