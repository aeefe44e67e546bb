//! Container: named collection of channels for one recording session

use crate::channel::{validate_sampling_rate, Channel, SignalData};
use crate::error::{BiosigError, BiosigResult};
use crate::events::EventChannel;
use crate::modality::Modality;
use crate::segment::WindowPlan;
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

/// A dense channel or an event channel held by a [`Container`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Signal {
    Channel(Channel),
    Events(EventChannel),
}

impl Signal {
    pub fn name(&self) -> &str {
        match self {
            Signal::Channel(channel) => channel.name(),
            Signal::Events(events) => events.name(),
        }
    }

    pub fn rename(&mut self, name: &str) {
        match self {
            Signal::Channel(channel) => channel.rename(name),
            Signal::Events(events) => events.rename(name),
        }
    }

    pub fn as_channel(&self) -> Option<&Channel> {
        match self {
            Signal::Channel(channel) => Some(channel),
            Signal::Events(_) => None,
        }
    }

    pub fn as_events(&self) -> Option<&EventChannel> {
        match self {
            Signal::Events(events) => Some(events),
            Signal::Channel(_) => None,
        }
    }

    /// Short description used in error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Signal::Channel(_) => "channel",
            Signal::Events(_) => "event channel",
        }
    }
}

impl From<Channel> for Signal {
    fn from(channel: Channel) -> Self {
        Signal::Channel(channel)
    }
}

impl From<EventChannel> for Signal {
    fn from(events: EventChannel) -> Self {
        Signal::Events(events)
    }
}

/// Named channels of one recording session, in insertion order
///
/// Cloning a container deep-copies every channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Container {
    id: Uuid,
    signals: Vec<Signal>,
    sampling_rate: Option<f64>,
    modality: Option<Modality>,
}

impl Default for Container {
    fn default() -> Self {
        Container::new()
    }
}

impl Container {
    /// Create an empty container
    pub fn new() -> Self {
        Container {
            id: Uuid::new_v4(),
            signals: Vec::new(),
            sampling_rate: None,
            modality: None,
        }
    }

    /// Create an empty container with session metadata
    pub fn with_metadata(sampling_rate: Option<f64>, modality: Option<Modality>) -> BiosigResult<Self> {
        if let Some(rate) = sampling_rate {
            validate_sampling_rate(rate)?;
        }
        Ok(Container {
            sampling_rate,
            modality,
            ..Container::new()
        })
    }

    /// Build a container from signals, rejecting duplicate names
    pub fn from_signals<I, S>(signals: I) -> BiosigResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<Signal>,
    {
        let mut container = Container::new();
        for signal in signals {
            container.add_channel(signal, None, false)?;
        }
        Ok(container)
    }

    /// Session identifier, shared by copies of this container
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Session default sampling rate
    pub fn sampling_rate(&self) -> Option<f64> {
        self.sampling_rate
    }

    pub fn modality(&self) -> Option<&Modality> {
        self.modality.as_ref()
    }

    pub fn set_modality(&mut self, modality: Modality) {
        self.modality = Some(modality);
    }

    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }

    pub fn is_multichannel(&self) -> bool {
        self.signals.len() > 1
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Channel names in insertion order
    pub fn channel_names(&self) -> Vec<&str> {
        self.signals.iter().map(Signal::name).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Signal> {
        self.signals.iter()
    }

    /// Add a signal, optionally renaming it first
    ///
    /// With `allow_replace` an existing signal of the same name is replaced in
    /// place; otherwise a name collision is an error.
    pub fn add_channel(
        &mut self,
        signal: impl Into<Signal>,
        name: Option<&str>,
        allow_replace: bool,
    ) -> BiosigResult<()> {
        let mut signal = signal.into();
        if let Some(name) = name {
            signal.rename(name);
        }

        match self.position(signal.name()) {
            Some(index) if allow_replace => {
                self.signals[index] = signal;
            }
            Some(_) => {
                return Err(BiosigError::DuplicateChannel {
                    name: signal.name().to_string(),
                });
            }
            None => self.signals.push(signal),
        }
        Ok(())
    }

    /// Remove and return a signal
    pub fn remove_channel(&mut self, name: &str) -> BiosigResult<Signal> {
        let index = self.position(name).ok_or_else(|| not_found(name))?;
        Ok(self.signals.remove(index))
    }

    /// Replace the sample data of a dense channel
    pub fn modify_channel(&mut self, name: &str, data: impl Into<SignalData>) -> BiosigResult<()> {
        match self.get_mut(name)? {
            Signal::Channel(channel) => channel.replace_data(data),
            Signal::Events(_) => Err(BiosigError::InvalidConfig {
                reason: format!("'{}' is an event channel and has no sample data", name),
            }),
        }
    }

    /// Look up a signal by name
    pub fn get(&self, name: &str) -> BiosigResult<&Signal> {
        self.signals
            .iter()
            .find(|s| s.name() == name)
            .ok_or_else(|| not_found(name))
    }

    pub fn get_mut(&mut self, name: &str) -> BiosigResult<&mut Signal> {
        self.signals
            .iter_mut()
            .find(|s| s.name() == name)
            .ok_or_else(|| not_found(name))
    }

    /// Look up a dense channel by name
    pub fn channel(&self, name: &str) -> BiosigResult<&Channel> {
        let signal = self.get(name)?;
        signal.as_channel().ok_or_else(|| BiosigError::InvalidConfig {
            reason: format!("'{}' is an {}, expected a sampled channel", name, signal.kind()),
        })
    }

    /// Look up an event channel by name
    pub fn events(&self, name: &str) -> BiosigResult<&EventChannel> {
        let signal = self.get(name)?;
        signal.as_events().ok_or_else(|| BiosigError::InvalidConfig {
            reason: format!("'{}' is a {}, expected an event channel", name, signal.kind()),
        })
    }

    /// Absorb every signal of `other`; fails without changes on any name overlap
    pub fn join(&mut self, other: Container) -> BiosigResult<()> {
        if let Some(duplicate) = other.signals.iter().find(|s| self.contains(s.name())) {
            return Err(BiosigError::DuplicateChannel {
                name: duplicate.name().to_string(),
            });
        }
        if self.sampling_rate.is_none() {
            self.sampling_rate = other.sampling_rate;
        }
        if self.modality.is_none() {
            self.modality = other.modality;
        }
        self.signals.extend(other.signals);
        Ok(())
    }

    /// Segment every dense channel into windows using its own sampling rate
    ///
    /// Data and timestamps are windowed with the same plan. Event channels are
    /// left untouched. The container is unchanged if any channel fails.
    pub fn segment_all(&mut self, window_size: f64, step_size: f64) -> BiosigResult<()> {
        let mut segmented = Vec::with_capacity(self.signals.len());

        for signal in &self.signals {
            let Signal::Channel(channel) = signal else {
                segmented.push(signal.clone());
                continue;
            };
            let (Some(samples), Some(timestamps)) =
                (channel.data().as_continuous(), channel.timestamps().as_continuous())
            else {
                return Err(BiosigError::InvalidWindow {
                    reason: format!("channel '{}' is already windowed", channel.name()),
                });
            };

            let plan = WindowPlan::new(samples.len(), window_size, step_size, channel.sampling_rate())?;
            debug!(
                channel = channel.name(),
                windows = plan.num_windows,
                window_samples = plan.window_samples,
                "segmenting channel"
            );

            let mut windowed = channel.clone();
            windowed.replace_data_with_timing(
                plan.apply(samples),
                plan.apply(timestamps),
                channel.sampling_rate(),
            )?;
            segmented.push(Signal::Channel(windowed));
        }

        self.signals = segmented;
        Ok(())
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.signals.iter().position(|s| s.name() == name)
    }
}

impl IntoIterator for Container {
    type Item = Signal;
    type IntoIter = std::vec::IntoIter<Signal>;

    fn into_iter(self) -> Self::IntoIter {
        self.signals.into_iter()
    }
}

fn not_found(name: &str) -> BiosigError {
    BiosigError::ChannelNotFound {
        name: name.to_string(),
    }
}
