//! biosig-core: data model for physiological signal pipelines
//!
//! Channels, event channels and containers, plus the segmentation primitive
//! shared by containers and pipelines.

pub mod channel;
pub mod container;
pub mod error;
pub mod events;
pub mod modality;
pub mod segment;
pub mod timestamp;

pub use channel::{validate_sampling_rate, Channel, ChannelBuilder, SignalData};
pub use container::{Container, Signal};
pub use error::{BiosigError, BiosigResult};
pub use events::EventChannel;
pub use modality::Modality;
pub use segment::{segment, WindowPlan};
pub use timestamp::{TimestampPoint, TimestampResolution};
