//! biosig-simulation: synthetic physiological signals
//!
//! Seeded generators for cardiac, respiration and skin conductance like
//! waveforms, used by tests and the demo runner.

pub mod signal_patterns;
pub mod simulator;

pub use signal_patterns::SignalPattern;
pub use simulator::{Recording, SimulationConfig, Simulator};
