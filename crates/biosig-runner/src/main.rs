//! biosig-runner: simulate a resting session, run a pipeline, print features
//!
//! Usage: `biosig-runner [pipeline.json] [duration_seconds]`

use anyhow::{bail, Context, Result};
use biosig_processing::{FeatureStepConfig, Pipeline, PipelineConfig, StepConfig};
use biosig_simulation::Recording;
use tracing::{info, warn};

const DEFAULT_DURATION: f64 = 60.0;
const SEED: u64 = 2024;

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) => PipelineConfig::from_file(&path)
            .with_context(|| format!("loading pipeline configuration from {}", path))?,
        None => default_config(),
    };
    let duration = match args.next() {
        Some(value) => value
            .parse::<f64>()
            .with_context(|| format!("invalid duration '{}'", value))?,
        None => DEFAULT_DURATION,
    };
    if args.next().is_some() {
        bail!("usage: biosig-runner [pipeline.json] [duration_seconds]");
    }

    let recording = Recording::resting(SEED).generate(duration)?;
    info!(channels = ?recording.channel_names(), duration, "simulated recording");

    let mut pipeline = Pipeline::from_config(config)?;
    pipeline.set_input(recording)?;
    let result = pipeline.run()?;
    for message in &result.warnings {
        warn!("{}", message);
    }
    info!(
        channels = ?result.output.channel_names(),
        elapsed_us = result.elapsed_us,
        "pipeline finished"
    );

    let matrix = pipeline.extract_features()?;
    println!("{}", serde_json::to_string_pretty(matrix)?);
    Ok(())
}

/// Ten second windows with a five second hop over the resting session
fn default_config() -> PipelineConfig {
    let mut config = PipelineConfig::windowed("resting", 10.0, 5.0);

    let mut notch = StepConfig::new("notch", &["ecg"]);
    notch.arguments.set("frequency", 50.0);
    config.preprocessing.push(notch);
    let mut highpass = StepConfig::new("highpass", &["ecg"]);
    highpass.arguments.set("cutoff", 0.5);
    config.preprocessing.push(highpass);

    config.processing.push(StepConfig::new("remove_mean", &["resp"]));

    let mut ecg = FeatureStepConfig::new("time_domain", &["ecg"]);
    ecg.prefix = Some("ecg_".into());
    config.features.push(ecg);

    let mut resp = FeatureStepConfig::new("spectral", &["resp"]);
    resp.prefix = Some("resp_".into());
    resp.arguments.set("bands", vec![0.1, 0.5, 1.0]);
    config.features.push(resp);

    let mut eda = FeatureStepConfig::new("statistical", &["eda"]);
    eda.prefix = Some("eda_".into());
    config.features.push(eda);

    config
}
