//! classify_live - classify the fruit under the sensor on demand
//!
//! Loads the scaler/model pair written by `train`, then classifies the latest
//! sensor reading every time Enter is pressed. Readings below the confidence
//! threshold are reported as unrecognized.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use fruit_sense::ingest::{self, KeyboardCommandSource, COMMAND_POLL_TIMEOUT};
use fruit_sense::{
    ClassifierParameters, InferenceSink, SensorConfig, SessionLoop, SessionMode, ShutdownFlag,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Serial device path, or stub://<fruit> for a synthetic sensor.
    #[arg(long)]
    port: Option<String>,
    /// Serial baud rate.
    #[arg(long)]
    baud_rate: Option<u32>,
    /// Trained model artifact.
    #[arg(long)]
    model: Option<PathBuf>,
    /// Fitted scaler artifact.
    #[arg(long)]
    scaler: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = SensorConfig::load()?;
    if let Some(port) = args.port {
        cfg.serial.path = port;
    }
    if let Some(baud_rate) = args.baud_rate {
        cfg.serial.baud_rate = baud_rate;
    }
    if let Some(model) = args.model {
        cfg.model_path = model;
    }
    if let Some(scaler) = args.scaler {
        cfg.scaler_path = scaler;
    }

    // Artifacts first: no point opening the port without a model.
    let params = ClassifierParameters::load(&cfg.scaler_path, &cfg.model_path)?;
    log::info!(
        "loaded model for classes [{}] from {}",
        params.labels().join(", "),
        cfg.model_path.display()
    );

    let shutdown = ShutdownFlag::new();
    shutdown.install_ctrlc()?;

    let lines = ingest::open_line_source(cfg.serial.clone())?;
    let mode = SessionMode::Inference(InferenceSink::new(params));
    let commands = KeyboardCommandSource::new(mode.trigger_mode(), COMMAND_POLL_TIMEOUT);
    let mut session = SessionLoop::new(lines, commands, mode);
    session.print_banner()?;

    let summary = session.run(&shutdown)?;
    log::info!(
        "session ended: {} frames, {} classifications, {} sensor errors",
        summary.frames_seen,
        summary.classifications,
        summary.source_errors
    );
    log::info!(
        "sensor: {} lines read, {} read errors, {} reconnects, {} oversized lines dropped",
        summary.sensor.lines_read,
        summary.sensor.read_errors,
        summary.sensor.reconnects,
        summary.sensor.discarded_partials
    );
    Ok(())
}
