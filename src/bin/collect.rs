//! collect - label live color-sensor readings and save them to the dataset CSV
//!
//! Each label key (l/p/m/f by default) tags the most recent sensor reading.
//! Samples stay in memory until Ctrl+C, then the whole session is written to the
//! dataset file in one go.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use fruit_sense::ingest::{self, KeyboardCommandSource, COMMAND_POLL_TIMEOUT};
use fruit_sense::{
    CollectionSink, LineSource, SensorConfig, SessionLoop, SessionMode, ShutdownFlag,
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
    /// Dataset CSV to write when the session ends.
    #[arg(long)]
    output: Option<PathBuf>,
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
    if let Some(output) = args.output {
        cfg.dataset_path = output;
    }

    let shutdown = ShutdownFlag::new();
    shutdown.install_ctrlc()?;

    let lines = ingest::open_line_source(cfg.serial.clone())?;
    log::info!("collecting from {} into {}", lines.describe(), cfg.dataset_path.display());

    let mode = SessionMode::Collection(CollectionSink::new(cfg.label_keys, cfg.dataset_path));
    let commands = KeyboardCommandSource::new(mode.trigger_mode(), COMMAND_POLL_TIMEOUT);
    let mut session = SessionLoop::new(lines, commands, mode);
    session.print_banner()?;

    let summary = session.run(&shutdown)?;
    match &summary.saved_to {
        Some(path) => println!(
            "Datos guardados en {} ({} muestras)",
            path.display(),
            summary.samples_recorded
        ),
        None => println!("No se registraron muestras."),
    }
    log::info!(
        "session ended: {} frames, {} samples, {} sensor errors",
        summary.frames_seen,
        summary.samples_recorded,
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
