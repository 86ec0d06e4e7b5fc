//! Fruit Sense
//!
//! Real-time fruit classification from an RGB color sensor on a serial link.
//!
//! # Architecture
//!
//! Two interactive modes share one pipeline:
//!
//! 1. **Collection** (`collect`): label keys tag the current sensor reading; samples
//!    are written to the dataset CSV when the session ends.
//! 2. **Live inference** (`classify_live`): Enter runs the current reading through
//!    the fitted scaler and model, and the confidence gate decides whether the top
//!    class is reported or the object is "unrecognized".
//!
//! `train` fits the scaler/model pair from the collected dataset.
//!
//! # Module Structure
//!
//! - `frame`: RawFrame, the sensor line parser, FrameCache
//! - `ingest`: pollable line sources (serial, synthetic, scripted) and command sources
//! - `classify`: StandardScaler, MlpClassifier, ConfidenceGate, artifact pair
//! - `dataset`: LabeledSample, SampleLog, CSV format
//! - `training`: stratified split, fitting, evaluation
//! - `session`: the poll/dispatch loop and graceful shutdown
//! - `config`, `report`, `ui`: settings, operator text, progress display

use anyhow::{anyhow, Context, Result};
use std::io::Write;
use std::path::Path;

pub mod classify;
pub mod config;
pub mod dataset;
pub mod frame;
pub mod ingest;
pub mod report;
pub mod session;
pub mod training;
pub mod ui;

pub use classify::{
    ClassProbability, ClassificationResult, ClassifierParameters, ConfidenceGate,
    StandardScaler, CONFIDENCE_THRESHOLD,
};
pub use config::{LabelKeys, SensorConfig};
pub use dataset::{LabeledSample, SampleLog};
pub use frame::{parse_frame_line, FrameCache, RawFrame, FRAME_SENTINEL};
pub use ingest::{Command, CommandSource, LineSource, SourceStats};
pub use session::{
    CollectionSink, InferenceSink, SessionEvent, SessionLoop, SessionMode, SessionState,
    SessionSummary, ShutdownFlag,
};

/// Replace `path` with `bytes` via a sibling temp file and rename.
///
/// Readers never observe a partially written file, and a failed write leaves the
/// previous content in place.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .ok_or_else(|| anyhow!("{} is not a file path", path.display()))?;
    let mut tmp_name = file_name.to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    let result = (|| -> Result<()> {
        let mut file = std::fs::File::create(&tmp_path)
            .with_context(|| format!("failed to create {}", tmp_path.display()))?;
        file.write_all(bytes)?;
        file.sync_all()?;
        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to move {} into place", tmp_path.display()))?;
        Ok(())
    })();
    if result.is_err() {
        let _ = std::fs::remove_file(&tmp_path);
    }
    result
}
