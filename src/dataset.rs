//! Labeled sample log and the CSV dataset format.
//!
//! The dataset file has the header `timestamp,label,R,G,B` and one row per sample.
//! Collection writes it once at session end; training reads it wholesale.

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDateTime;
use sha2::{Digest, Sha256};
use std::path::Path;

use crate::frame::RawFrame;

pub const DATASET_HEADER: &str = "timestamp,label,R,G,B";
pub const DEFAULT_DATASET_PATH: &str = "datos_colores.csv";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// One operator-labeled sensor reading.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LabeledSample {
    /// ISO-8601 local time, seconds precision.
    pub timestamp: String,
    pub label: String,
    pub r: u32,
    pub g: u32,
    pub b: u32,
}

impl LabeledSample {
    pub fn frame(&self) -> RawFrame {
        RawFrame::new(self.r, self.g, self.b)
    }

    fn to_row(&self) -> String {
        format!(
            "{},{},{},{},{}",
            self.timestamp, self.label, self.r, self.g, self.b
        )
    }
}

// ----------------------------------------------------------------------------
// SampleLog: append-only, in-memory until flush
// ----------------------------------------------------------------------------

/// Samples accumulated during one collection session, in insertion order.
#[derive(Debug, Default)]
pub struct SampleLog {
    samples: Vec<LabeledSample>,
    last_time: Option<NaiveDateTime>,
}

impl SampleLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sample stamped with the current local time.
    pub fn record(&mut self, label: &str, frame: RawFrame) -> &LabeledSample {
        self.record_at(label, frame, chrono::Local::now().naive_local())
    }

    /// Append a sample stamped with `now`.
    ///
    /// Timestamps never go backwards within a log: if the wall clock steps back, the
    /// previous sample's time is reused.
    pub fn record_at(&mut self, label: &str, frame: RawFrame, now: NaiveDateTime) -> &LabeledSample {
        let stamped = match self.last_time {
            Some(last) if now < last => last,
            _ => now,
        };
        self.last_time = Some(stamped);
        self.samples.push(LabeledSample {
            timestamp: stamped.format(TIMESTAMP_FORMAT).to_string(),
            label: label.to_string(),
            r: frame.r,
            g: frame.g,
            b: frame.b,
        });
        &self.samples[self.samples.len() - 1]
    }

    pub fn samples(&self) -> &[LabeledSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

// ----------------------------------------------------------------------------
// CSV format
// ----------------------------------------------------------------------------

/// Render samples as dataset CSV (header included).
pub fn to_csv(samples: &[LabeledSample]) -> String {
    let mut out = String::with_capacity(DATASET_HEADER.len() + 1 + samples.len() * 40);
    out.push_str(DATASET_HEADER);
    out.push('\n');
    for sample in samples {
        out.push_str(&sample.to_row());
        out.push('\n');
    }
    out
}

/// Write the dataset file, replacing any previous content atomically.
pub fn write_dataset(path: &Path, samples: &[LabeledSample]) -> Result<()> {
    crate::write_atomic(path, to_csv(samples).as_bytes())
        .with_context(|| format!("failed to write dataset {}", path.display()))
}

/// Parse dataset CSV text.
pub fn parse_csv(text: &str) -> Result<Vec<LabeledSample>> {
    let mut lines = text.lines().enumerate();
    let header = lines
        .next()
        .map(|(_, line)| line.trim_start_matches('\u{feff}').trim())
        .ok_or_else(|| anyhow!("dataset is empty (missing header)"))?;
    if header != DATASET_HEADER {
        return Err(anyhow!(
            "unexpected dataset header '{}' (expected '{}')",
            header,
            DATASET_HEADER
        ));
    }

    let mut samples = Vec::new();
    for (index, line) in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let row = index + 1;
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        let &[timestamp, label, r, g, b] = fields.as_slice() else {
            return Err(anyhow!(
                "dataset row {}: expected 5 fields, found {}",
                row,
                fields.len()
            ));
        };
        if label.is_empty() {
            return Err(anyhow!("dataset row {}: empty label", row));
        }
        let channel = |name: &str, value: &str| -> Result<u32> {
            value.parse().map_err(|_| {
                anyhow!(
                    "dataset row {}: {} '{}' is not a non-negative integer",
                    row,
                    name,
                    value
                )
            })
        };
        samples.push(LabeledSample {
            timestamp: timestamp.to_string(),
            label: label.to_string(),
            r: channel("R", r)?,
            g: channel("G", g)?,
            b: channel("B", b)?,
        });
    }
    Ok(samples)
}

pub fn read_dataset(path: &Path) -> Result<Vec<LabeledSample>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read dataset {}", path.display()))?;
    parse_csv(&text).with_context(|| format!("invalid dataset {}", path.display()))
}

/// SHA-256 over the `(label, R, G, B)` content of the samples, hex encoded.
///
/// Timestamps are excluded so re-exported copies of the same readings hash alike.
pub fn content_digest(samples: &[LabeledSample]) -> String {
    let mut hasher = Sha256::new();
    for sample in samples {
        hasher.update(sample.label.as_bytes());
        hasher.update([0u8]);
        hasher.update(sample.r.to_le_bytes());
        hasher.update(sample.g.to_le_bytes());
        hasher.update(sample.b.to_le_bytes());
    }
    hex::encode(hasher.finalize())
}
