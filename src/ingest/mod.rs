//! Input sources for the session loop.
//!
//! This module provides the two pollable inputs a session multiplexes:
//! - `LineSource`: newline-delimited text from the color sensor (serial device,
//!   synthetic `stub://` sensor, scripted lines for tests)
//! - `CommandSource`: operator keypresses (terminal stdin, scripted commands)
//!
//! Every `try_read` is bounded by a short timeout and never blocks indefinitely,
//! so one loop iteration can poll both sources without starving either.
//!
//! Sources MUST NOT:
//! - Spawn threads or background readers
//! - Interpret sensor lines (parsing belongs to `frame`)

pub mod keyboard;
mod lines;
pub mod scripted;
pub mod serial;
mod sys;
pub mod synthetic;

use anyhow::Result;
use std::time::Duration;

pub use keyboard::{KeyboardCommandSource, TriggerMode, COMMAND_POLL_TIMEOUT};
pub use lines::LineBuffer;
pub use scripted::{ScriptedCommandSource, ScriptedLineSource};
pub use serial::{SerialConfig, SerialLineSource};
pub use synthetic::SyntheticSensor;

/// Operator command produced by a `CommandSource`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    /// A printable key, lower-cased.
    Key(char),
    /// Enter / newline.
    Enter,
}

/// Counters a line source keeps about its input, reported when a session ends.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceStats {
    pub lines_read: u64,
    pub read_errors: u64,
    pub reconnects: u64,
    /// Oversized partial lines dropped before a newline arrived.
    pub discarded_partials: u64,
}

/// Pollable source of sensor text lines.
pub trait LineSource {
    /// Human-readable origin (device path, stub name).
    fn describe(&self) -> String;

    fn stats(&self) -> SourceStats {
        SourceStats::default()
    }

    /// Return one complete line if available within the poll timeout.
    ///
    /// Errors are transient from the caller's point of view: the session logs them
    /// and polls again on the next iteration.
    fn try_read(&mut self) -> Result<Option<String>>;
}

/// Pollable source of operator commands. Yields at most one command per call.
pub trait CommandSource {
    fn try_read(&mut self) -> Result<Option<Command>>;
}

impl<T: LineSource + ?Sized> LineSource for Box<T> {
    fn describe(&self) -> String {
        (**self).describe()
    }

    fn stats(&self) -> SourceStats {
        (**self).stats()
    }

    fn try_read(&mut self) -> Result<Option<String>> {
        (**self).try_read()
    }
}

impl<T: CommandSource + ?Sized> CommandSource for Box<T> {
    fn try_read(&mut self) -> Result<Option<Command>> {
        (**self).try_read()
    }
}

/// Open the sensor line source for a device path.
///
/// `stub://<fruit>` paths select the synthetic sensor; anything else is opened as a
/// serial device.
pub fn open_line_source(config: SerialConfig) -> Result<Box<dyn LineSource>> {
    if let Some(name) = config.path.strip_prefix("stub://") {
        let sensor = SyntheticSensor::new(name, config.poll_timeout)?;
        return Ok(Box::new(sensor));
    }
    let mut source = SerialLineSource::new(config);
    source.connect()?;
    Ok(Box::new(source))
}

/// Upper bound on any single poll performed by a source.
pub const MAX_POLL_TIMEOUT: Duration = Duration::from_millis(999);
