//! Scripted sources: replay a fixed sequence of lines or commands.
//!
//! Used by tests and dry runs. Each `try_read` yields the next scripted step; an
//! exhausted script behaves like an idle device.

use anyhow::{anyhow, Result};
use std::collections::VecDeque;

use super::{Command, CommandSource, LineSource, SourceStats};

/// One step of a scripted line stream.
#[derive(Clone, Debug)]
enum LineStep {
    Line(String),
    Idle,
    /// A transient read failure with the given message.
    Fail(String),
}

#[derive(Debug, Default)]
pub struct ScriptedLineSource {
    steps: VecDeque<LineStep>,
    stats: SourceStats,
}

impl ScriptedLineSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut source = Self::new();
        for line in lines {
            source = source.line(line);
        }
        source
    }

    pub fn line(mut self, line: impl Into<String>) -> Self {
        self.steps.push_back(LineStep::Line(line.into()));
        self
    }

    pub fn idle(mut self) -> Self {
        self.steps.push_back(LineStep::Idle);
        self
    }

    pub fn fail(mut self, message: impl Into<String>) -> Self {
        self.steps.push_back(LineStep::Fail(message.into()));
        self
    }
}

impl LineSource for ScriptedLineSource {
    fn describe(&self) -> String {
        "scripted".to_string()
    }

    fn stats(&self) -> SourceStats {
        self.stats.clone()
    }

    fn try_read(&mut self) -> Result<Option<String>> {
        match self.steps.pop_front() {
            Some(LineStep::Line(line)) => {
                self.stats.lines_read += 1;
                Ok(Some(line))
            }
            Some(LineStep::Fail(message)) => {
                self.stats.read_errors += 1;
                Err(anyhow!(message))
            }
            Some(LineStep::Idle) | None => Ok(None),
        }
    }
}

#[derive(Debug, Default)]
pub struct ScriptedCommandSource {
    steps: VecDeque<Option<Command>>,
}

impl ScriptedCommandSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(mut self, key: char) -> Self {
        self.steps.push_back(Some(Command::Key(key)));
        self
    }

    pub fn enter(mut self) -> Self {
        self.steps.push_back(Some(Command::Enter));
        self
    }

    pub fn idle(mut self) -> Self {
        self.steps.push_back(None);
        self
    }
}

impl CommandSource for ScriptedCommandSource {
    fn try_read(&mut self) -> Result<Option<Command>> {
        Ok(self.steps.pop_front().flatten())
    }
}
