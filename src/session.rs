//! Session loop: the single-threaded poll/dispatch cycle shared by collection and
//! live classification.
//!
//! Each iteration polls the sensor once, then the keyboard once. Valid sensor
//! frames overwrite the `FrameCache`; a trigger command reads the cache and hands
//! the frame to the mode's sink. A termination request moves the session to
//! `ShuttingDown`, where collected samples are flushed before `Stopped`.
//!
//! The interrupt handler only raises a flag. The flush runs on the loop's own stack,
//! so a second interrupt cannot cut it short.

use anyhow::{anyhow, Result};
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::classify::{ClassificationResult, ClassifierParameters, ConfidenceGate};
use crate::config::LabelKeys;
use crate::dataset::{write_dataset, LabeledSample, SampleLog};
use crate::frame::{parse_frame_line, FrameCache, RawFrame};
use crate::ingest::{Command, CommandSource, LineSource, SourceStats, TriggerMode};
use crate::report;

// ----------------------------------------------------------------------------
// Shutdown signal
// ----------------------------------------------------------------------------

/// Cancellation flag raised by the interrupt handler (or directly, in tests).
#[derive(Clone, Debug, Default)]
pub struct ShutdownFlag {
    raised: Arc<AtomicBool>,
}

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route Ctrl-C to this flag. Only the first interrupt is acted on.
    pub fn install_ctrlc(&self) -> Result<()> {
        let raised = self.raised.clone();
        ctrlc::set_handler(move || {
            if !raised.swap(true, Ordering::SeqCst) {
                log::info!("interrupt received, shutting down");
            }
        })
        .map_err(|e| anyhow!("failed to install Ctrl-C handler: {}", e))
    }

    pub fn trigger(&self) {
        self.raised.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }
}

// ----------------------------------------------------------------------------
// Modes
// ----------------------------------------------------------------------------

/// Collection: label keys append samples, flushed to the dataset at shutdown.
pub struct CollectionSink {
    keys: LabelKeys,
    log: SampleLog,
    dataset_path: PathBuf,
    flushed: bool,
}

impl CollectionSink {
    pub fn new(keys: LabelKeys, dataset_path: PathBuf) -> Self {
        Self {
            keys,
            log: SampleLog::new(),
            dataset_path,
            flushed: false,
        }
    }

    pub fn samples(&self) -> &[LabeledSample] {
        self.log.samples()
    }

    /// Write every accumulated sample. Runs at most once per session.
    fn flush(&mut self) -> Result<Option<PathBuf>> {
        if self.flushed {
            return Ok(None);
        }
        if self.log.is_empty() {
            self.flushed = true;
            log::warn!("no samples recorded; {} left untouched", self.dataset_path.display());
            return Ok(None);
        }
        write_dataset(&self.dataset_path, self.log.samples())?;
        self.flushed = true;
        log::info!(
            "saved {} samples to {}",
            self.log.len(),
            self.dataset_path.display()
        );
        Ok(Some(self.dataset_path.clone()))
    }
}

/// Inference: Enter runs scaler -> model -> gate on the cached frame.
pub struct InferenceSink {
    params: ClassifierParameters,
    gate: ConfidenceGate,
}

impl InferenceSink {
    pub fn new(params: ClassifierParameters) -> Self {
        Self {
            params,
            gate: ConfidenceGate::new(),
        }
    }
}

pub enum SessionMode {
    Collection(CollectionSink),
    Inference(InferenceSink),
}

impl SessionMode {
    pub fn trigger_mode(&self) -> TriggerMode {
        match self {
            SessionMode::Collection(_) => TriggerMode::SingleKey,
            SessionMode::Inference(_) => TriggerMode::Line,
        }
    }
}

// ----------------------------------------------------------------------------
// Loop
// ----------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    AwaitingInput,
    Dispatching,
    ShuttingDown,
    Stopped,
}

/// What one iteration observed.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    FrameCached(RawFrame),
    SourceError(String),
    Recorded(LabeledSample),
    Classified(ClassificationResult),
    /// A trigger arrived before any valid frame.
    NoFrame,
    /// A command that means nothing in this mode.
    Ignored(Command),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub frames_seen: u64,
    pub samples_recorded: usize,
    pub classifications: u64,
    pub source_errors: u64,
    /// Counters reported by the sensor source itself.
    pub sensor: SourceStats,
    pub saved_to: Option<PathBuf>,
}

pub struct SessionLoop<L: LineSource, C: CommandSource> {
    lines: L,
    commands: C,
    cache: FrameCache,
    mode: SessionMode,
    state: SessionState,
    out: Box<dyn Write>,
    classifications: u64,
    source_errors: u64,
}

impl<L: LineSource, C: CommandSource> SessionLoop<L, C> {
    pub fn new(lines: L, commands: C, mode: SessionMode) -> Self {
        Self {
            lines,
            commands,
            cache: FrameCache::new(),
            mode,
            state: SessionState::AwaitingInput,
            out: Box::new(std::io::stdout()),
            classifications: 0,
            source_errors: 0,
        }
    }

    /// Send operator output somewhere other than stdout.
    pub fn with_output(mut self, out: Box<dyn Write>) -> Self {
        self.out = out;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn cache(&self) -> &FrameCache {
        &self.cache
    }

    pub fn mode(&self) -> &SessionMode {
        &self.mode
    }

    /// Print the operator instructions for the current mode.
    pub fn print_banner(&mut self) -> Result<()> {
        writeln!(self.out, "Conectado a {}", self.lines.describe())?;
        match &self.mode {
            SessionMode::Collection(sink) => {
                writeln!(self.out, "Presiona:")?;
                for entry in sink.keys.entries() {
                    writeln!(self.out, "  [{}] -> {}", entry.key, entry.label)?;
                }
            }
            SessionMode::Inference(sink) => {
                writeln!(
                    self.out,
                    "Clases: {} | umbral de confianza {:.0}%",
                    sink.params.labels().join(", "),
                    sink.gate.threshold() * 100.0
                )?;
                writeln!(self.out, "Presiona ENTER para clasificar la fruta actual")?;
            }
        }
        writeln!(self.out, "Ctrl+C para terminar.\n")?;
        Ok(())
    }

    /// Run until the shutdown flag is raised, then flush and stop.
    ///
    /// Errors inside an iteration are logged and the loop carries on.
    pub fn run(&mut self, shutdown: &ShutdownFlag) -> Result<SessionSummary> {
        while !shutdown.is_triggered()
            && matches!(
                self.state,
                SessionState::AwaitingInput | SessionState::Dispatching
            )
        {
            if let Err(err) = self.step() {
                if self.state == SessionState::Dispatching {
                    self.state = SessionState::AwaitingInput;
                }
                log::warn!("session iteration failed: {:#}", err);
                let _ = writeln!(self.out, "Error: {:#}", err);
            }
        }
        self.shutdown()
    }

    /// One poll of each source, sensor first.
    pub fn step(&mut self) -> Result<Vec<SessionEvent>> {
        if matches!(self.state, SessionState::ShuttingDown | SessionState::Stopped) {
            return Err(anyhow!("session is no longer accepting input"));
        }
        let mut events = Vec::new();

        match self.lines.try_read() {
            Ok(Some(line)) => match parse_frame_line(&line) {
                Some(frame) => {
                    self.cache.update(frame);
                    events.push(SessionEvent::FrameCached(frame));
                }
                None => log::trace!("skipping sensor line: {}", line),
            },
            Ok(None) => {}
            Err(err) => {
                self.source_errors += 1;
                log::warn!("sensor read failed: {:#}", err);
                events.push(SessionEvent::SourceError(format!("{:#}", err)));
            }
        }

        match self.commands.try_read() {
            Ok(Some(command)) => events.push(self.dispatch(command)?),
            Ok(None) => {}
            Err(err) => log::warn!("command read failed: {:#}", err),
        }
        Ok(events)
    }

    fn dispatch(&mut self, command: Command) -> Result<SessionEvent> {
        let is_trigger = match (&self.mode, command) {
            (SessionMode::Collection(sink), Command::Key(key)) => sink.keys.label_for(key).is_some(),
            (SessionMode::Inference(_), Command::Enter) => true,
            _ => false,
        };
        if !is_trigger {
            return Ok(SessionEvent::Ignored(command));
        }
        let Some(frame) = self.cache.peek() else {
            log::warn!("no sensor reading yet; command ignored");
            let nothing_to_do = match self.mode {
                SessionMode::Collection(_) => "nada que registrar",
                SessionMode::Inference(_) => "nada que clasificar",
            };
            writeln!(self.out, "Sin lectura del sensor todavia; {}.", nothing_to_do)?;
            return Ok(SessionEvent::NoFrame);
        };

        self.state = SessionState::Dispatching;
        let event = match (&mut self.mode, command) {
            (SessionMode::Collection(sink), Command::Key(key)) => {
                let label = sink
                    .keys
                    .label_for(key)
                    .ok_or_else(|| anyhow!("key '{}' lost its label binding", key))?
                    .to_string();
                let sample = sink.log.record(&label, frame).clone();
                writeln!(self.out, "{}", report::sample_recorded(&sample))?;
                SessionEvent::Recorded(sample)
            }
            (SessionMode::Inference(sink), _) => {
                let result = sink.params.evaluate(frame, &sink.gate)?;
                let clock = chrono::Local::now().format("%H:%M:%S").to_string();
                write!(self.out, "\n{}", report::classification_report(&clock, frame, &result))?;
                writeln!(self.out, "\nPresiona ENTER para clasificar otra vez...")?;
                self.classifications += 1;
                SessionEvent::Classified(result)
            }
            (SessionMode::Collection(_), Command::Enter) => SessionEvent::Ignored(command),
        };
        self.state = SessionState::AwaitingInput;
        Ok(event)
    }

    /// Flush (collection mode) and stop. Safe to call more than once.
    pub fn shutdown(&mut self) -> Result<SessionSummary> {
        if self.state != SessionState::Stopped {
            self.state = SessionState::ShuttingDown;
            let _ = writeln!(self.out, "\nFinalizando sesion...");
        }
        let saved_to = match &mut self.mode {
            SessionMode::Collection(sink) => sink.flush()?,
            SessionMode::Inference(_) => None,
        };
        self.state = SessionState::Stopped;
        let _ = self.out.flush();
        Ok(self.summary(saved_to))
    }

    fn summary(&self, saved_to: Option<PathBuf>) -> SessionSummary {
        SessionSummary {
            frames_seen: self.cache.frames_seen(),
            samples_recorded: match &self.mode {
                SessionMode::Collection(sink) => sink.samples().len(),
                SessionMode::Inference(_) => 0,
            },
            classifications: self.classifications,
            source_errors: self.source_errors,
            sensor: self.lines.stats(),
            saved_to,
        }
    }
}

impl<L: LineSource, C: CommandSource> Drop for SessionLoop<L, C> {
    fn drop(&mut self) {
        if let SessionMode::Collection(sink) = &mut self.mode {
            if let Err(err) = sink.flush() {
                log::error!("failed to save samples on exit: {:#}", err);
            }
        }
    }
}
