use anyhow::Result;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::Write;
use std::rc::Rc;

use fruit_sense::dataset::read_dataset;
use fruit_sense::ingest::{ScriptedCommandSource, ScriptedLineSource};
use fruit_sense::training::{self, TrainingOptions};
use fruit_sense::{
    CollectionSink, Command, CommandSource, InferenceSink, LabelKeys, RawFrame, SampleLog,
    SessionEvent, SessionLoop, SessionMode, SessionState, ShutdownFlag,
};

/// Operator output captured for assertions.
#[derive(Clone, Default)]
struct Transcript(Rc<RefCell<Vec<u8>>>);

impl Transcript {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }
}

impl Write for Transcript {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Transcript whose first write fails, as a closed terminal would.
struct BrokenOnce {
    transcript: Transcript,
    failed: bool,
}

impl Write for BrokenOnce {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if !self.failed {
            self.failed = true;
            return Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "stdout closed"));
        }
        self.transcript.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Operator who presses the given keys, then hits Ctrl+C.
struct KeysThenInterrupt {
    keys: VecDeque<char>,
    shutdown: ShutdownFlag,
}

impl CommandSource for KeysThenInterrupt {
    fn try_read(&mut self) -> Result<Option<Command>> {
        match self.keys.pop_front() {
            Some(key) => Ok(Some(Command::Key(key))),
            None => {
                self.shutdown.trigger();
                Ok(None)
            }
        }
    }
}

fn collection(path: &std::path::Path) -> SessionMode {
    SessionMode::Collection(CollectionSink::new(LabelKeys::default(), path.to_path_buf()))
}

fn lemon_apple_params() -> fruit_sense::ClassifierParameters {
    let mut log = SampleLog::new();
    for i in 0..25u32 {
        let d = (i * 13) % 37;
        log.record("limon", RawFrame::new(985 + d, 1385 + d, 640 + d / 2));
        log.record("manzana", RawFrame::new(1485 + d, 885 + d, 690 + d / 2));
    }
    training::train(log.samples(), &TrainingOptions::default())
        .unwrap()
        .params
}

#[test]
fn label_key_before_any_frame_records_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("datos.csv");
    let transcript = Transcript::default();
    let mut session = SessionLoop::new(
        ScriptedLineSource::new().idle(),
        ScriptedCommandSource::new().key('l'),
        collection(&path),
    )
    .with_output(Box::new(transcript.clone()));

    assert_eq!(session.step().unwrap(), vec![SessionEvent::NoFrame]);
    assert!(session.cache().is_empty());
    assert!(transcript
        .text()
        .contains("Sin lectura del sensor todavia; nada que registrar."));

    let shutdown = ShutdownFlag::new();
    shutdown.trigger();
    let summary = session.run(&shutdown).unwrap();
    assert_eq!(summary.samples_recorded, 0);
    assert_eq!(summary.saved_to, None);
    assert!(!path.exists());
}

#[test]
fn interrupt_writes_header_and_samples_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("datos.csv");
    let lines = ScriptedLineSource::new()
        .line("TCS34725 listo")
        .line("RAW -> R:1000 G:1400 B:650")
        .line("Lux: 87")
        .line("RAW -> R:1500 G:900 B:700")
        .line("RAW -> R:300 G:350 B:300");
    let commands = ScriptedCommandSource::new()
        .idle()
        .key('l')
        .idle()
        .key('m')
        .key('f');
    let mut session = SessionLoop::new(lines, commands, collection(&path))
        .with_output(Box::new(std::io::sink()));

    for _ in 0..5 {
        session.step().unwrap();
    }
    assert_eq!(session.cache().frames_seen(), 3);

    let shutdown = ShutdownFlag::new();
    shutdown.trigger();
    let summary = session.run(&shutdown).unwrap();
    assert_eq!(session.state(), SessionState::Stopped);
    assert_eq!(summary.samples_recorded, 3);
    assert_eq!(summary.saved_to.as_deref(), Some(path.as_path()));

    let text = std::fs::read_to_string(&path).unwrap();
    let rows: Vec<&str> = text.lines().collect();
    assert_eq!(rows.len(), 4);
    assert_eq!(rows[0], "timestamp,label,R,G,B");

    let samples = read_dataset(&path).unwrap();
    let got: Vec<(&str, RawFrame)> = samples
        .iter()
        .map(|s| (s.label.as_str(), s.frame()))
        .collect();
    assert_eq!(
        got,
        vec![
            ("limon", RawFrame::new(1000, 1400, 650)),
            ("manzana", RawFrame::new(1500, 900, 700)),
            ("fondo", RawFrame::new(300, 350, 300)),
        ]
    );
    assert!(samples.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
}

#[test]
fn latest_frame_wins() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = SessionLoop::new(
        ScriptedLineSource::from_lines(["RAW -> R:1 G:1 B:1", "RAW -> R:2 G:2 B:2"]),
        ScriptedCommandSource::new().idle().key('p'),
        collection(&dir.path().join("datos.csv")),
    )
    .with_output(Box::new(std::io::sink()));

    session.step().unwrap();
    let events = session.step().unwrap();
    match &events[1] {
        SessionEvent::Recorded(sample) => {
            assert_eq!(sample.label, "platano");
            assert_eq!(sample.frame(), RawFrame::new(2, 2, 2));
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[test]
fn enter_classifies_cached_lemon() {
    let transcript = Transcript::default();
    let mut session = SessionLoop::new(
        ScriptedLineSource::from_lines(["RAW -> x x R:1000 G:1400 B:650"]),
        ScriptedCommandSource::new().enter(),
        SessionMode::Inference(InferenceSink::new(lemon_apple_params())),
    )
    .with_output(Box::new(transcript.clone()));

    let events = session.step().unwrap();
    assert_eq!(events[0], SessionEvent::FrameCached(RawFrame::new(1000, 1400, 650)));
    let SessionEvent::Classified(result) = &events[1] else {
        panic!("expected a classification, got {:?}", events);
    };
    assert!(result.accepted);
    assert_eq!(result.accepted_label(), Some("limon"));
    assert!(result.confidence() >= 0.70);

    let text = transcript.text();
    assert!(text.contains("RGB(1000, 1400,  650) -> LIMON"), "{}", text);
    assert!(text.contains("Presiona ENTER"));

    let summary = session.shutdown().unwrap();
    assert_eq!(summary.classifications, 1);
    assert_eq!(summary.saved_to, None);
}

#[test]
fn enter_without_frame_is_a_no_op_in_inference() {
    let transcript = Transcript::default();
    let mut session = SessionLoop::new(
        ScriptedLineSource::new(),
        ScriptedCommandSource::new().key('l').enter(),
        SessionMode::Inference(InferenceSink::new(lemon_apple_params())),
    )
    .with_output(Box::new(transcript.clone()));

    let events = session.step().unwrap();
    assert!(matches!(events.as_slice(), [SessionEvent::Ignored(_)]));
    assert_eq!(session.step().unwrap(), vec![SessionEvent::NoFrame]);
    assert_eq!(session.state(), SessionState::AwaitingInput);

    let text = transcript.text();
    assert!(text.contains("nada que clasificar"), "{}", text);
    assert!(!text.contains("registrar"), "{}", text);
}

#[test]
fn run_survives_failed_iteration_and_flushes_on_interrupt() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("datos.csv");
    let shutdown = ShutdownFlag::new();
    let transcript = Transcript::default();
    let lines = ScriptedLineSource::new()
        .line("RAW -> R:1000 G:1400 B:650")
        .fail("read timed out")
        .line("RAW -> R:1500 G:900 B:700")
        .line("RAW -> R:300 G:350 B:300");
    let commands = KeysThenInterrupt {
        keys: VecDeque::from(vec!['l', 'x', 'm', 'f']),
        shutdown: shutdown.clone(),
    };
    let output = BrokenOnce {
        transcript: transcript.clone(),
        failed: false,
    };
    let mut session =
        SessionLoop::new(lines, commands, collection(&path)).with_output(Box::new(output));

    let summary = session.run(&shutdown).unwrap();
    assert!(shutdown.is_triggered());
    assert_eq!(session.state(), SessionState::Stopped);
    assert_eq!(summary.samples_recorded, 3);
    assert_eq!(summary.source_errors, 1);
    assert_eq!(summary.sensor.lines_read, 3);
    assert_eq!(summary.sensor.read_errors, 1);
    assert_eq!(summary.saved_to.as_deref(), Some(path.as_path()));

    let text = transcript.text();
    assert!(text.contains("Error: stdout closed"), "{}", text);
    assert!(text.contains("Finalizando sesion"), "{}", text);

    let labels: Vec<String> = read_dataset(&path)
        .unwrap()
        .into_iter()
        .map(|s| s.label)
        .collect();
    assert_eq!(labels, ["limon", "manzana", "fondo"]);
}

#[test]
fn banner_lists_label_keys() {
    let dir = tempfile::tempdir().unwrap();
    let transcript = Transcript::default();
    let mut session = SessionLoop::new(
        ScriptedLineSource::new(),
        ScriptedCommandSource::new(),
        collection(&dir.path().join("datos.csv")),
    )
    .with_output(Box::new(transcript.clone()));

    session.print_banner().unwrap();
    let text = transcript.text();
    assert!(text.contains("[l] -> limon"));
    assert!(text.contains("[f] -> fondo"));
    assert!(text.contains("Ctrl+C"));
}
