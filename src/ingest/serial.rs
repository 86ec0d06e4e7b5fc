//! Serial color-sensor source.
//!
//! `SerialLineSource` reads newline-terminated text from a tty (or any readable
//! character device / FIFO) without blocking the session loop:
//! - the device is opened non-blocking and configured raw 8N1 at the configured baud
//! - each `try_read` waits at most `poll_timeout` for bytes
//! - read failures drop the handle; reconnects are attempted at most once per
//!   `reconnect_delay`

use anyhow::{anyhow, Context, Result};
use std::fs::File;
use std::time::{Duration, Instant};

use super::lines::LineBuffer;
use super::sys;
use super::{LineSource, SourceStats};

pub const DEFAULT_SERIAL_PORT: &str = "/dev/ttyUSB0";
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Configuration for a serial sensor source.
#[derive(Clone, Debug)]
pub struct SerialConfig {
    /// Device path (e.g., "/dev/ttyUSB0") or a `stub://` synthetic sensor.
    pub path: String,
    pub baud_rate: u32,
    /// Longest a single `try_read` may wait for bytes.
    pub poll_timeout: Duration,
    /// Minimum delay between reconnect attempts after the device drops.
    pub reconnect_delay: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            path: DEFAULT_SERIAL_PORT.to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            poll_timeout: Duration::from_millis(100),
            reconnect_delay: Duration::from_secs(2),
        }
    }
}

pub struct SerialLineSource {
    config: SerialConfig,
    device: Option<File>,
    buffer: LineBuffer,
    last_connect_attempt: Option<Instant>,
    stats: SourceStats,
}

impl SerialLineSource {
    pub fn new(config: SerialConfig) -> Self {
        Self {
            config,
            device: None,
            buffer: LineBuffer::new(),
            last_connect_attempt: None,
            stats: SourceStats::default(),
        }
    }

    /// Open and configure the device.
    pub fn connect(&mut self) -> Result<()> {
        self.last_connect_attempt = Some(Instant::now());
        let file = open_device(&self.config)?;
        log::info!(
            "SerialLineSource: connected to {} at {} baud",
            self.config.path,
            self.config.baud_rate
        );
        self.device = Some(file);
        Ok(())
    }

    fn reconnect_if_due(&mut self) -> Result<bool> {
        let due = self
            .last_connect_attempt
            .map_or(true, |at| at.elapsed() >= self.config.reconnect_delay);
        if !due {
            std::thread::sleep(self.config.poll_timeout);
            return Ok(false);
        }
        self.connect()?;
        self.stats.reconnects += 1;
        Ok(true)
    }

    fn drop_device(&mut self) {
        self.device = None;
        self.stats.read_errors += 1;
    }
}

impl LineSource for SerialLineSource {
    fn describe(&self) -> String {
        format!("serial:{}", self.config.path)
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            discarded_partials: self.buffer.discarded(),
            ..self.stats.clone()
        }
    }

    fn try_read(&mut self) -> Result<Option<String>> {
        if let Some(line) = self.buffer.next_line() {
            self.stats.lines_read += 1;
            return Ok(Some(line));
        }
        if self.device.is_none() && !self.reconnect_if_due()? {
            return Ok(None);
        }

        match read_available(self.device.as_mut(), self.config.poll_timeout) {
            Ok(Some(bytes)) => self.buffer.extend(&bytes),
            Ok(None) => {}
            Err(err) => {
                self.drop_device();
                return Err(err.context(format!("serial read from {}", self.config.path)));
            }
        }

        let line = self.buffer.next_line();
        if line.is_some() {
            self.stats.lines_read += 1;
        }
        Ok(line)
    }
}

#[cfg(target_os = "linux")]
fn open_device(config: &SerialConfig) -> Result<File> {
    use std::os::unix::fs::OpenOptionsExt;
    use std::os::unix::io::AsRawFd;

    let file = std::fs::OpenOptions::new()
        .read(true)
        .custom_flags(sys::serial_open_flags())
        .open(&config.path)
        .with_context(|| format!("failed to open serial device {}", config.path))?;
    if sys::is_tty(file.as_raw_fd()) {
        sys::configure_serial(file.as_raw_fd(), config.baud_rate)
            .with_context(|| format!("failed to configure serial device {}", config.path))?;
    } else {
        log::debug!(
            "{} is not a tty; reading without line discipline changes",
            config.path
        );
    }
    Ok(file)
}

#[cfg(not(target_os = "linux"))]
fn open_device(config: &SerialConfig) -> Result<File> {
    Err(anyhow!(
        "serial ingestion of {} requires linux (use a stub:// sensor instead)",
        config.path
    ))
}

/// Wait for the device to become readable and drain what is there.
#[cfg(target_os = "linux")]
fn read_available(device: Option<&mut File>, timeout: Duration) -> Result<Option<Vec<u8>>> {
    use std::io::{ErrorKind, Read};
    use std::os::unix::io::AsRawFd;

    let device = device.ok_or_else(|| anyhow!("serial device not connected"))?;
    if !sys::poll_readable(device.as_raw_fd(), timeout)? {
        return Ok(None);
    }
    let mut chunk = [0u8; 1024];
    match device.read(&mut chunk) {
        Ok(0) => Err(anyhow!("serial device closed (EOF)")),
        Ok(n) => Ok(Some(chunk[..n].to_vec())),
        Err(err) if err.kind() == ErrorKind::WouldBlock => Ok(None),
        Err(err) if err.kind() == ErrorKind::Interrupted => Ok(None),
        Err(err) => Err(err.into()),
    }
}

#[cfg(not(target_os = "linux"))]
fn read_available(_device: Option<&mut File>, _timeout: Duration) -> Result<Option<Vec<u8>>> {
    Err(anyhow!("serial ingestion requires linux"))
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;
    use std::io::Write;

    fn config_for(path: &std::path::Path) -> SerialConfig {
        SerialConfig {
            path: path.display().to_string(),
            poll_timeout: Duration::from_millis(10),
            reconnect_delay: Duration::from_millis(10),
            ..SerialConfig::default()
        }
    }

    #[test]
    fn reads_lines_from_plain_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"TCS34725 found\nRAW -> R:10 G:20 B:30\n")
            .unwrap();
        let mut source = SerialLineSource::new(config_for(file.path()));
        source.connect().unwrap();

        assert_eq!(source.try_read().unwrap().as_deref(), Some("TCS34725 found"));
        assert_eq!(
            source.try_read().unwrap().as_deref(),
            Some("RAW -> R:10 G:20 B:30")
        );
        assert_eq!(source.stats().lines_read, 2);
    }

    #[test]
    fn eof_is_reported_as_read_error() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut source = SerialLineSource::new(config_for(file.path()));
        source.connect().unwrap();

        assert!(source.try_read().is_err());
        assert_eq!(source.stats().read_errors, 1);
    }

    #[test]
    fn reopens_device_after_reconnect_delay() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"RAW -> R:1 G:2 B:3\n").unwrap();
        let mut source = SerialLineSource::new(config_for(file.path()));
        source.connect().unwrap();

        assert_eq!(source.try_read().unwrap().as_deref(), Some("RAW -> R:1 G:2 B:3"));
        assert!(source.try_read().is_err());
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(source.try_read().unwrap().as_deref(), Some("RAW -> R:1 G:2 B:3"));

        let stats = source.stats();
        assert_eq!(stats.lines_read, 2);
        assert_eq!(stats.read_errors, 1);
        assert_eq!(stats.reconnects, 1);
        assert_eq!(stats.discarded_partials, 0);
    }

    #[test]
    fn missing_device_fails_to_connect() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = SerialLineSource::new(config_for(&dir.path().join("ttyNOPE")));
        let err = source.connect().unwrap_err();
        assert!(format!("{:#}", err).contains("failed to open serial device"));
    }
}
