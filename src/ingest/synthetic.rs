//! Synthetic color sensor (`stub://<fruit>`) for running sessions without hardware.

use anyhow::{anyhow, Result};
use rand::Rng;
use std::time::{Duration, Instant};

use super::{LineSource, SourceStats};

/// Interval between synthetic readings, close to the firmware's default.
const EMIT_INTERVAL: Duration = Duration::from_millis(200);

/// Every Nth line is firmware diagnostics instead of a reading.
const DIAGNOSTIC_EVERY: u64 = 5;

/// Per-channel jitter applied around the base reading.
const JITTER: i64 = 40;

fn base_reading(name: &str) -> Option<[u32; 3]> {
    match name {
        "limon" => Some([1000, 1400, 650]),
        "manzana" => Some([1500, 900, 700]),
        "platano" => Some([1300, 1250, 500]),
        "fondo" => Some([300, 350, 300]),
        _ => None,
    }
}

pub struct SyntheticSensor {
    name: String,
    base: [u32; 3],
    poll_timeout: Duration,
    last_emit: Option<Instant>,
    lines_emitted: u64,
}

impl SyntheticSensor {
    pub fn new(name: &str, poll_timeout: Duration) -> Result<Self> {
        let base = base_reading(name).ok_or_else(|| {
            anyhow!(
                "unknown synthetic sensor 'stub://{}'; expected limon, manzana, platano or fondo",
                name
            )
        })?;
        log::info!("SyntheticSensor: emitting {} readings", name);
        Ok(Self {
            name: name.to_string(),
            base,
            poll_timeout,
            last_emit: None,
            lines_emitted: 0,
        })
    }

    fn next_line(&mut self) -> String {
        self.lines_emitted += 1;
        let mut rng = rand::thread_rng();
        if self.lines_emitted % DIAGNOSTIC_EVERY == 0 {
            return format!("Lux: {}", rng.gen_range(80..120));
        }
        let [r, g, b] = self.base.map(|channel| {
            let jitter = rng.gen_range(-JITTER..=JITTER);
            (channel as i64 + jitter).max(0) as u32
        });
        format!("RAW -> R:{} G:{} B:{}", r, g, b)
    }
}

impl LineSource for SyntheticSensor {
    fn describe(&self) -> String {
        format!("stub://{}", self.name)
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            lines_read: self.lines_emitted,
            ..SourceStats::default()
        }
    }

    fn try_read(&mut self) -> Result<Option<String>> {
        if let Some(last) = self.last_emit {
            let elapsed = last.elapsed();
            if elapsed < EMIT_INTERVAL {
                let wait = (EMIT_INTERVAL - elapsed).min(self.poll_timeout);
                std::thread::sleep(wait);
                if last.elapsed() < EMIT_INTERVAL {
                    return Ok(None);
                }
            }
        }
        self.last_emit = Some(Instant::now());
        Ok(Some(self.next_line()))
    }
}
