//! Sensor frame layer.
//!
//! - `RawFrame`: one RGB reflectance reading from the color sensor.
//! - `parse_frame_line`: pure line -> frame extraction. Diagnostic chatter from the
//!   microcontroller is expected and yields `None`, never an error.
//! - `FrameCache`: the last valid frame observed. Newest wins, no history.

/// Leading token of every sensor line that carries a reading.
pub const FRAME_SENTINEL: &str = "RAW ->";

/// Field positions after the sentinel where the `R:` channel may start.
const CHANNEL_OFFSETS: [usize; 2] = [0, 2];

// ----------------------------------------------------------------------------
// RawFrame
// ----------------------------------------------------------------------------

/// One RGB reading as reported by the sensor firmware.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RawFrame {
    pub r: u32,
    pub g: u32,
    pub b: u32,
}

impl RawFrame {
    pub fn new(r: u32, g: u32, b: u32) -> Self {
        Self { r, g, b }
    }

    /// Channels as model input, in fixed R, G, B order.
    pub fn channels(&self) -> [f64; 3] {
        [self.r as f64, self.g as f64, self.b as f64]
    }
}

// ----------------------------------------------------------------------------
// FrameParser
// ----------------------------------------------------------------------------

/// Extract a frame from one sensor line.
///
/// The line must start with [`FRAME_SENTINEL`] and carry `R:<int> G:<int> B:<int>`
/// as consecutive whitespace-separated fields, in that order. The channels either
/// follow the sentinel directly or come after exactly two padding fields
/// (`RAW -> x x R:.. G:.. B:..`). Anything else returns `None`.
pub fn parse_frame_line(line: &str) -> Option<RawFrame> {
    let rest = line.trim().strip_prefix(FRAME_SENTINEL)?;
    let fields: Vec<&str> = rest.split_whitespace().collect();
    let start = CHANNEL_OFFSETS
        .into_iter()
        .find(|offset| fields.get(*offset).and_then(|f| channel_key(f)) == Some("R"))?;
    let channels = fields.get(start..start + 3)?;

    let r = channel_value(channels[0], "R")?;
    let g = channel_value(channels[1], "G")?;
    let b = channel_value(channels[2], "B")?;
    Some(RawFrame { r, g, b })
}

fn channel_key(field: &str) -> Option<&str> {
    field.split_once(':').map(|(key, _)| key)
}

fn channel_value(field: &str, expected_key: &str) -> Option<u32> {
    let (key, value) = field.split_once(':')?;
    if key != expected_key {
        return None;
    }
    value.parse().ok()
}

// ----------------------------------------------------------------------------
// FrameCache
// ----------------------------------------------------------------------------

/// Single-slot holder for the most recent valid frame.
#[derive(Debug, Default)]
pub struct FrameCache {
    latest: Option<RawFrame>,
    frames_seen: u64,
}

impl FrameCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored frame. No merging or averaging.
    pub fn update(&mut self, frame: RawFrame) {
        self.latest = Some(frame);
        self.frames_seen += 1;
    }

    /// Current frame, left in place for the next command.
    pub fn peek(&self) -> Option<RawFrame> {
        self.latest
    }

    pub fn is_empty(&self) -> bool {
        self.latest.is_none()
    }

    /// Number of valid frames observed since the session started.
    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }
}
