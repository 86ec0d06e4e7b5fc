/// Longest partial line kept while waiting for a newline.
const MAX_PARTIAL_LINE: usize = 4096;

/// Accumulates raw bytes and splits them into trimmed text lines.
///
/// Invalid UTF-8 is replaced rather than rejected; serial links drop and flip bytes
/// and the parser will discard whatever line that damages.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buffer: Vec<u8>,
    discarded: u64,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
        if self.buffer.len() > MAX_PARTIAL_LINE && !self.buffer.contains(&b'\n') {
            self.buffer.clear();
            self.discarded += 1;
        }
    }

    /// Pop the next complete line. Blank lines are skipped.
    pub fn next_line(&mut self) -> Option<String> {
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw).trim().to_string();
            if !line.is_empty() {
                return Some(line);
            }
        }
        None
    }

    /// Number of oversized partial lines dropped.
    pub fn discarded(&self) -> u64 {
        self.discarded
    }
}
