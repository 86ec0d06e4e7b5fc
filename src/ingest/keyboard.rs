//! Terminal keyboard command source.
//!
//! Reads stdin one byte per poll so that a burst of keys is never coalesced into a
//! single command. Bytes are read straight from the descriptor; going through the
//! std `Stdin` buffer would hide pending input from `poll(2)`.

use anyhow::Result;
use std::time::Duration;

use super::sys::{self, STDIN_FD};
use super::{Command, CommandSource};

/// Keyboard polls stay short so the sensor is serviced promptly.
pub const COMMAND_POLL_TIMEOUT: Duration = Duration::from_millis(10);

/// How the operator triggers a command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TriggerMode {
    /// Each key press is delivered immediately (collection labels).
    SingleKey,
    /// Input is line-buffered by the terminal; Enter arrives as `Command::Enter`.
    Line,
}

pub struct KeyboardCommandSource {
    poll_timeout: Duration,
    closed: bool,
    _terminal: Option<sys::TerminalMode>,
}

impl KeyboardCommandSource {
    pub fn new(mode: TriggerMode, poll_timeout: Duration) -> Self {
        let terminal = match mode {
            TriggerMode::SingleKey if sys::is_tty(STDIN_FD) => {
                match sys::TerminalMode::enter_single_key(STDIN_FD) {
                    Ok(guard) => Some(guard),
                    Err(err) => {
                        log::warn!("could not switch terminal to single-key input: {}", err);
                        None
                    }
                }
            }
            _ => None,
        };
        Self {
            poll_timeout,
            closed: false,
            _terminal: terminal,
        }
    }
}

impl CommandSource for KeyboardCommandSource {
    fn try_read(&mut self) -> Result<Option<Command>> {
        if self.closed {
            return Ok(None);
        }
        if !sys::poll_readable(STDIN_FD, self.poll_timeout)? {
            return Ok(None);
        }
        match sys::read_byte(STDIN_FD)? {
            Some(byte) => Ok(decode_key(byte)),
            None => {
                log::warn!("stdin closed; keyboard commands disabled");
                self.closed = true;
                Ok(None)
            }
        }
    }
}

/// Map one input byte to a command. Control bytes other than newline are ignored.
pub(crate) fn decode_key(byte: u8) -> Option<Command> {
    match byte {
        b'\n' | b'\r' => Some(Command::Enter),
        b if b.is_ascii_graphic() || b == b' ' => {
            Some(Command::Key((b as char).to_ascii_lowercase()))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newline_and_carriage_return_are_enter() {
        assert_eq!(decode_key(b'\n'), Some(Command::Enter));
        assert_eq!(decode_key(b'\r'), Some(Command::Enter));
    }

    #[test]
    fn letters_are_lowercased() {
        assert_eq!(decode_key(b'L'), Some(Command::Key('l')));
        assert_eq!(decode_key(b'p'), Some(Command::Key('p')));
    }

    #[test]
    fn control_and_non_ascii_bytes_are_ignored() {
        assert_eq!(decode_key(0x1b), None);
        assert_eq!(decode_key(0x7f), None);
        assert_eq!(decode_key(0xc3), None);
    }
}
