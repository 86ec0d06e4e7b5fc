//! Platform glue for pollable file descriptors and terminal modes.
//!
//! Linux uses `poll(2)` and termios through `libc`. Other targets compile, but every
//! call reports `Unsupported`.

pub(crate) type Fd = i32;

pub(crate) const STDIN_FD: Fd = 0;

#[cfg(target_os = "linux")]
mod imp {
    use super::Fd;
    use std::io;
    use std::time::Duration;

    pub(crate) fn poll_readable(fd: Fd, timeout: Duration) -> io::Result<bool> {
        let mut pfd = libc::pollfd {
            fd,
            events: libc::POLLIN,
            revents: 0,
        };
        let timeout_ms = timeout.as_millis().min(i32::MAX as u128) as libc::c_int;
        // SAFETY: pfd is a valid pollfd for the duration of the call.
        let rc = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(false);
            }
            return Err(err);
        }
        if rc == 0 {
            return Ok(false);
        }
        if pfd.revents & (libc::POLLERR | libc::POLLNVAL) != 0 {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "descriptor reported POLLERR/POLLNVAL",
            ));
        }
        // POLLHUP with no POLLIN still means the next read returns EOF.
        Ok(pfd.revents & (libc::POLLIN | libc::POLLHUP) != 0)
    }

    /// Read a single byte. `Ok(None)` means end of file.
    pub(crate) fn read_byte(fd: Fd) -> io::Result<Option<u8>> {
        let mut byte = 0u8;
        // SAFETY: reading at most one byte into a live stack slot.
        let rc = unsafe { libc::read(fd, (&mut byte as *mut u8).cast(), 1) };
        match rc {
            0 => Ok(None),
            n if n > 0 => Ok(Some(byte)),
            _ => Err(io::Error::last_os_error()),
        }
    }

    pub(crate) fn is_tty(fd: Fd) -> bool {
        // SAFETY: isatty only inspects the descriptor.
        unsafe { libc::isatty(fd) == 1 }
    }

    pub(crate) fn serial_open_flags() -> i32 {
        libc::O_NOCTTY | libc::O_NONBLOCK
    }

    fn baud_constant(baud_rate: u32) -> io::Result<libc::speed_t> {
        let speed = match baud_rate {
            1200 => libc::B1200,
            2400 => libc::B2400,
            4800 => libc::B4800,
            9600 => libc::B9600,
            19200 => libc::B19200,
            38400 => libc::B38400,
            57600 => libc::B57600,
            115200 => libc::B115200,
            230400 => libc::B230400,
            460800 => libc::B460800,
            921600 => libc::B921600,
            other => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("unsupported baud rate {}", other),
                ))
            }
        };
        Ok(speed)
    }

    /// Put a tty into raw 8N1 mode at the requested speed.
    pub(crate) fn configure_serial(fd: Fd, baud_rate: u32) -> io::Result<()> {
        let speed = baud_constant(baud_rate)?;
        // SAFETY: termios is plain old data; tcgetattr fully initialises it on success.
        let mut tio: libc::termios = unsafe { std::mem::zeroed() };
        if unsafe { libc::tcgetattr(fd, &mut tio) } != 0 {
            return Err(io::Error::last_os_error());
        }
        unsafe {
            libc::cfmakeraw(&mut tio);
        }
        tio.c_cflag |= libc::CLOCAL | libc::CREAD;
        tio.c_cflag &= !(libc::CSTOPB | libc::PARENB);
        tio.c_cc[libc::VMIN] = 0;
        tio.c_cc[libc::VTIME] = 0;
        if unsafe { libc::cfsetispeed(&mut tio, speed) } != 0
            || unsafe { libc::cfsetospeed(&mut tio, speed) } != 0
        {
            return Err(io::Error::last_os_error());
        }
        if unsafe { libc::tcsetattr(fd, libc::TCSANOW, &tio) } != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Saved terminal attributes, restored on drop.
    pub(crate) struct TerminalMode {
        fd: Fd,
        saved: libc::termios,
    }

    impl TerminalMode {
        /// Switch to non-canonical, no-echo input so single keys arrive immediately.
        pub(crate) fn enter_single_key(fd: Fd) -> io::Result<Self> {
            // SAFETY: see configure_serial.
            let mut saved: libc::termios = unsafe { std::mem::zeroed() };
            if unsafe { libc::tcgetattr(fd, &mut saved) } != 0 {
                return Err(io::Error::last_os_error());
            }
            let mut raw = saved;
            raw.c_lflag &= !(libc::ICANON | libc::ECHO);
            raw.c_cc[libc::VMIN] = 1;
            raw.c_cc[libc::VTIME] = 0;
            if unsafe { libc::tcsetattr(fd, libc::TCSANOW, &raw) } != 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(Self { fd, saved })
        }
    }

    impl Drop for TerminalMode {
        fn drop(&mut self) {
            // SAFETY: restoring attributes captured from the same descriptor.
            unsafe {
                libc::tcsetattr(self.fd, libc::TCSANOW, &self.saved);
            }
        }
    }
}

#[cfg(not(target_os = "linux"))]
mod imp {
    use super::Fd;
    use std::io;
    use std::time::Duration;

    fn unsupported() -> io::Error {
        io::Error::new(
            io::ErrorKind::Unsupported,
            "serial and terminal polling require linux",
        )
    }

    pub(crate) fn poll_readable(_fd: Fd, _timeout: Duration) -> io::Result<bool> {
        Err(unsupported())
    }

    pub(crate) fn read_byte(_fd: Fd) -> io::Result<Option<u8>> {
        Err(unsupported())
    }

    pub(crate) fn is_tty(_fd: Fd) -> bool {
        false
    }

    pub(crate) fn serial_open_flags() -> i32 {
        0
    }

    pub(crate) fn configure_serial(_fd: Fd, _baud_rate: u32) -> io::Result<()> {
        Err(unsupported())
    }

    pub(crate) struct TerminalMode;

    impl TerminalMode {
        pub(crate) fn enter_single_key(_fd: Fd) -> io::Result<Self> {
            Err(unsupported())
        }
    }
}

pub(crate) use imp::{
    configure_serial, is_tty, poll_readable, read_byte, serial_open_flags, TerminalMode,
};

