//! Render surface: exclusive control of the terminal.
//!
//! [`Terminal::open`] switches the tty to non-canonical, no-echo mode so
//! keys arrive one by one, and clears the screen. [`Terminal::close`] puts
//! the saved mode back. Closing is idempotent and harmless when the terminal
//! was never opened; the scheduler closes it when it is dropped.

use libc::{ECHO, ICANON, TCSANOW, VMIN, VTIME, tcgetattr, tcsetattr, termios};
use log::debug;
use std::cell::RefCell;
use std::io::{self, Write};
use std::mem::MaybeUninit;
use std::os::fd::RawFd;
use std::rc::Rc;

struct TerminalState {
    fd: RawFd,
    saved: Option<termios>,
}

/// Shared handle to the scheduler's terminal.
#[derive(Clone)]
pub struct Terminal {
    state: Rc<RefCell<TerminalState>>,
}

impl Terminal {
    pub(crate) fn new(fd: RawFd) -> Self {
        Self {
            state: Rc::new(RefCell::new(TerminalState { fd, saved: None })),
        }
    }

    /// Acquires the terminal. Opening an open terminal does nothing.
    pub fn open(&self) -> io::Result<()> {
        let mut state = self.state.borrow_mut();
        if state.saved.is_some() {
            return Ok(());
        }

        let mut original = MaybeUninit::<termios>::uninit();
        if unsafe { tcgetattr(state.fd, original.as_mut_ptr()) } < 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: tcgetattr succeeded and filled the struct.
        let original = unsafe { original.assume_init() };

        let mut raw = original;
        raw.c_lflag &= !(ICANON | ECHO);
        raw.c_cc[VMIN] = 1;
        raw.c_cc[VTIME] = 0;

        if unsafe { tcsetattr(state.fd, TCSANOW, &raw) } < 0 {
            return Err(io::Error::last_os_error());
        }

        state.saved = Some(original);
        drop(state);

        debug!("terminal opened");
        self.clear()
    }

    /// Restores the terminal mode saved by [`Self::open`].
    pub fn close(&self) -> io::Result<()> {
        let Some(original) = self.state.borrow_mut().saved.take() else {
            return Ok(());
        };

        let fd = self.state.borrow().fd;
        if unsafe { tcsetattr(fd, TCSANOW, &original) } < 0 {
            return Err(io::Error::last_os_error());
        }

        debug!("terminal closed");
        let mut out = io::stdout().lock();
        out.write_all(b"\n")?;
        out.flush()
    }

    pub fn is_open(&self) -> bool {
        self.state.borrow().saved.is_some()
    }

    /// Clears the screen and homes the cursor.
    pub fn clear(&self) -> io::Result<()> {
        let mut out = io::stdout().lock();
        out.write_all(b"\x1b[2J\x1b[H")?;
        out.flush()
    }

    /// Writes `text` starting at the zero-based `row` and `col`.
    pub fn write_at(&self, row: u16, col: u16, text: &str) -> io::Result<()> {
        if !self.is_open() {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "terminal is not open",
            ));
        }

        let mut out = io::stdout().lock();
        write!(out, "\x1b[{};{}H{}", row + 1, col + 1, text)?;
        out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_without_open_is_a_no_op() {
        let terminal = Terminal::new(libc::STDIN_FILENO);

        assert!(!terminal.is_open());
        terminal.close().unwrap();
        terminal.close().unwrap();
        assert!(!terminal.is_open());
    }

    #[test]
    fn writing_requires_an_open_terminal() {
        let terminal = Terminal::new(libc::STDIN_FILENO);

        let error = terminal.write_at(0, 0, "x").unwrap_err();
        assert_eq!(error.kind(), io::ErrorKind::NotConnected);
    }

    #[test]
    fn opening_a_non_tty_fails_and_stays_closed() {
        let mut fds = [0; 2];
        assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);

        let terminal = Terminal::new(fds[0]);
        assert!(terminal.open().is_err());
        assert!(!terminal.is_open());

        unsafe {
            libc::close(fds[0]);
            libc::close(fds[1]);
        }
    }
}
