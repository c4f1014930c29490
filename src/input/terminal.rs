//! Terminal input: one key code per byte read from a tty.
//!
//! The read blocks in `poll(2)` on two descriptors: the terminal and the
//! read end of a self-pipe. Interrupting writes one byte into the pipe, which
//! wakes the poll; the byte stays there until the next read drains it, so an
//! interrupt raised before the read starts is not lost.

use super::{InputEvent, InputSource, Interrupt};

use libc::{F_GETFL, F_SETFL, O_NONBLOCK, POLLERR, POLLHUP, POLLIN, POLLNVAL, fcntl, pipe, poll, pollfd};
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::sync::Arc;

/// Input source reading from a terminal file descriptor.
pub struct TerminalInput {
    fd: RawFd,
    wake_read: OwnedFd,
    interrupter: Arc<PipeInterrupt>,
}

impl TerminalInput {
    /// Reads from standard input.
    pub fn stdin() -> io::Result<Self> {
        Self::new(libc::STDIN_FILENO)
    }

    /// Reads from `fd`. The descriptor is borrowed, not closed on drop.
    pub fn new(fd: RawFd) -> io::Result<Self> {
        let mut fds = [0; 2];
        if unsafe { pipe(fds.as_mut_ptr()) } < 0 {
            return Err(io::Error::last_os_error());
        }

        // SAFETY: pipe() just returned two fresh descriptors we now own.
        let (wake_read, wake_write) =
            unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };

        set_nonblocking(wake_read.as_raw_fd())?;
        set_nonblocking(wake_write.as_raw_fd())?;

        Ok(Self {
            fd,
            wake_read,
            interrupter: Arc::new(PipeInterrupt { wake_write }),
        })
    }

    fn drain_wake_pipe(&self) {
        let mut buffer = [0u8; 64];
        loop {
            let read = unsafe {
                libc::read(
                    self.wake_read.as_raw_fd(),
                    buffer.as_mut_ptr() as *mut _,
                    buffer.len(),
                )
            };
            if read <= 0 {
                break;
            }
        }
    }
}

impl InputSource for TerminalInput {
    fn read_event(&mut self) -> io::Result<Option<InputEvent>> {
        let mut fds = [
            pollfd {
                fd: self.wake_read.as_raw_fd(),
                events: POLLIN,
                revents: 0,
            },
            pollfd {
                fd: self.fd,
                events: POLLIN,
                revents: 0,
            },
        ];

        let ready = unsafe { poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, -1) };
        if ready < 0 {
            let error = io::Error::last_os_error();
            if error.kind() == io::ErrorKind::Interrupted {
                return Ok(None);
            }
            return Err(error);
        }

        if fds[0].revents & POLLIN != 0 {
            self.drain_wake_pipe();
            return Ok(None);
        }

        let revents = fds[1].revents;
        if revents & POLLNVAL != 0 {
            return Err(io::Error::from_raw_os_error(libc::EBADF));
        }
        if revents & (POLLIN | POLLHUP | POLLERR) == 0 {
            return Ok(None);
        }

        let mut byte = 0u8;
        let read = unsafe { libc::read(self.fd, &mut byte as *mut u8 as *mut _, 1) };

        match read {
            1 => Ok(Some(InputEvent::from(byte))),
            0 => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "terminal input closed",
            )),
            _ => {
                let error = io::Error::last_os_error();
                match error.kind() {
                    io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock => Ok(None),
                    _ => Err(error),
                }
            }
        }
    }

    fn interrupter(&self) -> Arc<dyn Interrupt> {
        self.interrupter.clone()
    }
}

struct PipeInterrupt {
    wake_write: OwnedFd,
}

impl Interrupt for PipeInterrupt {
    fn interrupt(&self) {
        let byte = 1u8;
        // A full pipe already holds a pending wake-up, so EAGAIN is fine.
        unsafe {
            libc::write(
                self.wake_write.as_raw_fd(),
                &byte as *const u8 as *const _,
                1,
            );
        }
    }
}

fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    let flags = unsafe { fcntl(fd, F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }

    if unsafe { fcntl(fd, F_SETFL, flags | O_NONBLOCK) } < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}
