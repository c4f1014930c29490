//! Fluent builder for [`Scheduler`] construction.

use crate::error::Result;
use crate::input::{InputSource, TerminalInput};
use crate::runtime::Scheduler;

/// Builder for configuring a [`Scheduler`].
///
/// # Example
/// ```ignore
/// let (events, source) = tasklet::input::channel();
/// let scheduler = SchedulerBuilder::new()
///     .input(source)
///     .cancel_grace_steps(0)
///     .build()?;
/// ```
pub struct SchedulerBuilder {
    input: Option<Box<dyn InputSource>>,
    cancel_grace_steps: u32,
    terminal_fd: libc::c_int,
}

impl Default for SchedulerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SchedulerBuilder {
    /// Defaults: terminal input on stdin, one grace step after cancellation.
    pub fn new() -> Self {
        Self {
            input: None,
            cancel_grace_steps: 1,
            terminal_fd: libc::STDIN_FILENO,
        }
    }

    /// Uses `source` instead of the terminal for input events.
    pub fn input<S>(mut self, source: S) -> Self
    where
        S: InputSource + 'static,
    {
        self.input = Some(Box::new(source));
        self
    }

    /// Number of extra suspensions a cancelled computation may make before
    /// it is dropped.
    pub fn cancel_grace_steps(mut self, steps: u32) -> Self {
        self.cancel_grace_steps = steps;
        self
    }

    /// Descriptor of the tty used as render surface and, unless replaced
    /// with [`Self::input`], as input source.
    pub fn terminal_fd(mut self, fd: libc::c_int) -> Self {
        self.terminal_fd = fd;
        self
    }

    /// Builds the scheduler.
    ///
    /// Fails with [`Error::SchedulerActive`](crate::Error::SchedulerActive)
    /// while another scheduler is alive in this process.
    pub fn build(self) -> Result<Scheduler> {
        let input = match self.input {
            Some(input) => input,
            None => Box::new(TerminalInput::new(self.terminal_fd)?),
        };

        Scheduler::from_parts(input, self.terminal_fd, self.cancel_grace_steps)
    }
}
