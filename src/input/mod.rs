//! The one blocking input source the scheduler multiplexes against.
//!
//! The scheduler calls [`InputSource::read_event`] only when no task is
//! ready. The read blocks until an event arrives or until the source's
//! [`Interrupt`] fires, in which case it returns `Ok(None)`.
//!
//! - [`terminal`]: reads key codes from a tty, woken through a self-pipe
//! - [`channel`]: in-process source fed by [`EventSender`]s

pub mod channel;
pub mod terminal;

pub use channel::{ChannelInput, EventSender, channel};
pub use terminal::TerminalInput;

use std::io;
use std::sync::Arc;

/// Integer code of one input event, e.g. a key.
pub type InputEvent = i32;

/// A synchronous "read next event" source.
pub trait InputSource {
    /// Blocks for the next event.
    ///
    /// Returns `Ok(None)` if the read was interrupted before an event was
    /// available. An interruption never consumes an event.
    fn read_event(&mut self) -> io::Result<Option<InputEvent>>;

    /// Returns the handle other threads use to interrupt a blocked read.
    fn interrupter(&self) -> Arc<dyn Interrupt>;
}

/// Wakes a blocked [`InputSource::read_event`].
///
/// Interrupts latch: one raised before the read starts makes that read
/// return immediately.
pub trait Interrupt: Send + Sync {
    fn interrupt(&self);
}
