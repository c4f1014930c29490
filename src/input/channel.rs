//! In-process input source.
//!
//! Events are pushed by [`EventSender`]s from any thread and read by the
//! scheduler through [`ChannelInput`]. Useful for tests and for embedding the
//! scheduler behind something other than a terminal.
//!
//! ```ignore
//! let (events, source) = tasklet::input::channel();
//! let mut scheduler = Scheduler::builder().input(source).build()?;
//! events.send(b'q' as i32);
//! ```

use super::{InputEvent, InputSource, Interrupt};

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

struct State {
    events: VecDeque<InputEvent>,
    interrupted: bool,
    senders: usize,
}

struct Channel {
    state: Mutex<State>,
    ready: Condvar,
}

impl Channel {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Creates a connected sender and source.
pub fn channel() -> (EventSender, ChannelInput) {
    let channel = Arc::new(Channel {
        state: Mutex::new(State {
            events: VecDeque::new(),
            interrupted: false,
            senders: 1,
        }),
        ready: Condvar::new(),
    });

    (
        EventSender {
            channel: channel.clone(),
        },
        ChannelInput { channel },
    )
}

/// Sending half; cloneable and `Send`.
pub struct EventSender {
    channel: Arc<Channel>,
}

impl EventSender {
    /// Queues an event for the scheduler.
    pub fn send(&self, event: InputEvent) {
        self.channel.lock().events.push_back(event);
        self.channel.ready.notify_all();
    }
}

impl Clone for EventSender {
    fn clone(&self) -> Self {
        self.channel.lock().senders += 1;
        Self {
            channel: self.channel.clone(),
        }
    }
}

impl Drop for EventSender {
    fn drop(&mut self) {
        self.channel.lock().senders -= 1;
        self.channel.ready.notify_all();
    }
}

/// Receiving half, handed to the scheduler.
pub struct ChannelInput {
    channel: Arc<Channel>,
}

impl InputSource for ChannelInput {
    /// Reports a pending interrupt before any queued event. Once every sender
    /// is gone and the queue is empty, fails with `UnexpectedEof`.
    fn read_event(&mut self) -> io::Result<Option<InputEvent>> {
        let mut state = self.channel.lock();

        loop {
            if state.interrupted {
                state.interrupted = false;
                return Ok(None);
            }

            if let Some(event) = state.events.pop_front() {
                return Ok(Some(event));
            }

            if state.senders == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "all event senders dropped",
                ));
            }

            state = self
                .channel
                .ready
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn interrupter(&self) -> Arc<dyn Interrupt> {
        Arc::new(ChannelInterrupt {
            channel: self.channel.clone(),
        })
    }
}

struct ChannelInterrupt {
    channel: Arc<Channel>,
}

impl Interrupt for ChannelInterrupt {
    fn interrupt(&self) {
        self.channel.lock().interrupted = true;
        self.channel.ready.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::thread;
    use std::time::Duration;

    #[test]
    fn delivers_events_in_order() {
        let (events, mut source) = channel();
        events.send(1);
        events.send(2);

        assert_eq!(source.read_event().unwrap(), Some(1));
        assert_eq!(source.read_event().unwrap(), Some(2));
    }

    #[test]
    fn interrupt_wins_over_queued_event_without_losing_it() {
        let (events, mut source) = channel();
        events.send(7);
        source.interrupter().interrupt();

        assert_eq!(source.read_event().unwrap(), None);
        assert_eq!(source.read_event().unwrap(), Some(7));
    }

    #[test]
    fn interrupt_wakes_blocked_read() {
        let (_events, mut source) = channel();
        let interrupter = source.interrupter();

        let waker = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            interrupter.interrupt();
        });

        assert_eq!(source.read_event().unwrap(), None);
        waker.join().unwrap();
    }

    #[test]
    fn dropped_senders_end_the_stream() {
        let (events, mut source) = channel();
        let extra = events.clone();
        extra.send(3);
        drop(events);
        drop(extra);

        assert_eq!(source.read_event().unwrap(), Some(3));
        let error = source.read_event().unwrap_err();
        assert_eq!(error.kind(), io::ErrorKind::UnexpectedEof);
    }
}
