//! Cross-thread wake channel.

use crate::runtime::handle::Shared;

use log::trace;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::Ordering;

/// Handle usable from any thread.
///
/// It can only enqueue callbacks for the scheduler thread; it never touches
/// task or result state itself.
#[derive(Clone)]
pub struct RemoteHandle {
    shared: Arc<Shared>,
}

impl RemoteHandle {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Queues `callback` to run as a task on the scheduler thread.
    ///
    /// If the scheduler is blocked reading input, the read is interrupted so
    /// the callback runs before the next input event is delivered.
    pub fn schedule_threadsafe<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.shared.inject.push(Box::new(callback));

        if self.shared.blocked.load(Ordering::SeqCst) {
            trace!("interrupting blocked input read");
            self.shared.interrupter.interrupt();
        }
    }

    /// True while the scheduler is blocked in the input read.
    pub fn is_blocked(&self) -> bool {
        self.shared.blocked.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for RemoteHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteHandle")
            .field("blocked", &self.is_blocked())
            .finish()
    }
}
