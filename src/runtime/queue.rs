//! Thread-safe queue of callbacks injected from other threads.
//!
//! Foreign threads never touch task or result state; they only push boxed
//! callbacks here. The scheduler drains the queue at the top of each loop
//! pass and turns every callback into a task on its own thread.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

pub(crate) type Injected = Box<dyn FnOnce() + Send + 'static>;

/// FIFO of injected callbacks behind a mutex.
pub(crate) struct InjectQueue {
    queue: Mutex<VecDeque<Injected>>,
}

impl InjectQueue {
    pub(crate) fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
        }
    }

    /// Enqueues a callback behind those already waiting.
    pub(crate) fn push(&self, callback: Injected) {
        self.lock().push_back(callback);
    }

    /// Takes every queued callback, oldest first.
    pub(crate) fn drain(&self) -> VecDeque<Injected> {
        std::mem::take(&mut *self.lock())
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // Callbacks never run under the lock, so a poisoned queue is still consistent.
    fn lock(&self) -> MutexGuard<'_, VecDeque<Injected>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
