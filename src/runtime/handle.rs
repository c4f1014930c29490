//! Scheduler handles.
//!
//! A [`Handle`] is the single-threaded entry point applications and tasks
//! use to talk to the scheduler: submitting computations, scheduling
//! callbacks, requesting input, stopping the loop. It is a cheap `Rc` clone
//! and can be moved into `async` blocks.

use crate::awaitable::{Awaitable, AwaitableResult};
use crate::error::Result;
use crate::input::{InputEvent, Interrupt};
use crate::runtime::context;
use crate::runtime::queue::InjectQueue;
use crate::runtime::remote::RemoteHandle;
use crate::task::{Runnable, Task, TaskId};
use crate::terminal::Terminal;

use log::trace;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::future::Future;
use std::rc::{Rc, Weak};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

/// Scheduler state only ever touched from the scheduler thread.
pub(crate) struct Core {
    /// Live tasks keyed by submission order.
    pub(crate) tasks: BTreeMap<TaskId, Rc<dyn Runnable>>,
    next_task: u64,
    /// The one outstanding "read next input" request.
    pub(crate) input: Option<AwaitableResult<InputEvent>>,
    pub(crate) stopping: bool,
    cancel_grace_steps: u32,
}

/// State shared with foreign threads through [`RemoteHandle`].
pub(crate) struct Shared {
    pub(crate) inject: InjectQueue,
    /// Set while the scheduler sits in the blocking input read.
    pub(crate) blocked: AtomicBool,
    pub(crate) interrupter: Arc<dyn Interrupt>,
}

struct HandleInner {
    core: RefCell<Core>,
    shared: Arc<Shared>,
    terminal: Terminal,
}

/// Handle to the scheduler running on this thread.
#[derive(Clone)]
pub struct Handle {
    inner: Rc<HandleInner>,
}

#[derive(Clone)]
pub(crate) struct WeakHandle(Weak<HandleInner>);

impl WeakHandle {
    pub(crate) fn upgrade(&self) -> Option<Handle> {
        self.0.upgrade().map(|inner| Handle { inner })
    }
}

impl Handle {
    pub(crate) fn new(
        interrupter: Arc<dyn Interrupt>,
        terminal: Terminal,
        cancel_grace_steps: u32,
    ) -> Self {
        Self {
            inner: Rc::new(HandleInner {
                core: RefCell::new(Core {
                    tasks: BTreeMap::new(),
                    next_task: 0,
                    input: None,
                    stopping: false,
                    cancel_grace_steps,
                }),
                shared: Arc::new(Shared {
                    inject: InjectQueue::new(),
                    blocked: AtomicBool::new(false),
                    interrupter,
                }),
                terminal,
            }),
        }
    }

    /// Returns the handle of the scheduler alive on this thread.
    ///
    /// Fails with [`Error::NoScheduler`](crate::Error::NoScheduler) if there
    /// is none.
    pub fn current() -> Result<Handle> {
        context::current()
    }

    pub(crate) fn downgrade(&self) -> WeakHandle {
        WeakHandle(Rc::downgrade(&self.inner))
    }

    pub(crate) fn core(&self) -> &RefCell<Core> {
        &self.inner.core
    }

    pub(crate) fn shared(&self) -> &Arc<Shared> {
        &self.inner.shared
    }

    /// Wraps `computation` in a task and adds it to the live set.
    ///
    /// The task is stepped for the first time on the next loop pass; the
    /// returned [`Task`] can be awaited right away.
    pub fn submit<F, T>(&self, computation: F) -> Task<T>
    where
        F: Future<Output = Result<T>> + 'static,
        T: 'static,
    {
        let (id, grace_steps) = {
            let mut core = self.inner.core.borrow_mut();
            let id = TaskId::new(core.next_task);
            core.next_task += 1;
            (id, core.cancel_grace_steps)
        };

        let task = Task::new(id, self, Box::pin(computation), grace_steps);
        self.inner
            .core
            .borrow_mut()
            .tasks
            .insert(id, task.runnable());

        trace!("{id}: submitted");
        task
    }

    /// Runs `callback` on a later loop pass, never synchronously.
    pub fn schedule<F>(&self, callback: F) -> Task<()>
    where
        F: FnOnce() + 'static,
    {
        self.submit(async move {
            callback();
            Ok(())
        })
    }

    /// Returns the awaitable for the next input event.
    ///
    /// Requests coalesce: while one is outstanding every caller gets the same
    /// awaitable, so a single physical read serves all of them.
    pub fn request_input(&self) -> AwaitableResult<InputEvent> {
        let mut core = self.inner.core.borrow_mut();

        if let Some(pending) = core.input.as_ref().filter(|pending| !pending.is_done()) {
            return pending.clone();
        }

        let pending = AwaitableResult::new(self);
        core.input = Some(pending.clone());
        trace!("input requested");
        pending
    }

    /// Asks the loop to exit once the current pass finishes.
    pub fn stop(&self) {
        self.inner.core.borrow_mut().stopping = true;
    }

    /// Creates a pending awaitable owned by this scheduler.
    pub fn create_awaitable<T: 'static>(&self) -> AwaitableResult<T> {
        AwaitableResult::new(self)
    }

    /// The render surface of this scheduler.
    pub fn terminal(&self) -> Terminal {
        self.inner.terminal.clone()
    }

    /// A `Send` handle for injecting work from other threads.
    pub fn remote(&self) -> RemoteHandle {
        RemoteHandle::new(self.inner.shared.clone())
    }

    /// Number of tasks in the live set.
    pub fn task_count(&self) -> usize {
        self.inner.core.borrow().tasks.len()
    }
}
