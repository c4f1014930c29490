//! Tasks: computations bound to the scheduler.
//!
//! A task wraps a computation (any `Future<Output = Result<T, Error>>`,
//! usually an `async` block) and advances it one step at a time. Each step
//! resumes the computation until it suspends on another awaitable or
//! finishes. A task is itself awaitable, so tasks can wait on each other.
//!
//! # Step protocol
//!
//! 1. The first step starts the computation.
//! 2. Later steps happen once the awaited handle is done; the suspended
//!    `.await` then yields the handle's value or error.
//! 3. If cancellation was requested, the step instead makes the suspended
//!    `.await` yield [`Error::Cancelled`]. Returning that error (for example
//!    through `?`) acknowledges the cancellation and the task becomes
//!    cancelled.
//!
//! ```ignore
//! let handle = Handle::current()?;
//! let task = handle.submit(async move {
//!     let key = handle.request_input().await?;
//!     Ok(key * 2)
//! });
//! ```
//!
//! # Cancellation
//!
//! [`Awaitable::cancel`] on a task only records the request and forwards it
//! to whatever the task is awaiting. The task turns terminal on its next
//! step, after its computation had the chance to clean up. A computation
//! that suspends again after seeing the cancellation gets a limited number
//! of grace steps (see
//! [`SchedulerBuilder::cancel_grace_steps`](crate::SchedulerBuilder::cancel_grace_steps));
//! after that it is dropped and the task is marked cancelled.

use crate::awaitable::{Awaitable, AwaitableResult, CallbackId, Readable};
use crate::error::{Error, InvalidState, Result};
use crate::runtime::context::{Resumption, enter_step, poll_awaited};
use crate::runtime::handle::Handle;

use log::{debug, trace, warn};
use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

pub(crate) type Computation<T> = Pin<Box<dyn Future<Output = Result<T>>>>;

/// Identifier of a task, increasing in submission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u64);

impl TaskId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

/// A submitted computation.
///
/// Created by [`Handle::submit`](crate::Handle::submit). Cloning yields
/// another handle to the same task.
pub struct Task<T> {
    inner: Rc<TaskInner<T>>,
}

pub(crate) struct TaskInner<T> {
    id: TaskId,
    result: AwaitableResult<T>,
    state: RefCell<StepState<T>>,
}

struct StepState<T> {
    computation: Option<Computation<T>>,
    awaited: Option<Rc<dyn Awaitable>>,
    started: bool,
    cancel_requested: bool,
    grace_steps: u32,
}

/// Type-erased view the scheduler keeps in its live-task set.
pub(crate) trait Runnable {
    fn id(&self) -> TaskId;

    fn is_done(&self) -> bool;

    fn is_step_ready(&self) -> bool;

    fn step(&self) -> Result<()>;
}

impl<T: 'static> Task<T> {
    pub(crate) fn new(
        id: TaskId,
        handle: &Handle,
        computation: Computation<T>,
        grace_steps: u32,
    ) -> Self {
        Self {
            inner: Rc::new(TaskInner {
                id,
                result: AwaitableResult::new(handle),
                state: RefCell::new(StepState {
                    computation: Some(computation),
                    awaited: None,
                    started: false,
                    cancel_requested: false,
                    grace_steps,
                }),
            }),
        }
    }

    pub(crate) fn runnable(&self) -> Rc<dyn Runnable> {
        self.inner.clone()
    }

    pub fn id(&self) -> TaskId {
        self.inner.id
    }

    /// True if the next [`Self::step`] would make progress.
    pub fn is_step_ready(&self) -> bool {
        self.inner.is_step_ready()
    }

    /// True once cancellation was requested, even if not yet acknowledged.
    pub fn is_cancel_requested(&self) -> bool {
        self.inner.state.borrow().cancel_requested
    }

    /// Resumes the computation once.
    ///
    /// The scheduler calls this for every ready task; calling it directly is
    /// allowed. Stepping a finished task fails with
    /// [`InvalidState::StepAfterDone`], stepping a task that is not ready
    /// fails with [`InvalidState::NotReady`] and changes nothing.
    pub fn step(&self) -> Result<()> {
        self.inner.step()
    }

    /// Registers a callback on the task's result.
    /// See [`AwaitableResult::on_done`].
    pub fn on_done<F>(&self, callback: F) -> CallbackId
    where
        F: FnOnce(&AwaitableResult<T>) + 'static,
    {
        self.inner.result.on_done(callback)
    }

    pub fn unregister(&self, id: CallbackId) -> bool {
        self.inner.result.unregister(id)
    }

    /// See [`AwaitableResult::error`].
    pub fn error(&self) -> Result<Option<Error>> {
        self.inner.result.error()
    }
}

impl<T: 'static> TaskInner<T> {
    fn request_cancel(&self) -> bool {
        if self.result.is_done() {
            return false;
        }

        let awaited = {
            let mut state = self.state.borrow_mut();
            if state.cancel_requested {
                return true;
            }
            state.cancel_requested = true;
            state.awaited.clone()
        };

        debug!("{}: cancellation requested", self.id);
        if let Some(awaited) = awaited {
            awaited.cancel();
        }

        true
    }

    fn suspend(&self, computation: Computation<T>, awaited: Option<Rc<dyn Awaitable>>) -> Result<()> {
        let mut state = self.state.borrow_mut();

        if !state.cancel_requested {
            state.awaited = awaited;
            state.computation = Some(computation);
            return Ok(());
        }

        if state.grace_steps == 0 {
            drop(state);
            warn!("{}: computation kept running after cancellation, dropping it", self.id);
            drop(computation);
            self.result.cancel();
            return Ok(());
        }

        state.grace_steps -= 1;
        state.awaited = awaited.clone();
        state.computation = Some(computation);
        drop(state);

        debug!("{}: suspended while cancelling, granting a grace step", self.id);
        if let Some(awaited) = awaited {
            awaited.cancel();
        }

        Ok(())
    }
}

impl<T: 'static> Runnable for TaskInner<T> {
    fn id(&self) -> TaskId {
        self.id
    }

    fn is_done(&self) -> bool {
        self.result.is_done()
    }

    fn is_step_ready(&self) -> bool {
        if self.result.is_done() {
            return false;
        }

        let state = self.state.borrow();
        if state.cancel_requested {
            return true;
        }

        match &state.awaited {
            None => true,
            Some(awaited) => awaited.is_done(),
        }
    }

    fn step(&self) -> Result<()> {
        if self.result.is_done() {
            return Err(InvalidState::StepAfterDone.into());
        }
        if !self.is_step_ready() {
            return Err(InvalidState::NotReady.into());
        }

        let (resumption, fresh, computation) = {
            let mut state = self.state.borrow_mut();
            let resumption = if state.cancel_requested {
                Resumption::Cancel
            } else if state.started {
                Resumption::Resume
            } else {
                Resumption::Start
            };
            let fresh = !state.started;
            state.started = true;
            (resumption, fresh, state.computation.take())
        };

        // Only absent while this very task is being stepped further up the stack.
        let Some(mut computation) = computation else {
            return Err(InvalidState::NotReady.into());
        };

        if resumption == Resumption::Cancel && fresh {
            drop(computation);
            debug!("{}: cancelled before its first step", self.id);
            self.result.cancel();
            return Ok(());
        }

        trace!("{}: step ({resumption:?})", self.id);
        let (poll, frame) = enter_step(resumption, || {
            let mut cx = Context::from_waker(Waker::noop());
            computation.as_mut().poll(&mut cx)
        });

        match poll {
            Poll::Ready(Ok(value)) => {
                trace!("{}: completed", self.id);
                self.result.complete(value)
            }
            Poll::Ready(Err(Error::Cancelled)) => {
                debug!("{}: cancelled", self.id);
                self.result.cancel();
                Ok(())
            }
            Poll::Ready(Err(error)) => {
                debug!("{}: failed: {error}", self.id);
                self.result.fail(error)
            }
            Poll::Pending => self.suspend(computation, frame.awaited),
        }
    }
}

impl<T: 'static> Awaitable for Task<T> {
    fn is_done(&self) -> bool {
        self.inner.result.is_done()
    }

    fn is_cancelled(&self) -> bool {
        self.inner.result.is_cancelled()
    }

    /// Requests cancellation and forwards it to the awaited handle. The task
    /// itself turns cancelled on its next step.
    fn cancel(&self) -> bool {
        self.inner.request_cancel()
    }
}

impl<T: Clone + 'static> Readable for Task<T> {
    type Output = T;

    fn read(&self) -> Result<T> {
        self.inner.result.read()
    }
}

impl<T: Clone + 'static> Future for Task<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        poll_awaited(self.get_mut())
    }
}

impl<T> Clone for Task<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.inner.id)
            .field("result", &self.inner.result)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input;
    use crate::runtime::{Scheduler, test_lock};

    use std::cell::Cell;

    fn scheduler() -> Scheduler {
        let (_events, source) = input::channel();
        Scheduler::builder().input(source).build().unwrap()
    }

    #[test]
    fn step_when_not_ready_changes_nothing() {
        let _guard = test_lock();
        let scheduler = scheduler();
        let handle = scheduler.handle();
        let gate = handle.create_awaitable::<u8>();

        let awaited = gate.clone();
        let task = handle.submit(async move { awaited.await });

        assert!(task.is_step_ready());
        task.step().unwrap();
        assert!(!task.is_step_ready());

        let error = task.step().unwrap_err();
        assert_eq!(error.invalid_state(), Some(InvalidState::NotReady));
        assert!(!task.is_done());

        gate.complete(9).unwrap();
        assert!(task.is_step_ready());
        task.step().unwrap();
        assert_eq!(task.read().unwrap(), 9);

        let error = task.step().unwrap_err();
        assert_eq!(error.invalid_state(), Some(InvalidState::StepAfterDone));
    }

    #[test]
    fn cancel_before_first_step_is_acknowledged_on_step() {
        let _guard = test_lock();
        let scheduler = scheduler();
        let ran = Rc::new(Cell::new(false));

        let flag = ran.clone();
        let task = scheduler.submit(async move {
            flag.set(true);
            Ok(())
        });

        assert!(task.cancel());
        assert!(task.cancel());
        assert!(!task.is_cancelled());

        task.step().unwrap();

        assert!(task.is_cancelled());
        assert!(!ran.get());
        assert!(task.read().unwrap_err().is_cancelled());
        assert!(!task.cancel());
    }

    #[test]
    fn cancellation_is_delivered_to_the_suspended_await() {
        let _guard = test_lock();
        let scheduler = scheduler();
        let handle = scheduler.handle();
        let gate = handle.create_awaitable::<u8>();
        let cleaned = Rc::new(Cell::new(false));

        let awaited = gate.clone();
        let flag = cleaned.clone();
        let task = handle.submit(async move {
            let outcome = awaited.await;
            flag.set(true);
            outcome
        });

        task.step().unwrap();
        assert!(task.cancel());
        assert!(gate.is_cancelled());
        assert!(!task.is_done());

        task.step().unwrap();
        assert!(cleaned.get());
        assert!(task.is_cancelled());
    }

    #[test]
    fn failure_of_awaited_handle_reaches_the_computation() {
        let _guard = test_lock();
        let scheduler = scheduler();
        let handle = scheduler.handle();
        let gate = handle.create_awaitable::<u8>();

        let awaited = gate.clone();
        let task = handle.submit(async move {
            match awaited.await {
                Ok(_) => Err(Error::msg("unexpected value")),
                Err(error) => Ok(format!("handled: {error}")),
            }
        });

        task.step().unwrap();
        gate.fail(Error::msg("sensor unplugged")).unwrap();
        task.step().unwrap();

        assert_eq!(task.read().unwrap(), "handled: sensor unplugged");
    }

    #[test]
    fn stubborn_computation_is_dropped_after_grace() {
        let _guard = test_lock();
        let scheduler = scheduler();
        let handle = scheduler.handle();

        let inner = handle.clone();
        let task = handle.submit(async move {
            let mut rounds = 0;
            loop {
                let _ = inner.create_awaitable::<()>().await;
                rounds += 1;
                if rounds > 100 {
                    break Ok(());
                }
            }
        });

        task.step().unwrap();
        task.cancel();

        // Cancellation delivered, computation suspends again: grace step.
        task.step().unwrap();
        assert!(!task.is_done());

        // Still suspending: dropped.
        task.step().unwrap();
        assert!(task.is_cancelled());
    }
}
