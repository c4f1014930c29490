//! Thread-local runtime context.
//!
//! Two pieces of state live here:
//!
//! - the [`Handle`] of the scheduler owning the current thread, so code running
//!   inside a task can reach it through [`Handle::current`] without threading a
//!   reference everywhere;
//! - the step frame of the task currently being stepped. The frame carries
//!   the [`Resumption`] the task was resumed with and records the awaitable
//!   its computation suspended on.
//!
//! Both are set and restored by the scheduler and the task step; nothing here
//! is meant to be touched directly by applications.

use crate::awaitable::{Awaitable, Readable};
use crate::error::{Error, InvalidState, Result};
use crate::runtime::handle::Handle;

use std::cell::RefCell;
use std::rc::Rc;
use std::task::Poll;

/// How a task resumes its computation on a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Resumption {
    /// First step: the computation starts running.
    Start,
    /// The awaited handle is done; the suspended `.await` reads it.
    Resume,
    /// Cancellation was requested; the suspended `.await` yields
    /// [`Error::Cancelled`].
    Cancel,
}

pub(crate) struct StepFrame {
    resumption: Resumption,
    pub(crate) awaited: Option<Rc<dyn Awaitable>>,
}

thread_local! {
    /// Scheduler owning this thread, set for the scheduler's whole lifetime.
    static CURRENT_HANDLE: RefCell<Option<Handle>> = const { RefCell::new(None) };

    /// Frame of the task being stepped on this thread.
    static CURRENT_STEP: RefCell<Option<StepFrame>> = const { RefCell::new(None) };
}

pub(crate) fn set_current(handle: Handle) {
    CURRENT_HANDLE.with(|current| *current.borrow_mut() = Some(handle));
}

pub(crate) fn clear_current() {
    // Moved out first so the handle drops outside the borrow.
    let previous = CURRENT_HANDLE.with(|current| current.borrow_mut().take());
    drop(previous);
}

pub(crate) fn current() -> Result<Handle> {
    CURRENT_HANDLE.with(|current| current.borrow().clone().ok_or(Error::NoScheduler))
}

/// Runs `function` with a fresh step frame and returns the frame afterwards.
///
/// The previous frame is restored on exit so a step nested in another step
/// does not clobber the outer one.
pub(crate) fn enter_step<F, R>(resumption: Resumption, function: F) -> (R, StepFrame)
where
    F: FnOnce() -> R,
{
    let frame = StepFrame {
        resumption,
        awaited: None,
    };
    let previous = CURRENT_STEP.with(|current| current.borrow_mut().replace(frame));

    let result = function();

    let frame = CURRENT_STEP.with(|current| std::mem::replace(&mut *current.borrow_mut(), previous));
    let frame = frame.unwrap_or(StepFrame {
        resumption,
        awaited: None,
    });

    (result, frame)
}

enum Delivery {
    Outside,
    Cancelled,
    Ready,
    Suspend,
}

/// Polls an awaitable from inside a computation.
///
/// A pending cancellation is delivered first, exactly once per step. A done
/// awaitable is read immediately; a pending one is recorded in the frame as
/// the handle the task now waits on.
pub(crate) fn poll_awaited<A>(awaitable: &A) -> Poll<Result<A::Output>>
where
    A: Readable + Clone + 'static,
{
    let delivery = CURRENT_STEP.with(|current| {
        let mut current = current.borrow_mut();
        let Some(frame) = current.as_mut() else {
            return Delivery::Outside;
        };

        if frame.resumption == Resumption::Cancel {
            frame.resumption = Resumption::Resume;
            return Delivery::Cancelled;
        }

        if awaitable.is_done() {
            Delivery::Ready
        } else {
            frame.awaited = Some(Rc::new(awaitable.clone()));
            Delivery::Suspend
        }
    });

    match delivery {
        Delivery::Outside => Poll::Ready(Err(InvalidState::OutsideTask.into())),
        Delivery::Cancelled => Poll::Ready(Err(Error::Cancelled)),
        Delivery::Ready => Poll::Ready(awaitable.read()),
        Delivery::Suspend => Poll::Pending,
    }
}

/// Delivers a pending cancellation without suspending on anything.
///
/// Returns `Some(Err(Cancelled))` when the current step carries one,
/// `Some(Err(OutsideTask))` outside of a step.
pub(crate) fn take_cancellation() -> Option<Result<()>> {
    CURRENT_STEP.with(|current| {
        let mut current = current.borrow_mut();
        let Some(frame) = current.as_mut() else {
            return Some(Err(InvalidState::OutsideTask.into()));
        };

        if frame.resumption == Resumption::Cancel {
            frame.resumption = Resumption::Resume;
            return Some(Err(Error::Cancelled));
        }

        None
    })
}
