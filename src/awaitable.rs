//! Single-assignment result cells.
//!
//! An [`AwaitableResult`] starts pending and moves exactly once into one of
//! three terminal states: completed with a value, failed with an error, or
//! cancelled. Anything that wants to know about the transition registers a
//! callback with [`AwaitableResult::on_done`]; callbacks never run inside the
//! call that completed the result; they are handed to the owning scheduler
//! and run on a later pass of its loop.
//!
//! Inside a task the result is consumed with `.await`:
//!
//! ```ignore
//! let handle = Handle::current()?;
//! let key = handle.request_input().await?;
//! ```

use crate::error::{Error, InvalidState, Result};
use crate::runtime::context::poll_awaited;
use crate::runtime::handle::{Handle, WeakHandle};

use log::debug;
use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

/// Object-safe view of anything a task can suspend on.
pub trait Awaitable {
    /// True once the state left pending.
    fn is_done(&self) -> bool;

    fn is_cancelled(&self) -> bool;

    /// Requests cancellation. Returns `false` if the awaitable already
    /// finished, in which case nothing changes.
    fn cancel(&self) -> bool;
}

/// An awaitable whose outcome can be read back.
pub trait Readable: Awaitable {
    type Output;

    /// Returns the value, re-raises the stored error, or reports
    /// [`Error::Cancelled`]. Reading a pending awaitable is
    /// [`InvalidState::NotDone`].
    fn read(&self) -> Result<Self::Output>;
}

/// Token returned by [`AwaitableResult::on_done`], used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(u64);

type DoneCallback<T> = Box<dyn FnOnce(&AwaitableResult<T>)>;

enum State<T> {
    Pending,
    Completed(T),
    Failed(Error),
    Cancelled,
}

impl<T> State<T> {
    fn name(&self) -> &'static str {
        match self {
            State::Pending => "pending",
            State::Completed(_) => "completed",
            State::Failed(_) => "failed",
            State::Cancelled => "cancelled",
        }
    }
}

struct Inner<T> {
    state: State<T>,
    callbacks: Vec<(CallbackId, DoneCallback<T>)>,
    next_callback: u64,
}

/// A pending-then-terminal result owned by one scheduler.
///
/// Cloning is cheap and every clone observes the same state.
pub struct AwaitableResult<T> {
    inner: Rc<RefCell<Inner<T>>>,
    owner: WeakHandle,
}

impl<T: 'static> AwaitableResult<T> {
    /// Creates a pending result whose callbacks run on `handle`'s scheduler.
    pub fn new(handle: &Handle) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                state: State::Pending,
                callbacks: Vec::new(),
                next_callback: 0,
            })),
            owner: handle.downgrade(),
        }
    }

    /// Moves pending → completed.
    pub fn complete(&self, value: T) -> Result<()> {
        self.transition(State::Completed(value))
    }

    /// Moves pending → failed.
    pub fn fail(&self, error: Error) -> Result<()> {
        self.transition(State::Failed(error))
    }

    /// Registers `callback` to run after the result is set.
    ///
    /// If the result is already done the callback is scheduled right away,
    /// still on a later loop pass rather than inline.
    pub fn on_done<F>(&self, callback: F) -> CallbackId
    where
        F: FnOnce(&AwaitableResult<T>) + 'static,
    {
        let mut inner = self.inner.borrow_mut();
        let id = CallbackId(inner.next_callback);
        inner.next_callback += 1;

        if matches!(inner.state, State::Pending) {
            inner.callbacks.push((id, Box::new(callback)));
        } else {
            drop(inner);
            self.schedule_callbacks(vec![(id, Box::new(callback))]);
        }

        id
    }

    /// Removes a callback registered with [`Self::on_done`].
    ///
    /// Returns whether something was removed; unknown or already scheduled
    /// ids are a no-op.
    pub fn unregister(&self, id: CallbackId) -> bool {
        let mut inner = self.inner.borrow_mut();
        let before = inner.callbacks.len();
        inner.callbacks.retain(|(entry, _)| *entry != id);
        inner.callbacks.len() != before
    }

    /// The stored failure: `Ok(None)` when completed, `Ok(Some(e))` when
    /// failed, `Err(Cancelled)` when cancelled.
    pub fn error(&self) -> Result<Option<Error>> {
        match &self.inner.borrow().state {
            State::Completed(_) => Ok(None),
            State::Failed(error) => Ok(Some(error.clone())),
            State::Cancelled => Err(Error::Cancelled),
            State::Pending => Err(InvalidState::NotDone.into()),
        }
    }

    /// True if both handles refer to the same underlying result.
    pub fn same_as(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    fn transition(&self, next: State<T>) -> Result<()> {
        let callbacks = {
            let mut inner = self.inner.borrow_mut();
            if !matches!(inner.state, State::Pending) {
                return Err(InvalidState::AlreadyDone.into());
            }
            inner.state = next;
            std::mem::take(&mut inner.callbacks)
        };

        self.schedule_callbacks(callbacks);
        Ok(())
    }

    fn schedule_callbacks(&self, callbacks: Vec<(CallbackId, DoneCallback<T>)>) {
        if callbacks.is_empty() {
            return;
        }

        let Some(handle) = self.owner.upgrade() else {
            debug!(
                "dropping {} done callbacks: scheduler is gone",
                callbacks.len()
            );
            return;
        };

        for (_, callback) in callbacks {
            let this = self.clone();
            handle.schedule(move || callback(&this));
        }
    }
}

impl<T: 'static> Awaitable for AwaitableResult<T> {
    fn is_done(&self) -> bool {
        !matches!(self.inner.borrow().state, State::Pending)
    }

    fn is_cancelled(&self) -> bool {
        matches!(self.inner.borrow().state, State::Cancelled)
    }

    fn cancel(&self) -> bool {
        self.transition(State::Cancelled).is_ok()
    }
}

impl<T: Clone + 'static> Readable for AwaitableResult<T> {
    type Output = T;

    fn read(&self) -> Result<T> {
        match &self.inner.borrow().state {
            State::Completed(value) => Ok(value.clone()),
            State::Failed(error) => Err(error.clone()),
            State::Cancelled => Err(Error::Cancelled),
            State::Pending => Err(InvalidState::NotDone.into()),
        }
    }
}

impl<T: Clone + 'static> Future for AwaitableResult<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        poll_awaited(self.get_mut())
    }
}

impl<T> Clone for AwaitableResult<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            owner: self.owner.clone(),
        }
    }
}

impl<T> fmt::Debug for AwaitableResult<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("AwaitableResult")
            .field("state", &inner.state.name())
            .field("callbacks", &inner.callbacks.len())
            .finish()
    }
}
