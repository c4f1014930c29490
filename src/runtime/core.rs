//! The scheduler and its run loop.
//!
//! Each pass of the loop snapshots the ready tasks and steps each of them
//! once. Only when no task is ready does the loop perform the one blocking
//! operation of the runtime: reading the next input event. Ready work always
//! goes before blocking input.

use crate::awaitable::{Awaitable, AwaitableResult, Readable};
use crate::error::{Error, Result};
use crate::input::{InputEvent, InputSource};
use crate::runtime::context;
use crate::runtime::handle::Handle;
use crate::runtime::remote::RemoteHandle;
use crate::runtime::SchedulerBuilder;
use crate::task::{Runnable, Task};
use crate::terminal::Terminal;

use log::{debug, trace, warn};
use std::future::Future;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};

// At most one scheduler per process.
static ACTIVE: AtomicBool = AtomicBool::new(false);

/// Single-threaded cooperative scheduler.
///
/// Owns the live tasks, the outstanding input request and the input source.
/// Dropping it drops every live task, closes the terminal and lets another
/// scheduler be built.
///
/// # Example
/// ```ignore
/// let mut scheduler = Scheduler::new()?;
/// let handle = scheduler.handle();
/// let task = scheduler.submit(async move {
///     let key = handle.request_input().await?;
///     Ok(key)
/// });
/// let key = scheduler.run_until(&task)?;
/// ```
pub struct Scheduler {
    handle: Handle,
    input: Box<dyn InputSource>,
}

impl Scheduler {
    /// Creates a scheduler reading key codes from stdin.
    pub fn new() -> Result<Self> {
        SchedulerBuilder::new().build()
    }

    pub fn builder() -> SchedulerBuilder {
        SchedulerBuilder::new()
    }

    pub(crate) fn from_parts(
        input: Box<dyn InputSource>,
        terminal_fd: libc::c_int,
        cancel_grace_steps: u32,
    ) -> Result<Self> {
        if ACTIVE
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::SchedulerActive);
        }

        let handle = Handle::new(
            input.interrupter(),
            Terminal::new(terminal_fd),
            cancel_grace_steps,
        );
        context::set_current(handle.clone());
        debug!("scheduler created");

        Ok(Self { handle, input })
    }

    pub fn handle(&self) -> Handle {
        self.handle.clone()
    }

    /// See [`Handle::submit`].
    pub fn submit<F, T>(&self, computation: F) -> Task<T>
    where
        F: Future<Output = Result<T>> + 'static,
        T: 'static,
    {
        self.handle.submit(computation)
    }

    /// See [`Handle::schedule`].
    pub fn schedule<F>(&self, callback: F) -> Task<()>
    where
        F: FnOnce() + 'static,
    {
        self.handle.schedule(callback)
    }

    /// See [`Handle::request_input`].
    pub fn request_input(&self) -> AwaitableResult<InputEvent> {
        self.handle.request_input()
    }

    /// See [`Handle::stop`].
    pub fn stop(&self) {
        self.handle.stop();
    }

    /// See [`Handle::remote`].
    pub fn remote(&self) -> RemoteHandle {
        self.handle.remote()
    }

    /// See [`RemoteHandle::schedule_threadsafe`].
    pub fn schedule_threadsafe<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.handle.remote().schedule_threadsafe(callback);
    }

    /// Acquires the terminal and returns it.
    pub fn open(&self) -> Result<Terminal> {
        let terminal = self.handle.terminal();
        terminal.open()?;
        Ok(terminal)
    }

    /// Releases the terminal. Safe to call at any time, any number of times.
    pub fn close(&self) -> Result<()> {
        self.handle.terminal().close()?;
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        !self.handle.terminal().is_open()
    }

    /// Runs the loop until [`Self::stop`] is called.
    pub fn run_forever(&mut self) -> Result<()> {
        let never = self.handle.create_awaitable::<()>();
        self.run_until(&never).map(|_| ())
    }

    /// Runs the loop until `target` is done or a stop is requested.
    ///
    /// Returns `Ok(Some(value))` when the target completed, the target's
    /// error when it failed or was cancelled, and `Ok(None)` when stopped.
    /// A failing task never aborts the loop; its error stays in the task.
    pub fn run_until<A: Readable>(&mut self, target: &A) -> Result<Option<A::Output>> {
        let outcome = self.run_loop(target);
        self.handle.core().borrow_mut().stopping = false;
        outcome
    }

    fn run_loop<A: Readable>(&mut self, target: &A) -> Result<Option<A::Output>> {
        loop {
            self.drain_injected();

            let ready = self.collect_ready();
            if ready.is_empty() {
                self.read_input()?;
            } else {
                self.step_all(ready);
            }

            if target.is_done() {
                return target.read().map(Some);
            }

            if self.handle.core().borrow().stopping {
                debug!("scheduler stopped");
                return Ok(None);
            }
        }
    }

    fn drain_injected(&self) {
        for callback in self.handle.shared().inject.drain() {
            self.handle.schedule(callback);
        }
    }

    // Snapshot: tasks submitted while stepping wait for the next pass.
    fn collect_ready(&self) -> Vec<Rc<dyn Runnable>> {
        let mut core = self.handle.core().borrow_mut();
        core.tasks.retain(|_, task| !task.is_done());
        core.tasks
            .values()
            .filter(|task| task.is_step_ready())
            .cloned()
            .collect()
    }

    fn step_all(&self, ready: Vec<Rc<dyn Runnable>>) {
        for task in ready {
            if let Err(error) = task.step() {
                debug!("{}: skipped: {error}", task.id());
            }

            if task.is_done() {
                let removed = self.handle.core().borrow_mut().tasks.remove(&task.id());
                drop(removed);
            }
        }
    }

    fn read_input(&mut self) -> Result<()> {
        let shared = self.handle.shared().clone();

        shared.blocked.store(true, Ordering::SeqCst);
        // Work injected before the flag was raised would not interrupt us.
        if !shared.inject.is_empty() {
            shared.blocked.store(false, Ordering::SeqCst);
            return Ok(());
        }

        trace!("blocking on input");
        let outcome = self.input.read_event();
        shared.blocked.store(false, Ordering::SeqCst);

        match outcome {
            Ok(None) => {
                trace!("input read interrupted");
                Ok(())
            }
            Ok(Some(event)) => {
                match self.take_input_request() {
                    Some(pending) => {
                        trace!("input event {event}");
                        if let Err(error) = pending.complete(event) {
                            debug!("input event {event} not delivered: {error}");
                        }
                    }
                    None => debug!("dropping input event {event}: no pending request"),
                }
                Ok(())
            }
            Err(error) => {
                let error = Error::from(error);
                match self.take_input_request() {
                    Some(pending) => {
                        warn!("input read failed: {error}");
                        if let Err(state) = pending.fail(error) {
                            debug!("input failure not delivered: {state}");
                        }
                        Ok(())
                    }
                    None => Err(error),
                }
            }
        }
    }

    fn take_input_request(&self) -> Option<AwaitableResult<InputEvent>> {
        let pending = self.handle.core().borrow_mut().input.take();
        pending.filter(|pending| !pending.is_done())
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        let (tasks, input) = {
            let mut core = self.handle.core().borrow_mut();
            (std::mem::take(&mut core.tasks), core.input.take())
        };
        // Computations may run arbitrary code when dropped.
        drop(tasks);
        drop(input);

        if let Err(error) = self.handle.terminal().close() {
            warn!("failed to restore the terminal: {error}");
        }

        context::clear_current();
        ACTIVE.store(false, Ordering::SeqCst);
        debug!("scheduler dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input;
    use crate::runtime::test_lock;

    use std::cell::RefCell;

    #[test]
    fn second_scheduler_is_rejected_until_first_drops() {
        let _guard = test_lock();
        let (_events, source) = input::channel();
        let first = Scheduler::builder().input(source).build().unwrap();

        let (_more, other) = input::channel();
        let error = Scheduler::builder().input(other).build().err().unwrap();
        assert!(matches!(error, Error::SchedulerActive));

        drop(first);
        assert!(matches!(Handle::current(), Err(Error::NoScheduler)));

        let (_again, source) = input::channel();
        let second = Scheduler::builder().input(source).build().unwrap();
        assert!(Handle::current().is_ok());
        drop(second);
    }

    #[test]
    fn tasks_added_mid_pass_wait_for_the_next_pass() {
        let _guard = test_lock();
        let (_events, source) = input::channel();
        let mut scheduler = Scheduler::builder().input(source).build().unwrap();
        let handle = scheduler.handle();
        let log = Rc::new(RefCell::new(Vec::new()));

        let outer_log = log.clone();
        let spawner = handle.clone();
        let first = scheduler.submit(async move {
            outer_log.borrow_mut().push("first");
            let inner_log = outer_log.clone();
            spawner.schedule(move || inner_log.borrow_mut().push("spawned"));
            Ok(())
        });
        let second_log = log.clone();
        scheduler.schedule(move || second_log.borrow_mut().push("second"));

        scheduler.run_until(&first).unwrap();
        assert_eq!(*log.borrow(), vec!["first", "second"]);

        let marker = scheduler.schedule(|| {});
        scheduler.run_until(&marker).unwrap();
        assert_eq!(*log.borrow(), vec!["first", "second", "spawned"]);
    }

    #[test]
    fn failing_task_does_not_abort_the_loop() {
        let _guard = test_lock();
        let (_events, source) = input::channel();
        let mut scheduler = Scheduler::builder().input(source).build().unwrap();

        let broken = scheduler.submit(async { Err::<(), _>(Error::msg("broken")) });
        let healthy = scheduler.submit(async { Ok(5) });

        assert_eq!(scheduler.run_until(&healthy).unwrap(), Some(5));
        assert_eq!(broken.read().unwrap_err().to_string(), "broken");
        assert_eq!(scheduler.handle().task_count(), 0);
    }

    #[test]
    fn stop_ends_run_forever_and_resets() {
        let _guard = test_lock();
        let (_events, source) = input::channel();
        let mut scheduler = Scheduler::builder().input(source).build().unwrap();
        let handle = scheduler.handle();

        scheduler.schedule(move || handle.stop());
        scheduler.run_forever().unwrap();

        let task = scheduler.submit(async { Ok("after stop") });
        assert_eq!(scheduler.run_until(&task).unwrap(), Some("after stop"));
    }

    #[test]
    fn read_error_without_requester_ends_the_run() {
        let _guard = test_lock();
        let (events, source) = input::channel();
        let mut scheduler = Scheduler::builder().input(source).build().unwrap();
        drop(events);

        let never = scheduler.handle().create_awaitable::<()>();
        let error = scheduler.run_until(&never).unwrap_err();
        assert!(matches!(error, Error::Io(_)));
    }

    #[test]
    fn read_error_fails_the_pending_request() {
        let _guard = test_lock();
        let (events, source) = input::channel();
        let mut scheduler = Scheduler::builder().input(source).build().unwrap();
        let handle = scheduler.handle();
        drop(events);

        let reader = scheduler.submit(async move { handle.request_input().await });
        let error = scheduler.run_until(&reader).unwrap_err();
        assert!(matches!(error, Error::Io(_)));
    }
}
