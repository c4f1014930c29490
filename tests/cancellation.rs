mod common;

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use tasklet::{Awaitable, Error, Readable};

#[test]
fn task_cancelled_before_its_first_step_never_runs() {
    let _guard = common::lock();
    let (_events, mut scheduler) = common::scheduler();
    let ran = Rc::new(Cell::new(false));

    let flag = ran.clone();
    let task = scheduler.submit(async move {
        flag.set(true);
        Ok(1)
    });

    assert!(task.cancel());
    assert!(!task.is_done());

    let error = scheduler.run_until(&task).unwrap_err();
    assert!(error.is_cancelled());
    assert!(task.is_cancelled());
    assert!(!ran.get());
}

#[test]
fn cancellation_cascades_through_awaited_tasks() {
    let _guard = common::lock();
    let (_events, mut scheduler) = common::scheduler();
    let handle = scheduler.handle();
    let gate = handle.create_awaitable::<i32>();

    let awaited = gate.clone();
    let inner = scheduler.submit(async move { awaited.await });
    let nested = inner.clone();
    let outer = scheduler.submit(async move { nested.await });

    common::settle(&mut scheduler);
    assert!(!inner.is_done());
    assert!(!outer.is_done());

    assert!(outer.cancel());
    assert!(outer.is_cancel_requested());
    assert!(inner.is_cancel_requested());
    assert!(gate.is_cancelled());
    assert!(!outer.is_done());

    let error = scheduler.run_until(&outer).unwrap_err();
    assert!(error.is_cancelled());
    assert!(inner.is_cancelled());
    assert!(outer.is_cancelled());
}

#[test]
fn cancellation_wins_over_a_value_not_yet_observed() {
    let _guard = common::lock();
    let (_events, mut scheduler) = common::scheduler();
    let handle = scheduler.handle();
    let gate = handle.create_awaitable::<i32>();

    let awaited = gate.clone();
    let task = scheduler.submit(async move { awaited.await });
    common::settle(&mut scheduler);

    gate.complete(3).unwrap();
    assert!(task.cancel());
    // Already done, so forwarding the request to the gate does nothing.
    assert!(!gate.is_cancelled());

    let error = scheduler.run_until(&task).unwrap_err();
    assert!(error.is_cancelled());
}

#[test]
fn computation_may_clean_up_and_finish_after_cancellation() {
    let _guard = common::lock();
    let (_events, mut scheduler) = common::scheduler();
    let handle = scheduler.handle();
    let log = Rc::new(RefCell::new(Vec::new()));

    let gate = handle.create_awaitable::<()>();
    let awaited = gate.clone();
    let steps = log.clone();
    let task = scheduler.submit(async move {
        match awaited.await {
            Err(Error::Cancelled) => {
                steps.borrow_mut().push("cleanup");
                Ok("partial")
            }
            other => other.map(|_| "full"),
        }
    });

    common::settle(&mut scheduler);
    task.cancel();

    assert_eq!(scheduler.run_until(&task).unwrap(), Some("partial"));
    assert_eq!(*log.borrow(), vec!["cleanup"]);
    assert!(!task.is_cancelled());
}

#[test]
fn cancelling_a_finished_task_reports_false() {
    let _guard = common::lock();
    let (_events, mut scheduler) = common::scheduler();

    let task = scheduler.submit(async { Ok(()) });
    scheduler.run_until(&task).unwrap();

    assert!(!task.cancel());
    assert!(!task.is_cancelled());
    assert!(task.read().is_ok());
}
