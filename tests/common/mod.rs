#![allow(dead_code)]

use std::sync::{Mutex, MutexGuard, PoisonError};
use tasklet::Scheduler;
use tasklet::input::{self, EventSender};

static LOCK: Mutex<()> = Mutex::new(());

/// Only one scheduler may live per process; tests take turns.
pub fn lock() -> MutexGuard<'static, ()> {
    LOCK.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Scheduler fed from an in-process channel.
pub fn scheduler() -> (EventSender, Scheduler) {
    let (events, source) = input::channel();
    let scheduler = Scheduler::builder().input(source).build().unwrap();
    (events, scheduler)
}

/// Runs passes until every task ready right now has been stepped once.
pub fn settle(scheduler: &mut Scheduler) {
    let marker = scheduler.schedule(|| {});
    scheduler.run_until(&marker).unwrap();
}
