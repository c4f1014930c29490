//! Runtime subsystem modules.

mod builder;
pub(crate) mod context;
mod core;
pub(crate) mod handle;
pub(crate) mod queue;
pub(crate) mod remote;
pub mod yield_now;

pub use builder::SchedulerBuilder;
pub use self::core::Scheduler;
pub use handle::Handle;
pub use remote::RemoteHandle;

/// Serialises tests that build a scheduler, since only one may be alive.
#[cfg(test)]
pub(crate) fn test_lock() -> std::sync::MutexGuard<'static, ()> {
    use std::sync::{Mutex, PoisonError};

    static LOCK: Mutex<()> = Mutex::new(());
    LOCK.lock().unwrap_or_else(PoisonError::into_inner)
}
