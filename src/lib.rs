//! Minimal cooperative task runtime driven by one blocking input source.
//!
//! This crate provides a single-threaded scheduler that steps suspendable
//! computations to completion. Computations suspend only by awaiting an
//! awaitable; the scheduler reads the next input event only when nothing
//! else is ready, and other threads can inject work and wake it out of that
//! read.
//!
//! # Architecture
//!
//! - **AwaitableResult**: single-assignment result cell with done callbacks
//! - **Task**: steps a computation, is itself awaitable
//! - **Scheduler**: run loop multiplexing ready tasks against the input read
//! - **RemoteHandle**: cross-thread wake channel (`schedule_threadsafe`)
//! - **InputSource**: the blocking "read next event" call, interruptible
//! - **Terminal**: render surface the application opens and closes
//! - **SchedulerBuilder**: fluent configuration
//!
//! # Example
//!
//! ```ignore
//! use tasklet::{Scheduler, input};
//!
//! let (events, source) = input::channel();
//! let mut scheduler = Scheduler::builder().input(source).build()?;
//! let handle = scheduler.handle();
//!
//! let task = scheduler.submit(async move {
//!     let mut keys = Vec::new();
//!     for _ in 0..3 {
//!         keys.push(handle.request_input().await?);
//!     }
//!     Ok(keys)
//! });
//!
//! for key in [65, 10, 7] {
//!     events.send(key);
//! }
//! assert_eq!(scheduler.run_until(&task)?, Some(vec![65, 10, 7]));
//! ```

mod awaitable;
mod error;
pub mod input;
mod runtime;
mod task;
mod terminal;

pub use awaitable::{Awaitable, AwaitableResult, CallbackId, Readable};
pub use error::{Error, InvalidState, Result};
pub use input::{InputEvent, InputSource, Interrupt};
pub use runtime::yield_now::yield_now;
pub use runtime::{Handle, RemoteHandle, Scheduler, SchedulerBuilder};
pub use task::{Task, TaskId};
pub use terminal::Terminal;
