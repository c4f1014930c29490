//! Error types shared by awaitables, tasks and the scheduler.

use std::io;
use std::sync::Arc;

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised by the runtime or carried by a failed awaitable.
///
/// The type is `Clone` so a failure stored in an awaitable can be read any
/// number of times and fanned out to every task awaiting it.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// An operation hit an awaitable or task in the wrong lifecycle phase.
    #[error("invalid state: {0}")]
    InvalidState(#[from] InvalidState),

    /// The awaited operation was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// A computation failed with an application error.
    #[error("{0}")]
    Failed(Arc<dyn std::error::Error + Send + Sync + 'static>),

    /// The input source or the terminal reported an I/O error.
    #[error("i/o error: {0}")]
    Io(Arc<io::Error>),

    #[error("a scheduler is already active in this process")]
    SchedulerActive,

    #[error("no scheduler is running on this thread")]
    NoScheduler,
}

/// Lifecycle violations. These are programming errors and never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InvalidState {
    #[error("result is already set")]
    AlreadyDone,

    #[error("result read before completion")]
    NotDone,

    #[error("task stepped after it finished")]
    StepAfterDone,

    #[error("task stepped while its awaited handle is still pending")]
    NotReady,

    #[error("awaitable polled outside of a task step")]
    OutsideTask,
}

impl Error {
    /// Wraps any error as an application failure.
    pub fn failed<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Failed(Arc::new(error))
    }

    /// Builds an application failure from a message.
    pub fn msg(message: impl Into<String>) -> Self {
        Error::Failed(Arc::new(Message(message.into())))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// Returns the lifecycle violation, if this is one.
    pub fn invalid_state(&self) -> Option<InvalidState> {
        match self {
            Error::InvalidState(kind) => Some(*kind),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(error: io::Error) -> Self {
        Error::Io(Arc::new(error))
    }
}

#[derive(Debug, Error)]
#[error("{0}")]
struct Message(String);
