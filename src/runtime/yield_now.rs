use crate::error::Result;
use crate::runtime::context::take_cancellation;

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Cooperative scheduler hint: gives up the rest of this step once.
///
/// The task suspends without awaiting anything, so it stays ready and is
/// stepped again on the next pass of the loop, after every other task that
/// was ready in this pass. A pending cancellation is delivered here like at
/// any other suspension point.
pub async fn yield_now() -> Result<()> {
    struct YieldOnce(bool);

    impl Future for YieldOnce {
        type Output = Result<()>;

        fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
            if let Some(cancelled) = take_cancellation() {
                return Poll::Ready(cancelled);
            }

            if !self.0 {
                self.0 = true;
                return Poll::Pending;
            }

            Poll::Ready(Ok(()))
        }
    }

    YieldOnce(false).await
}
