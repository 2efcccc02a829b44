use std::{
    pin::Pin,
    task::{Context, Poll},
};

use futures::future::BoxFuture;

/// A future that keeps running on the tokio runtime if it is dropped before
/// completion. Created by [`CompleteOnDrop::complete_on_drop`].
pub struct RunToCompletion<T: Send + 'static> {
    future: Option<BoxFuture<'static, T>>,
}

impl<T: Send + 'static> Future for RunToCompletion<T> {
    type Output = T;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        let Some(future) = self.future.as_mut() else {
            panic!("RunToCompletion polled after completion");
        };

        let output = std::task::ready!(future.as_mut().poll(cx));
        self.future = None;

        Poll::Ready(output)
    }
}

impl<T: Send + 'static> Drop for RunToCompletion<T> {
    fn drop(&mut self) {
        if let Some(future) = self.future.take() {
            tokio::spawn(future);
        }
    }
}

/// Graph and cache updates must not stop half way because the caller lost
/// interest, so they are wrapped in [`RunToCompletion`].
pub trait CompleteOnDrop: Future + Send + Sized + 'static
where
    Self::Output: Send + 'static,
{
    /// Wraps the future so that dropping it hands the remainder of the work
    /// to the tokio runtime instead of cancelling it.
    fn complete_on_drop(self) -> RunToCompletion<Self::Output> {
        RunToCompletion { future: Some(Box::pin(self)) }
    }
}

impl<F> CompleteOnDrop for F
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
}
