use super::{
    errors::{panic_message, MapError},
    scope::ExecutionScope,
};
use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};
use tokio::{task::JoinHandle, time::Duration};

type MapOutput<O, E> = Result<Vec<O>, MapError<E>>;

/// Handle on a mapping started with `Mapper::spawn`, with cancel and timeout support
pub struct MapHandle<O, E> {
    scope: ExecutionScope,
    join: JoinHandle<MapOutput<O, E>>,
}

impl<O, E> MapHandle<O, E> {
    pub(crate) fn new(scope: ExecutionScope, join: JoinHandle<MapOutput<O, E>>) -> Self {
        Self { scope, join }
    }

    /// Cancels the mapping; the handle then resolves to `MapError::Cancelled`
    /// unless it had already finished.
    #[inline]
    pub fn cancel(&self) {
        self.scope.cancel();
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.scope.is_cancelled()
    }

    #[inline]
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Waits up to `timeout`. On expiry the mapping is cancelled and fully
    /// stopped; a run that still finished with all outputs is returned as is,
    /// anything else becomes `DeadlineExceeded`.
    pub async fn await_timeout(mut self, timeout: Duration) -> MapOutput<O, E> {
        match tokio::time::timeout(timeout, &mut self).await {
            Ok(result) => result,
            Err(_) => {
                self.cancel();
                match (&mut self).await {
                    Ok(values) => Ok(values),
                    Err(_) => Err(MapError::DeadlineExceeded),
                }
            }
        }
    }
}

impl<O, E> Future for MapHandle<O, E> {
    type Output = MapOutput<O, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.join).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(err)) if err.is_panic() => Poll::Ready(Err(MapError::Panic {
                index: None,
                message: panic_message(err.into_panic()),
            })),
            Poll::Ready(Err(_)) => Poll::Ready(Err(MapError::Cancelled)),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<O, E> Drop for MapHandle<O, E> {
    fn drop(&mut self) {
        self.scope.cancel();
    }
}
