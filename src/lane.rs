use super::{
    errors::{panic_message, MapError},
    model::{Outcome, Task},
    scope::ExecutionScope,
};
use std::{future::Future, panic::AssertUnwindSafe, sync::Arc};
use futures::FutureExt;
use tokio::sync::mpsc;
use tracing::{trace, warn};

/// Round-robin feed: item `idx` goes to lane `idx % lanes`.
pub(crate) async fn dispatch<I>(
    scope: ExecutionScope,
    inputs: Vec<I>,
    lanes: Vec<mpsc::Sender<Task<I>>>,
) {
    let n = lanes.len();
    let total = inputs.len();
    for (index, value) in inputs.into_iter().enumerate() {
        if scope.is_stopped() {
            trace!(index, "dispatch stopped");
            return;
        }
        let lane = &lanes[index % n];
        tokio::select! {
            biased;
            _ = scope.cancelled() => {
                trace!(index, "dispatch stopped by cancellation");
                return;
            }
            sent = lane.send(Task { index, value }) => {
                if sent.is_err() {
                    trace!(index, "lane closed, dispatch stopped");
                    return;
                }
            }
        }
    }
    trace!(items = total, lanes = n, "dispatch finished");
}

/// Runs tasks from one lane queue through `transform`, one at a time.
///
/// Exits when its queue closes, when the scope is stopped, or when the
/// collector is gone. Emits exactly one outcome per processed task.
pub(crate) async fn run_lane<I, O, E, F, Fut>(
    lane: usize,
    scope: ExecutionScope,
    transform: Arc<F>,
    mut tasks: mpsc::Receiver<Task<I>>,
    outcomes: mpsc::Sender<Outcome<O, E>>,
) where
    F: Fn(ExecutionScope, I) -> Fut,
    Fut: Future<Output = Result<O, E>>,
{
    let mut processed = 0usize;
    loop {
        let task = tokio::select! {
            biased;
            _ = scope.cancelled() => break,
            task = tasks.recv() => match task {
                Some(task) => task,
                None => break,
            },
        };

        if scope.is_stopped() {
            break;
        }

        let index = task.index;
        let result = apply(&*transform, scope.clone(), task).await;
        processed += 1;

        if outcomes.send(Outcome { index, result }).await.is_err() {
            break;
        }
    }
    trace!(lane, processed, cancelled = scope.is_cancelled(), "lane exited");
}

async fn apply<I, O, E, F, Fut>(
    transform: &F,
    scope: ExecutionScope,
    task: Task<I>,
) -> Result<O, MapError<E>>
where
    F: Fn(ExecutionScope, I) -> Fut,
    Fut: Future<Output = Result<O, E>>,
{
    let Task { index, value } = task;

    // Building the future can panic as well as polling it.
    let fut = match std::panic::catch_unwind(AssertUnwindSafe(|| transform(scope, value))) {
        Ok(fut) => fut,
        Err(payload) => return Err(panicked(index, payload)),
    };

    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(source)) => Err(MapError::Transform { index, source }),
        Err(payload) => Err(panicked(index, payload)),
    }
}

fn panicked<E>(index: usize, payload: Box<dyn std::any::Any + Send>) -> MapError<E> {
    let message = panic_message(payload);
    warn!(index, %message, "transform panicked");
    MapError::Panic {
        index: Some(index),
        message,
    }
}
