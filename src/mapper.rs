use super::{
    errors::{panic_message, ConfigError, MapError},
    handle::MapHandle,
    lane::{dispatch, run_lane},
    model::{Outcome, ResultBuffer},
    scope::{ExecutionScope, StopReason},
};
use std::{future::Future, str::FromStr, sync::Arc, time::Duration};
use tokio::{sync::mpsc, task::JoinSet};
use tracing::{debug, debug_span, Instrument};

const ENV_WORKERS: &str = "LANEMAP_WORKERS";
const ENV_QUEUE_CAPACITY: &str = "LANEMAP_QUEUE_CAPACITY";
const ENV_TIMEOUT_MS: &str = "LANEMAP_TIMEOUT_MS";

/// Mapper configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Requested lane count; clamped to the input length per invocation.
    pub workers: usize,
    /// Capacity of each lane's input queue.
    pub queue_capacity: usize,
    /// Per-invocation time limit, on top of any deadline the caller's scope carries.
    pub timeout: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        let num_cpus = num_cpus::get();
        Self {
            workers: num_cpus * 2,
            queue_capacity: 1,
            timeout: None,
        }
    }
}

impl Config {
    pub fn cpu_bound() -> Self {
        Self {
            workers: num_cpus::get(),
            queue_capacity: 1,
            timeout: None,
        }
    }

    pub fn io_bound() -> Self {
        let num_cpus = num_cpus::get();
        Self {
            workers: num_cpus * 4,
            queue_capacity: 4,
            timeout: Some(Duration::from_secs(30)),
        }
    }

    /// Defaults overridden by `LANEMAP_WORKERS`, `LANEMAP_QUEUE_CAPACITY` and
    /// `LANEMAP_TIMEOUT_MS` when set.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<L>(lookup: L) -> Result<Self, ConfigError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(workers) = parse_var(&lookup, ENV_WORKERS)? {
            config.workers = workers;
        }
        if let Some(capacity) = parse_var(&lookup, ENV_QUEUE_CAPACITY)? {
            config.queue_capacity = capacity;
        }
        if let Some(ms) = parse_var(&lookup, ENV_TIMEOUT_MS)? {
            config.timeout = Some(Duration::from_millis(ms));
        }
        Ok(config)
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn validate<E>(&self) -> Result<(), MapError<E>> {
        if self.workers == 0 {
            return Err(MapError::InvalidWorkerCount(self.workers));
        }
        if self.queue_capacity == 0 {
            return Err(MapError::InvalidQueueCapacity);
        }
        Ok(())
    }
}

fn parse_var<T, L>(lookup: &L, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    L: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber { var, value }),
    }
}

/// Runs order-preserving, fail-fast parallel maps with a fixed lane count.
///
/// Holds configuration only; every invocation builds and tears down its own
/// lanes, channels and scope.
#[derive(Debug, Clone, Default)]
pub struct Mapper {
    config: Config,
}

impl Mapper {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Maps `inputs` through `transform` on up to `config.workers` lanes.
    ///
    /// Returns every output in input order, or the first failure observed:
    /// a transform error or panic, the caller cancelling `scope`, or a deadline.
    /// All lanes are stopped and joined before this returns.
    pub async fn map<I, O, E, F, Fut>(
        &self,
        scope: &ExecutionScope,
        inputs: Vec<I>,
        transform: F,
    ) -> Result<Vec<O>, MapError<E>>
    where
        I: Send + 'static,
        O: Send + 'static,
        E: Send + 'static,
        F: Fn(ExecutionScope, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, E>> + Send + 'static,
    {
        let total = inputs.len();
        if total == 0 {
            return Ok(Vec::new());
        }
        self.config.validate()?;

        let lanes = self.config.workers.min(total);
        let span = debug_span!("par_map", items = total, lanes);

        async move {
            let run_scope = scope.child_with_timeout(self.config.timeout);
            let _cancel_on_exit = run_scope.drop_guard();
            if run_scope.is_expired() {
                run_scope.cancel();
            }
            let transform = Arc::new(transform);

            let (outcome_tx, outcome_rx) = mpsc::channel(lanes);
            let mut tasks = JoinSet::new();
            let mut queues = Vec::with_capacity(lanes);

            for lane in 0..lanes {
                let (task_tx, task_rx) = mpsc::channel(self.config.queue_capacity);
                queues.push(task_tx);
                tasks.spawn(
                    run_lane(
                        lane,
                        run_scope.clone(),
                        Arc::clone(&transform),
                        task_rx,
                        outcome_tx.clone(),
                    )
                    .instrument(debug_span!("lane", lane)),
                );
            }
            // Lanes hold the only senders; the collector sees `None` once all are gone.
            drop(outcome_tx);
            drop(transform);

            tasks.spawn(
                dispatch(run_scope.clone(), inputs, queues).instrument(debug_span!("dispatch")),
            );
            if run_scope.deadline().is_some() {
                tasks.spawn(run_scope.clone().cancel_at_deadline());
            }

            debug!("mapping started");
            let result = collect(&run_scope, outcome_rx, &mut tasks, total).await;

            run_scope.cancel();
            tasks.shutdown().await;

            match &result {
                Ok(_) => debug!("mapping finished"),
                Err(err) => debug!(code = err.code(), index = ?err.index(), "mapping aborted"),
            }
            result
        }
        .instrument(span)
        .await
    }

    /// Runs [`Mapper::map`] on a background task.
    ///
    /// The handle can cancel the invocation; dropping the handle cancels it too.
    pub fn spawn<I, O, E, F, Fut>(
        &self,
        scope: &ExecutionScope,
        inputs: Vec<I>,
        transform: F,
    ) -> MapHandle<O, E>
    where
        I: Send + 'static,
        O: Send + 'static,
        E: Send + 'static,
        F: Fn(ExecutionScope, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, E>> + Send + 'static,
    {
        let handle_scope = scope.child();
        let run_scope = handle_scope.clone();
        let mapper = self.clone();
        let join = tokio::spawn(async move { mapper.map(&run_scope, inputs, transform).await });
        MapHandle::new(handle_scope, join)
    }
}

/// Merges lane outcomes into the result buffer until it is full or the run fails.
async fn collect<O, E>(
    scope: &ExecutionScope,
    mut outcomes: mpsc::Receiver<Outcome<O, E>>,
    tasks: &mut JoinSet<()>,
    total: usize,
) -> Result<Vec<O>, MapError<E>>
where
    O: Send + 'static,
    E: Send + 'static,
{
    let mut buffer = ResultBuffer::new(total);
    let stopped = scope.stopped();
    tokio::pin!(stopped);

    while !buffer.is_full() {
        tokio::select! {
            biased;
            reason = &mut stopped => {
                return Err(stop_error(reason));
            }
            outcome = outcomes.recv() => match outcome {
                Some(Outcome { index, result: Ok(value) }) => {
                    buffer.write(index, value);
                }
                Some(Outcome { index, result: Err(err) }) => {
                    debug!(index, code = err.code(), "failing fast");
                    scope.cancel();
                    return Err(err);
                }
                None => {
                    if scope.is_stopped() {
                        return Err(stop_error(scope.stop_reason()));
                    }
                    scope.cancel();
                    if let Some(message) = lane_panic(tasks).await {
                        return Err(MapError::Panic { index: None, message });
                    }
                    return Err(MapError::Incomplete {
                        completed: buffer.completed(),
                        expected: buffer.len(),
                    });
                }
            },
            Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                if let Err(err) = joined {
                    if err.is_panic() {
                        scope.cancel();
                        return Err(MapError::Panic {
                            index: None,
                            message: panic_message(err.into_panic()),
                        });
                    }
                }
            }
        }
    }

    buffer.into_ordered().ok_or(MapError::Incomplete {
        completed: total,
        expected: total,
    })
}

/// Joins what is left after every lane hung up, looking for one that panicked.
async fn lane_panic(tasks: &mut JoinSet<()>) -> Option<String> {
    while let Some(joined) = tasks.join_next().await {
        if let Err(err) = joined {
            if err.is_panic() {
                return Some(panic_message(err.into_panic()));
            }
        }
    }
    None
}

fn stop_error<E>(reason: StopReason) -> MapError<E> {
    match reason {
        StopReason::Cancelled => MapError::Cancelled,
        StopReason::DeadlineExceeded => MapError::DeadlineExceeded,
    }
}

/// Maps `inputs` through `transform` on `workers` concurrent lanes.
///
/// `workers` is clamped to `inputs.len()`; empty input returns an empty
/// vector without spawning anything.
///
/// ```no_run
/// use lanemap::{par_map, ExecutionScope};
///
/// # async fn demo() {
/// let scope = ExecutionScope::new();
/// let double = |_, x: i32| async move { Ok::<_, String>(x * 2) };
/// let doubled = par_map(&scope, 2, double, vec![1, 2, 3]).await.unwrap();
/// assert_eq!(doubled, vec![2, 4, 6]);
/// # }
/// ```
pub async fn par_map<I, O, E, F, Fut>(
    scope: &ExecutionScope,
    workers: usize,
    transform: F,
    inputs: Vec<I>,
) -> Result<Vec<O>, MapError<E>>
where
    I: Send + 'static,
    O: Send + 'static,
    E: Send + 'static,
    F: Fn(ExecutionScope, I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O, E>> + Send + 'static,
{
    Mapper::new(Config::default().with_workers(workers))
        .map(scope, inputs, transform)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn config_from_lookup_overrides_defaults() {
        let config = Config::from_lookup(lookup(&[
            (ENV_WORKERS, "3"),
            (ENV_QUEUE_CAPACITY, " 8 "),
            (ENV_TIMEOUT_MS, "250"),
        ]))
        .unwrap();
        assert_eq!(config.workers, 3);
        assert_eq!(config.queue_capacity, 8);
        assert_eq!(config.timeout, Some(Duration::from_millis(250)));
    }

    #[test]
    fn config_from_lookup_keeps_defaults_when_unset() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        let default = Config::default();
        assert_eq!(config.workers, default.workers);
        assert_eq!(config.queue_capacity, default.queue_capacity);
        assert_eq!(config.timeout, None);
    }

    #[test]
    fn config_from_lookup_rejects_garbage() {
        let err = Config::from_lookup(lookup(&[(ENV_WORKERS, "many")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidNumber {
                var: ENV_WORKERS,
                value: "many".into()
            }
        );
    }

    #[test]
    fn config_from_lookup_rejects_out_of_range() {
        let err = Config::from_lookup(lookup(&[(ENV_WORKERS, "-1")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidNumber { var: ENV_WORKERS, .. }));

        let too_big = format!("{}0", usize::MAX);
        let err =
            Config::from_lookup(lookup(&[(ENV_QUEUE_CAPACITY, too_big.as_str())])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidNumber {
                var: ENV_QUEUE_CAPACITY,
                value: too_big
            }
        );
    }

    #[test]
    fn validate_rejects_zero_sizes() {
        let err = Config::default().with_workers(0).validate::<()>().unwrap_err();
        assert!(matches!(err, MapError::InvalidWorkerCount(0)));

        let err = Config::default()
            .with_queue_capacity(0)
            .validate::<()>()
            .unwrap_err();
        assert!(matches!(err, MapError::InvalidQueueCapacity));
    }

    #[tokio::test]
    async fn collector_sees_lane_panic_outside_transform() {
        let scope = ExecutionScope::new();
        let (_tx, rx) = mpsc::channel::<Outcome<i32, ()>>(1);
        let mut tasks = JoinSet::new();
        tasks.spawn(async { panic!("lane blew up") });

        let err = collect(&scope, rx, &mut tasks, 1).await.unwrap_err();
        match err {
            MapError::Panic { index, message } => {
                assert_eq!(index, None);
                assert_eq!(message, "lane blew up");
            }
            other => panic!("expected panic error, got {other:?}"),
        }
        assert!(scope.is_cancelled());
    }

    #[tokio::test]
    async fn collector_reports_panic_when_lanes_hang_up() {
        let scope = ExecutionScope::new();
        let (tx, rx) = mpsc::channel::<Outcome<i32, ()>>(1);
        let mut tasks = JoinSet::new();
        tasks.spawn(async move {
            let _sender = tx;
            panic!("lane died holding its sender");
        });

        let err = collect(&scope, rx, &mut tasks, 2).await.unwrap_err();
        match err {
            MapError::Panic { index, message } => {
                assert_eq!(index, None);
                assert_eq!(message, "lane died holding its sender");
            }
            other => panic!("expected panic error, got {other:?}"),
        }
        assert!(scope.is_cancelled());
    }

    #[tokio::test]
    async fn collector_reports_incomplete_when_lanes_exit_cleanly() {
        let scope = ExecutionScope::new();
        let (tx, rx) = mpsc::channel::<Outcome<i32, ()>>(1);
        let mut tasks = JoinSet::new();
        tasks.spawn(async move {
            let _ = tx.send(Outcome { index: 0, result: Ok(7) }).await;
        });

        let err = collect(&scope, rx, &mut tasks, 2).await.unwrap_err();
        assert!(matches!(err, MapError::Incomplete { completed: 1, expected: 2 }));
    }
}
