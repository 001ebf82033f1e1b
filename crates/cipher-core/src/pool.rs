//! The worker pool dispatcher: a single logical scheduler that owns every
//! piece of pool state exclusively and is driven by one `tokio::spawn`-ed
//! actor task reading from three kinds of events — `submit`, worker
//! replies, and timers — in a `tokio::select!` loop that never blocks on a
//! worker's response.
//!
//! Scheduling is LIFO over idle workers (most-recently-released first, for
//! cache affinity) and FIFO over the task queue. Because this whole module
//! is a single consumer of its own command channel, the "coalesce one
//! dispatch pass per tick" latch the source needs is redundant here — each
//! iteration of the actor loop already runs at most one scheduling pass.

use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use tokio::sync::{mpsc, oneshot};
use tokio::time::sleep_until;
use tokio_util::time::delay_queue::Key as DelayKey;
use tokio_util::time::DelayQueue;

use crate::queue::TaskQueue;
use crate::task::Task;
use crate::worker::{self, PreprocessFn, WorkerEvent, WorkerHandle, WorkerId};

/// Errors the pool surfaces to a submitter. Cheap to clone: `latch_fatal`
/// rejects every queued task with the same cause.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PoolError {
    #[error("task aged out of the queue before it could be dispatched")]
    QueueAgeExceeded,
    #[error("failed to dispatch the task to a worker")]
    DispatchFailed,
    #[error("the worker crashed while processing the task")]
    WorkerCrashed,
    #[error("the worker exceeded the in-flight timeout")]
    WorkerTimeout,
    #[error("worker reported an error: {message}")]
    WorkerReportedError { message: String, stack: Option<String> },
    /// Reserved for an out-of-process worker transport where a reply can
    /// arrive in a shape the dispatcher doesn't recognize. Unreachable with
    /// the in-process closure-based worker this crate ships.
    #[error("worker protocol error: {0}")]
    WorkerProtocolError(String),
    #[error("pool has latched a fatal error: {0}")]
    PoolFatal(String),
}

/// Immutable after construction.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub concurrency: usize,
    pub messages_limit: u32,
    pub max_task_age: Duration,
    pub in_flight_timeout: Duration,
    pub recovery_backoff_base: Duration,
    pub recovery_backoff_max: Duration,
    pub recovery_failure_threshold: u32,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            concurrency: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            messages_limit: 10_000,
            max_task_age: Duration::from_secs(30 * 60),
            in_flight_timeout: Duration::from_secs(60 * 60),
            recovery_backoff_base: Duration::from_millis(25),
            recovery_backoff_max: Duration::from_secs(5),
            recovery_failure_threshold: 5,
        }
    }
}

/// A snapshot of pool state, useful for tests and introspection endpoints.
#[derive(Debug, Clone)]
pub struct PoolSnapshot {
    pub worker_count: usize,
    pub idle_count: usize,
    pub in_flight_count: usize,
    pub queue_length: usize,
    pub quarantined_count: usize,
    pub recovery_failures: u32,
    pub is_fatal: bool,
}

type WorkerSpawner =
    Arc<dyn Fn(u32, PreprocessFn, mpsc::UnboundedSender<WorkerEvent>) -> io::Result<WorkerHandle> + Send + Sync>;

enum Command {
    Submit(Task),
    Snapshot(oneshot::Sender<PoolSnapshot>),
}

/// Handle to the pool. Cheap to clone; every clone talks to the same
/// dispatcher actor task.
#[derive(Clone)]
pub struct WorkerPool {
    command_tx: mpsc::UnboundedSender<Command>,
}

impl WorkerPool {
    pub fn new(config: PoolConfig, preprocess: PreprocessFn) -> Self {
        Self::with_spawner(config, preprocess, Arc::new(worker::spawn))
    }

    /// Constructs a pool with a caller-supplied worker spawner. Exists so
    /// tests can inject spawn failures to exercise the recovery state
    /// machine without relying on real OS thread exhaustion.
    pub fn with_spawner(config: PoolConfig, preprocess: PreprocessFn, spawner: WorkerSpawner) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let state = DispatcherState {
            config,
            preprocess,
            spawner,
            events_tx,
            workers: HashMap::new(),
            idle: Vec::new(),
            queue: TaskQueue::new(),
            in_flight: HashMap::new(),
            quarantined: HashSet::new(),
            timeouts: DelayQueue::new(),
            timeout_keys: HashMap::new(),
            pool_fatal: None,
            recovery_failures: 0,
            backoff: Duration::ZERO,
            recovery_deadline: None,
        };

        tokio::spawn(run_dispatcher(state, command_rx, events_rx));

        Self { command_tx }
    }

    /// Submits one input and awaits its output or typed error.
    pub async fn submit(&self, input: String) -> Result<String, PoolError> {
        let (settle_tx, settle_rx) = oneshot::channel();
        let task = Task::new(input, settle_tx);
        if self.command_tx.send(Command::Submit(task)).is_err() {
            return Err(PoolError::PoolFatal("dispatcher task is no longer running".to_string()));
        }
        match settle_rx.await {
            Ok(result) => result,
            Err(_) => Err(PoolError::PoolFatal(
                "dispatcher dropped the task without settling it".to_string(),
            )),
        }
    }

    /// Returns a point-in-time snapshot of pool state.
    pub async fn snapshot(&self) -> PoolSnapshot {
        let (tx, rx) = oneshot::channel();
        if self.command_tx.send(Command::Snapshot(tx)).is_err() {
            return PoolSnapshot {
                worker_count: 0,
                idle_count: 0,
                in_flight_count: 0,
                queue_length: 0,
                quarantined_count: 0,
                recovery_failures: 0,
                is_fatal: true,
            };
        }
        rx.await.unwrap_or(PoolSnapshot {
            worker_count: 0,
            idle_count: 0,
            in_flight_count: 0,
            queue_length: 0,
            quarantined_count: 0,
            recovery_failures: 0,
            is_fatal: true,
        })
    }
}

struct InFlightRecord {
    task: Task,
}

struct DispatcherState {
    config: PoolConfig,
    preprocess: PreprocessFn,
    spawner: WorkerSpawner,
    events_tx: mpsc::UnboundedSender<WorkerEvent>,
    workers: HashMap<WorkerId, WorkerHandle>,
    idle: Vec<WorkerId>,
    queue: TaskQueue,
    in_flight: HashMap<WorkerId, InFlightRecord>,
    quarantined: HashSet<WorkerId>,
    timeouts: DelayQueue<WorkerId>,
    timeout_keys: HashMap<WorkerId, DelayKey>,
    pool_fatal: Option<PoolError>,
    recovery_failures: u32,
    backoff: Duration,
    recovery_deadline: Option<Instant>,
}

async fn run_dispatcher(
    mut state: DispatcherState,
    mut commands: mpsc::UnboundedReceiver<Command>,
    mut events: mpsc::UnboundedReceiver<WorkerEvent>,
) {
    state.schedule();

    loop {
        tokio::select! {
            maybe_cmd = commands.recv() => {
                match maybe_cmd {
                    Some(Command::Submit(task)) => state.handle_submit(task),
                    Some(Command::Snapshot(reply)) => { let _ = reply.send(state.snapshot()); }
                    None => break,
                }
            }
            maybe_event = events.recv() => {
                if let Some(event) = maybe_event {
                    state.handle_worker_event(event);
                }
            }
            Some(Ok(expired)) = state.timeouts.next() => {
                state.handle_in_flight_timeout(expired.into_inner());
            }
            _ = sleep_until_opt(state.recovery_deadline), if state.recovery_deadline.is_some() => {
                state.recovery_deadline = None;
                state.schedule();
            }
        }
    }

    state.shutdown_all();
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline.into()).await,
        None => std::future::pending().await,
    }
}

impl DispatcherState {
    fn snapshot(&self) -> PoolSnapshot {
        PoolSnapshot {
            worker_count: self.workers.len(),
            idle_count: self.idle.len(),
            in_flight_count: self.in_flight.len(),
            queue_length: self.queue.length(),
            quarantined_count: self.quarantined.len(),
            recovery_failures: self.recovery_failures,
            is_fatal: self.pool_fatal.is_some(),
        }
    }

    fn handle_submit(&mut self, task: Task) {
        if let Some(cause) = &self.pool_fatal {
            task.reject(cause.clone());
            return;
        }
        self.queue.push(task, Instant::now());
        self.schedule();
    }

    fn handle_worker_event(&mut self, event: WorkerEvent) {
        match event {
            WorkerEvent::Success { id, output } => self.on_success(id, output),
            WorkerEvent::ReportedError { id, message } => self.on_reported_error(id, message),
            WorkerEvent::Crashed { id } => self.on_crashed(id),
        }
    }

    fn handle_in_flight_timeout(&mut self, id: WorkerId) {
        self.timeout_keys.remove(&id);
        if let Some(record) = self.in_flight.remove(&id) {
            record.task.reject(PoolError::WorkerTimeout);
        }
        tracing::warn!(worker_id = ?id, "in-flight timeout fired, retiring worker");
        self.retire_worker(id);
        self.schedule();
    }

    fn on_success(&mut self, id: WorkerId, output: String) {
        match self.take_in_flight(id) {
            Some(record) => record.task.resolve(output),
            None => {
                tracing::warn!(worker_id = ?id, "stray success message, no in-flight task tracked");
                self.retire_worker(id);
                self.schedule();
                return;
            }
        }
        self.release_worker(id);
    }

    fn on_reported_error(&mut self, id: WorkerId, message: String) {
        match self.take_in_flight(id) {
            Some(record) => record.task.reject(PoolError::WorkerReportedError { message, stack: None }),
            None => {
                tracing::warn!(worker_id = ?id, "stray error message, no in-flight task tracked");
                self.retire_worker(id);
                self.schedule();
                return;
            }
        }
        if let Some(worker) = self.workers.get_mut(&id) {
            worker.messages_remaining = 0;
        }
        self.release_worker(id);
    }

    fn on_crashed(&mut self, id: WorkerId) {
        if let Some(record) = self.take_in_flight(id) {
            record.task.reject(PoolError::WorkerCrashed);
        }
        tracing::warn!(worker_id = ?id, "worker crashed, retiring and scheduling refill");
        self.retire_worker(id);
        self.schedule();
    }

    /// Pops the in-flight record for `id`, cancelling its timeout timer.
    fn take_in_flight(&mut self, id: WorkerId) -> Option<InFlightRecord> {
        if let Some(key) = self.timeout_keys.remove(&id) {
            self.timeouts.remove(&key);
        }
        self.in_flight.remove(&id)
    }

    /// Returns a just-completed worker to idle, or retires it if quarantined
    /// or out of budget. Always followed by a scheduling pass: a queued
    /// task may have been waiting on exactly this worker.
    fn release_worker(&mut self, id: WorkerId) {
        if self.quarantined.contains(&id) {
            self.retire_worker(id);
        } else if let Some(worker) = self.workers.get(&id) {
            if worker.messages_remaining > 0 {
                self.idle.push(id);
            } else {
                self.retire_worker(id);
            }
        }
        self.schedule();
    }

    /// Removes a worker from every tracking set and asks its thread to
    /// stop. Never touches `in_flight` — callers must have already taken
    /// (and settled) any in-flight record before retiring the worker, so a
    /// task is never silently dropped.
    fn retire_worker(&mut self, id: WorkerId) {
        if let Some(worker) = self.workers.remove(&id) {
            worker.shutdown();
        }
        self.quarantined.remove(&id);
        self.idle.retain(|w| *w != id);
        if let Some(key) = self.timeout_keys.remove(&id) {
            self.timeouts.remove(&key);
        }
    }

    fn shutdown_all(&mut self) {
        let ids: Vec<WorkerId> = self.workers.keys().copied().collect();
        for id in ids {
            if let Some(record) = self.in_flight.remove(&id) {
                record.task.reject(PoolError::PoolFatal("pool is shutting down".to_string()));
            }
            self.retire_worker(id);
        }
        for entry in self.queue.drain() {
            entry
                .task
                .reject(PoolError::PoolFatal("pool is shutting down".to_string()));
        }
    }

    /// Ensures `|workers| == CONCURRENCY`, spawning replacements as needed.
    fn spawn_missing(&mut self) -> io::Result<()> {
        while self.workers.len() < self.config.concurrency {
            let handle = (self.spawner)(
                self.config.messages_limit,
                Arc::clone(&self.preprocess),
                self.events_tx.clone(),
            )?;
            let id = handle.id;
            self.workers.insert(id, handle);
            self.idle.push(id);
        }
        Ok(())
    }

    /// One scheduling pass: top off the worker pool, then dispatch queued
    /// tasks onto idle workers until either runs dry. Ends with a second
    /// top-off in case budget exhaustion or quarantine retired workers
    /// mid-pass.
    fn run_pass(&mut self) -> io::Result<()> {
        self.spawn_missing()?;

        while !self.queue.is_empty() {
            let Some(worker_id) = self.idle.pop() else {
                break;
            };

            let budget_exhausted = self
                .workers
                .get(&worker_id)
                .map(|w| w.messages_remaining == 0)
                .unwrap_or(true);
            if budget_exhausted || self.quarantined.contains(&worker_id) {
                self.retire_worker(worker_id);
                continue;
            }

            let head_aged_out = self
                .queue
                .peek()
                .map(|entry| entry.enqueued_at.elapsed() > self.config.max_task_age)
                .unwrap_or(false);
            if head_aged_out {
                if let Some(entry) = self.queue.shift() {
                    entry.task.reject(PoolError::QueueAgeExceeded);
                }
                self.idle.push(worker_id);
                continue;
            }

            let Some(entry) = self.queue.shift() else {
                self.idle.push(worker_id);
                break;
            };

            let worker = self.workers.get_mut(&worker_id).expect("idle worker must be tracked");
            worker.messages_remaining -= 1;

            match worker.dispatch(entry.task.input.clone()) {
                Ok(()) => {
                    let key = self.timeouts.insert(worker_id, self.config.in_flight_timeout);
                    self.timeout_keys.insert(worker_id, key);
                    self.in_flight.insert(worker_id, InFlightRecord { task: entry.task });
                }
                Err(()) => {
                    if let Some(worker) = self.workers.get_mut(&worker_id) {
                        worker.messages_remaining = 0;
                    }
                    entry.task.reject(PoolError::DispatchFailed);
                    self.retire_worker(worker_id);
                }
            }
        }

        self.spawn_missing()
    }

    fn schedule(&mut self) {
        if self.pool_fatal.is_some() || self.recovery_deadline.is_some() {
            return;
        }
        match self.run_pass() {
            Ok(()) => {
                if self.recovery_failures > 0 {
                    self.recovery_failures = 0;
                    self.backoff = Duration::ZERO;
                }
            }
            Err(err) => self.enter_recovery(err),
        }
    }

    fn enter_recovery(&mut self, cause: io::Error) {
        self.recovery_failures += 1;
        tracing::warn!(
            failures = self.recovery_failures,
            error = %cause,
            "scheduling pass failed, entering recovery"
        );

        let tracked: Vec<WorkerId> = self.workers.keys().copied().collect();
        for id in &tracked {
            if let Some(worker) = self.workers.get_mut(id) {
                worker.messages_remaining = 0;
            }
            self.quarantined.insert(*id);
        }
        let quarantined_now: HashSet<WorkerId> = tracked.into_iter().collect();

        let idle_now: Vec<WorkerId> = self.idle.clone();
        for id in idle_now {
            if quarantined_now.contains(&id) {
                self.retire_worker(id);
            }
        }

        // Cross-check: anything in-flight but missing from the freshly
        // quarantined set is anomalous (e.g. it was retired out from under
        // us between passes). Reject it with the recovery cause.
        let in_flight_ids: Vec<WorkerId> = self.in_flight.keys().copied().collect();
        for id in in_flight_ids {
            if !quarantined_now.contains(&id) {
                if let Some(record) = self.take_in_flight(id) {
                    record
                        .task
                        .reject(PoolError::PoolFatal(format!("recovery anomaly: {cause}")));
                }
                self.retire_worker(id);
            }
        }

        if self.recovery_failures >= self.config.recovery_failure_threshold {
            self.latch_fatal(PoolError::PoolFatal(format!(
                "recovery failed {} consecutive times: {cause}",
                self.recovery_failures
            )));
            return;
        }

        let base = if self.backoff.is_zero() {
            self.config.recovery_backoff_base
        } else {
            self.backoff
        };
        let backoff = base.min(self.config.recovery_backoff_max);
        self.recovery_deadline = Some(Instant::now() + backoff);
        self.backoff = (backoff * 2).min(self.config.recovery_backoff_max);
    }

    fn latch_fatal(&mut self, cause: PoolError) {
        tracing::error!(error = %cause, "pool latched a fatal error");
        self.pool_fatal = Some(cause.clone());
        for entry in self.queue.drain() {
            entry.task.reject(cause.clone());
        }
    }
}
