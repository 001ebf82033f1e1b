//! An isolated evaluation context: one dedicated OS thread that runs the
//! (opaque, externally supplied) preprocessor on one string at a time.
//!
//! # Isolation choice
//!
//! Process-per-worker buys free crash isolation at a higher spawn cost;
//! thread-with-watchdog is cheaper to spawn and sufficient here because the
//! preprocessor is CPU-bound string work and the in-flight ceiling is
//! generous (tens of minutes). `std::panic::catch_unwind` turns an ordinary
//! panic into a `Crashed` event instead of taking down the host process, and
//! a worker that never returns (an infinite loop in the preprocessor) is
//! simply abandoned — its thread leaks harmlessly until process exit,
//! exactly as the in-flight timeout already tolerates.
//!
//! A worker thread exits for good after it reports `Crashed` or receives
//! `Shutdown` — it is never reused past that point, matching the contract
//! that a retired worker is never referenced again.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;

/// The opaque `Preprocess(src) -> prepared` collaborator. May run
/// arbitrarily long or panic; neither is this module's concern to prevent,
/// only to contain.
pub type PreprocessFn = Arc<dyn Fn(&str) -> Result<String, String> + Send + Sync>;

/// Stable, process-local worker identity. Plain integer IDs (arena-plus-index)
/// avoid back-pointers from worker to pool — the dispatcher owns the
/// worker/in-flight-record relationship, never the other way around.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(u64);

static NEXT_WORKER_ID: AtomicU64 = AtomicU64::new(0);

impl WorkerId {
    fn next() -> Self {
        Self(NEXT_WORKER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

enum WorkerCommand {
    Run(String),
    Shutdown,
}

/// Messages a worker thread reports back to the dispatcher.
pub enum WorkerEvent {
    Success { id: WorkerId, output: String },
    ReportedError { id: WorkerId, message: String },
    Crashed { id: WorkerId },
}

/// The dispatcher's handle to a spawned worker thread. Budget fields are
/// managed by the pool; the handle itself only knows how to send one run
/// request or a shutdown.
pub struct WorkerHandle {
    pub id: WorkerId,
    command_tx: std_mpsc::Sender<WorkerCommand>,
    pub messages_limit: u32,
    pub messages_remaining: u32,
}

impl WorkerHandle {
    /// Sends one input to the worker thread. Returns `Err` if the thread is
    /// already gone (send on a disconnected channel) — the caller treats
    /// this as `DispatchFailed`.
    pub fn dispatch(&self, input: String) -> Result<(), ()> {
        self.command_tx
            .send(WorkerCommand::Run(input))
            .map_err(|_| ())
    }

    /// Asks the thread to stop accepting further work. Best-effort: if the
    /// thread is already gone this is a no-op, matching "terminate failures
    /// are swallowed, worker may already be gone".
    pub fn shutdown(&self) {
        let _ = self.command_tx.send(WorkerCommand::Shutdown);
    }
}

/// Spawns a new worker thread with the given message budget.
///
/// `events` is shared by every worker in the pool; events carry the
/// originating `WorkerId` so the dispatcher can look up the in-flight
/// record (or discover it has none, i.e. a stray message).
///
/// Returns `Err` if the OS refuses to create the thread (e.g. resource
/// exhaustion) — the dispatcher treats this as a scheduling-pass failure
/// and enters the recovery state machine rather than panicking.
pub fn spawn(
    messages_limit: u32,
    preprocess: PreprocessFn,
    events: UnboundedSender<WorkerEvent>,
) -> std::io::Result<WorkerHandle> {
    let id = WorkerId::next();
    let (command_tx, command_rx) = std_mpsc::channel::<WorkerCommand>();

    std::thread::Builder::new()
        .name(format!("cipher-worker-{}", id.0))
        .spawn(move || worker_loop(id, command_rx, preprocess, events))?;

    Ok(WorkerHandle {
        id,
        command_tx,
        messages_limit,
        messages_remaining: messages_limit,
    })
}

fn worker_loop(
    id: WorkerId,
    command_rx: std_mpsc::Receiver<WorkerCommand>,
    preprocess: PreprocessFn,
    events: UnboundedSender<WorkerEvent>,
) {
    loop {
        let command = match command_rx.recv() {
            Ok(command) => command,
            Err(_) => return, // dispatcher dropped its sender; nothing left to do.
        };

        let input = match command {
            WorkerCommand::Run(input) => input,
            WorkerCommand::Shutdown => return,
        };

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| preprocess(&input)));

        let event = match outcome {
            Ok(Ok(output)) => WorkerEvent::Success { id, output },
            Ok(Err(message)) => WorkerEvent::ReportedError { id, message },
            Err(_panic) => {
                let _ = events.send(WorkerEvent::Crashed { id });
                // A worker that has panicked is never reused; exit for good.
                return;
            }
        };

        if events.send(event).is_err() {
            // Dispatcher is gone (process shutting down). Nothing more to do.
            return;
        }
    }
}

/// Builds a handle to a worker that is already gone: its channel receiver
/// is dropped without ever spawning a thread, so `dispatch` fails
/// immediately. Lets pool-level tests exercise `DispatchFailed` without
/// reaching into this module's private fields.
#[cfg(test)]
pub(crate) fn spawn_dead(messages_limit: u32) -> WorkerHandle {
    let id = WorkerId::next();
    let (command_tx, command_rx) = std_mpsc::channel::<WorkerCommand>();
    drop(command_rx);
    WorkerHandle {
        id,
        command_tx,
        messages_limit,
        messages_remaining: messages_limit,
    }
}
