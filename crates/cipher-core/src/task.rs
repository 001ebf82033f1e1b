//! A single unit of pool work: one input string, settled exactly once with
//! either an output string or a typed error.

use tokio::sync::oneshot;

use crate::pool::PoolError;

/// Created on `submit`, destroyed after the first settle. `input` is
/// immutable; `resolve`/`reject` are the two ways to settle it, modeled as
/// a single oneshot sender carrying a `Result` so "settled exactly once" is
/// enforced by the channel itself (a second send is simply dropped).
pub struct Task {
    pub input: String,
    settle: oneshot::Sender<Result<String, PoolError>>,
}

impl Task {
    pub fn new(input: String, settle: oneshot::Sender<Result<String, PoolError>>) -> Self {
        Self { input, settle }
    }

    /// Settles the task successfully. Consumes the task.
    pub fn resolve(self, output: String) {
        // A throwing consumer on the receiving end cannot corrupt pool state:
        // `send` only fails if the receiver was already dropped, which we
        // ignore here exactly as we ignore it in `reject`.
        let _ = self.settle.send(Ok(output));
    }

    /// Settles the task with an error. Consumes the task.
    pub fn reject(self, error: PoolError) {
        let _ = self.settle.send(Err(error));
    }
}
