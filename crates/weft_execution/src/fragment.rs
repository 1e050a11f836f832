//! Worker-local plan fragments and the threads that drive them.
//!
//! A fragment is one root operator plus its subtree. One thread drives one
//! fragment's pull loop to completion; multiple fragments run concurrently
//! on the executor's thread pool, each with its own operator tree. Cleanup
//! of the whole subtree is guaranteed on every exit path, including errors
//! and cancellation, so channels and connections are never leaked.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::Arc;

use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};
use weft_error::{Result, WeftError};

use crate::env::ExecEnv;
use crate::operators::{BoxedOperator, ExecState, Operator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FragmentId(u64);

impl FragmentId {
    pub const fn new(id: u64) -> Self {
        FragmentId(id)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for FragmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fragment({})", self.0)
    }
}

/// Cooperative cancellation flag shared between a driving thread and
/// whoever wants to interrupt it.
///
/// A cancelled blocked pull surfaces as a stream error rather than a silent
/// stop, so the driver still runs cleanup.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// How a fragment round ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentOutcome {
    /// The root reached EOS; the fragment is done.
    Completed,
    /// The root reached EOI; the plan may rewind and run another round.
    IterEnded,
}

/// One worker-local instance of (part of) a distributed plan.
#[derive(Debug)]
pub struct Fragment {
    id: FragmentId,
    root: BoxedOperator,
}

impl Fragment {
    pub fn new(id: FragmentId, root: BoxedOperator) -> Self {
        Fragment { id, root }
    }

    pub fn id(&self) -> FragmentId {
        self.id
    }

    /// Drive one round: open on first use, then pull until EOS or EOI.
    ///
    /// Does not clean up; callers either continue with
    /// [`rewind`](Self::rewind) + another round or call
    /// [`finish`](Self::finish).
    pub fn run_round(&mut self, env: &ExecEnv) -> Result<FragmentOutcome> {
        if self.root.base().state() == ExecState::Created {
            self.root.open(env)?;
        }
        loop {
            if env.cancel_token().is_cancelled() {
                return Err(WeftError::cancelled(format!("{} was interrupted", self.id)));
            }
            let batch = self.root.next()?;
            match batch {
                Some(_) => {
                    // Root operators sink their input; stray batches are
                    // dropped.
                    trace!(id = %self.id, "root emitted a batch, ignoring");
                }
                None => {
                    if self.root.eoi() {
                        debug!(id = %self.id, "fragment round ended");
                        return Ok(FragmentOutcome::IterEnded);
                    }
                    debug!(id = %self.id, "fragment completed");
                    return Ok(FragmentOutcome::Completed);
                }
            }
        }
    }

    /// Reset the tree for the next round after [`FragmentOutcome::IterEnded`].
    pub fn rewind(&mut self, env: &ExecEnv) -> Result<()> {
        self.root.rewind(env)
    }

    /// Clean up the whole subtree.
    pub fn finish(&mut self) -> Result<()> {
        self.root.cleanup()
    }

    /// Drive a single-round fragment to completion with guaranteed cleanup.
    pub fn run(mut self, env: &ExecEnv) -> Result<FragmentOutcome> {
        let outcome = self.run_round(env);
        let cleaned = self.finish();
        match (outcome, cleaned) {
            (Err(err), _) => Err(err),
            (Ok(_), Err(err)) => Err(err),
            (Ok(outcome), Ok(())) => Ok(outcome),
        }
    }
}

/// Spawns fragments on a shared worker thread pool.
#[derive(Clone)]
pub struct FragmentExecutor {
    pool: Arc<ThreadPool>,
}

impl fmt::Debug for FragmentExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FragmentExecutor")
            .field("num_threads", &self.pool.current_num_threads())
            .finish_non_exhaustive()
    }
}

impl FragmentExecutor {
    pub fn try_new() -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .thread_name(|idx| format!("weft-worker-{idx}"))
            .build()
            .map_err(|e| WeftError::with_source("Failed to build worker thread pool", Box::new(e)))?;
        Ok(FragmentExecutor {
            pool: Arc::new(pool),
        })
    }

    /// Run a fragment on the pool. The returned handle joins on the outcome
    /// and can cancel the fragment through its environment's token.
    pub fn spawn(&self, fragment: Fragment, env: ExecEnv) -> FragmentHandle {
        let id = fragment.id();
        let cancel = env.cancel_token().clone();
        let (tx, rx): (Sender<Result<FragmentOutcome>>, Receiver<_>) = std::sync::mpsc::channel();

        debug!(%id, "spawning fragment");
        self.pool.spawn(move || {
            let outcome = fragment.run(&env);
            let _ = tx.send(outcome);
        });

        FragmentHandle { id, cancel, rx }
    }
}

pub struct FragmentHandle {
    id: FragmentId,
    cancel: CancelToken,
    rx: Receiver<Result<FragmentOutcome>>,
}

impl fmt::Debug for FragmentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FragmentHandle")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl FragmentHandle {
    pub fn id(&self) -> FragmentId {
        self.id
    }

    /// Ask the fragment to stop at its next pull.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Block until the fragment reports its outcome.
    pub fn join(self) -> Result<FragmentOutcome> {
        self.rx
            .recv()
            .map_err(|_| WeftError::new(format!("{} exited without reporting an outcome", self.id)))?
    }
}
