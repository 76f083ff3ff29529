//! Task executors used for background refresh.

use crossbeam_channel::{unbounded, Receiver, Sender};
use once_cell::sync::Lazy;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

/// A unit of background work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Runs background refresh tasks.
///
/// The cache hands every refresh to its executor and returns the stale value
/// to the reader right away, so `execute` must not be expected to block the
/// caller. [`SameThreadExecutor`] is the exception and exists for tests.
pub trait Executor: Send + Sync {
    fn execute(&self, task: Task);
}

/// Default number of refresh workers.
pub const DEFAULT_REFRESH_WORKERS: usize = 4;

/// Fixed pool of named worker threads fed through a channel.
///
/// Tasks queue up when every worker is busy, so a burst of stale reads never
/// starts more than `workers` threads. Workers exit once every clone of the
/// executor is dropped.
#[derive(Clone, Debug)]
pub struct ThreadExecutor {
    sender: Sender<Task>,
    workers: usize,
}

impl ThreadExecutor {
    /// Starts `workers` threads (at least one).
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        let (sender, receiver) = unbounded::<Task>();
        let mut started = 0;
        for index in 0..workers {
            let receiver = receiver.clone();
            let spawned = thread::Builder::new()
                .name("strata-refresh".to_string())
                .spawn(move || run_worker(receiver));
            match spawned {
                Ok(_) => started += 1,
                Err(err) => tracing::error!(worker = index, error = %err, "failed to spawn refresh worker"),
            }
        }
        Self {
            sender,
            workers: started,
        }
    }

    /// Number of running workers.
    pub fn workers(&self) -> usize {
        self.workers
    }
}

impl Default for ThreadExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_REFRESH_WORKERS)
    }
}

fn run_worker(receiver: Receiver<Task>) {
    for task in receiver.iter() {
        if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
            tracing::error!("refresh task panicked");
        }
    }
}

impl Executor for ThreadExecutor {
    fn execute(&self, task: Task) {
        if self.workers == 0 || self.sender.send(task).is_err() {
            tracing::error!("no refresh worker available, task dropped");
        }
    }
}

/// Runs tasks inline on the calling thread.
#[derive(Clone, Copy, Debug, Default)]
pub struct SameThreadExecutor;

impl Executor for SameThreadExecutor {
    fn execute(&self, task: Task) {
        task()
    }
}

/// Runs tasks on a tokio runtime's blocking pool.
#[cfg(feature = "tokio")]
#[derive(Clone, Debug)]
pub struct TokioExecutor {
    handle: tokio::runtime::Handle,
}

#[cfg(feature = "tokio")]
impl TokioExecutor {
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Executor bound to the runtime of the current context, if any.
    pub fn try_current() -> Option<Self> {
        tokio::runtime::Handle::try_current().ok().map(Self::new)
    }
}

#[cfg(feature = "tokio")]
impl Executor for TokioExecutor {
    fn execute(&self, task: Task) {
        // Fire-and-forget.
        let _ = self.handle.spawn_blocking(task);
    }
}

impl<E: Executor + ?Sized> Executor for Arc<E> {
    fn execute(&self, task: Task) {
        (**self).execute(task)
    }
}

impl fmt::Debug for dyn Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Executor")
    }
}

static DEFAULT_EXECUTOR: Lazy<Arc<dyn Executor>> = Lazy::new(|| Arc::new(ThreadExecutor::default()));

/// The executor used by caches built without an explicit one.
pub fn default_executor() -> Arc<dyn Executor> {
    Arc::clone(&DEFAULT_EXECUTOR)
}
