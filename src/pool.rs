use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use rayon::iter::{IntoParallelIterator, ParallelIterator};
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::error::{PoolError, TaskResult};

/// Handle to the worker pool shared by every parallel queue of a process.
///
/// The pool is sized once when it is created. Cloning the handle does not
/// spawn new workers.
#[derive(Clone)]
pub struct WorkerPool {
    pool: Arc<ThreadPool>,
}

impl WorkerPool {
    /// Creates a pool with `threads` workers, or one per CPU when `None`.
    pub fn new(threads: Option<usize>) -> Result<Self, PoolError> {
        let mut builder = ThreadPoolBuilder::new().thread_name(|i| format!("bakery-worker-{i}"));

        if let Some(threads) = threads {
            builder = builder.num_threads(threads);
        }

        Ok(Self {
            pool: Arc::new(builder.build()?),
        })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Runs every unit on the pool and blocks until all of them complete.
    ///
    /// Results are returned in the order the units were submitted. The first
    /// failure is returned instead, and a panicking unit counts as a failure.
    pub fn submit_batch<T, F>(&self, units: Vec<F>) -> TaskResult<Vec<T>>
    where
        T: Send,
        F: FnOnce() -> TaskResult<T> + Send,
    {
        self.pool.install(|| {
            units
                .into_par_iter()
                .map(|unit| match catch_unwind(AssertUnwindSafe(unit)) {
                    Ok(result) => result,
                    Err(panic) => Err(PoolError::Panic(panic_message(panic.as_ref())).into()),
                })
                .collect::<TaskResult<Vec<_>>>()
        })
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "WorkerPool({})", self.threads())
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        String::from("unknown payload")
    }
}
