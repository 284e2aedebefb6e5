//! Actionable work and the capabilities attached to it.
//!
//! Every unit of work in a build is a [`Task`]. The set of task kinds is
//! closed: a deferred function call, a sequential [`TaskQueue`], a
//! [`ParallelTaskQueue`], or a [`FileTask`] bound to an artifact on disk.
//! Other parts of the engine never probe for methods; they match on the
//! variant or go through one of the capability traits below.
//!
//! * [`Actionable`]: `is_done`, `run`, `result`.
//! * [`Cleanable`]: `needs_cleaning`, `clean`.
//! * [`Interpolatable`]: expands into command line arguments.
//! * [`Breakable`]: exposes the member tasks of a composite task.

mod queue;

use std::fmt::Debug;
use std::sync::{Arc, OnceLock};

use crate::core::Resource;
use crate::error::{CleanupError, TaskResult, WorkflowError};
use crate::file::{File, FileTask};
use crate::pool::WorkerPool;

pub use crate::task::queue::{ParallelTaskQueue, TaskQueue};

/// Something that can be run to produce a [`Resource`].
pub trait Actionable: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the work is already complete and `run` can be skipped.
    fn is_done(&self) -> bool;

    fn run(&self) -> TaskResult<Resource>;

    /// The value of the last completed run, if any.
    fn result(&self) -> Option<Resource>;
}

/// An artifact that can be reclaimed.
pub trait Cleanable: Send + Sync {
    /// Whether the artifact currently exists and should be removed.
    ///
    /// Directories are only reported when `recursive` is set, otherwise the
    /// check fails with [`CleanupError::Directory`].
    fn needs_cleaning(&self, recursive: bool) -> Result<bool, CleanupError>;

    fn clean(&self) -> Result<(), CleanupError>;
}

/// A value that expands into a list of resources when placed on a command line.
pub trait Interpolatable {
    fn interp(&self) -> Result<Vec<Resource>, WorkflowError>;
}

/// A composite task that can be broken down into its members.
pub trait Breakable {
    fn breakdown(&self) -> &[Task];
}

type CallFn = Box<dyn Fn() -> TaskResult<Resource> + Send + Sync>;

/// A function call deferred until the task is run.
pub struct CallTask {
    name: String,
    func: CallFn,
    result: OnceLock<Resource>,
}

impl CallTask {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn() -> TaskResult<Resource> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Box::new(func),
            result: OnceLock::new(),
        }
    }
}

impl Actionable for CallTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_done(&self) -> bool {
        self.result.get().is_some()
    }

    fn run(&self) -> TaskResult<Resource> {
        if let Some(value) = self.result.get() {
            return Ok(value.clone());
        }

        let value = (self.func)()?;
        Ok(self.result.get_or_init(|| value).clone())
    }

    fn result(&self) -> Option<Resource> {
        self.result.get().cloned()
    }
}

/// A unit of work in the build.
///
/// Cloning a `Task` is cheap and yields a handle to the same underlying work,
/// so a task referenced by several consumers still runs at most once.
#[derive(Clone)]
pub enum Task {
    Call(Arc<CallTask>),
    Queue(Arc<TaskQueue>),
    Parallel(Arc<ParallelTaskQueue>),
    File(Arc<FileTask>),
}

impl Task {
    /// Defers a call to `func` until the task is run.
    pub fn call<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn() -> TaskResult<Resource> + Send + Sync + 'static,
    {
        Task::Call(Arc::new(CallTask::new(name, func)))
    }

    /// Runs `tasks` one after another.
    pub fn queue(name: impl Into<String>, tasks: Vec<Task>) -> Self {
        Task::Queue(Arc::new(TaskQueue::new(name, tasks)))
    }

    /// Runs `tasks` on the worker pool.
    pub fn parallel(name: impl Into<String>, pool: WorkerPool, tasks: Vec<Task>) -> Self {
        Task::Parallel(Arc::new(ParallelTaskQueue::new(name, pool, tasks)))
    }

    /// Binds `action` to the existence of `file`.
    pub fn file<F>(file: impl Into<File>, action: F) -> Self
    where
        F: Fn(&File) -> TaskResult<()> + Send + Sync + 'static,
    {
        Task::File(Arc::new(FileTask::new(file, action)))
    }

    fn inner(&self) -> &dyn Actionable {
        match self {
            Task::Call(task) => task.as_ref(),
            Task::Queue(task) => task.as_ref(),
            Task::Parallel(task) => task.as_ref(),
            Task::File(task) => task.as_ref(),
        }
    }

    pub fn as_cleanable(&self) -> Option<&dyn Cleanable> {
        match self {
            Task::Call(_) => None,
            Task::Queue(task) => Some(task.as_ref()),
            Task::Parallel(task) => Some(task.as_ref()),
            Task::File(task) => Some(task.as_ref()),
        }
    }

    pub fn as_breakable(&self) -> Option<&dyn Breakable> {
        match self {
            Task::Queue(task) => Some(task.as_ref()),
            Task::Parallel(task) => Some(task.as_ref()),
            Task::Call(_) | Task::File(_) => None,
        }
    }
}

impl Actionable for Task {
    fn name(&self) -> &str {
        self.inner().name()
    }

    fn is_done(&self) -> bool {
        self.inner().is_done()
    }

    fn run(&self) -> TaskResult<Resource> {
        self.inner().run()
    }

    fn result(&self) -> Option<Resource> {
        self.inner().result()
    }
}

impl Interpolatable for Task {
    fn interp(&self) -> Result<Vec<Resource>, WorkflowError> {
        match self {
            Task::Queue(queue) => queue.interp(),
            Task::Parallel(queue) => queue.interp(),
            Task::File(task) => Ok(vec![Resource::File(task.file().clone())]),
            Task::Call(task) => match task.result() {
                Some(value) => Ok(vec![value]),
                None => Err(WorkflowError(task.name().to_string())),
            },
        }
    }
}

impl Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Task::Call(task) => write!(f, "Task::Call({})", task.name()),
            Task::Queue(task) => write!(f, "Task::Queue({}, {})", task.name(), task.len()),
            Task::Parallel(task) => write!(f, "Task::Parallel({}, {})", task.name(), task.len()),
            Task::File(task) => write!(f, "Task::File({})", task.file()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_call_task_memoizes_result() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let task = Task::call("answer", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Resource::Int(42))
        });

        assert!(!task.is_done());
        assert!(task.result().is_none());

        let value = task.run().unwrap();
        assert_eq!(value.as_int(), Some(42));
        assert!(task.is_done());
        assert_eq!(task.result().and_then(|r| r.as_int()), Some(42));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_rerunning_done_call_returns_cached_value() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let task = Task::call("tick", move || {
            Ok(Resource::Int(counter.fetch_add(1, Ordering::SeqCst) as i64))
        });

        assert_eq!(task.run().unwrap().as_int(), Some(0));
        assert_eq!(task.run().unwrap().as_int(), Some(0));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_call_stays_pending() {
        let task = Task::call("broken", || anyhow::bail!("nope"));

        assert!(task.run().is_err());
        assert!(!task.is_done());
    }

    #[test]
    fn test_clones_share_work() {
        let task = Task::call("shared", || Ok(Resource::Bool(true)));
        let other = task.clone();

        task.run().unwrap();

        assert!(other.is_done());
    }

    #[test]
    fn test_interpolating_pending_call_fails() {
        let task = Task::call("pending", || Ok(Resource::None));

        assert!(task.interp().is_err());
        task.run().unwrap();
        assert_eq!(task.interp().unwrap().len(), 1);
    }

    #[test]
    fn test_call_task_is_not_cleanable() {
        let task = Task::call("plain", || Ok(Resource::None));

        assert!(task.as_cleanable().is_none());
        assert!(task.as_breakable().is_none());
    }
}
