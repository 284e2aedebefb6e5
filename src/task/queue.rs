use std::sync::OnceLock;

use tracing::debug;

use crate::core::Resource;
use crate::error::{CleanupError, TaskResult, WorkflowError};
use crate::pool::WorkerPool;
use crate::task::{Actionable, Breakable, Cleanable, Interpolatable, Task};

/// An ordered list of tasks run one after another.
///
/// Members that are already done when the queue runs are skipped, and they
/// contribute nothing to the result list. Whoever needs their values holds a
/// direct reference to them (usually a [`crate::File`]), so the result list can
/// be shorter than the queue.
pub struct TaskQueue {
    name: String,
    tasks: Vec<Task>,
    result: OnceLock<Vec<Resource>>,
}

impl TaskQueue {
    pub fn new(name: impl Into<String>, tasks: Vec<Task>) -> Self {
        Self {
            name: name.into(),
            tasks,
            result: OnceLock::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    fn pending(&self) -> Vec<Task> {
        self.tasks
            .iter()
            .filter(|task| !task.is_done())
            .cloned()
            .collect()
    }

    fn finish(&self, results: Vec<Resource>) -> Resource {
        Resource::List(self.result.get_or_init(|| results).clone())
    }
}

impl Actionable for TaskQueue {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_done(&self) -> bool {
        self.tasks.iter().all(Actionable::is_done)
    }

    fn run(&self) -> TaskResult<Resource> {
        let pending = self.pending();
        debug!(queue = %self.name, pending = pending.len(), "running task queue");

        let results = pending
            .iter()
            .map(Actionable::run)
            .collect::<TaskResult<Vec<_>>>()?;

        Ok(self.finish(results))
    }

    fn result(&self) -> Option<Resource> {
        self.result.get().cloned().map(Resource::List)
    }
}

impl Cleanable for TaskQueue {
    fn needs_cleaning(&self, recursive: bool) -> Result<bool, CleanupError> {
        for task in &self.tasks {
            if let Some(cleanable) = task.as_cleanable() {
                if cleanable.needs_cleaning(recursive)? {
                    return Ok(true);
                }
            }
        }

        Ok(false)
    }

    fn clean(&self) -> Result<(), CleanupError> {
        self.tasks
            .iter()
            .filter_map(Task::as_cleanable)
            .try_for_each(|cleanable| cleanable.clean())
    }
}

impl Interpolatable for TaskQueue {
    fn interp(&self) -> Result<Vec<Resource>, WorkflowError> {
        match self.result.get() {
            Some(results) if !results.is_empty() => Ok(results.clone()),
            _ => Err(WorkflowError(self.name.clone())),
        }
    }
}

impl Breakable for TaskQueue {
    fn breakdown(&self) -> &[Task] {
        &self.tasks
    }
}

/// A [`TaskQueue`] whose pending members run on the shared worker pool.
///
/// Results come back in submission order, whatever order the workers finish
/// in.
pub struct ParallelTaskQueue {
    queue: TaskQueue,
    pool: WorkerPool,
}

impl ParallelTaskQueue {
    pub fn new(name: impl Into<String>, pool: WorkerPool, tasks: Vec<Task>) -> Self {
        Self {
            queue: TaskQueue::new(name, tasks),
            pool,
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl Actionable for ParallelTaskQueue {
    fn name(&self) -> &str {
        self.queue.name()
    }

    fn is_done(&self) -> bool {
        self.queue.is_done()
    }

    fn run(&self) -> TaskResult<Resource> {
        let pending = self.queue.pending();
        debug!(
            queue = %self.queue.name,
            pending = pending.len(),
            "dispatching task queue to worker pool"
        );

        let units = pending
            .into_iter()
            .map(|task| move || task.run())
            .collect::<Vec<_>>();

        let results = self.pool.submit_batch(units)?;

        Ok(self.queue.finish(results))
    }

    fn result(&self) -> Option<Resource> {
        self.queue.result()
    }
}

impl Cleanable for ParallelTaskQueue {
    fn needs_cleaning(&self, recursive: bool) -> Result<bool, CleanupError> {
        self.queue.needs_cleaning(recursive)
    }

    fn clean(&self) -> Result<(), CleanupError> {
        self.queue.clean()
    }
}

impl Interpolatable for ParallelTaskQueue {
    fn interp(&self) -> Result<Vec<Resource>, WorkflowError> {
        self.queue.interp()
    }
}

impl Breakable for ParallelTaskQueue {
    fn breakdown(&self) -> &[Task] {
        self.queue.breakdown()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    fn counted(name: &str, value: i64, calls: &Arc<AtomicUsize>) -> Task {
        let calls = calls.clone();
        Task::call(name, move || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(Resource::Int(value))
        })
    }

    fn ints(resource: Resource) -> Vec<i64> {
        resource
            .as_list()
            .unwrap()
            .iter()
            .map(|r| r.as_int().unwrap())
            .collect()
    }

    #[test]
    fn test_queue_runs_in_order() {
        let calls = Arc::new(AtomicUsize::new(0));
        let queue = TaskQueue::new(
            "q",
            vec![
                counted("a", 1, &calls),
                counted("b", 2, &calls),
                counted("c", 3, &calls),
            ],
        );

        assert!(!queue.is_done());
        assert_eq!(ints(queue.run().unwrap()), vec![1, 2, 3]);
        assert!(queue.is_done());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    /// Done members are skipped and dropped from the result list, so the
    /// result can be shorter than the queue.
    #[test]
    fn test_done_members_are_dropped_from_result() {
        let calls = Arc::new(AtomicUsize::new(0));
        let done = counted("done", 1, &calls);
        done.run().unwrap();

        let queue = TaskQueue::new("q", vec![done, counted("fresh", 2, &calls)]);

        let result = queue.run().unwrap();
        assert_eq!(ints(result), vec![2]);
        assert_eq!(queue.len(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_failure_stops_queue() {
        let calls = Arc::new(AtomicUsize::new(0));
        let queue = TaskQueue::new(
            "q",
            vec![
                Task::call("broken", || anyhow::bail!("boom")),
                counted("after", 1, &calls),
            ],
        );

        assert!(queue.run().is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(queue.result().is_none());
    }

    #[test]
    fn test_interp_requires_evaluation() {
        let queue = TaskQueue::new("q", vec![Task::call("a", || Ok("x".into()))]);

        assert!(queue.interp().is_err());
        queue.run().unwrap();
        assert_eq!(queue.interp().unwrap()[0].as_str(), Some("x"));
    }

    #[test]
    fn test_breakdown_exposes_members() {
        let queue = TaskQueue::new("q", vec![Task::call("a", || Ok(Resource::None))]);

        assert_eq!(queue.breakdown().len(), 1);
        assert_eq!(queue.breakdown()[0].name(), "a");
    }

    #[test]
    fn test_parallel_preserves_submission_order() {
        let pool = WorkerPool::new(Some(4)).unwrap();
        let tasks = (0..3)
            .map(|i| {
                Task::call(format!("t{i}"), move || {
                    // later submissions finish first
                    thread::sleep(Duration::from_millis(30 * (3 - i as u64)));
                    Ok(Resource::Int(i))
                })
            })
            .collect();

        let queue = ParallelTaskQueue::new("p", pool, tasks);

        assert_eq!(ints(queue.run().unwrap()), vec![0, 1, 2]);
        assert!(queue.is_done());
    }

    #[test]
    fn test_parallel_skips_done_members() {
        let pool = WorkerPool::new(Some(2)).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let done = counted("done", 1, &calls);
        done.run().unwrap();

        let queue = ParallelTaskQueue::new("p", pool, vec![done, counted("fresh", 2, &calls)]);

        assert_eq!(ints(queue.run().unwrap()), vec![2]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_parallel_surfaces_failure() {
        let pool = WorkerPool::new(Some(2)).unwrap();
        let queue = ParallelTaskQueue::new(
            "p",
            pool,
            vec![
                Task::call("ok", || Ok(Resource::None)),
                Task::call("broken", || anyhow::bail!("boom")),
            ],
        );

        let err = queue.run().unwrap_err();
        assert!(err.to_string().contains("boom"));
    }
}
