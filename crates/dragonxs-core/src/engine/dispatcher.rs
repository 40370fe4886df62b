use super::cache::OutputCache;
use super::error::{EngineError, TaskFailure};
use super::executor::{Executor, TaskOutcome, task_cache_key};
use super::progress::{Progress, ProgressReporter};
use super::task::ExecutionTask;
use tracing::{debug, info, instrument, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Called once after every worker has finished, before results are consumed.
///
/// Distributed deployments use this to synchronize shared state across nodes.
pub trait SyncHook: Send + Sync {
    fn synchronize(&self, report: &DispatchReport);
}

impl<F> SyncHook for F
where
    F: Fn(&DispatchReport) + Send + Sync,
{
    fn synchronize(&self, report: &DispatchReport) {
        self(report)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskResult {
    pub task_id: String,
    pub group_id: String,
    pub result: Result<TaskOutcome, TaskFailure>,
}

/// Terminal state of every task of one dispatch, in task creation order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    results: Vec<TaskResult>,
}

impl DispatchReport {
    pub fn new(results: Vec<TaskResult>) -> Self {
        Self { results }
    }

    pub fn results(&self) -> &[TaskResult] {
        &self.results
    }

    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &TaskOutcome> {
        self.results.iter().filter_map(|r| r.result.as_ref().ok())
    }

    pub fn failures(&self) -> Vec<TaskFailure> {
        self.results
            .iter()
            .filter_map(|r| r.result.as_ref().err().cloned())
            .collect()
    }

    pub fn has_failures(&self) -> bool {
        self.results.iter().any(|r| r.result.is_err())
    }

    /// Records a task that failed before it could be dispatched.
    pub fn push_failure(&mut self, group_id: impl Into<String>, failure: TaskFailure) {
        self.results.push(TaskResult {
            task_id: failure.task_id.clone(),
            group_id: group_id.into(),
            result: Err(failure),
        });
    }

    /// All outcomes, or one error naming every failed task.
    pub fn into_result(self) -> Result<Vec<TaskOutcome>, EngineError> {
        if self.has_failures() {
            return Err(EngineError::TasksFailed {
                total: self.total(),
                failures: self.failures(),
            });
        }
        Ok(self
            .results
            .into_iter()
            .filter_map(|r| r.result.ok())
            .collect())
    }
}

/// Runs a batch of independent tasks.
pub trait TaskRunner: Send + Sync {
    fn run(
        &self,
        tasks: &[ExecutionTask],
        reporter: &ProgressReporter,
        sync: Option<&dyn SyncHook>,
    ) -> Result<DispatchReport, EngineError>;
}

/// Fans tasks out over a fixed number of workers.
///
/// Task `i` goes to worker `i % workers`. Every task runs to a terminal state
/// regardless of its siblings; results come back in task order.
pub struct TaskDispatcher {
    executor: Box<dyn Executor>,
    cache: Option<OutputCache>,
    workers: usize,
}

impl TaskDispatcher {
    pub fn new(executor: Box<dyn Executor>, workers: usize) -> Self {
        Self {
            executor,
            cache: None,
            workers: workers.max(1),
        }
    }

    pub fn with_cache(mut self, cache: OutputCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn cache(&self) -> Option<&OutputCache> {
        self.cache.as_ref()
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    fn run_one(&self, task: &ExecutionTask, reporter: &ProgressReporter) -> TaskResult {
        let result = match self.restore_cached(task) {
            Ok(Some(outcome)) => Ok(outcome),
            Ok(None) => self.executor.execute(task, self.cache.as_ref()),
            Err(e) => Err(e),
        }
        .map_err(|e| TaskFailure::new(&task.task_id, e));

        reporter.report(Progress::TaskFinished {
            task_id: task.task_id.clone(),
            succeeded: result.is_ok(),
            from_cache: result.as_ref().is_ok_and(|o| o.from_cache),
        });
        TaskResult {
            task_id: task.task_id.clone(),
            group_id: task.group_id.clone(),
            result,
        }
    }

    /// Copies a cached entry straight to the task's destinations, bypassing the executor.
    fn restore_cached(&self, task: &ExecutionTask) -> Result<Option<TaskOutcome>, EngineError> {
        let Some(cache) = &self.cache else {
            return Ok(None);
        };
        let key = task_cache_key(task)?;
        let Some(entry) = cache.lookup(&key)? else {
            debug!(task_id = %task.task_id, key = %key, "Cache miss.");
            return Ok(None);
        };

        let mut outputs = Vec::with_capacity(task.outputs.len());
        for output in &task.outputs {
            let Some(cached) = entry.path_of(&output.local_name) else {
                if output.required {
                    warn!(task_id = %task.task_id, output = %output.local_name, "Cache entry lacks a required output; running instead.");
                    return Ok(None);
                }
                continue;
            };
            let destination = task.destination_for(output);
            if let Some(parent) = destination.parent() {
                std::fs::create_dir_all(parent).map_err(|e| EngineError::Io {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
            }
            std::fs::copy(&cached, &destination).map_err(|e| EngineError::Io {
                path: destination.clone(),
                source: e,
            })?;
            outputs.push(destination);
        }

        info!(task_id = %task.task_id, key = %key, "Restored outputs from cache.");
        Ok(Some(TaskOutcome {
            task_id: task.task_id.clone(),
            group_id: task.group_id.clone(),
            outputs,
            from_cache: true,
        }))
    }

    #[cfg(feature = "parallel")]
    fn run_partitions(
        &self,
        tasks: &[ExecutionTask],
        partitions: &[Vec<usize>],
        reporter: &ProgressReporter,
    ) -> Result<Vec<(usize, TaskResult)>, EngineError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(partitions.len())
            .thread_name(|i| format!("dragonxs-worker-{i}"))
            .build()
            .map_err(|e| EngineError::WorkerPool(e.to_string()))?;

        let per_worker: Vec<Vec<(usize, TaskResult)>> = pool.install(|| {
            partitions
                .par_iter()
                .map(|indices| {
                    indices
                        .iter()
                        .map(|&i| (i, self.run_one(&tasks[i], reporter)))
                        .collect()
                })
                .collect()
        });
        Ok(per_worker.into_iter().flatten().collect())
    }

    #[cfg(not(feature = "parallel"))]
    fn run_partitions(
        &self,
        tasks: &[ExecutionTask],
        partitions: &[Vec<usize>],
        reporter: &ProgressReporter,
    ) -> Result<Vec<(usize, TaskResult)>, EngineError> {
        let mut results = Vec::with_capacity(tasks.len());
        for indices in partitions {
            for &i in indices {
                results.push((i, self.run_one(&tasks[i], reporter)));
            }
        }
        Ok(results)
    }
}

impl TaskRunner for TaskDispatcher {
    #[instrument(skip_all, name = "task_dispatch", fields(tasks = tasks.len(), workers = self.workers))]
    fn run(
        &self,
        tasks: &[ExecutionTask],
        reporter: &ProgressReporter,
        sync: Option<&dyn SyncHook>,
    ) -> Result<DispatchReport, EngineError> {
        reporter.report(Progress::TasksStart {
            total: tasks.len() as u64,
        });

        let partitions = partition(tasks.len(), self.workers);
        let mut indexed = if partitions.is_empty() {
            Vec::new()
        } else {
            self.run_partitions(tasks, &partitions, reporter)?
        };
        indexed.sort_by_key(|(i, _)| *i);
        let report = DispatchReport::new(indexed.into_iter().map(|(_, r)| r).collect());

        reporter.report(Progress::TasksFinish);
        if let Some(hook) = sync {
            hook.synchronize(&report);
        }

        info!(
            succeeded = report.succeeded().count(),
            failed = report.failures().len(),
            "All tasks reached a terminal state."
        );
        Ok(report)
    }
}

/// Round-robin assignment of `len` task indices to at most `workers` non-empty partitions.
fn partition(len: usize, workers: usize) -> Vec<Vec<usize>> {
    let workers = workers.max(1).min(len);
    let mut partitions = vec![Vec::new(); workers];
    for i in 0..len {
        partitions[i % workers].push(i);
    }
    partitions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::task::{InputRole, OutputKind};
    use std::collections::HashSet;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeExecutor {
        calls: AtomicUsize,
        failing: HashSet<String>,
    }

    impl FakeExecutor {
        fn failing(ids: &[&str]) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                failing: ids.iter().map(|s| s.to_string()).collect(),
            }
        }
    }

    impl Executor for FakeExecutor {
        fn execute(&self, task: &ExecutionTask, _cache: Option<&OutputCache>) -> Result<TaskOutcome, EngineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.contains(&task.group_id) {
                return Err(EngineError::SolverExecution {
                    task_id: task.task_id.clone(),
                    input: "deck".to_string(),
                    reason: "solver exit status: 1".to_string(),
                });
            }
            Ok(TaskOutcome {
                task_id: task.task_id.clone(),
                group_id: task.group_id.clone(),
                outputs: Vec::new(),
                from_cache: false,
            })
        }
    }

    impl Executor for std::sync::Arc<FakeExecutor> {
        fn execute(&self, task: &ExecutionTask, cache: Option<&OutputCache>) -> Result<TaskOutcome, EngineError> {
            self.as_ref().execute(task, cache)
        }
    }

    fn tasks(dir: &Path, ids: &[&str]) -> Vec<ExecutionTask> {
        let exe = dir.join("dragon");
        std::fs::write(&exe, "binary").unwrap();
        ids.iter()
            .map(|id| {
                let deck = dir.join(format!("dragon{id}.x2m"));
                std::fs::write(&deck, format!("deck {id}")).unwrap();
                ExecutionTask::builder(format!("dragon-{id}-0-0"))
                    .group_id(*id)
                    .executable(&exe)
                    .input(&deck, InputRole::Primary)
                    .output(format!("dragon{id}.x2mout"), dir, OutputKind::Log, true)
                    .build()
                    .unwrap()
            })
            .collect()
    }

    #[test]
    fn partitions_are_round_robin_and_never_empty() {
        assert_eq!(partition(5, 2), vec![vec![0, 2, 4], vec![1, 3]]);
        assert_eq!(partition(2, 8), vec![vec![0], vec![1]]);
        assert!(partition(0, 4).is_empty());
    }

    #[test]
    fn one_failure_does_not_stop_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let tasks = tasks(dir.path(), &["AA", "AB", "AC"]);
        let executor = std::sync::Arc::new(FakeExecutor::failing(&["AB"]));
        let dispatcher = TaskDispatcher::new(Box::new(executor.clone()), 2);

        let report = dispatcher.run(&tasks, &ProgressReporter::new(), None).unwrap();
        assert_eq!(executor.calls.load(Ordering::SeqCst), 3);
        assert_eq!(report.total(), 3);
        let ids: Vec<_> = report.results().iter().map(|r| r.task_id.as_str()).collect();
        assert_eq!(ids, ["dragon-AA-0-0", "dragon-AB-0-0", "dragon-AC-0-0"]);
        assert_eq!(report.succeeded().count(), 2);
        assert_eq!(report.failures().len(), 1);
        assert_eq!(report.failures()[0].task_id, "dragon-AB-0-0");

        match report.into_result() {
            Err(EngineError::TasksFailed { total, failures }) => {
                assert_eq!(total, 3);
                assert_eq!(failures[0].task_id, "dragon-AB-0-0");
            }
            other => panic!("expected an aggregate failure, got {other:?}"),
        }
    }

    #[test]
    fn sync_hook_runs_exactly_once() {
        let dir = tempfile::tempdir().unwrap();
        let tasks = tasks(dir.path(), &["AA", "AB", "AC", "AD"]);
        let dispatcher = TaskDispatcher::new(Box::new(FakeExecutor::failing(&[])), 3);
        let syncs = AtomicUsize::new(0);
        let hook = |report: &DispatchReport| {
            assert_eq!(report.total(), 4);
            syncs.fetch_add(1, Ordering::SeqCst);
        };

        dispatcher
            .run(&tasks, &ProgressReporter::new(), Some(&hook))
            .unwrap();
        assert_eq!(syncs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn progress_counts_every_task() {
        let dir = tempfile::tempdir().unwrap();
        let tasks = tasks(dir.path(), &["AA", "AB", "AC"]);
        let dispatcher = TaskDispatcher::new(Box::new(FakeExecutor::failing(&["AC"])), 2);
        let finished = AtomicUsize::new(0);
        let reporter = ProgressReporter::with_callback(Box::new(|event: Progress| {
            if let Progress::TaskFinished { .. } = event {
                finished.fetch_add(1, Ordering::SeqCst);
            }
        }));
        dispatcher.run(&tasks, &reporter, None).unwrap();
        assert_eq!(finished.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn cached_tasks_skip_the_executor() {
        let dir = tempfile::tempdir().unwrap();
        let tasks = tasks(dir.path(), &["AA"]);
        let cache = OutputCache::new(dir.path().join("cache"));
        let key = task_cache_key(&tasks[0]).unwrap();
        let work = tempfile::tempdir().unwrap();
        cache
            .store::<EngineError, _>(&key, work.path(), &["dragonAA.x2mout"], || {
                std::fs::write(work.path().join("dragonAA.x2mout"), "cached log").unwrap();
                Ok(())
            })
            .unwrap();

        let executor = std::sync::Arc::new(FakeExecutor::failing(&[]));
        let dispatcher = TaskDispatcher::new(Box::new(executor.clone()), 1).with_cache(cache);
        let report = dispatcher.run(&tasks, &ProgressReporter::new(), None).unwrap();

        assert_eq!(executor.calls.load(Ordering::SeqCst), 0);
        let outcome = report.succeeded().next().unwrap();
        assert!(outcome.from_cache);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("dragonAA.x2mout")).unwrap(),
            "cached log"
        );
    }

    #[test]
    fn empty_batches_still_synchronize() {
        let dispatcher = TaskDispatcher::new(Box::new(FakeExecutor::failing(&[])), 4);
        let syncs = AtomicUsize::new(0);
        let hook = |_: &DispatchReport| {
            syncs.fetch_add(1, Ordering::SeqCst);
        };
        let report = dispatcher.run(&[], &ProgressReporter::new(), Some(&hook)).unwrap();
        assert_eq!(report.total(), 0);
        assert_eq!(syncs.load(Ordering::SeqCst), 1);
    }
}
