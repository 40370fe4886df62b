use super::cache::{CacheKey, OutputCache};
use super::error::EngineError;
use super::task::{ExecutionTask, InputRole, OutputFile, TaskState};
use crate::core::deck::writer::{DEFAULT_MAX_LIBRARY_NAME_CHARS, short_library_name};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tempfile::TempDir;
use tracing::{debug, info, instrument, warn};

/// What a successful task left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOutcome {
    pub task_id: String,
    pub group_id: String,
    /// Destination paths of the relocated outputs.
    pub outputs: Vec<PathBuf>,
    pub from_cache: bool,
}

/// Runs one solver invocation.
pub trait Executor: Send + Sync {
    fn execute(&self, task: &ExecutionTask, cache: Option<&OutputCache>) -> Result<TaskOutcome, EngineError>;
}

/// Runs every task in its own scratch directory.
///
/// DRAGON writes scratch files with fixed names (`_DUMMY`, `_main001`), so two
/// runs sharing a directory corrupt each other. The scratch directory is
/// removed when the task ends, whatever the outcome.
#[derive(Debug, Clone)]
pub struct IsolatedExecutor {
    max_library_name_chars: usize,
    scratch_root: Option<PathBuf>,
}

impl Default for IsolatedExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LIBRARY_NAME_CHARS)
    }
}

impl IsolatedExecutor {
    pub fn new(max_library_name_chars: usize) -> Self {
        Self {
            max_library_name_chars,
            scratch_root: None,
        }
    }

    /// Creates scratch directories under `root` instead of the system temp dir.
    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(root.into());
        self
    }

    fn create_work_area(&self) -> Result<TempDir, EngineError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("dragonxs-");
        let result = match &self.scratch_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        };
        result.map_err(|e| EngineError::Io {
            path: self.scratch_root.clone().unwrap_or_else(std::env::temp_dir),
            source: e,
        })
    }

    /// Local name an input receives in the work area.
    fn staged_name(&self, task_input_name: &str, role: InputRole) -> String {
        match role {
            InputRole::Library => short_library_name(task_input_name, self.max_library_name_chars),
            InputRole::Primary | InputRole::Auxiliary => task_input_name.to_string(),
        }
    }

    fn stage(&self, task: &ExecutionTask, work_dir: &Path) -> Result<(), EngineError> {
        for input in &task.inputs {
            let target = work_dir.join(self.staged_name(&input.local_name, input.role));
            std::fs::copy(&input.source, &target).map_err(|e| EngineError::Io {
                path: input.source.clone(),
                source: e,
            })?;
        }
        Ok(())
    }

    fn run_solver(&self, task: &ExecutionTask, work_dir: &Path) -> Result<(), EngineError> {
        let primary = task
            .primary_input()
            .ok_or_else(|| solver_error(task, "<none>", "task declares no primary input"))?;
        let log = task
            .log_output()
            .ok_or_else(|| solver_error(task, &primary.local_name, "task declares no log output"))?;

        let stdin_path = work_dir.join(&primary.local_name);
        let stdin = File::open(&stdin_path).map_err(|e| EngineError::Io {
            path: stdin_path.clone(),
            source: e,
        })?;
        let log_path = work_dir.join(&log.local_name);
        let stdout = File::create(&log_path).map_err(|e| EngineError::Io {
            path: log_path.clone(),
            source: e,
        })?;
        let stderr = stdout.try_clone().map_err(|e| EngineError::Io {
            path: log_path.clone(),
            source: e,
        })?;

        info!(
            task_id = %task.task_id,
            executable = %task.executable.display(),
            input = %primary.local_name,
            "Running DRAGON."
        );
        let status = Command::new(&task.executable)
            .current_dir(work_dir)
            .stdin(Stdio::from(stdin))
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .status()
            .map_err(|e| solver_error(task, &primary.local_name, &format!("could not be launched: {e}")))?;

        if !status.success() {
            return Err(solver_error(task, &primary.local_name, &format!("solver {status}")));
        }
        if let Some(missing) = task
            .outputs
            .iter()
            .find(|output| output.required && !work_dir.join(&output.local_name).is_file())
        {
            return Err(solver_error(
                task,
                &primary.local_name,
                &format!("expected output '{}' was not produced", missing.local_name),
            ));
        }
        Ok(())
    }

    fn relocate(&self, task: &ExecutionTask, work_dir: &Path) -> Result<Vec<PathBuf>, EngineError> {
        let mut relocated = Vec::with_capacity(task.outputs.len());
        for output in &task.outputs {
            let source = work_dir.join(&output.local_name);
            if !source.is_file() {
                if output.required {
                    let input = task.primary_input().map_or("<none>", |i| i.local_name.as_str());
                    return Err(solver_error(
                        task,
                        input,
                        &format!("required output '{}' could not be relocated", output.local_name),
                    ));
                }
                continue;
            }
            relocated.push(move_output(task, output, &source)?);
        }
        Ok(relocated)
    }

    /// Returns the solver log of a failed run to its destination, if there is one.
    fn salvage_log(&self, task: &ExecutionTask, work_dir: &Path) {
        let Some(log) = task.log_output() else {
            return;
        };
        let source = work_dir.join(&log.local_name);
        if source.is_file() {
            if let Err(e) = move_output(task, log, &source) {
                warn!(task_id = %task.task_id, error = %e, "Could not keep the log of a failed run.");
            }
        }
    }
}

impl Executor for IsolatedExecutor {
    #[instrument(skip_all, name = "isolated_execution", fields(task_id = %task.task_id))]
    fn execute(&self, task: &ExecutionTask, cache: Option<&OutputCache>) -> Result<TaskOutcome, EngineError> {
        let mut state = TaskState::Pending;
        let work_area = self.create_work_area()?;
        debug!(dir = %work_area.path().display(), "Created work area.");

        let result = self.run_in(task, work_area.path(), cache, &mut state);
        match &result {
            Ok(_) => advance(task, &mut state, TaskState::Succeeded),
            Err(e) => {
                if state == TaskState::Running {
                    advance(task, &mut state, TaskState::Failed);
                    self.salvage_log(task, work_area.path());
                }
                warn!(error = %e, "Task failed.");
            }
        }

        if let Err(e) = work_area.close() {
            warn!(error = %e, "Could not remove work area.");
        }
        advance(task, &mut state, TaskState::Cleaned);
        result
    }
}

impl IsolatedExecutor {
    fn run_in(
        &self,
        task: &ExecutionTask,
        work_dir: &Path,
        cache: Option<&OutputCache>,
        state: &mut TaskState,
    ) -> Result<TaskOutcome, EngineError> {
        self.stage(task, work_dir)?;
        advance(task, state, TaskState::Staged);

        advance(task, state, TaskState::Running);
        let from_cache = match cache {
            Some(cache) => {
                let key = task_cache_key(task)?;
                cache
                    .store(&key, work_dir, &task.output_names(), || self.run_solver(task, work_dir))?
                    .is_hit()
            }
            None => {
                self.run_solver(task, work_dir)?;
                false
            }
        };

        Ok(TaskOutcome {
            task_id: task.task_id.clone(),
            group_id: task.group_id.clone(),
            outputs: self.relocate(task, work_dir)?,
            from_cache,
        })
    }
}

/// The cache key of `task`, computed from its declared sources.
///
/// Staged copies are byte-identical to the sources, so the key can be computed
/// before staging (e.g. by a dispatcher looking for hits).
pub fn task_cache_key(task: &ExecutionTask) -> Result<CacheKey, EngineError> {
    let sources: Vec<&Path> = task.inputs.iter().map(|i| i.source.as_path()).collect();
    Ok(CacheKey::compute(&task.executable, &sources)?)
}

fn advance(task: &ExecutionTask, state: &mut TaskState, next: TaskState) {
    if !state.can_transition_to(next) {
        warn!(task_id = %task.task_id, from = %state, to = %next, "Unexpected task state transition.");
    }
    debug!(task_id = %task.task_id, from = %state, to = %next, "Task state changed.");
    *state = next;
}

fn solver_error(task: &ExecutionTask, input: &str, reason: &str) -> EngineError {
    EngineError::SolverExecution {
        task_id: task.task_id.clone(),
        input: input.to_string(),
        reason: reason.to_string(),
    }
}

/// Moves (or copies, across filesystems) one output to its destination.
pub(crate) fn move_output(task: &ExecutionTask, output: &OutputFile, source: &Path) -> Result<PathBuf, EngineError> {
    let destination = task.destination_for(output);
    if let Some(parent) = destination.parent() {
        std::fs::create_dir_all(parent).map_err(|e| EngineError::Io {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }
    if std::fs::rename(source, &destination).is_err() {
        std::fs::copy(source, &destination).map_err(|e| EngineError::Io {
            path: destination.clone(),
            source: e,
        })?;
    }
    debug!(from = %source.display(), to = %destination.display(), "Relocated output.");
    Ok(destination)
}
