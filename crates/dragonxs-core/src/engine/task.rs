use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TaskBuildError {
    #[error("Task '{task_id}' is missing required parameter: {parameter}")]
    MissingParameter {
        task_id: String,
        parameter: &'static str,
    },
    #[error("Task '{task_id}' declares {count} primary inputs; exactly one is required")]
    PrimaryInputCount { task_id: String, count: usize },
    #[error("Task '{task_id}' declares {count} log outputs; exactly one is required")]
    LogOutputCount { task_id: String, count: usize },
    #[error("Task '{task_id}' declares local file name '{name}' more than once")]
    DuplicateLocalName { task_id: String, name: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputRole {
    /// Piped to the solver's standard input.
    Primary,
    /// Nuclear data; staged under a shortened name.
    Library,
    Auxiliary,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputFile {
    pub local_name: String,
    pub source: PathBuf,
    pub role: InputRole,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    /// Receives the solver's interleaved stdout and stderr.
    Log,
    Artifact,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFile {
    pub local_name: String,
    pub destination_dir: PathBuf,
    pub kind: OutputKind,
    pub required: bool,
}

/// One solver invocation, created per case and consumed once by an executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionTask {
    pub task_id: String,
    /// Cross-section id of the case, used to key merged results.
    pub group_id: String,
    pub executable: PathBuf,
    pub inputs: Vec<InputFile>,
    pub outputs: Vec<OutputFile>,
    /// Local output name to the name it receives at its destination.
    pub rename_on_return: BTreeMap<String, String>,
}

impl ExecutionTask {
    pub fn builder(task_id: impl Into<String>) -> ExecutionTaskBuilder {
        ExecutionTaskBuilder::new(task_id)
    }

    pub fn primary_input(&self) -> Option<&InputFile> {
        self.inputs
            .iter()
            .find(|input| input.role == InputRole::Primary)
    }

    pub fn log_output(&self) -> Option<&OutputFile> {
        self.outputs
            .iter()
            .find(|output| output.kind == OutputKind::Log)
    }

    /// Where `output` lands once relocated, after any rename.
    pub fn destination_for(&self, output: &OutputFile) -> PathBuf {
        let name = self
            .rename_on_return
            .get(&output.local_name)
            .unwrap_or(&output.local_name);
        output.destination_dir.join(name)
    }

    /// The destination of the output named `local_name`, if declared.
    pub fn destination_of(&self, local_name: &str) -> Option<PathBuf> {
        self.outputs
            .iter()
            .find(|output| output.local_name == local_name)
            .map(|output| self.destination_for(output))
    }

    pub fn output_names(&self) -> Vec<&str> {
        self.outputs.iter().map(|o| o.local_name.as_str()).collect()
    }
}

/// Builds an [`ExecutionTask`], checking that it has exactly one primary input
/// and one log output.
pub struct ExecutionTaskBuilder {
    task_id: String,
    group_id: Option<String>,
    executable: Option<PathBuf>,
    inputs: Vec<InputFile>,
    outputs: Vec<OutputFile>,
    rename_on_return: BTreeMap<String, String>,
}

impl ExecutionTaskBuilder {
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            group_id: None,
            executable: None,
            inputs: Vec::new(),
            outputs: Vec::new(),
            rename_on_return: BTreeMap::new(),
        }
    }

    pub fn group_id(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    pub fn executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.executable = Some(path.into());
        self
    }

    pub fn input(mut self, source: impl AsRef<Path>, role: InputRole) -> Self {
        let source = source.as_ref().to_path_buf();
        let local_name = file_name(&source);
        self.inputs.push(InputFile {
            local_name,
            source,
            role,
        });
        self
    }

    pub fn output(
        mut self,
        local_name: impl Into<String>,
        destination_dir: impl Into<PathBuf>,
        kind: OutputKind,
        required: bool,
    ) -> Self {
        self.outputs.push(OutputFile {
            local_name: local_name.into(),
            destination_dir: destination_dir.into(),
            kind,
            required,
        });
        self
    }

    pub fn rename_on_return(mut self, local_name: impl Into<String>, returned_name: impl Into<String>) -> Self {
        self.rename_on_return
            .insert(local_name.into(), returned_name.into());
        self
    }

    pub fn build(self) -> Result<ExecutionTask, TaskBuildError> {
        let task_id = self.task_id;
        let missing = |parameter| TaskBuildError::MissingParameter {
            task_id: task_id.clone(),
            parameter,
        };
        let executable = self.executable.ok_or_else(|| missing("executable"))?;
        let group_id = self.group_id.ok_or_else(|| missing("group_id"))?;

        let primaries = self
            .inputs
            .iter()
            .filter(|i| i.role == InputRole::Primary)
            .count();
        if primaries != 1 {
            return Err(TaskBuildError::PrimaryInputCount {
                task_id,
                count: primaries,
            });
        }
        let logs = self
            .outputs
            .iter()
            .filter(|o| o.kind == OutputKind::Log)
            .count();
        if logs != 1 {
            return Err(TaskBuildError::LogOutputCount {
                task_id,
                count: logs,
            });
        }
        let mut names = std::collections::HashSet::new();
        for name in self
            .inputs
            .iter()
            .map(|i| &i.local_name)
            .chain(self.outputs.iter().map(|o| &o.local_name))
        {
            if !names.insert(name) {
                return Err(TaskBuildError::DuplicateLocalName {
                    task_id,
                    name: name.clone(),
                });
            }
        }

        Ok(ExecutionTask {
            task_id,
            group_id,
            executable,
            inputs: self.inputs,
            outputs: self.outputs,
            rename_on_return: self.rename_on_return,
        })
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// Lifecycle of one task inside an executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Staged,
    Running,
    Succeeded,
    Failed,
    Cleaned,
}

impl TaskState {
    pub fn can_transition_to(self, next: TaskState) -> bool {
        use TaskState::*;
        matches!(
            (self, next),
            (Pending, Staged)
                | (Staged, Running)
                | (Running, Succeeded)
                | (Running, Failed)
                | (Pending | Staged | Succeeded | Failed, Cleaned)
        )
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskState::Pending => "PENDING",
            TaskState::Staged => "STAGED",
            TaskState::Running => "RUNNING",
            TaskState::Succeeded => "SUCCEEDED",
            TaskState::Failed => "FAILED",
            TaskState::Cleaned => "CLEANED",
        };
        f.write_str(name)
    }
}
