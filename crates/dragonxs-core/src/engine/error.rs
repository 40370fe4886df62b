use super::cache::CacheError;
use super::config::ConfigError;
use crate::core::composition::CompositionError;
use crate::core::deck::template::TemplateError;
use crate::core::deck::writer::DeckError;
use crate::core::library::codec::LibraryIoError;
use crate::core::library::model::MergeConflictError;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// A task that did not reach `Succeeded`, with the reason attributed to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFailure {
    pub task_id: String,
    pub cause: String,
}

impl TaskFailure {
    pub fn new(task_id: impl Into<String>, cause: impl fmt::Display) -> Self {
        Self {
            task_id: task_id.into(),
            cause: cause.to_string(),
        }
    }
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.task_id, self.cause)
    }
}

fn list_failures(failures: &[TaskFailure]) -> String {
    failures
        .iter()
        .map(|failure| format!("  - {failure}"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Data integrity violation: {0}")]
    DataIntegrity(#[from] CompositionError),

    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    #[error("DRAGON task '{task_id}' on input '{input}' failed: {reason}")]
    SolverExecution {
        task_id: String,
        input: String,
        reason: String,
    },

    #[error("Library merge conflict: {0}")]
    MergeConflict(#[from] MergeConflictError),

    #[error("Output cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Library error: {0}")]
    Library(#[from] LibraryIoError),

    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("CSV error for '{path}': {source}")]
    Csv { path: PathBuf, source: csv::Error },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to start worker pool: {0}")]
    WorkerPool(String),

    #[error("{} of {total} task(s) failed:\n{}", .failures.len(), list_failures(.failures))]
    TasksFailed {
        total: usize,
        failures: Vec<TaskFailure>,
    },
}

impl From<DeckError> for EngineError {
    fn from(err: DeckError) -> Self {
        match err {
            DeckError::Composition(e) => EngineError::DataIntegrity(e),
            DeckError::Template(e) => EngineError::Template(e),
            DeckError::GroupStructure(e) => EngineError::Config(ConfigError::from(e)),
            DeckError::Io { path, source } => EngineError::Io { path, source },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_error_names_every_failed_task() {
        let err = EngineError::TasksFailed {
            total: 3,
            failures: vec![
                TaskFailure::new("dragon-B1-0-0", "exited with status 3"),
                TaskFailure::new("dragon-B7-0-0", "expected output 'ISOTXS000001' was not produced"),
            ],
        };
        let message = err.to_string();
        assert!(message.starts_with("2 of 3 task(s) failed:"));
        assert!(message.contains("dragon-B1-0-0: exited with status 3"));
        assert!(message.contains("dragon-B7-0-0"));
    }

    #[test]
    fn deck_errors_map_onto_the_engine_taxonomy() {
        let err: EngineError = DeckError::Composition(CompositionError::NoComponentArea {
            unit: "B1".to_string(),
        })
        .into();
        assert!(matches!(err, EngineError::DataIntegrity(_)));

        let err: EngineError = DeckError::Template(TemplateError::Render("missing".to_string())).into();
        assert!(matches!(err, EngineError::Template(_)));
    }
}
