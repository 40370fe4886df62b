use crate::core::deck::groups::{GroupStructure, GroupStructureError, RECOMMENDED_MAX_GROUPS};
use crate::core::deck::writer::{DEFAULT_MAX_LIBRARY_NAME_CHARS, DeckOptions};
use crate::core::mixture::MixingOptions;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// The default DRAGLIB data file.
pub const DEFAULT_LIBRARY_NAME: &str = "draglibendfb7r1SHEM361";

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("Executable '{0}' was not found")]
    ExecutableNotFound(PathBuf),
    #[error("Executable '{0}' is not a runnable file")]
    NotExecutable(PathBuf),
    #[error("Nuclear data library '{0}' does not exist")]
    LibraryNotFound(PathBuf),
    #[error("Worker count must be at least 1")]
    NoWorkers,
    #[error("Library name budget must be at least 1 character")]
    ZeroLibraryNameBudget,
    #[error(transparent)]
    GroupStructure(#[from] GroupStructureError),
}

/// What happens to the merge step when some tasks failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Report every failure and skip the merge.
    #[default]
    FailFast,
    /// Merge the libraries of the tasks that succeeded and report the rest.
    MergePartial,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CacheConfig {
    /// Root of the shared output cache; caching is disabled when `None`.
    pub root: Option<PathBuf>,
}

/// Run-scoped settings, built once and threaded through the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Absolute path of the solver, resolved at build time.
    pub executable_path: PathBuf,
    pub library_path: PathBuf,
    /// Deck template; the bundled 0-D template is used when `None`.
    pub template_path: Option<PathBuf>,
    /// Shared destination of decks, outputs and the merged library.
    pub working_dir: PathBuf,
    pub cache: CacheConfig,
    pub workers: usize,
    pub failure_policy: FailurePolicy,
    pub mixing: MixingOptions,
    pub max_library_name_chars: usize,
    pub group_structure: GroupStructure,
    pub critical_buckling: bool,
    pub nuclides: Vec<String>,
    pub cycle: usize,
    pub time_node: usize,
}

impl PipelineConfig {
    pub fn deck_options(&self) -> DeckOptions {
        DeckOptions {
            library_path: self.library_path.clone(),
            max_library_name_chars: self.max_library_name_chars,
            group_structure: self.group_structure.clone(),
            critical_buckling: self.critical_buckling,
            nuclides: self.nuclides.clone(),
            mixing: self.mixing,
        }
    }
}

pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

#[derive(Default)]
pub struct PipelineConfigBuilder {
    executable_path: Option<PathBuf>,
    library_path: Option<PathBuf>,
    template_path: Option<PathBuf>,
    working_dir: Option<PathBuf>,
    cache_root: Option<PathBuf>,
    workers: Option<usize>,
    failure_policy: Option<FailurePolicy>,
    self_shield_density_threshold: Option<f64>,
    max_library_name_chars: Option<usize>,
    group_structure: Option<GroupStructure>,
    critical_buckling: Option<bool>,
    nuclides: Option<Vec<String>>,
    cycle: Option<usize>,
    time_node: Option<usize>,
}

impl PipelineConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn executable_path(mut self, path: PathBuf) -> Self {
        self.executable_path = Some(path);
        self
    }
    pub fn library_path(mut self, path: PathBuf) -> Self {
        self.library_path = Some(path);
        self
    }
    pub fn template_path(mut self, path: Option<PathBuf>) -> Self {
        self.template_path = path;
        self
    }
    pub fn working_dir(mut self, path: PathBuf) -> Self {
        self.working_dir = Some(path);
        self
    }
    pub fn cache_root(mut self, root: Option<PathBuf>) -> Self {
        self.cache_root = root;
        self
    }
    pub fn workers(mut self, n: usize) -> Self {
        self.workers = Some(n);
        self
    }
    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = Some(policy);
        self
    }
    pub fn self_shield_density_threshold(mut self, threshold: f64) -> Self {
        self.self_shield_density_threshold = Some(threshold);
        self
    }
    pub fn max_library_name_chars(mut self, n: usize) -> Self {
        self.max_library_name_chars = Some(n);
        self
    }
    pub fn group_structure(mut self, structure: GroupStructure) -> Self {
        self.group_structure = Some(structure);
        self
    }
    pub fn critical_buckling(mut self, enabled: bool) -> Self {
        self.critical_buckling = Some(enabled);
        self
    }
    pub fn nuclides(mut self, nuclides: Vec<String>) -> Self {
        self.nuclides = Some(nuclides);
        self
    }
    pub fn cycle(mut self, cycle: usize) -> Self {
        self.cycle = Some(cycle);
        self
    }
    pub fn time_node(mut self, node: usize) -> Self {
        self.time_node = Some(node);
        self
    }

    pub fn build(self) -> Result<PipelineConfig, ConfigError> {
        let executable = self
            .executable_path
            .ok_or(ConfigError::MissingParameter("executable_path"))?;
        let executable_path = resolve_executable(&executable)?;

        let library_path = self
            .library_path
            .ok_or(ConfigError::MissingParameter("library_path"))?;
        if !library_path.is_file() {
            return Err(ConfigError::LibraryNotFound(library_path));
        }
        warn_on_library_name(&library_path);

        let nuclides = self
            .nuclides
            .filter(|n| !n.is_empty())
            .ok_or(ConfigError::MissingParameter("nuclides"))?;

        let workers = self.workers.unwrap_or_else(default_workers);
        if workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        let max_library_name_chars = self
            .max_library_name_chars
            .unwrap_or(DEFAULT_MAX_LIBRARY_NAME_CHARS);
        if max_library_name_chars == 0 {
            return Err(ConfigError::ZeroLibraryNameBudget);
        }

        let group_structure = self.group_structure.unwrap_or_default();
        let num_groups = group_structure.num_groups()?;
        if num_groups > RECOMMENDED_MAX_GROUPS {
            warn!(
                groups = num_groups,
                "DRAGON cross sections with more than {RECOMMENDED_MAX_GROUPS} groups may need fine-group condensation and have not been validated."
            );
        }

        let mut mixing = MixingOptions::default();
        if let Some(threshold) = self.self_shield_density_threshold {
            mixing.self_shield_density_threshold = threshold;
        }

        Ok(PipelineConfig {
            executable_path,
            library_path,
            template_path: self.template_path,
            working_dir: self
                .working_dir
                .ok_or(ConfigError::MissingParameter("working_dir"))?,
            cache: CacheConfig {
                root: self.cache_root,
            },
            workers,
            failure_policy: self.failure_policy.unwrap_or_default(),
            mixing,
            max_library_name_chars,
            group_structure,
            critical_buckling: self.critical_buckling.unwrap_or(true),
            nuclides,
            cycle: self.cycle.unwrap_or(0),
            time_node: self.time_node.unwrap_or(0),
        })
    }
}

fn warn_on_library_name(path: &Path) {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    if name.contains("7r0") {
        warn!(
            library = %path.display(),
            "ENDF/B-VII.0 DRAGLIB libraries have no Mo98 data; models containing Mo98 will fail."
        );
    }
}

/// Resolves `exe` to an absolute runnable file, searching `PATH` for bare names.
pub fn resolve_executable(exe: &Path) -> Result<PathBuf, ConfigError> {
    let is_bare_name = exe.components().count() == 1 && !exe.is_absolute();
    let candidate = if is_bare_name {
        std::env::var_os("PATH")
            .and_then(|paths| {
                std::env::split_paths(&paths)
                    .map(|dir| dir.join(exe))
                    .find(|path| path.is_file() && is_runnable(path))
            })
            .ok_or_else(|| ConfigError::ExecutableNotFound(exe.to_path_buf()))?
    } else {
        exe.to_path_buf()
    };

    if !candidate.exists() {
        return Err(ConfigError::ExecutableNotFound(candidate));
    }
    if !candidate.is_file() || !is_runnable(&candidate) {
        return Err(ConfigError::NotExecutable(candidate));
    }
    std::path::absolute(&candidate).map_err(|_| ConfigError::ExecutableNotFound(candidate))
}

#[cfg(unix)]
fn is_runnable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_runnable(path: &Path) -> bool {
    path.is_file()
}
