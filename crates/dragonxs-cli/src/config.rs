use crate::cli::{FailurePolicyFlags, RunArgs};
use crate::error::{CliError, Result};
use dragonxs::core::deck::groups::GroupStructure;
use dragonxs::engine::config as core_config;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct PartialSolverConfig {
    executable: Option<PathBuf>,
    library: Option<PathBuf>,
    max_library_name_chars: Option<usize>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct PartialDeckConfig {
    template: Option<PathBuf>,
    nuclides: Option<Vec<String>>,
    group_structure: Option<GroupStructure>,
    critical_buckling: Option<bool>,
    self_shield_density_threshold: Option<f64>,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
enum PartialFailurePolicy {
    FailFast,
    MergePartial,
}

impl From<PartialFailurePolicy> for core_config::FailurePolicy {
    fn from(p: PartialFailurePolicy) -> Self {
        match p {
            PartialFailurePolicy::FailFast => core_config::FailurePolicy::FailFast,
            PartialFailurePolicy::MergePartial => core_config::FailurePolicy::MergePartial,
        }
    }
}

impl FromStr for PartialFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "fail-fast" => Ok(Self::FailFast),
            "merge-partial" => Ok(Self::MergePartial),
            other => Err(format!(
                "unknown failure policy '{other}', expected 'fail-fast' or 'merge-partial'"
            )),
        }
    }
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct PartialExecutionConfig {
    working_dir: Option<PathBuf>,
    workers: Option<usize>,
    failure_policy: Option<PartialFailurePolicy>,
    cycle: Option<usize>,
    time_node: Option<usize>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct PartialCacheConfig {
    root: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct PartialRunConfig {
    solver: Option<PartialSolverConfig>,
    deck: Option<PartialDeckConfig>,
    execution: Option<PartialExecutionConfig>,
    cache: Option<PartialCacheConfig>,
}

impl PartialRunConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })
    }

    pub fn cache_root(&self) -> Option<&Path> {
        self.cache.as_ref()?.root.as_deref()
    }

    pub fn merge_with_cli(mut self, args: &RunArgs) -> Result<core_config::PipelineConfig> {
        self.apply_set_values(&args.set_values)?;

        let solver = self.solver.take().unwrap_or_default();
        let deck = self.deck.take().unwrap_or_default();
        let execution = self.execution.take().unwrap_or_default();
        let cache = self.cache.take().unwrap_or_default();

        let executable = args
            .executable
            .clone()
            .or(solver.executable)
            .ok_or_else(|| required("solver.executable"))?;
        let library = args
            .library
            .clone()
            .or(solver.library)
            .ok_or_else(|| required("solver.library"))?;
        let nuclides = deck.nuclides.ok_or_else(|| required("deck.nuclides"))?;

        let mut builder = core_config::PipelineConfigBuilder::new()
            .executable_path(executable)
            .library_path(resolve_library(library))
            .template_path(args.template.clone().or(deck.template))
            .working_dir(
                args.working_dir
                    .clone()
                    .or(execution.working_dir)
                    .unwrap_or_else(|| PathBuf::from(".")),
            )
            .cache_root(if args.no_cache { None } else { cache.root })
            .failure_policy(Self::merge_failure_policy(
                args.failure_policy,
                execution.failure_policy,
            ))
            .nuclides(nuclides)
            .cycle(execution.cycle.unwrap_or(0))
            .time_node(execution.time_node.unwrap_or(0));

        if let Some(workers) = args.workers.or(execution.workers) {
            builder = builder.workers(workers);
        }
        if let Some(n) = solver.max_library_name_chars {
            builder = builder.max_library_name_chars(n);
        }
        if let Some(structure) = deck.group_structure {
            builder = builder.group_structure(structure);
        }
        if let Some(enabled) = deck.critical_buckling {
            builder = builder.critical_buckling(enabled);
        }
        if let Some(threshold) = deck.self_shield_density_threshold {
            builder = builder.self_shield_density_threshold(threshold);
        }

        builder.build().map_err(|e| CliError::Config(e.to_string()))
    }

    fn merge_failure_policy(
        cli_flags: FailurePolicyFlags,
        file_val: Option<PartialFailurePolicy>,
    ) -> core_config::FailurePolicy {
        if cli_flags.partial {
            core_config::FailurePolicy::MergePartial
        } else if cli_flags.fail_fast {
            core_config::FailurePolicy::FailFast
        } else {
            file_val.map(Into::into).unwrap_or_default()
        }
    }

    fn apply_set_values(&mut self, set_values: &[String]) -> Result<()> {
        for kv_pair in set_values {
            let Some((key, value)) = kv_pair.split_once('=') else {
                return Err(CliError::Config(format!(
                    "Invalid --set format: '{}'. Expected KEY=VALUE.",
                    kv_pair
                )));
            };

            match key {
                "solver.executable" => {
                    self.solver.get_or_insert_with(Default::default).executable = Some(PathBuf::from(value));
                }
                "solver.library" => {
                    self.solver.get_or_insert_with(Default::default).library = Some(PathBuf::from(value));
                }
                "solver.max-library-name-chars" => {
                    self.solver.get_or_insert_with(Default::default).max_library_name_chars =
                        Some(parse_value(key, value)?);
                }
                "deck.template" => {
                    self.deck.get_or_insert_with(Default::default).template = Some(PathBuf::from(value));
                }
                "deck.group-structure" => {
                    self.deck.get_or_insert_with(Default::default).group_structure =
                        Some(GroupStructure::Named(value.to_string()));
                }
                "deck.critical-buckling" => {
                    self.deck.get_or_insert_with(Default::default).critical_buckling =
                        Some(parse_value(key, value)?);
                }
                "deck.self-shield-density-threshold" => {
                    self.deck
                        .get_or_insert_with(Default::default)
                        .self_shield_density_threshold = Some(parse_value(key, value)?);
                }
                "execution.working-dir" => {
                    self.execution.get_or_insert_with(Default::default).working_dir =
                        Some(PathBuf::from(value));
                }
                "execution.workers" => {
                    self.execution.get_or_insert_with(Default::default).workers =
                        Some(parse_value(key, value)?);
                }
                "execution.failure-policy" => {
                    self.execution.get_or_insert_with(Default::default).failure_policy =
                        Some(value.parse().map_err(CliError::Config)?);
                }
                "execution.cycle" => {
                    self.execution.get_or_insert_with(Default::default).cycle =
                        Some(parse_value(key, value)?);
                }
                "execution.time-node" => {
                    self.execution.get_or_insert_with(Default::default).time_node =
                        Some(parse_value(key, value)?);
                }
                "cache.root" => {
                    self.cache.get_or_insert_with(Default::default).root = Some(PathBuf::from(value));
                }
                _ => {
                    return Err(CliError::Config(format!(
                        "Unsupported configuration key for --set: '{}'",
                        key
                    )));
                }
            }
        }
        Ok(())
    }
}

fn required(key: &str) -> CliError {
    CliError::Config(format!(
        "A value for '{}' is required either in the config file or via CLI argument.",
        key
    ))
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| CliError::Config(format!("Invalid value for {}: {}", key, value)))
}

/// A directory stands for the default DRAGLIB file inside it.
fn resolve_library(path: PathBuf) -> PathBuf {
    if path.is_dir() {
        path.join(core_config::DEFAULT_LIBRARY_NAME)
    } else {
        path
    }
}
