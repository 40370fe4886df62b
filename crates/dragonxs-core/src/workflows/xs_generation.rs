use crate::core::composition::CompositionUnit;
use crate::core::deck::writer::DeckCase;
use crate::engine::config::{FailurePolicy, PipelineConfig};
use crate::engine::dispatcher::{DispatchReport, SyncHook};
use crate::engine::error::{EngineError, TaskFailure};
use crate::engine::merge::{MergedLibrary, ResultMerger};
use crate::engine::pipeline::Pipeline;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::task::{ExecutionTask, InputRole, OutputKind};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

/// Library file DRAGON writes regardless of the case.
pub const ISOTXS_ARTIFACT: &str = "ISOTXS000001";
pub const MERGED_LIBRARY_NAME: &str = "ISOTXS";

#[derive(Debug, Clone)]
pub struct XsGenerationResult {
    pub merged: MergedLibrary,
    /// Where the merged library was written.
    pub output_path: PathBuf,
    /// Outcome of every case, including those that failed before dispatch.
    pub report: DispatchReport,
}

impl XsGenerationResult {
    pub fn failures(&self) -> Vec<TaskFailure> {
        self.report.failures()
    }
}

struct Case<'u> {
    xs_id: String,
    label: String,
    units: Vec<&'u dyn CompositionUnit>,
}

#[instrument(skip_all, name = "xs_generation_workflow", fields(units = units.len()))]
pub fn run(
    units: &[&dyn CompositionUnit],
    config: &PipelineConfig,
    pipeline: &Pipeline,
    reporter: &ProgressReporter,
    sync: Option<&dyn SyncHook>,
) -> Result<XsGenerationResult, EngineError> {
    std::fs::create_dir_all(&config.working_dir).map_err(|e| EngineError::Io {
        path: config.working_dir.clone(),
        source: e,
    })?;

    // === Phase 1: Decks ===
    reporter.report(Progress::PhaseStart {
        name: "Deck Preparation",
    });
    let cases = group_cases(units, config);
    info!(cases = cases.len(), "Grouped units into DRAGON cases.");

    let mut tasks = Vec::with_capacity(cases.len());
    let mut early_failures = Vec::new();
    for case in &cases {
        match prepare_task(case, config, pipeline) {
            Ok(task) => tasks.push(task),
            Err(e) => {
                warn!(task_id = %case.label, xs_id = %case.xs_id, error = %e, "Could not prepare case.");
                early_failures.push((case.xs_id.clone(), TaskFailure::new(&case.label, e)));
            }
        }
    }
    reporter.report(Progress::PhaseFinish);

    // === Phase 2: Execution ===
    reporter.report(Progress::PhaseStart {
        name: "DRAGON Execution",
    });
    let mut report = pipeline.runner.run(&tasks, reporter, sync)?;
    for (xs_id, failure) in early_failures {
        report.push_failure(xs_id, failure);
    }
    reporter.report(Progress::PhaseFinish);

    if report.has_failures() {
        match config.failure_policy {
            FailurePolicy::FailFast => {
                return Err(EngineError::TasksFailed {
                    total: report.total(),
                    failures: report.failures(),
                });
            }
            FailurePolicy::MergePartial => {
                warn!(
                    failed = report.failures().len(),
                    total = report.total(),
                    "Merging the libraries of the cases that succeeded."
                );
            }
        }
    }
    if report.total() > 0 && report.succeeded().next().is_none() {
        return Err(EngineError::TasksFailed {
            total: report.total(),
            failures: report.failures(),
        });
    }

    // === Phase 3: Merge ===
    reporter.report(Progress::PhaseStart {
        name: "Library Merge",
    });
    let destinations: BTreeMap<&str, PathBuf> = tasks
        .iter()
        .filter_map(|task| {
            task.destination_of(ISOTXS_ARTIFACT)
                .map(|path| (task.task_id.as_str(), path))
        })
        .collect();
    let sources: Vec<(String, PathBuf)> = report
        .succeeded()
        .filter_map(|outcome| {
            destinations
                .get(outcome.task_id.as_str())
                .map(|path| (outcome.group_id.clone(), path.clone()))
        })
        .collect();

    let merged = ResultMerger::new(pipeline.codec.as_ref()).merge(&sources)?;
    let output_path = config.working_dir.join(MERGED_LIBRARY_NAME);
    pipeline.codec.write(&merged.library, &output_path)?;
    reporter.report(Progress::PhaseFinish);

    info!(
        path = %output_path.display(),
        xs_ids = merged.summary.nuclides_per_xs_id.len(),
        "Wrote merged cross-section library."
    );
    Ok(XsGenerationResult {
        merged,
        output_path,
        report,
    })
}

/// Groups units by cross-section id, each group ordered by the units' order keys.
fn group_cases<'u>(units: &[&'u dyn CompositionUnit], config: &PipelineConfig) -> Vec<Case<'u>> {
    let mut groups: BTreeMap<&str, Vec<&'u dyn CompositionUnit>> = BTreeMap::new();
    for &unit in units {
        groups.entry(unit.xs_id()).or_default().push(unit);
    }
    groups
        .into_iter()
        .filter_map(|(xs_id, mut members)| {
            members.sort_by_key(|unit| unit.order_key());
            let label = format!(
                "dragon-{}-{}-{}",
                members.first()?.name(),
                config.cycle,
                config.time_node
            );
            Some(Case {
                xs_id: xs_id.to_string(),
                label,
                units: members,
            })
        })
        .collect()
}

fn deck_name(xs_id: &str) -> String {
    format!("dragon{xs_id}.x2m")
}

fn prepare_task(case: &Case<'_>, config: &PipelineConfig, pipeline: &Pipeline) -> Result<ExecutionTask, EngineError> {
    let deck_path = config.working_dir.join(deck_name(&case.xs_id));
    let deck_case = DeckCase {
        xs_id: &case.xs_id,
        units: &case.units,
    };
    pipeline.deck_writer.write(&deck_case, &deck_path)?;
    build_task(case, &deck_path, config)
}

fn build_task(case: &Case<'_>, deck_path: &Path, config: &PipelineConfig) -> Result<ExecutionTask, EngineError> {
    let dest = &config.working_dir;
    ExecutionTask::builder(&case.label)
        .group_id(&case.xs_id)
        .executable(&config.executable_path)
        .input(deck_path, InputRole::Primary)
        .input(&config.library_path, InputRole::Library)
        .output(format!("{}out", deck_name(&case.xs_id)), dest, OutputKind::Log, true)
        .output(ISOTXS_ARTIFACT, dest, OutputKind::Artifact, true)
        .rename_on_return(ISOTXS_ARTIFACT, format!("ISO{}", case.xs_id))
        .build()
        .map_err(|e| EngineError::SolverExecution {
            task_id: case.label.clone(),
            input: deck_name(&case.xs_id),
            reason: e.to_string(),
        })
}
