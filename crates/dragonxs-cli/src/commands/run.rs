use crate::cli::RunArgs;
use crate::config::PartialRunConfig;
use crate::error::{CliError, Result};
use crate::utils::progress::CliProgressHandler;
use dragonxs::{
    core::{composition::CompositionUnit, io::composition_file},
    engine::{pipeline::Pipeline, progress::ProgressReporter},
    workflows,
};
use tracing::{info, warn};

pub fn run(args: RunArgs) -> Result<()> {
    let partial_config = PartialRunConfig::from_file(&args.config)?;
    info!("Merging configuration from file and CLI arguments...");
    let config = partial_config.merge_with_cli(&args)?;

    info!("Loading composition units from {:?}", &args.input);
    let blocks = composition_file::load(&args.input).map_err(|e| CliError::FileParsing {
        path: args.input.clone(),
        source: e.into(),
    })?;
    let units: Vec<&dyn CompositionUnit> = blocks.iter().map(|b| b as &dyn CompositionUnit).collect();

    let pipeline = Pipeline::from_config(&config)?;
    let progress_handler = CliProgressHandler::new();
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

    println!(
        "Generating cross sections for {} unit(s) with {} worker(s)...",
        units.len(),
        config.workers
    );
    let result = workflows::xs_generation::run(&units, &config, &pipeline, &reporter, None)?;

    let failures = result.failures();
    if !failures.is_empty() {
        warn!(failed = failures.len(), "Some cases failed and were left out of the merge.");
        println!("Warning: {} case(s) failed:", failures.len());
        for failure in &failures {
            println!("  ✗ {failure}");
        }
    }

    println!(
        "✓ Merged library ({} cross-section id(s), {} nuclide entries) written to: {}",
        result.merged.summary.nuclides_per_xs_id.len(),
        result.merged.library.nuclides.len(),
        result.output_path.display()
    );

    if let Some(path) = &args.velocities {
        result.merged.write_velocity_csv(path)?;
        println!("✓ Neutron velocities written to: {}", path.display());
    }

    Ok(())
}
