use crate::cli::{CacheArgs, CacheCommands};
use crate::config::PartialRunConfig;
use crate::error::{CliError, Result};
use dragonxs::engine::cache::{CacheKey, OutputCache};
use dragonxs::engine::error::EngineError;
use std::path::PathBuf;
use tracing::info;

pub fn run(args: CacheArgs) -> Result<()> {
    match args.command {
        CacheCommands::Key { executable, inputs } => {
            let key = CacheKey::compute(&executable, inputs.as_slice()).map_err(EngineError::from)?;
            println!("{key}");
        }
        CacheCommands::Clear { root, config } => {
            let root = resolve_root(root, config)?;
            info!("Clearing output cache at {:?}", &root);
            OutputCache::new(&root).clear().map_err(EngineError::from)?;
            println!("✓ Cleared output cache: {}", root.display());
        }
    }
    Ok(())
}

fn resolve_root(root: Option<PathBuf>, config: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(root) = root {
        return Ok(root);
    }
    let path = config.ok_or_else(|| CliError::Config("either --root or --config is required".to_string()))?;
    PartialRunConfig::from_file(&path)?
        .cache_root()
        .map(PathBuf::from)
        .ok_or_else(|| CliError::Config(format!("'{}' does not configure `cache.root`", path.display())))
}
