use crate::error::{CliError, Result};
use std::fs::File;
use std::path::PathBuf;
use tracing::Subscriber;
use tracing_subscriber::{
    Layer,
    filter::{LevelFilter, Targets},
    fmt::{self, format::FmtSpan},
    prelude::*,
    registry::LookupSpan,
};

/// Events from the library and the binary follow the verbosity flags.
const DRAGONXS_TARGET: &str = "dragonxs";

fn level_filter(verbosity: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::ERROR;
    }
    match verbosity {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

/// Dependencies never log below `WARN`, however verbose the run.
fn targets(level: LevelFilter) -> Targets {
    Targets::new()
        .with_default(level.min(LevelFilter::WARN))
        .with_target(DRAGONXS_TARGET, level)
}

/// Full records for the log file: worker thread names and the duration of
/// every closed span, so a slow solver task can be traced to its worker.
fn file_layer<S>(file: File) -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fmt::layer()
        .with_writer(file)
        .with_ansi(false)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true)
}

pub fn setup_logging(verbosity: u8, quiet: bool, log_file: Option<PathBuf>) -> Result<()> {
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_target(false)
        .compact();

    let subscriber = tracing_subscriber::registry()
        .with(targets(level_filter(verbosity, quiet)))
        .with(stderr_layer);

    if let Some(path) = log_file {
        let file = File::create(&path).map_err(CliError::Io)?;
        subscriber.with(file_layer(file)).init();
    } else {
        subscriber.init();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::sync::Once;
    use tracing::{Level, debug, error, info, info_span, trace, warn};

    static INIT: Once = Once::new();

    fn ensure_global_logger_is_set() {
        INIT.call_once(|| {
            setup_logging(3, false, None).expect("Failed to set up global logger for tests");
        });
    }

    #[test]
    fn verbosity_maps_to_levels() {
        assert_eq!(level_filter(0, false), LevelFilter::WARN);
        assert_eq!(level_filter(2, false), LevelFilter::DEBUG);
        assert_eq!(level_filter(9, false), LevelFilter::TRACE);
        assert_eq!(level_filter(3, true), LevelFilter::ERROR);
    }

    #[test]
    fn dependencies_stay_at_warn_when_verbose() {
        let filter = targets(LevelFilter::DEBUG);
        assert!(filter.would_enable("dragonxs::engine::executor", &Level::DEBUG));
        assert!(!filter.would_enable("rayon_core::registry", &Level::DEBUG));
        assert!(filter.would_enable("rayon_core::registry", &Level::WARN));

        let quiet = targets(LevelFilter::ERROR);
        assert!(!quiet.would_enable("dragonxs::workflows", &Level::WARN));
        assert!(!quiet.would_enable("minijinja", &Level::WARN));
    }

    #[test]
    #[serial]
    fn initialization_and_macros_work() {
        ensure_global_logger_is_set();

        error!("This is an error");
        warn!(task_id = "dragon-B1-0-0", "This is a warning");
        info!("This is info");
        debug!("This is debug");
        trace!("This is trace");
    }

    #[test]
    #[serial]
    fn file_layer_records_workers_and_task_spans() {
        let temp_dir = tempfile::tempdir().unwrap();
        let log_path = temp_dir.path().join("dragonxs.log");
        let file = File::create(&log_path).unwrap();
        let subscriber = tracing_subscriber::registry().with(file_layer(file));

        std::thread::Builder::new()
            .name("dragonxs-worker-0".to_string())
            .spawn(move || {
                tracing::subscriber::with_default(subscriber, || {
                    let _span = info_span!("execute_task", task_id = "dragon-B1-0-0").entered();
                    debug!(xs_id = "AA", "Solver finished.");
                });
            })
            .unwrap()
            .join()
            .unwrap();

        let content = std::fs::read_to_string(log_path).unwrap();
        assert!(content.contains("Solver finished."));
        assert!(content.contains("dragonxs-worker-0"));
        assert!(content.contains("ThreadId"));
        assert!(content.contains("task_id=\"dragon-B1-0-0\""));
        assert!(content.contains("time.busy"));
    }

    #[test]
    #[serial]
    fn invalid_log_file_path_propagates_error() {
        let invalid_path = PathBuf::from("/");

        if cfg!(unix) && invalid_path.is_dir() {
            let result = setup_logging(0, false, Some(invalid_path));
            assert!(matches!(result, Err(CliError::Io(_))));
        }
    }
}
