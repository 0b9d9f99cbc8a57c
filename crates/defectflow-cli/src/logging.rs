use crate::error::{CliError, Result};
use defectflow::engine::parallel::ParallelContext;
use std::fs::File;
use std::path::Path;
use tracing_subscriber::{
    filter::LevelFilter,
    fmt::{self},
    prelude::*,
};

pub fn level_filter(verbosity: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::OFF;
    }
    match verbosity {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

/// Level and log file a process actually uses.
///
/// Worker ranks log nothing and never open the log file, which belongs to the
/// coordinator.
pub fn effective_settings<'a>(
    verbosity: u8,
    quiet: bool,
    log_file: Option<&'a Path>,
    context: &ParallelContext,
) -> (LevelFilter, Option<&'a Path>) {
    if context.is_coordinator() {
        (level_filter(verbosity, quiet), log_file)
    } else {
        (LevelFilter::OFF, None)
    }
}

/// Installs the global subscriber: a compact stderr layer and, when requested,
/// a plain-text file layer.
pub fn setup_logging(
    verbosity: u8,
    quiet: bool,
    log_file: Option<&Path>,
    context: &ParallelContext,
) -> Result<()> {
    let (level, log_file) = effective_settings(verbosity, quiet, log_file, context);

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_target(false)
        .compact();

    let subscriber = tracing_subscriber::registry()
        .with(level)
        .with(stderr_layer);

    if let Some(path) = log_file {
        let file = File::create(path).map_err(CliError::Io)?;

        let file_layer = fmt::layer()
            .with_writer(file)
            .with_ansi(false)
            .with_thread_ids(true)
            .with_target(true);

        subscriber.with(file_layer).init();
    } else {
        subscriber.init();
    }

    Ok(())
}
