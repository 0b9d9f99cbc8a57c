pub mod analyze;
pub mod build;
pub mod pipeline;
pub mod relax;
pub mod scf;

use crate::error::CliError;
use crate::utils::progress::CliProgressHandler;
use defectflow::core::io::{self, StructureIoError};
use defectflow::core::models::structure::Structure;
use defectflow::engine::parallel::ParallelContext;
use std::path::Path;
use tracing::info;

/// Progress is drawn by the coordinator only.
fn progress_handler(context: &ParallelContext) -> CliProgressHandler {
    if context.is_coordinator() {
        CliProgressHandler::new()
    } else {
        CliProgressHandler::hidden()
    }
}

fn read_structure(path: &Path) -> Result<Structure, CliError> {
    info!("Loading structure from {:?}", path);
    io::read_structure(path).map_err(|e: StructureIoError| CliError::FileParsing {
        path: path.to_path_buf(),
        source: e.into(),
    })
}
