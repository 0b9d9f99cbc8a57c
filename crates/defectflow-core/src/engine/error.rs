use thiserror::Error;

use super::checkpoint::CheckpointError;
use super::config::ConfigError;
use super::doping::DopingError;
use super::optimizer::OptimizerError;
use super::supercell::SupercellError;
use crate::core::analysis::distances::AnalysisError;
use crate::core::calculator::CalculatorError;
use crate::core::calculator::params::ParamLoadError;
use crate::core::io::StructureIoError;
use crate::core::models::structure::StructureError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Structure file error: {0}")]
    StructureIo(#[from] StructureIoError),

    #[error("Structure error: {0}")]
    Structure(#[from] StructureError),

    #[error("Supercell construction failed: {0}")]
    Supercell(#[from] SupercellError),

    #[error("Dopant substitution failed: {0}")]
    Doping(#[from] DopingError),

    #[error("Calculator parameters could not be loaded: {0}")]
    Parameters(#[from] ParamLoadError),

    #[error("Calculation failed: {0}")]
    Calculator(#[from] CalculatorError),

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("Optimizer error: {0}")]
    Optimizer(#[from] OptimizerError),

    #[error("Analysis failed: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to write '{path}': {source}")]
    Output {
        path: String,
        source: std::io::Error,
    },
}
