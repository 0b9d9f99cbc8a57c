use defectflow::core::models::element::Element;
use defectflow::engine::config as core_config;
use defectflow::workflows::relax::RelaxOutputs;
use std::path::PathBuf;

pub struct BuildAppConfig {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub seed: Option<u64>,
    pub core_config: core_config::BuildConfig,
}

pub struct ScfAppConfig {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    /// Species of the doping step, used to report how many of each remain.
    pub host: Element,
    pub dopant: Element,
    pub core_config: core_config::ScfConfig,
}

pub struct RelaxAppConfig {
    pub input_path: PathBuf,
    pub outputs: RelaxOutputs,
    pub core_config: core_config::RelaxConfig,
}

pub struct AnalyzeAppConfig {
    pub input_path: PathBuf,
    pub core_config: core_config::AnalysisConfig,
}
