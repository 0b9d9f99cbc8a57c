use crate::error::{CliError, Result};
use crate::utils::parser;
use defectflow::core::models::element::Element;
use defectflow::engine::supercell::SupercellMatrix;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A tiling matrix as written in a config file: a full matrix, its diagonal,
/// or the command-line spelling such as `"2x2x1"`.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum FileSupercell {
    Matrix(SupercellMatrix),
    Diagonal([i32; 3]),
    Text(String),
}

impl FileSupercell {
    pub fn resolve(&self) -> Result<SupercellMatrix> {
        match self {
            Self::Matrix(matrix) => Ok(*matrix),
            Self::Diagonal([a, b, c]) => Ok(SupercellMatrix::diagonal(*a, *b, *c)),
            Self::Text(text) => {
                parser::parse_supercell(text).map_err(|e| CliError::Config(e.to_string()))
            }
        }
    }
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileBuildConfig {
    pub supercell: Option<FileSupercell>,
    pub host: Option<Element>,
    pub dopant: Option<Element>,
    pub count: Option<usize>,
    pub seed: Option<u64>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileConvergenceConfig {
    pub energy: Option<f64>,
    pub density: Option<f64>,
    pub eigenstates: Option<f64>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileScfConfig {
    pub parameters: Option<PathBuf>,
    pub max_iterations: Option<usize>,
    pub mixing: Option<f64>,
    pub convergence: Option<FileConvergenceConfig>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileRelaxConfig {
    pub fmax: Option<f64>,
    pub steps: Option<usize>,
    pub maxstep: Option<f64>,
    pub alpha: Option<f64>,
    pub restart: Option<bool>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileAnalysisConfig {
    pub species: Option<Element>,
    pub minimum_image: Option<bool>,
    pub csv: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileNamesConfig {
    pub doped_structure: Option<PathBuf>,
    pub scf_checkpoint: Option<PathBuf>,
    pub relaxed_checkpoint: Option<PathBuf>,
    pub relaxed_geometry: Option<PathBuf>,
    pub optimizer_log: Option<PathBuf>,
    pub trajectory: Option<PathBuf>,
    pub optimizer_restart: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub build: Option<FileBuildConfig>,
    pub scf: Option<FileScfConfig>,
    pub relax: Option<FileRelaxConfig>,
    pub analysis: Option<FileAnalysisConfig>,
    pub files: Option<FileNamesConfig>,
}

/// Reads a config file as an untyped table so that overrides can be merged
/// before the typed view is built.
pub fn read_table(path: &Path) -> Result<toml::Table> {
    debug!("Loading configuration from file: {:?}", path);
    let content = std::fs::read_to_string(path)?;
    content.parse::<toml::Table>().map_err(|e| CliError::FileParsing {
        path: path.to_path_buf(),
        source: e.into(),
    })
}

impl FileConfig {
    pub fn from_table(table: toml::Table) -> std::result::Result<Self, toml::de::Error> {
        toml::Value::Table(table).try_into()
    }
}
