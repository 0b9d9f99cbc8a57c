//! Persistent calculator state shared between the SCF and relaxation stages.
//!
//! A checkpoint is a JSON document holding everything needed to continue from a
//! converged calculation: the structure, the calculator parameters and settings,
//! and the converged electronic state (charges, energy, forces).

use crate::core::calculator::CalculationResult;
use crate::core::calculator::charge_eq::{ChargeEquilibrationCalculator, ScfSettings};
use crate::core::calculator::params::ParameterSet;
use crate::core::models::structure::Structure;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use thiserror::Error;

const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("Checkpoint serialization error for '{path}': {source}")]
    Json {
        path: String,
        source: serde_json::Error,
    },
    #[error("Unsupported checkpoint version {found} (expected {expected})")]
    Version { found: u32, expected: u32 },
    #[error("Checkpoint is inconsistent: {0}")]
    Inconsistent(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub version: u32,
    pub structure: Structure,
    pub parameters: ParameterSet,
    pub settings: ScfSettings,
    pub result: CalculationResult,
}

impl Checkpoint {
    pub fn new(
        structure: Structure,
        parameters: ParameterSet,
        settings: ScfSettings,
        result: CalculationResult,
    ) -> Self {
        Self {
            version: FORMAT_VERSION,
            structure,
            parameters,
            settings,
            result,
        }
    }

    /// Writes the checkpoint and forces it to stable storage before returning.
    pub fn save(&self, path: &Path) -> Result<(), CheckpointError> {
        let io_error = |source| CheckpointError::Io {
            path: path.to_string_lossy().to_string(),
            source,
        };
        let file = File::create(path).map_err(io_error)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self).map_err(|source| CheckpointError::Json {
            path: path.to_string_lossy().to_string(),
            source,
        })?;
        writer.flush().map_err(io_error)?;
        writer.get_ref().sync_all().map_err(io_error)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, CheckpointError> {
        let file = File::open(path).map_err(|source| CheckpointError::Io {
            path: path.to_string_lossy().to_string(),
            source,
        })?;
        let checkpoint: Self =
            serde_json::from_reader(BufReader::new(file)).map_err(|source| CheckpointError::Json {
                path: path.to_string_lossy().to_string(),
                source,
            })?;
        checkpoint.validate()?;
        Ok(checkpoint)
    }

    fn validate(&self) -> Result<(), CheckpointError> {
        if self.version != FORMAT_VERSION {
            return Err(CheckpointError::Version {
                found: self.version,
                expected: FORMAT_VERSION,
            });
        }
        let n = self.structure.len();
        if self.result.charges.len() != n || self.result.forces.len() != n {
            return Err(CheckpointError::Inconsistent(format!(
                "{} atoms but {} charges and {} forces",
                n,
                self.result.charges.len(),
                self.result.forces.len()
            )));
        }
        Ok(())
    }

    /// Rebuilds the calculator with the stored settings, starting from the stored charges.
    pub fn restore_calculator(&self) -> ChargeEquilibrationCalculator {
        ChargeEquilibrationCalculator::new(self.parameters.clone(), self.settings)
            .with_initial_charges(self.result.charges.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::calculator::Calculator;
    use crate::core::models::atom::Atom;
    use crate::core::models::element::Element;
    use crate::core::models::lattice::Lattice;
    use nalgebra::Point3;
    use tempfile::tempdir;

    fn converged_checkpoint() -> Checkpoint {
        let mut structure = Structure::new(Lattice::cubic(6.0));
        structure.push(Atom::new(Element::from_symbol("Si").unwrap(), Point3::new(0.0, 0.0, 0.0)));
        structure.push(Atom::new(Element::from_symbol("C").unwrap(), Point3::new(1.9, 0.0, 0.0)));
        let parameters = ParameterSet::builtin().unwrap();
        let settings = ScfSettings::default();
        let mut calc = ChargeEquilibrationCalculator::new(parameters.clone(), settings);
        let result = calc.calculate(&structure).unwrap();
        Checkpoint::new(structure, parameters, settings, result)
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("preconverged.chk");
        let checkpoint = converged_checkpoint();
        checkpoint.save(&path).unwrap();
        let loaded = Checkpoint::load(&path).unwrap();
        assert_eq!(loaded.structure, checkpoint.structure);
        assert_eq!(loaded.result.charges.len(), 2);
        assert!((loaded.result.energy - checkpoint.result.energy).abs() < 1e-12);
    }

    #[test]
    fn restored_calculator_reproduces_the_stored_energy() {
        let checkpoint = converged_checkpoint();
        let mut calc = checkpoint.restore_calculator();
        let result = calc.calculate(&checkpoint.structure).unwrap();
        assert!((result.energy - checkpoint.result.energy).abs() < 1e-4);
        assert!(result.iterations <= checkpoint.result.iterations);
    }

    #[test]
    fn load_rejects_inconsistent_or_foreign_files() {
        let dir = tempdir().unwrap();

        let mut checkpoint = converged_checkpoint();
        checkpoint.result.charges.pop();
        let path = dir.path().join("broken.chk");
        checkpoint.save(&path).unwrap();
        assert!(matches!(Checkpoint::load(&path), Err(CheckpointError::Inconsistent(_))));

        let mut checkpoint = converged_checkpoint();
        checkpoint.version = 99;
        checkpoint.save(&path).unwrap();
        assert!(matches!(
            Checkpoint::load(&path),
            Err(CheckpointError::Version { found: 99, .. })
        ));

        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(Checkpoint::load(&path), Err(CheckpointError::Json { .. })));
        assert!(matches!(
            Checkpoint::load(&dir.path().join("missing.chk")),
            Err(CheckpointError::Io { .. })
        ));
    }
}
