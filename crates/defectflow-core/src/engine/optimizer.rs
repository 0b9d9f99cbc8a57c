//! Quasi-Newton geometry optimisation.
//!
//! [`Bfgs`] keeps an approximate Hessian in cartesian coordinates, updates it with
//! the BFGS formula after every step and takes the Newton step from its eigen
//! decomposition, using absolute eigenvalues so that every step goes downhill.
//! The longest per-atom displacement is capped at `maxstep`.

use crate::core::calculator::{CalculationResult, Calculator};
use crate::core::models::structure::Structure;
use crate::engine::error::EngineError;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info};

/// Displacements below this are treated as "did not move" and skip the Hessian update.
const MIN_UPDATE_DISPLACEMENT: f64 = 1e-7;

#[derive(Debug, Error)]
pub enum OptimizerError {
    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("Optimizer state serialization error for '{path}': {source}")]
    Json {
        path: String,
        source: serde_json::Error,
    },
    #[error("Optimizer state has {found} degrees of freedom, structure has {expected}")]
    Dimension { expected: usize, found: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BfgsSettings {
    /// Largest displacement of any single atom per step, Å.
    pub maxstep: f64,
    /// Curvature of the initial diagonal Hessian, eV/Å².
    pub alpha: f64,
}

impl Default for BfgsSettings {
    fn default() -> Self {
        Self {
            maxstep: 0.2,
            alpha: 70.0,
        }
    }
}

/// Serializable snapshot of the optimizer, written after every step so an
/// interrupted relaxation can continue with its accumulated curvature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerState {
    pub settings: BfgsSettings,
    pub hessian: Option<Vec<Vec<f64>>>,
    pub previous_positions: Option<Vec<f64>>,
    pub previous_forces: Option<Vec<f64>>,
}

impl OptimizerState {
    pub fn save(&self, path: &Path) -> Result<(), OptimizerError> {
        let io_error = |source| OptimizerError::Io {
            path: path.to_string_lossy().to_string(),
            source,
        };
        let mut writer = BufWriter::new(File::create(path).map_err(io_error)?);
        serde_json::to_writer(&mut writer, self).map_err(|source| OptimizerError::Json {
            path: path.to_string_lossy().to_string(),
            source,
        })?;
        writer.flush().map_err(io_error)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, OptimizerError> {
        let file = File::open(path).map_err(|source| OptimizerError::Io {
            path: path.to_string_lossy().to_string(),
            source,
        })?;
        serde_json::from_reader(BufReader::new(file)).map_err(|source| OptimizerError::Json {
            path: path.to_string_lossy().to_string(),
            source,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Bfgs {
    settings: BfgsSettings,
    hessian: Option<DMatrix<f64>>,
    previous_positions: Option<DVector<f64>>,
    previous_forces: Option<DVector<f64>>,
}

/// Everything known about the current geometry when a step is recorded.
#[derive(Debug)]
pub struct StepRecord<'a> {
    pub step: usize,
    pub structure: &'a Structure,
    pub result: &'a CalculationResult,
    pub max_force: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationReport {
    /// Number of position updates performed.
    pub steps: usize,
    /// Whether the optimizer itself saw `max_force < fmax`.
    pub converged: bool,
    pub energy: f64,
    pub max_force: f64,
}

impl Bfgs {
    pub fn new(settings: BfgsSettings) -> Self {
        Self {
            settings,
            hessian: None,
            previous_positions: None,
            previous_forces: None,
        }
    }

    /// Restores an optimizer for a structure with `atoms` atoms.
    pub fn from_state(state: OptimizerState, atoms: usize) -> Result<Self, OptimizerError> {
        let dof = 3 * atoms;
        let check = |found: usize| {
            if found == dof {
                Ok(())
            } else {
                Err(OptimizerError::Dimension {
                    expected: dof,
                    found,
                })
            }
        };

        let hessian = match state.hessian {
            Some(rows) => {
                check(rows.len())?;
                for row in &rows {
                    check(row.len())?;
                }
                let flat: Vec<f64> = rows.into_iter().flatten().collect();
                Some(DMatrix::from_row_slice(dof, dof, &flat))
            }
            None => None,
        };
        let vector = |data: Option<Vec<f64>>| -> Result<Option<DVector<f64>>, OptimizerError> {
            match data {
                Some(v) => {
                    check(v.len())?;
                    Ok(Some(DVector::from_vec(v)))
                }
                None => Ok(None),
            }
        };

        Ok(Self {
            settings: state.settings,
            hessian,
            previous_positions: vector(state.previous_positions)?,
            previous_forces: vector(state.previous_forces)?,
        })
    }

    pub fn state(&self) -> OptimizerState {
        OptimizerState {
            settings: self.settings,
            hessian: self
                .hessian
                .as_ref()
                .map(|h| h.row_iter().map(|row| row.iter().copied().collect()).collect()),
            previous_positions: self.previous_positions.as_ref().map(|v| v.as_slice().to_vec()),
            previous_forces: self.previous_forces.as_ref().map(|v| v.as_slice().to_vec()),
        }
    }

    pub fn settings(&self) -> &BfgsSettings {
        &self.settings
    }

    fn update_hessian(&mut self, positions: &DVector<f64>, forces: &DVector<f64>) {
        let Some(hessian) = self.hessian.as_mut() else {
            self.hessian = Some(DMatrix::identity(positions.len(), positions.len()) * self.settings.alpha);
            return;
        };
        let (Some(r0), Some(f0)) = (&self.previous_positions, &self.previous_forces) else {
            return;
        };

        let dr = positions - r0;
        if dr.amax() < MIN_UPDATE_DISPLACEMENT {
            return;
        }
        let df = forces - f0;
        let a = dr.dot(&df);
        let dg = &*hessian * &dr;
        let b = dr.dot(&dg);
        if a.abs() < f64::EPSILON || b.abs() < f64::EPSILON {
            debug!(a, b, "Skipping degenerate Hessian update");
            return;
        }
        *hessian -= &df * df.transpose() / a + &dg * dg.transpose() / b;
    }

    /// Returns the new flat positions for the given flat positions and forces.
    pub fn step(&mut self, positions: &DVector<f64>, forces: &DVector<f64>) -> DVector<f64> {
        self.update_hessian(positions, forces);
        let hessian = match &self.hessian {
            Some(h) => h.clone(),
            None => DMatrix::identity(positions.len(), positions.len()) * self.settings.alpha,
        };

        let eigen = hessian.symmetric_eigen();
        let projected = eigen.eigenvectors.transpose() * forces;
        let scaled = DVector::from_iterator(
            projected.len(),
            projected
                .iter()
                .zip(eigen.eigenvalues.iter())
                .map(|(f, w)| f / w.abs()),
        );
        let mut dr = &eigen.eigenvectors * scaled;

        let longest = dr
            .as_slice()
            .chunks(3)
            .map(|d| (d[0] * d[0] + d[1] * d[1] + d[2] * d[2]).sqrt())
            .fold(0.0, f64::max);
        if longest > self.settings.maxstep {
            dr *= self.settings.maxstep / longest;
        }

        self.previous_positions = Some(positions.clone());
        self.previous_forces = Some(forces.clone());
        positions + dr
    }

    /// Relaxes `structure` in place until `max_force < fmax` or `steps` updates were made.
    ///
    /// `on_step` sees every evaluated geometry, including the starting one, and the
    /// optimizer state after the preceding update.
    pub fn run<C, F>(
        &mut self,
        structure: &mut Structure,
        calculator: &mut C,
        fmax: f64,
        steps: usize,
        mut on_step: F,
    ) -> Result<OptimizationReport, EngineError>
    where
        C: Calculator + ?Sized,
        F: FnMut(&StepRecord<'_>, &Bfgs) -> Result<(), EngineError>,
    {
        let mut step = 0;
        loop {
            let result = calculator.calculate(structure)?;
            let max_force = result.max_force();
            on_step(
                &StepRecord {
                    step,
                    structure: &*structure,
                    result: &result,
                    max_force,
                },
                self,
            )?;

            let converged = max_force < fmax;
            if converged || step >= steps {
                info!(step, energy = result.energy, max_force, converged, "BFGS finished");
                return Ok(OptimizationReport {
                    steps: step,
                    converged,
                    energy: result.energy,
                    max_force,
                });
            }

            let forces = DVector::from_iterator(
                result.forces.len() * 3,
                result.forces.iter().flat_map(|f| [f.x, f.y, f.z]),
            );
            let updated = self.step(&structure.positions_flat(), &forces);
            structure.set_positions_flat(&updated)?;
            step += 1;
        }
    }
}

/// Human-readable optimisation log, one line per evaluated geometry.
pub struct OptimizerLog {
    writer: BufWriter<File>,
    started: Instant,
}

impl OptimizerLog {
    pub fn create(path: &Path, append: bool) -> Result<Self, OptimizerError> {
        let io_error = |source| OptimizerError::Io {
            path: path.to_string_lossy().to_string(),
            source,
        };
        let file = if append {
            File::options().create(true).append(true).open(path)
        } else {
            File::create(path)
        }
        .map_err(io_error)?;
        let mut writer = BufWriter::new(file);
        writeln!(
            writer,
            "{:>10} {:>4} {:>10} {:>18} {:>12}",
            "", "Step", "Time[s]", "Energy[eV]", "fmax[eV/Å]"
        )
        .map_err(io_error)?;
        Ok(Self {
            writer,
            started: Instant::now(),
        })
    }

    pub fn record(&mut self, step: usize, energy: f64, fmax: f64) -> Result<(), std::io::Error> {
        writeln!(
            self.writer,
            "{:>10} {:>4} {:>10.2} {:>18.6} {:>12.4}",
            "BFGS:",
            step,
            self.started.elapsed().as_secs_f64(),
            energy,
            fmax
        )?;
        self.writer.flush()
    }
}
