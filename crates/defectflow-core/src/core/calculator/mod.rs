//! # Calculator Module
//!
//! Energy and force evaluation for periodic structures. Stages talk to a calculator
//! only through the [`Calculator`] trait, so the workflows do not depend on how the
//! electronic problem is solved.
//!
//! ## Key Components
//!
//! - [`charge_eq`] - The built-in self-consistent charge-equilibration calculator
//! - [`params`] - Element parameter tables loaded from TOML
//! - [`neighbors`] - Periodic neighbour search within a cutoff
//!
//! ## Usage
//!
//! ```ignore
//! use defectflow::core::calculator::{Calculator, charge_eq::ChargeEquilibrationCalculator};
//!
//! let mut calc = ChargeEquilibrationCalculator::new(params, settings);
//! let result = calc.calculate(&structure)?;
//! println!("E = {:.6} eV, Fmax = {:.4} eV/Å", result.energy, result.max_force());
//! ```

pub mod charge_eq;
pub mod neighbors;
pub mod params;
pub(crate) mod potentials;

use crate::core::models::structure::Structure;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Converged output of a single-point calculation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationResult {
    /// Total energy in eV.
    pub energy: f64,
    /// Per-atom forces in eV/Å, in structure order.
    pub forces: Vec<Vector3<f64>>,
    /// Per-atom partial charges in units of e.
    pub charges: Vec<f64>,
    /// Self-consistency iterations needed to converge.
    pub iterations: usize,
}

impl CalculationResult {
    /// Largest per-atom force magnitude.
    pub fn max_force(&self) -> f64 {
        self.forces.iter().map(|f| f.norm()).fold(0.0, f64::max)
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CalculatorError {
    #[error("Structure contains no atoms")]
    EmptyStructure,
    #[error("No calculator parameters for element '{0}'")]
    MissingParameters(String),
    #[error(
        "Self-consistency not reached after {iterations} iterations (ΔE = {energy_change:.3e} eV, Δq = {density_change:.3e} e, residual = {residual:.3e} eV²)"
    )]
    NotConverged {
        iterations: usize,
        energy_change: f64,
        density_change: f64,
        residual: f64,
    },
    #[error("Invalid calculator state: {0}")]
    InvalidState(String),
}

/// A method that turns a structure into energy and forces.
pub trait Calculator {
    fn name(&self) -> &str;

    /// Runs a converged single-point calculation.
    ///
    /// # Errors
    ///
    /// Returns [`CalculatorError::NotConverged`] when self-consistency is not reached;
    /// no partial result is ever returned.
    fn calculate(&mut self, structure: &Structure) -> Result<CalculationResult, CalculatorError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_force_is_largest_vector_norm() {
        let result = CalculationResult {
            energy: -1.0,
            forces: vec![
                Vector3::new(0.03, 0.04, 0.0),
                Vector3::new(0.0, -0.01, 0.0),
            ],
            charges: vec![0.1, -0.1],
            iterations: 3,
        };
        assert!((result.max_force() - 0.05).abs() < 1e-15);
    }
}
