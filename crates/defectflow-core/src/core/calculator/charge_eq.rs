use super::neighbors::NeighborList;
use super::params::{ElementParams, ParameterSet};
use super::potentials::{apply_taper, morse, screened_coulomb, taper};
use super::{CalculationResult, Calculator, CalculatorError};
use crate::core::models::structure::Structure;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Thresholds that must all hold for the charge iteration to count as converged.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ConvergenceCriteria {
    /// Change of total energy between iterations, eV.
    pub energy: f64,
    /// RMS change of the atomic charges between iterations, e.
    pub density: f64,
    /// Mean squared deviation of the atomic chemical potentials from their mean, eV².
    pub eigenstates: f64,
}

impl Default for ConvergenceCriteria {
    fn default() -> Self {
        Self {
            energy: 1e-5,
            density: 1e-3,
            eigenstates: 1e-8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScfSettings {
    pub convergence: ConvergenceCriteria,
    pub max_iterations: usize,
    /// Fraction of the new charges mixed into the old ones each iteration.
    pub mixing: f64,
}

impl Default for ScfSettings {
    fn default() -> Self {
        Self {
            convergence: ConvergenceCriteria::default(),
            max_iterations: 100,
            mixing: 0.6,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct PairTerm {
    index: usize,
    unit: Vector3<f64>,
    /// Tapered Morse energy and radial derivative.
    morse: (f64, f64),
    /// Tapered screened Coulomb kernel and radial derivative.
    kernel: (f64, f64),
}

/// Self-consistent charge equilibration on top of a tapered Morse pair potential.
///
/// Each iteration computes the electrostatic potential at every site from the
/// current charges, equalises the chemical potential under a total-charge
/// constraint and mixes the resulting charges into the current ones. Forces are
/// taken at self-consistency, where the charge response does not contribute.
#[derive(Debug, Clone)]
pub struct ChargeEquilibrationCalculator {
    params: ParameterSet,
    settings: ScfSettings,
    initial_charges: Option<Vec<f64>>,
    cache: Option<(Structure, CalculationResult)>,
    evaluations: usize,
}

impl ChargeEquilibrationCalculator {
    pub fn new(params: ParameterSet, settings: ScfSettings) -> Self {
        Self {
            params,
            settings,
            initial_charges: None,
            cache: None,
            evaluations: 0,
        }
    }

    /// Starts the next charge iteration from previously converged charges.
    pub fn with_initial_charges(mut self, charges: Vec<f64>) -> Self {
        self.initial_charges = Some(charges);
        self
    }

    pub fn params(&self) -> &ParameterSet {
        &self.params
    }

    pub fn settings(&self) -> &ScfSettings {
        &self.settings
    }

    /// Number of full self-consistent evaluations performed (cache hits excluded).
    pub fn evaluations(&self) -> usize {
        self.evaluations
    }

    fn site_params(&self, structure: &Structure) -> Result<Vec<ElementParams>, CalculatorError> {
        structure
            .atoms()
            .iter()
            .map(|atom| {
                self.params
                    .element(atom.element)
                    .copied()
                    .ok_or_else(|| CalculatorError::MissingParameters(atom.symbol().to_string()))
            })
            .collect()
    }

    fn pair_terms(&self, structure: &Structure, sites: &[ElementParams]) -> Vec<Vec<PairTerm>> {
        let globals = &self.params.globals;
        let list = NeighborList::build(structure, globals.cutoff);

        let terms_for = |i: usize| -> Vec<PairTerm> {
            list.of(i)
                .iter()
                .map(|neighbor| {
                    let r = neighbor.distance;
                    let pair = self.params.pair(&sites[i], &sites[neighbor.index]);
                    let switch = taper(r, globals.cutoff, globals.taper_width);
                    PairTerm {
                        index: neighbor.index,
                        unit: neighbor.vector / r,
                        morse: apply_taper(
                            morse(r, pair.equilibrium_distance, pair.well_depth, pair.stiffness),
                            switch,
                        ),
                        kernel: apply_taper(screened_coulomb(r, globals.screening_length), switch),
                    }
                })
                .collect()
        };

        #[cfg(not(feature = "parallel"))]
        let iterator = 0..sites.len();

        #[cfg(feature = "parallel")]
        let iterator = (0..sites.len()).into_par_iter();

        iterator.map(terms_for).collect()
    }

    fn starting_charges(&self, n: usize) -> Vec<f64> {
        let total = self.params.globals.total_charge;
        match &self.initial_charges {
            Some(charges) if charges.len() == n => {
                // Shift uniformly so the constraint holds exactly from the start.
                let shift = (total - charges.iter().sum::<f64>()) / n as f64;
                charges.iter().map(|q| q + shift).collect()
            }
            _ => vec![total / n as f64; n],
        }
    }

    fn energy(sites: &[ElementParams], pairs: &[Vec<PairTerm>], charges: &[f64]) -> f64 {
        let onsite: f64 = sites
            .iter()
            .zip(charges)
            .map(|(p, q)| p.electronegativity * q + 0.5 * p.hardness * q * q)
            .sum();
        let pair: f64 = pairs
            .iter()
            .enumerate()
            .flat_map(|(i, terms)| {
                terms
                    .iter()
                    .map(move |t| t.morse.0 + charges[i] * charges[t.index] * t.kernel.0)
            })
            .sum();
        onsite + 0.5 * pair
    }

    fn forces(pairs: &[Vec<PairTerm>], charges: &[f64]) -> Vec<Vector3<f64>> {
        let force_on = |(i, terms): (usize, &Vec<PairTerm>)| -> Vector3<f64> {
            terms.iter().fold(Vector3::zeros(), |acc, t| {
                let derivative = t.morse.1 + charges[i] * charges[t.index] * t.kernel.1;
                acc + t.unit * derivative
            })
        };

        #[cfg(not(feature = "parallel"))]
        let iterator = pairs.iter().enumerate();

        #[cfg(feature = "parallel")]
        let iterator = pairs.par_iter().enumerate();

        iterator.map(force_on).collect()
    }

    fn solve(&self, structure: &Structure) -> Result<CalculationResult, CalculatorError> {
        if structure.is_empty() {
            return Err(CalculatorError::EmptyStructure);
        }
        let sites = self.site_params(structure)?;
        let pairs = self.pair_terms(structure, &sites);
        let n = sites.len();
        let total_charge = self.params.globals.total_charge;
        let ScfSettings {
            convergence,
            max_iterations,
            mixing,
        } = self.settings;

        let inverse_hardness_sum: f64 = sites.iter().map(|p| 1.0 / p.hardness).sum();
        let mut charges = self.starting_charges(n);
        let mut energy = Self::energy(&sites, &pairs, &charges);
        let (mut energy_change, mut density_change, mut residual) = (f64::INFINITY, f64::INFINITY, f64::INFINITY);

        for iteration in 1..=max_iterations {
            let potentials: Vec<f64> = sites
                .iter()
                .zip(&pairs)
                .map(|(p, terms)| {
                    p.electronegativity + terms.iter().map(|t| t.kernel.0 * charges[t.index]).sum::<f64>()
                })
                .collect();

            let chemical: Vec<f64> = potentials
                .iter()
                .zip(&sites)
                .zip(&charges)
                .map(|((v, p), q)| v + p.hardness * q)
                .collect();
            let mean_chemical = chemical.iter().sum::<f64>() / n as f64;
            residual = chemical.iter().map(|m| (m - mean_chemical).powi(2)).sum::<f64>() / n as f64;

            let mu = (total_charge
                + potentials
                    .iter()
                    .zip(&sites)
                    .map(|(v, p)| v / p.hardness)
                    .sum::<f64>())
                / inverse_hardness_sum;

            let updated: Vec<f64> = potentials
                .iter()
                .zip(&sites)
                .zip(&charges)
                .map(|((v, p), q)| q + mixing * ((mu - v) / p.hardness - q))
                .collect();

            density_change = (updated
                .iter()
                .zip(&charges)
                .map(|(a, b)| (a - b).powi(2))
                .sum::<f64>()
                / n as f64)
                .sqrt();
            charges = updated;

            let new_energy = Self::energy(&sites, &pairs, &charges);
            energy_change = (new_energy - energy).abs();
            energy = new_energy;

            trace!(iteration, energy, energy_change, density_change, residual, "SCF iteration");

            if energy_change < convergence.energy
                && density_change < convergence.density
                && residual < convergence.eigenstates
            {
                debug!(iteration, energy, "SCF converged");
                let forces = Self::forces(&pairs, &charges);
                return Ok(CalculationResult {
                    energy,
                    forces,
                    charges,
                    iterations: iteration,
                });
            }
        }

        Err(CalculatorError::NotConverged {
            iterations: max_iterations,
            energy_change,
            density_change,
            residual,
        })
    }
}

impl Calculator for ChargeEquilibrationCalculator {
    fn name(&self) -> &str {
        "charge-equilibration"
    }

    fn calculate(&mut self, structure: &Structure) -> Result<CalculationResult, CalculatorError> {
        if let Some((cached, result)) = &self.cache {
            if cached == structure {
                return Ok(result.clone());
            }
        }
        let result = self.solve(structure)?;
        self.evaluations += 1;
        self.initial_charges = Some(result.charges.clone());
        self.cache = Some((structure.clone(), result.clone()));
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::atom::Atom;
    use crate::core::models::element::Element;
    use crate::core::models::lattice::Lattice;
    use nalgebra::Point3;

    fn el(symbol: &str) -> Element {
        Element::from_symbol(symbol).unwrap()
    }

    fn tight_settings() -> ScfSettings {
        ScfSettings {
            convergence: ConvergenceCriteria {
                energy: 1e-13,
                density: 1e-11,
                eigenstates: 1e-20,
            },
            max_iterations: 1000,
            mixing: 0.6,
        }
    }

    fn distorted_sic() -> Structure {
        let mut s = Structure::new(Lattice::cubic(4.2));
        s.push(Atom::new(el("Si"), Point3::new(0.1, 0.0, 0.05)));
        s.push(Atom::new(el("C"), Point3::new(1.05, 1.0, 1.1)));
        s.push(Atom::new(el("Si"), Point3::new(2.0, 2.15, 0.0)));
        s.push(Atom::new(el("O"), Point3::new(3.1, 3.0, 1.0)));
        s
    }

    fn calculator(settings: ScfSettings) -> ChargeEquilibrationCalculator {
        ChargeEquilibrationCalculator::new(ParameterSet::builtin().unwrap(), settings)
    }

    #[test]
    fn converged_charges_are_neutral_and_follow_electronegativity() {
        let mut calc = calculator(ScfSettings::default());
        let result = calc.calculate(&distorted_sic()).unwrap();
        let total: f64 = result.charges.iter().sum();
        assert!(total.abs() < 1e-10);
        assert!(result.charges[3] < 0.0, "oxygen should be negative");
        assert!(result.charges[0] > 0.0, "silicon should be positive");
        assert!(result.iterations >= 1);
        assert_eq!(result.forces.len(), 4);
    }

    #[test]
    fn forces_match_finite_difference_of_energy() {
        let mut calc = calculator(tight_settings());
        let structure = distorted_sic();
        let result = calc.calculate(&structure).unwrap();

        let h = 1e-5;
        for (atom, axis) in [(0, 0), (1, 2), (3, 1)] {
            let mut flat = structure.positions_flat();
            flat[3 * atom + axis] += h;
            let mut plus = structure.clone();
            plus.set_positions_flat(&flat).unwrap();
            flat[3 * atom + axis] -= 2.0 * h;
            let mut minus = structure.clone();
            minus.set_positions_flat(&flat).unwrap();

            let e_plus = calc.calculate(&plus).unwrap().energy;
            let e_minus = calc.calculate(&minus).unwrap().energy;
            let numeric = -(e_plus - e_minus) / (2.0 * h);
            let analytic = result.forces[atom][axis];
            assert!(
                (numeric - analytic).abs() < 1e-4,
                "atom {atom} axis {axis}: numeric {numeric}, analytic {analytic}"
            );
        }
    }

    #[test]
    fn forces_sum_to_zero() {
        let mut calc = calculator(tight_settings());
        let result = calc.calculate(&distorted_sic()).unwrap();
        let sum = result.forces.iter().fold(Vector3::zeros(), |acc, f| acc + f);
        assert!(sum.norm() < 1e-9);
    }

    #[test]
    fn too_few_iterations_reports_non_convergence() {
        let settings = ScfSettings {
            max_iterations: 1,
            ..ScfSettings::default()
        };
        let mut calc = calculator(settings);
        let result = calc.calculate(&distorted_sic());
        assert!(matches!(result, Err(CalculatorError::NotConverged { iterations: 1, .. })));
    }

    #[test]
    fn missing_element_parameters_are_reported() {
        let mut s = Structure::new(Lattice::cubic(5.0));
        s.push(Atom::new(el("Fe"), Point3::origin()));
        let mut calc = calculator(ScfSettings::default());
        assert_eq!(
            calc.calculate(&s),
            Err(CalculatorError::MissingParameters("Fe".into()))
        );
        assert_eq!(
            calc.calculate(&Structure::new(Lattice::cubic(5.0))),
            Err(CalculatorError::EmptyStructure)
        );
    }

    #[test]
    fn repeated_calculation_on_same_geometry_uses_cache() {
        let mut calc = calculator(ScfSettings::default());
        let structure = distorted_sic();
        let first = calc.calculate(&structure).unwrap();
        let second = calc.calculate(&structure).unwrap();
        assert_eq!(first, second);
        assert_eq!(calc.evaluations(), 1);
    }

    #[test]
    fn warm_start_from_converged_charges_needs_fewer_iterations() {
        let structure = distorted_sic();
        let cold = calculator(tight_settings()).calculate(&structure).unwrap();
        let warm = calculator(tight_settings())
            .with_initial_charges(cold.charges.clone())
            .calculate(&structure)
            .unwrap();
        assert!(warm.iterations < cold.iterations);
        assert!((warm.energy - cold.energy).abs() < 1e-9);
    }
}
