use crate::core::calculator::Calculator;
use crate::core::calculator::charge_eq::ChargeEquilibrationCalculator;
use crate::core::models::element::Element;
use crate::core::models::structure::Structure;
use crate::engine::checkpoint::Checkpoint;
use crate::engine::config::ScfConfig;
use crate::engine::error::EngineError;
use crate::engine::parallel::ParallelContext;
use crate::engine::progress::{Progress, ProgressReporter};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, instrument};

#[derive(Debug, Clone)]
pub struct ScfOutcome {
    pub checkpoint: Checkpoint,
    pub species_counts: BTreeMap<Element, usize>,
}

impl ScfOutcome {
    pub fn energy(&self) -> f64 {
        self.checkpoint.result.energy
    }

    pub fn count_of(&self, element: Element) -> usize {
        self.species_counts.get(&element).copied().unwrap_or(0)
    }
}

/// Converges the electronic state of `structure` with fixed calculator settings.
///
/// Non-convergence is an error, so a returned outcome always holds a converged
/// state that is safe to persist.
#[instrument(skip_all, name = "scf_workflow")]
pub fn run(
    structure: Structure,
    config: &ScfConfig,
    reporter: &ProgressReporter,
) -> Result<ScfOutcome, EngineError> {
    reporter.report(Progress::PhaseStart { name: "SCF" });
    let species_counts = structure.species_counts();
    for (element, count) in &species_counts {
        info!("{} atoms: {}", element, count);
    }

    let parameters = config.parameters.load()?;
    let mut calculator = ChargeEquilibrationCalculator::new(parameters.clone(), config.settings);
    let result = calculator.calculate(&structure)?;
    info!(
        calculator = calculator.name(),
        energy = result.energy,
        iterations = result.iterations,
        max_force = result.max_force(),
        "SCF converged"
    );
    reporter.report(Progress::PhaseFinish);

    Ok(ScfOutcome {
        checkpoint: Checkpoint::new(structure, parameters, config.settings, result),
        species_counts,
    })
}

/// Writes the checkpoint on the coordinator; other ranks write nothing.
pub fn persist(
    outcome: &ScfOutcome,
    path: &Path,
    context: &ParallelContext,
) -> Result<bool, EngineError> {
    if !context.is_coordinator() {
        return Ok(false);
    }
    outcome.checkpoint.save(path)?;
    info!(path = %path.display(), "Checkpoint written");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::calculator::CalculatorError;
    use crate::core::calculator::charge_eq::ConvergenceCriteria;
    use crate::core::models::atom::Atom;
    use crate::core::models::lattice::Lattice;
    use crate::engine::config::ScfConfigBuilder;
    use nalgebra::Point3;
    use tempfile::tempdir;

    fn el(symbol: &str) -> Element {
        Element::from_symbol(symbol).unwrap()
    }

    fn doped_cell() -> Structure {
        let mut s = Structure::new(Lattice::cubic(4.4));
        s.push(Atom::new(el("Si"), Point3::new(0.0, 0.0, 0.0)));
        s.push(Atom::new(el("C"), Point3::new(1.1, 1.1, 1.1)));
        s.push(Atom::new(el("Si"), Point3::new(2.2, 2.2, 0.0)));
        s.push(Atom::new(el("O"), Point3::new(3.3, 3.3, 1.1)));
        s
    }

    fn config(max_iterations: usize) -> ScfConfig {
        ScfConfigBuilder::new()
            .convergence(ConvergenceCriteria::default())
            .max_iterations(max_iterations)
            .mixing(0.6)
            .build()
            .unwrap()
    }

    #[test]
    fn converged_run_reports_species_and_writes_checkpoint() {
        let outcome = run(doped_cell(), &config(100), &ProgressReporter::new()).unwrap();
        assert_eq!(outcome.count_of(el("C")), 1);
        assert_eq!(outcome.count_of(el("O")), 1);
        assert_eq!(outcome.count_of(el("N")), 0);

        let dir = tempdir().unwrap();
        let path = dir.path().join("preconverged.chk");
        assert!(persist(&outcome, &path, &ParallelContext::serial()).unwrap());
        let loaded = Checkpoint::load(&path).unwrap();
        assert_eq!(loaded.structure.len(), 4);
        assert!((loaded.result.energy - outcome.energy()).abs() < 1e-12);
    }

    #[test]
    fn non_coordinator_does_not_write() {
        let outcome = run(doped_cell(), &config(100), &ProgressReporter::new()).unwrap();
        let dir = tempdir().unwrap();
        let path = dir.path().join("preconverged.chk");
        let worker = ParallelContext { rank: 1, size: 2 };
        assert!(!persist(&outcome, &path, &worker).unwrap());
        assert!(!path.exists());
    }

    #[test]
    fn unconverged_scf_is_an_error() {
        let result = run(doped_cell(), &config(1), &ProgressReporter::new());
        assert!(matches!(
            result,
            Err(EngineError::Calculator(CalculatorError::NotConverged { .. }))
        ));
    }
}
