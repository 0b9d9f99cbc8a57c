use crate::core::calculator::{CalculationResult, Calculator};
use crate::core::io::StructureIoError;
use crate::core::io::cif::CifFile;
use crate::core::io::traits::StructureFile;
use crate::core::io::xyz::TrajectoryWriter;
use crate::core::models::structure::Structure;
use crate::engine::checkpoint::Checkpoint;
use crate::engine::config::RelaxConfig;
use crate::engine::error::EngineError;
use crate::engine::optimizer::{Bfgs, OptimizerError, OptimizerLog, OptimizerState};
use crate::engine::parallel::ParallelContext;
use crate::engine::progress::{Progress, ProgressReporter};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

/// Result of re-checking the final geometry against the force threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvergenceGate {
    Converged,
    NotConverged,
}

impl ConvergenceGate {
    /// Converged only when the largest force is strictly below `fmax`.
    pub fn check(max_force: f64, fmax: f64) -> Self {
        if max_force < fmax {
            Self::Converged
        } else {
            Self::NotConverged
        }
    }
}

#[derive(Debug, Clone)]
pub struct RelaxOutcome {
    pub structure: Structure,
    /// Calculation on the final geometry, evaluated after the optimizer stopped.
    pub result: CalculationResult,
    pub energy: f64,
    pub max_force: f64,
    pub fmax: f64,
    pub steps: usize,
    /// The optimizer's own verdict, kept for reporting only.
    pub optimizer_converged: bool,
    pub gate: ConvergenceGate,
}

impl RelaxOutcome {
    pub fn is_converged(&self) -> bool {
        self.gate == ConvergenceGate::Converged
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelaxOutputs {
    pub checkpoint: PathBuf,
    pub geometry: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    Written,
    SkippedNotConverged,
    SkippedNotCoordinator,
}

fn load_optimizer(config: &RelaxConfig, atoms: usize) -> Result<(Bfgs, bool), EngineError> {
    let fresh = || Bfgs::new(config.bfgs);
    let Some(path) = config.restart.as_deref().filter(|p| p.exists()) else {
        return Ok((fresh(), false));
    };
    match OptimizerState::load(path).and_then(|state| Bfgs::from_state(state, atoms)) {
        Ok(bfgs) => {
            info!(path = %path.display(), "Restarting optimizer from saved state");
            Ok((bfgs, true))
        }
        Err(OptimizerError::Dimension { expected, found }) => {
            warn!(
                path = %path.display(),
                expected,
                found,
                "Ignoring optimizer state for a different structure"
            );
            Ok((fresh(), false))
        }
        Err(e) => Err(e.into()),
    }
}

fn output_error(path: &Path) -> impl Fn(std::io::Error) -> EngineError + '_ {
    move |source| EngineError::Output {
        path: path.display().to_string(),
        source,
    }
}

/// Relaxes the structure stored in `checkpoint` and re-checks convergence.
///
/// The structure is wrapped into its cell and the calculator starts from the
/// checkpoint's charges. The optimizer log, trajectory and restart state are
/// written by the coordinator only. After the optimizer stops, the final geometry
/// is evaluated again and its largest force decides [`RelaxOutcome::gate`],
/// regardless of what the optimizer reported.
#[instrument(skip_all, name = "relax_workflow")]
pub fn run(
    checkpoint: &Checkpoint,
    config: &RelaxConfig,
    context: &ParallelContext,
    reporter: &ProgressReporter,
) -> Result<RelaxOutcome, EngineError> {
    let mut structure = checkpoint.structure.clone();
    structure.wrap();
    let mut calculator = checkpoint.restore_calculator();
    let (mut bfgs, restarted) = load_optimizer(config, structure.len())?;

    let writes = context.is_coordinator();
    let mut log = match config.log.as_deref().filter(|_| writes) {
        Some(path) => Some((OptimizerLog::create(path, restarted)?, path)),
        None => None,
    };
    let mut trajectory = match config.trajectory.as_deref().filter(|_| writes) {
        Some(path) => Some(
            if restarted {
                TrajectoryWriter::append(path)
            } else {
                TrajectoryWriter::create(path)
            }
            .map_err(StructureIoError::from)?,
        ),
        None => None,
    };
    let restart = config.restart.as_deref().filter(|_| writes);

    reporter.report(Progress::PhaseStart { name: "Relaxation" });
    reporter.report(Progress::TaskStart {
        total_steps: config.steps as u64 + 1,
    });
    let report = bfgs.run(
        &mut structure,
        &mut calculator,
        config.fmax,
        config.steps,
        |record, optimizer| {
            info!(
                step = record.step,
                energy = record.result.energy,
                max_force = record.max_force,
                "BFGS step"
            );
            if let Some((log, path)) = log.as_mut() {
                log.record(record.step, record.result.energy, record.max_force)
                    .map_err(output_error(path))?;
            }
            if let Some(trajectory) = trajectory.as_mut() {
                trajectory
                    .write(record.structure, record.result.energy, &record.result.forces)
                    .map_err(StructureIoError::from)?;
            }
            if let Some(path) = restart {
                optimizer.state().save(path)?;
            }
            reporter.report(Progress::OptimizerStep {
                step: record.step,
                energy: record.result.energy,
                max_force: record.max_force,
            });
            reporter.report(Progress::TaskIncrement);
            Ok(())
        },
    )?;
    reporter.report(Progress::TaskFinish);

    let result = calculator.calculate(&structure)?;
    let max_force = result.max_force();
    let gate = ConvergenceGate::check(max_force, config.fmax);
    info!(
        energy = result.energy,
        max_force,
        fmax = config.fmax,
        steps = report.steps,
        converged = gate == ConvergenceGate::Converged,
        "Relaxation finished"
    );
    reporter.report(Progress::PhaseFinish);

    Ok(RelaxOutcome {
        energy: result.energy,
        structure,
        result,
        max_force,
        fmax: config.fmax,
        steps: report.steps,
        optimizer_converged: report.converged,
        gate,
    })
}

fn sync_file(path: &Path) -> Result<(), EngineError> {
    File::open(path)
        .and_then(|f| f.sync_all())
        .map_err(output_error(path))
}

/// Saves the relaxed checkpoint and a geometry-only CIF, but only when the
/// relaxation converged and this process is the coordinator.
///
/// On non-convergence nothing is written and files from earlier stages are
/// left untouched.
pub fn persist(
    outcome: &RelaxOutcome,
    source: &Checkpoint,
    outputs: &RelaxOutputs,
    context: &ParallelContext,
) -> Result<PersistOutcome, EngineError> {
    if !outcome.is_converged() {
        warn!(
            max_force = outcome.max_force,
            fmax = outcome.fmax,
            "Not converged. Skipping save to avoid writing partial data."
        );
        return Ok(PersistOutcome::SkippedNotConverged);
    }
    if !context.is_coordinator() {
        return Ok(PersistOutcome::SkippedNotCoordinator);
    }

    let checkpoint = Checkpoint::new(
        outcome.structure.clone(),
        source.parameters.clone(),
        source.settings,
        outcome.result.clone(),
    );
    checkpoint.save(&outputs.checkpoint)?;
    CifFile::write_to_path(&outcome.structure, &outputs.geometry).map_err(StructureIoError::from)?;
    sync_file(&outputs.geometry)?;
    info!(
        checkpoint = %outputs.checkpoint.display(),
        geometry = %outputs.geometry.display(),
        "Relaxed state saved"
    );
    Ok(PersistOutcome::Written)
}
