use crate::core::models::structure::Structure;
use crate::engine::config::BuildConfig;
use crate::engine::doping::{Substitution, substitute};
use crate::engine::error::EngineError;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::supercell::make_supercell;
use rand::Rng;
use tracing::{info, instrument};

#[derive(Debug, Clone)]
pub struct BuildResult {
    pub structure: Structure,
    pub substitution: Substitution,
}

/// Tiles the base structure and substitutes dopants into the tiled cell.
///
/// The returned structure is ready to be written; indices in the substitution
/// refer to it directly.
#[instrument(skip_all, name = "build_workflow")]
pub fn run<R: Rng + ?Sized>(
    base: &Structure,
    config: &BuildConfig,
    rng: &mut R,
    reporter: &ProgressReporter,
) -> Result<BuildResult, EngineError> {
    reporter.report(Progress::PhaseStart { name: "Supercell" });
    let mut structure = make_supercell(base, &config.supercell)?;
    info!(
        base_atoms = base.len(),
        atoms = structure.len(),
        matrix = %config.supercell,
        "Built supercell"
    );
    reporter.report(Progress::PhaseFinish);

    reporter.report(Progress::PhaseStart { name: "Doping" });
    let substitution = substitute(
        &mut structure,
        config.host,
        config.dopant,
        config.count,
        rng,
    )?;
    info!(
        indices = ?substitution.indices,
        formula = %structure.formula(),
        "Replaced {} {} atom(s) with {}",
        substitution.indices.len(),
        config.host,
        config.dopant
    );
    reporter.report(Progress::Message(format!(
        "{} -> {} at sites {:?}",
        substitution.host, substitution.dopant, substitution.indices
    )));
    reporter.report(Progress::PhaseFinish);

    Ok(BuildResult {
        structure,
        substitution,
    })
}
