use crate::cli::ScfArgs;
use crate::config::{self, ScfAppConfig};
use crate::error::Result;
use defectflow::core::models::structure::Structure;
use defectflow::engine::checkpoint::Checkpoint;
use defectflow::engine::parallel::ParallelContext;
use defectflow::engine::progress::ProgressReporter;
use defectflow::workflows;

pub fn run(args: ScfArgs, context: &ParallelContext) -> Result<()> {
    let file_config = config::load(&args.config)?;
    let app_config = config::scf_config(&args, &file_config)?;
    let structure = super::read_structure(&app_config.input_path)?;
    execute(structure, &app_config, context)?;
    Ok(())
}

/// Converges the structure and writes the checkpoint, returning it for relaxation.
pub fn execute(
    structure: Structure,
    app_config: &ScfAppConfig,
    context: &ParallelContext,
) -> Result<Checkpoint> {
    let progress_handler = super::progress_handler(context);
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());
    let outcome = workflows::scf::run(structure, &app_config.core_config, &reporter)?;

    let written = workflows::scf::persist(&outcome, &app_config.output_path, context)?;
    if context.is_coordinator() {
        println!(
            "Remaining {} atoms: {}, doped {} atoms: {}",
            app_config.host,
            outcome.count_of(app_config.host),
            app_config.dopant,
            outcome.count_of(app_config.dopant)
        );
        println!(
            "SCF converged in {} iterations, E = {:.6} eV",
            outcome.checkpoint.result.iterations,
            outcome.energy()
        );
    }
    if written {
        println!(
            "✓ Checkpoint written to: {}",
            app_config.output_path.display()
        );
    }
    Ok(outcome.checkpoint)
}
