use crate::cli::RelaxArgs;
use crate::config::{self, RelaxAppConfig};
use crate::error::Result;
use defectflow::core::models::structure::Structure;
use defectflow::engine::checkpoint::Checkpoint;
use defectflow::engine::error::EngineError;
use defectflow::engine::parallel::ParallelContext;
use defectflow::engine::progress::ProgressReporter;
use defectflow::workflows;
use defectflow::workflows::relax::PersistOutcome;
use tracing::info;

pub fn run(args: RelaxArgs, context: &ParallelContext) -> Result<()> {
    let file_config = config::load(&args.config)?;
    let app_config = config::relax_config(&args, &file_config)?;
    info!("Loading checkpoint from {:?}", app_config.input_path);
    let checkpoint = Checkpoint::load(&app_config.input_path).map_err(EngineError::from)?;
    execute(&checkpoint, &app_config, context)?;
    Ok(())
}

/// Relaxes the checkpointed structure and saves it when converged.
///
/// Returns the relaxed structure only when it passed the force threshold.
pub fn execute(
    checkpoint: &Checkpoint,
    app_config: &RelaxAppConfig,
    context: &ParallelContext,
) -> Result<Option<Structure>> {
    let progress_handler = super::progress_handler(context);
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());
    let outcome =
        workflows::relax::run(checkpoint, &app_config.core_config, context, &reporter)?;

    if context.is_coordinator() {
        println!(
            "Relaxation stopped after {} step(s): E = {:.6} eV, max force = {:.4} eV/Å (fmax {:.4})",
            outcome.steps, outcome.energy, outcome.max_force, outcome.fmax
        );
    }

    match workflows::relax::persist(&outcome, checkpoint, &app_config.outputs, context)? {
        PersistOutcome::Written => {
            println!(
                "✓ Relaxed checkpoint written to: {}",
                app_config.outputs.checkpoint.display()
            );
            println!(
                "✓ Relaxed geometry written to: {}",
                app_config.outputs.geometry.display()
            );
        }
        PersistOutcome::SkippedNotConverged => {
            if context.is_coordinator() {
                println!("⚠ Not converged. Skipping save to avoid writing partial data.");
            }
        }
        PersistOutcome::SkippedNotCoordinator => {}
    }

    Ok(outcome.is_converged().then_some(outcome.structure))
}
