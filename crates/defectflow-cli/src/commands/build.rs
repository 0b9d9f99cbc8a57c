use crate::cli::BuildArgs;
use crate::config::{self, BuildAppConfig};
use crate::error::Result;
use defectflow::core::io::write_structure;
use defectflow::core::models::structure::Structure;
use defectflow::engine::error::EngineError;
use defectflow::engine::parallel::ParallelContext;
use defectflow::engine::progress::ProgressReporter;
use defectflow::workflows;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{info, warn};

pub fn run(args: BuildArgs, context: &ParallelContext) -> Result<()> {
    let file_config = config::load(&args.config)?;
    let app_config = config::build_config(&args, &file_config)?;
    let base = super::read_structure(&app_config.input_path)?;
    execute(&base, &app_config, context)?;
    Ok(())
}

/// Builds and writes the doped supercell, returning it for the next stage.
pub fn execute(
    base: &Structure,
    app_config: &BuildAppConfig,
    context: &ParallelContext,
) -> Result<Structure> {
    let seed = match app_config.seed {
        Some(seed) => seed,
        None => {
            let seed = rand::random::<u64>();
            if context.size > 1 {
                warn!("No seed given while running on several processes; ranks draw different sites.");
            }
            info!("No seed given, drawing dopant sites with seed {}", seed);
            seed
        }
    };
    let mut rng = StdRng::seed_from_u64(seed);

    let progress_handler = super::progress_handler(context);
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());
    let result = workflows::build::run(base, &app_config.core_config, &mut rng, &reporter)?;

    if context.is_coordinator() {
        write_structure(&result.structure, &app_config.output_path).map_err(EngineError::from)?;
        println!(
            "✓ Doped supercell {} ({} atoms) written to: {}",
            result.structure.formula(),
            result.structure.len(),
            app_config.output_path.display()
        );
        println!("  Substitution seed: {}", seed);
    }
    Ok(result.structure)
}
