use crate::cli::{AnalyzeArgs, BuildArgs, RelaxArgs, RunArgs, ScfArgs};
use crate::config;
use crate::error::Result;
use defectflow::engine::parallel::ParallelContext;
use tracing::{info, warn};

/// Runs all four stages with one configuration.
///
/// Each stage writes its usual files, and the next stage continues from the
/// in-memory result so that worker ranks never read files they did not write.
pub fn run(args: RunArgs, context: &ParallelContext) -> Result<()> {
    let file_config = config::load(&args.config)?;
    let build_args = BuildArgs {
        input: args.input.clone(),
        output: None,
        supercell: None,
        host: None,
        dopant: None,
        count: None,
        seed: args.seed,
        config: args.config.clone(),
    };
    let build_config = config::build_config(&build_args, &file_config)?;
    let scf_config = config::scf_config(&ScfArgs::default(), &file_config)?;
    let relax_config = config::relax_config(&RelaxArgs::default(), &file_config)?;
    let analyze_config = config::analyze_config(&AnalyzeArgs::default(), &file_config)?;

    let base = super::read_structure(&build_config.input_path)?;

    info!("Stage 1/4: building the doped supercell");
    let doped = super::build::execute(&base, &build_config, context)?;

    info!("Stage 2/4: converging the electronic state");
    let checkpoint = super::scf::execute(doped, &scf_config, context)?;

    info!("Stage 3/4: relaxing the structure");
    let Some(relaxed) = super::relax::execute(&checkpoint, &relax_config, context)? else {
        warn!("Relaxation did not converge; skipping distance analysis.");
        return Ok(());
    };

    info!("Stage 4/4: analysing nearest-neighbour distances");
    super::analyze::execute(&relaxed, &analyze_config, context)
}
