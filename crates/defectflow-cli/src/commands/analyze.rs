use crate::cli::AnalyzeArgs;
use crate::config::{self, AnalyzeAppConfig};
use crate::error::Result;
use defectflow::core::models::structure::Structure;
use defectflow::engine::parallel::ParallelContext;
use defectflow::workflows;

pub fn run(args: AnalyzeArgs, context: &ParallelContext) -> Result<()> {
    let file_config = config::load(&args.config)?;
    let app_config = config::analyze_config(&args, &file_config)?;
    let structure = super::read_structure(&app_config.input_path)?;
    execute(&structure, &app_config, context)
}

pub fn execute(
    structure: &Structure,
    app_config: &AnalyzeAppConfig,
    context: &ParallelContext,
) -> Result<()> {
    let report = workflows::analyze::run(structure, &app_config.core_config, context)?;
    if !context.is_coordinator() {
        return Ok(());
    }

    for line in report.lines() {
        println!("{}", line);
    }
    let summary = report.summary();
    println!(
        "{} {} atoms: min = {:.3} Å, mean = {:.3} Å, max = {:.3} Å",
        report.entries.len(),
        report.species,
        summary.min,
        summary.mean,
        summary.max
    );
    if let Some(path) = &app_config.core_config.csv {
        println!("✓ Distance table written to: {}", path.display());
    }
    Ok(())
}
