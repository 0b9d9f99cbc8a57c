use super::defaults::DefaultsConfig;
use super::file::{FileConfig, FileNamesConfig};
use super::models::{AnalyzeAppConfig, BuildAppConfig, RelaxAppConfig, ScfAppConfig};
use crate::cli::{AnalyzeArgs, BuildArgs, RelaxArgs, ScfArgs};
use crate::error::{CliError, Result};
use defectflow::core::calculator::charge_eq::ConvergenceCriteria;
use defectflow::core::models::element::Element;
use defectflow::engine::config as core_config;
use defectflow::workflows::relax::RelaxOutputs;
use std::path::PathBuf;

fn default_element(symbol: &str) -> Result<Element> {
    Element::from_symbol(symbol).map_err(|e| CliError::Config(e.to_string()))
}

/// File names shared by all stages, with defaults filled in.
struct ResolvedFiles {
    doped_structure: PathBuf,
    scf_checkpoint: PathBuf,
    relaxed_checkpoint: PathBuf,
    relaxed_geometry: PathBuf,
    optimizer_log: PathBuf,
    trajectory: PathBuf,
    optimizer_restart: PathBuf,
}

fn resolve_files(file_config: &FileConfig, defaults: &DefaultsConfig) -> ResolvedFiles {
    let files = file_config.files.clone().unwrap_or_default();
    let FileNamesConfig {
        doped_structure,
        scf_checkpoint,
        relaxed_checkpoint,
        relaxed_geometry,
        optimizer_log,
        trajectory,
        optimizer_restart,
    } = files;
    ResolvedFiles {
        doped_structure: doped_structure.unwrap_or_else(|| defaults.doped_structure.into()),
        scf_checkpoint: scf_checkpoint.unwrap_or_else(|| defaults.scf_checkpoint.into()),
        relaxed_checkpoint: relaxed_checkpoint
            .unwrap_or_else(|| defaults.relaxed_checkpoint.into()),
        relaxed_geometry: relaxed_geometry.unwrap_or_else(|| defaults.relaxed_geometry.into()),
        optimizer_log: optimizer_log.unwrap_or_else(|| defaults.optimizer_log.into()),
        trajectory: trajectory.unwrap_or_else(|| defaults.trajectory.into()),
        optimizer_restart: optimizer_restart.unwrap_or_else(|| defaults.optimizer_restart.into()),
    }
}

pub fn build_config(args: &BuildArgs, file_config: &FileConfig) -> Result<BuildAppConfig> {
    let defaults = DefaultsConfig::default();
    let files = resolve_files(file_config, &defaults);
    let build_file = file_config.build.clone().unwrap_or_default();

    let supercell = match (args.supercell, &build_file.supercell) {
        (Some(matrix), _) => matrix,
        (None, Some(from_file)) => from_file.resolve()?,
        (None, None) => defaults.supercell,
    };
    let host = match args.host.or(build_file.host) {
        Some(element) => element,
        None => default_element(defaults.host)?,
    };
    let dopant = match args.dopant.or(build_file.dopant) {
        Some(element) => element,
        None => default_element(defaults.dopant)?,
    };
    let count = args.count.or(build_file.count).unwrap_or(defaults.count);

    let core_config = core_config::BuildConfigBuilder::new()
        .supercell(supercell)
        .host(host)
        .dopant(dopant)
        .count(count)
        .build()
        .map_err(|e| CliError::Config(e.to_string()))?;

    Ok(BuildAppConfig {
        input_path: args.input.clone(),
        output_path: args.output.clone().unwrap_or(files.doped_structure),
        seed: args.seed.or(build_file.seed),
        core_config,
    })
}

pub fn scf_config(args: &ScfArgs, file_config: &FileConfig) -> Result<ScfAppConfig> {
    let defaults = DefaultsConfig::default();
    let files = resolve_files(file_config, &defaults);
    let scf_file = file_config.scf.clone().unwrap_or_default();
    let build_file = file_config.build.clone().unwrap_or_default();

    let convergence_file = scf_file.convergence.unwrap_or_default();
    let convergence = ConvergenceCriteria {
        energy: convergence_file
            .energy
            .unwrap_or(defaults.convergence.energy),
        density: convergence_file
            .density
            .unwrap_or(defaults.convergence.density),
        eigenstates: convergence_file
            .eigenstates
            .unwrap_or(defaults.convergence.eigenstates),
    };

    let parameters = match args.parameters.clone().or(scf_file.parameters) {
        Some(path) => core_config::ParameterSource::File(path),
        None => core_config::ParameterSource::Builtin,
    };

    let core_config = core_config::ScfConfigBuilder::new()
        .parameters(parameters)
        .convergence(convergence)
        .max_iterations(
            args.max_iterations
                .or(scf_file.max_iterations)
                .unwrap_or(defaults.max_iterations),
        )
        .mixing(args.mixing.or(scf_file.mixing).unwrap_or(defaults.mixing))
        .build()
        .map_err(|e| CliError::Config(e.to_string()))?;

    Ok(ScfAppConfig {
        input_path: args.input.clone().unwrap_or(files.doped_structure),
        output_path: args.output.clone().unwrap_or(files.scf_checkpoint),
        host: match build_file.host {
            Some(element) => element,
            None => default_element(defaults.host)?,
        },
        dopant: match build_file.dopant {
            Some(element) => element,
            None => default_element(defaults.dopant)?,
        },
        core_config,
    })
}

pub fn relax_config(args: &RelaxArgs, file_config: &FileConfig) -> Result<RelaxAppConfig> {
    let defaults = DefaultsConfig::default();
    let files = resolve_files(file_config, &defaults);
    let relax_file = file_config.relax.clone().unwrap_or_default();

    let use_restart = !args.no_restart && relax_file.restart.unwrap_or(true);

    let core_config = core_config::RelaxConfigBuilder::new()
        .fmax(args.fmax.or(relax_file.fmax).unwrap_or(defaults.fmax))
        .steps(args.steps.or(relax_file.steps).unwrap_or(defaults.steps))
        .maxstep(
            args.maxstep
                .or(relax_file.maxstep)
                .unwrap_or(defaults.bfgs.maxstep),
        )
        .alpha(relax_file.alpha.unwrap_or(defaults.bfgs.alpha))
        .restart(use_restart.then_some(files.optimizer_restart))
        .log(Some(files.optimizer_log))
        .trajectory(Some(files.trajectory))
        .build()
        .map_err(|e| CliError::Config(e.to_string()))?;

    Ok(RelaxAppConfig {
        input_path: args.input.clone().unwrap_or(files.scf_checkpoint),
        outputs: RelaxOutputs {
            checkpoint: args.output.clone().unwrap_or(files.relaxed_checkpoint),
            geometry: args.geometry.clone().unwrap_or(files.relaxed_geometry),
        },
        core_config,
    })
}

pub fn analyze_config(args: &AnalyzeArgs, file_config: &FileConfig) -> Result<AnalyzeAppConfig> {
    let defaults = DefaultsConfig::default();
    let files = resolve_files(file_config, &defaults);
    let analysis_file = file_config.analysis.clone().unwrap_or_default();

    let species = match args.species.or(analysis_file.species) {
        Some(element) => element,
        None => default_element(defaults.species)?,
    };
    let minimum_image = args.minimum_image
        || analysis_file
            .minimum_image
            .unwrap_or(defaults.minimum_image);

    Ok(AnalyzeAppConfig {
        input_path: args.input.clone().unwrap_or(files.relaxed_geometry),
        core_config: core_config::AnalysisConfig {
            species,
            minimum_image,
            csv: args.csv.clone().or(analysis_file.csv),
        },
    })
}
