use crate::utils::parser;
use clap::{Args, Parser, Subcommand};
use defectflow::core::models::element::Element;
use defectflow::engine::supercell::SupercellMatrix;
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "defectflow - build doped supercells, converge and relax them, and analyse the relaxed geometry.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Set the number of threads for parallel computation.
    /// Defaults to the number of available logical cores.
    #[arg(short = 'j', long, global = true, value_name = "NUM")]
    pub threads: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Tile a base structure into a supercell and substitute dopant atoms.
    Build(BuildArgs),
    /// Converge the electronic state of a structure and write a checkpoint.
    Scf(ScfArgs),
    /// Relax the geometry stored in a checkpoint with BFGS.
    Relax(RelaxArgs),
    /// Report nearest-neighbour distances of one species.
    Analyze(AnalyzeArgs),
    /// Run build, scf, relax and analyze in sequence.
    Run(RunArgs),
}

/// Configuration sources shared by every subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// Path to a TOML workflow configuration file.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Override a configuration value, e.g. `-S relax.fmax=0.02`.
    /// Can be used multiple times.
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}

/// Arguments for the `build` subcommand.
#[derive(Args, Debug, Clone)]
pub struct BuildArgs {
    /// Path to the base structure (.cif, .xyz or .extxyz).
    #[arg(short, long, required = true, value_name = "PATH")]
    pub input: PathBuf,

    /// Path for the doped supercell. Defaults to the `files.doped-structure` setting.
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Tiling matrix: three diagonal factors ("2,2,1") or nine entries in row order.
    #[arg(long, value_name = "MATRIX", value_parser = parser::parse_supercell)]
    pub supercell: Option<SupercellMatrix>,

    /// Species replaced by the dopant.
    #[arg(long, value_name = "ELEMENT")]
    pub host: Option<Element>,

    /// Species substituted into host sites.
    #[arg(long, value_name = "ELEMENT")]
    pub dopant: Option<Element>,

    /// Number of host atoms to replace.
    #[arg(long, value_name = "NUM")]
    pub count: Option<usize>,

    /// Seed for the substitution sites. A fresh seed is drawn and logged when omitted.
    #[arg(long, value_name = "SEED")]
    pub seed: Option<u64>,

    #[command(flatten)]
    pub config: ConfigArgs,
}

/// Arguments for the `scf` subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct ScfArgs {
    /// Structure to converge. Defaults to the `files.doped-structure` setting.
    #[arg(short, long, value_name = "PATH")]
    pub input: Option<PathBuf>,

    /// Checkpoint to write. Defaults to the `files.scf-checkpoint` setting.
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// TOML file with calculator element parameters, replacing the built-in table.
    #[arg(long, value_name = "PATH")]
    pub parameters: Option<PathBuf>,

    /// Maximum number of self-consistent iterations.
    #[arg(long, value_name = "NUM")]
    pub max_iterations: Option<usize>,

    /// Linear mixing fraction for new charges, in (0, 1].
    #[arg(long, value_name = "FRACTION")]
    pub mixing: Option<f64>,

    #[command(flatten)]
    pub config: ConfigArgs,
}

/// Arguments for the `relax` subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct RelaxArgs {
    /// Checkpoint to restart from. Defaults to the `files.scf-checkpoint` setting.
    #[arg(short, long, value_name = "PATH")]
    pub input: Option<PathBuf>,

    /// Relaxed checkpoint to write. Defaults to the `files.relaxed-checkpoint` setting.
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Geometry-only structure to write. Defaults to the `files.relaxed-geometry` setting.
    #[arg(long, value_name = "PATH")]
    pub geometry: Option<PathBuf>,

    /// Force threshold in eV/Å.
    #[arg(long, value_name = "EV_PER_A")]
    pub fmax: Option<f64>,

    /// Maximum number of optimizer steps.
    #[arg(long, value_name = "NUM")]
    pub steps: Option<usize>,

    /// Largest displacement of any atom per step, in Å.
    #[arg(long, value_name = "ANGSTROM")]
    pub maxstep: Option<f64>,

    /// Neither read nor write the optimizer restart file.
    #[arg(long)]
    pub no_restart: bool,

    #[command(flatten)]
    pub config: ConfigArgs,
}

/// Arguments for the `analyze` subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct AnalyzeArgs {
    /// Structure to analyse. Defaults to the `files.relaxed-geometry` setting.
    #[arg(short, long, value_name = "PATH")]
    pub input: Option<PathBuf>,

    /// Species whose nearest neighbours are reported.
    #[arg(long, value_name = "ELEMENT")]
    pub species: Option<Element>,

    /// Measure distances to the nearest periodic image.
    #[arg(long)]
    pub minimum_image: bool,

    /// Also write the distance table as CSV.
    #[arg(long, value_name = "PATH")]
    pub csv: Option<PathBuf>,

    #[command(flatten)]
    pub config: ConfigArgs,
}

/// Arguments for the `run` subcommand.
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Path to the base structure (.cif, .xyz or .extxyz).
    #[arg(short, long, required = true, value_name = "PATH")]
    pub input: PathBuf,

    /// Seed for the substitution sites.
    #[arg(long, value_name = "SEED")]
    pub seed: Option<u64>,

    #[command(flatten)]
    pub config: ConfigArgs,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn build_arguments_are_parsed() {
        let cli = Cli::try_parse_from([
            "defectflow",
            "-vv",
            "build",
            "-i",
            "SiC.cif",
            "--supercell",
            "3x3x1",
            "--host",
            "c",
            "--dopant",
            "N",
            "--count",
            "4",
            "--seed",
            "7",
            "-S",
            "files.doped-structure=out.cif",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        let Commands::Build(args) = cli.command else {
            panic!("expected the build subcommand");
        };
        assert_eq!(args.supercell, Some(SupercellMatrix::diagonal(3, 3, 1)));
        assert_eq!(args.host, Some(Element::from_symbol("C").unwrap()));
        assert_eq!(args.dopant, Some(Element::from_symbol("N").unwrap()));
        assert_eq!(args.count, Some(4));
        assert_eq!(args.seed, Some(7));
        assert_eq!(args.config.set_values, vec!["files.doped-structure=out.cif"]);
    }

    #[test]
    fn invalid_values_are_rejected_by_the_parser() {
        assert!(Cli::try_parse_from(["defectflow", "build", "-i", "a.cif", "--supercell", "2,2"]).is_err());
        assert!(Cli::try_parse_from(["defectflow", "analyze", "--species", "Xx"]).is_err());
        assert!(Cli::try_parse_from(["defectflow", "-q", "-v", "analyze"]).is_err());
    }

    #[test]
    fn stage_inputs_are_optional_after_build() {
        let cli = Cli::try_parse_from(["defectflow", "relax", "--fmax", "0.02", "--no-restart"]).unwrap();
        let Commands::Relax(args) = cli.command else {
            panic!("expected the relax subcommand");
        };
        assert_eq!(args.input, None);
        assert_eq!(args.fmax, Some(0.02));
        assert!(args.no_restart);
    }
}
