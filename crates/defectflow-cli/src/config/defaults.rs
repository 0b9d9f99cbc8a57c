use defectflow::core::calculator::charge_eq::ConvergenceCriteria;
use defectflow::engine::optimizer::BfgsSettings;
use defectflow::engine::supercell::SupercellMatrix;

/// Settings used when neither a flag, a `--set` override nor the config file
/// provides a value.
pub struct DefaultsConfig {
    pub supercell: SupercellMatrix,
    pub host: &'static str,
    pub dopant: &'static str,
    pub count: usize,
    pub convergence: ConvergenceCriteria,
    pub max_iterations: usize,
    pub mixing: f64,
    pub fmax: f64,
    pub steps: usize,
    pub bfgs: BfgsSettings,
    pub species: &'static str,
    pub minimum_image: bool,
    pub doped_structure: &'static str,
    pub scf_checkpoint: &'static str,
    pub relaxed_checkpoint: &'static str,
    pub relaxed_geometry: &'static str,
    pub optimizer_log: &'static str,
    pub trajectory: &'static str,
    pub optimizer_restart: &'static str,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            supercell: SupercellMatrix::diagonal(2, 2, 1),
            host: "C",
            dopant: "O",
            count: 2,
            convergence: ConvergenceCriteria::default(),
            max_iterations: 100,
            mixing: 0.6,
            fmax: 0.05,
            steps: 50,
            bfgs: BfgsSettings::default(),
            species: "Si",
            minimum_image: false,
            doped_structure: "SiC_2x2x1_O2_doped.cif",
            scf_checkpoint: "preconverged.chk",
            relaxed_checkpoint: "relaxed.chk",
            relaxed_geometry: "relaxed_positions_only.cif",
            optimizer_log: "bfgs.log",
            trajectory: "relax.xyz",
            optimizer_restart: "bfgs.json",
        }
    }
}
