use crate::core::calculator::charge_eq::{ConvergenceCriteria, ScfSettings};
use crate::core::calculator::params::{ParamLoadError, ParameterSet};
use crate::core::models::element::Element;
use crate::engine::optimizer::BfgsSettings;
use crate::engine::supercell::SupercellMatrix;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("Invalid value for {parameter}: {reason}")]
    InvalidValue {
        parameter: &'static str,
        reason: String,
    },
}

fn require_positive(parameter: &'static str, value: f64) -> Result<f64, ConfigError> {
    if value > 0.0 && value.is_finite() {
        Ok(value)
    } else {
        Err(ConfigError::InvalidValue {
            parameter,
            reason: format!("must be a positive number, got {}", value),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BuildConfig {
    pub supercell: SupercellMatrix,
    pub host: Element,
    pub dopant: Element,
    pub count: usize,
}

#[derive(Default)]
pub struct BuildConfigBuilder {
    supercell: Option<SupercellMatrix>,
    host: Option<Element>,
    dopant: Option<Element>,
    count: Option<usize>,
}

impl BuildConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn supercell(mut self, matrix: SupercellMatrix) -> Self {
        self.supercell = Some(matrix);
        self
    }
    pub fn host(mut self, element: Element) -> Self {
        self.host = Some(element);
        self
    }
    pub fn dopant(mut self, element: Element) -> Self {
        self.dopant = Some(element);
        self
    }
    pub fn count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }

    pub fn build(self) -> Result<BuildConfig, ConfigError> {
        let supercell = self
            .supercell
            .ok_or(ConfigError::MissingParameter("supercell"))?;
        if supercell.determinant() <= 0 {
            return Err(ConfigError::InvalidValue {
                parameter: "supercell",
                reason: format!("determinant of {} must be positive", supercell),
            });
        }
        Ok(BuildConfig {
            supercell,
            host: self.host.ok_or(ConfigError::MissingParameter("host"))?,
            dopant: self.dopant.ok_or(ConfigError::MissingParameter("dopant"))?,
            count: self.count.ok_or(ConfigError::MissingParameter("count"))?,
        })
    }
}

/// Where the calculator's element parameters come from.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterSource {
    Builtin,
    File(PathBuf),
}

impl ParameterSource {
    pub fn load(&self) -> Result<ParameterSet, ParamLoadError> {
        match self {
            Self::Builtin => ParameterSet::builtin(),
            Self::File(path) => ParameterSet::load(path),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScfConfig {
    pub parameters: ParameterSource,
    pub settings: ScfSettings,
}

#[derive(Default)]
pub struct ScfConfigBuilder {
    parameters: Option<ParameterSource>,
    convergence: Option<ConvergenceCriteria>,
    max_iterations: Option<usize>,
    mixing: Option<f64>,
}

impl ScfConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parameters(mut self, source: ParameterSource) -> Self {
        self.parameters = Some(source);
        self
    }
    pub fn convergence(mut self, criteria: ConvergenceCriteria) -> Self {
        self.convergence = Some(criteria);
        self
    }
    pub fn max_iterations(mut self, iterations: usize) -> Self {
        self.max_iterations = Some(iterations);
        self
    }
    pub fn mixing(mut self, mixing: f64) -> Self {
        self.mixing = Some(mixing);
        self
    }

    pub fn build(self) -> Result<ScfConfig, ConfigError> {
        let convergence = self
            .convergence
            .ok_or(ConfigError::MissingParameter("convergence"))?;
        require_positive("convergence.energy", convergence.energy)?;
        require_positive("convergence.density", convergence.density)?;
        require_positive("convergence.eigenstates", convergence.eigenstates)?;

        let max_iterations = self
            .max_iterations
            .ok_or(ConfigError::MissingParameter("max_iterations"))?;
        if max_iterations == 0 {
            return Err(ConfigError::InvalidValue {
                parameter: "max_iterations",
                reason: "must be at least 1".into(),
            });
        }
        let mixing = self.mixing.ok_or(ConfigError::MissingParameter("mixing"))?;
        if !(mixing > 0.0 && mixing <= 1.0) {
            return Err(ConfigError::InvalidValue {
                parameter: "mixing",
                reason: format!("must lie in (0, 1], got {}", mixing),
            });
        }

        Ok(ScfConfig {
            parameters: self.parameters.unwrap_or(ParameterSource::Builtin),
            settings: ScfSettings {
                convergence,
                max_iterations,
                mixing,
            },
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelaxConfig {
    /// Force threshold in eV/Å; the relaxed state is kept only below it.
    pub fmax: f64,
    /// Maximum number of optimizer steps.
    pub steps: usize,
    pub bfgs: BfgsSettings,
    /// Optimizer restart file, read when present and rewritten after every step.
    pub restart: Option<PathBuf>,
    pub log: Option<PathBuf>,
    pub trajectory: Option<PathBuf>,
}

#[derive(Default)]
pub struct RelaxConfigBuilder {
    fmax: Option<f64>,
    steps: Option<usize>,
    maxstep: Option<f64>,
    alpha: Option<f64>,
    restart: Option<PathBuf>,
    log: Option<PathBuf>,
    trajectory: Option<PathBuf>,
}

impl RelaxConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fmax(mut self, fmax: f64) -> Self {
        self.fmax = Some(fmax);
        self
    }
    pub fn steps(mut self, steps: usize) -> Self {
        self.steps = Some(steps);
        self
    }
    pub fn maxstep(mut self, maxstep: f64) -> Self {
        self.maxstep = Some(maxstep);
        self
    }
    pub fn alpha(mut self, alpha: f64) -> Self {
        self.alpha = Some(alpha);
        self
    }
    pub fn restart(mut self, path: Option<PathBuf>) -> Self {
        self.restart = path;
        self
    }
    pub fn log(mut self, path: Option<PathBuf>) -> Self {
        self.log = path;
        self
    }
    pub fn trajectory(mut self, path: Option<PathBuf>) -> Self {
        self.trajectory = path;
        self
    }

    pub fn build(self) -> Result<RelaxConfig, ConfigError> {
        let defaults = BfgsSettings::default();
        let fmax = require_positive(
            "fmax",
            self.fmax.ok_or(ConfigError::MissingParameter("fmax"))?,
        )?;
        let bfgs = BfgsSettings {
            maxstep: require_positive("maxstep", self.maxstep.unwrap_or(defaults.maxstep))?,
            alpha: require_positive("alpha", self.alpha.unwrap_or(defaults.alpha))?,
        };
        Ok(RelaxConfig {
            fmax,
            steps: self.steps.ok_or(ConfigError::MissingParameter("steps"))?,
            bfgs,
            restart: self.restart,
            log: self.log,
            trajectory: self.trajectory,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisConfig {
    pub species: Element,
    /// Measure distances to the nearest periodic image instead of within the cell.
    pub minimum_image: bool,
    pub csv: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn el(symbol: &str) -> Element {
        Element::from_symbol(symbol).unwrap()
    }

    #[test]
    fn build_config_requires_every_field() {
        let result = BuildConfigBuilder::new()
            .supercell(SupercellMatrix::diagonal(2, 2, 1))
            .host(el("C"))
            .dopant(el("O"))
            .build();
        assert_eq!(result, Err(ConfigError::MissingParameter("count")));

        let config = BuildConfigBuilder::new()
            .supercell(SupercellMatrix::diagonal(2, 2, 1))
            .host(el("C"))
            .dopant(el("O"))
            .count(2)
            .build()
            .unwrap();
        assert_eq!(config.count, 2);
    }

    #[test]
    fn build_config_rejects_degenerate_supercell() {
        let result = BuildConfigBuilder::new()
            .supercell(SupercellMatrix::diagonal(2, 0, 1))
            .host(el("C"))
            .dopant(el("O"))
            .count(2)
            .build();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { parameter: "supercell", .. })
        ));
    }

    #[test]
    fn scf_config_defaults_to_builtin_parameters() {
        let config = ScfConfigBuilder::new()
            .convergence(ConvergenceCriteria::default())
            .max_iterations(100)
            .mixing(0.6)
            .build()
            .unwrap();
        assert_eq!(config.parameters, ParameterSource::Builtin);
        assert!(config.parameters.load().is_ok());
        assert_eq!(config.settings, ScfSettings::default());
    }

    #[test]
    fn scf_config_validates_values() {
        let base = || {
            ScfConfigBuilder::new()
                .convergence(ConvergenceCriteria::default())
                .max_iterations(100)
        };
        assert_eq!(
            base().build(),
            Err(ConfigError::MissingParameter("mixing"))
        );
        assert!(matches!(
            base().mixing(1.5).build(),
            Err(ConfigError::InvalidValue { parameter: "mixing", .. })
        ));
        assert!(matches!(
            base().mixing(0.5).max_iterations(0).build(),
            Err(ConfigError::InvalidValue { parameter: "max_iterations", .. })
        ));
        let bad_criteria = ConvergenceCriteria {
            density: -1.0,
            ..ConvergenceCriteria::default()
        };
        assert!(matches!(
            base().mixing(0.5).convergence(bad_criteria).build(),
            Err(ConfigError::InvalidValue { parameter: "convergence.density", .. })
        ));
    }

    #[test]
    fn relax_config_fills_optimizer_defaults() {
        let config = RelaxConfigBuilder::new().fmax(0.05).steps(50).build().unwrap();
        assert_eq!(config.bfgs, BfgsSettings::default());
        assert_eq!(config.restart, None);

        assert_eq!(
            RelaxConfigBuilder::new().fmax(0.05).build(),
            Err(ConfigError::MissingParameter("steps"))
        );
        assert!(matches!(
            RelaxConfigBuilder::new().fmax(0.0).steps(5).build(),
            Err(ConfigError::InvalidValue { parameter: "fmax", .. })
        ));
    }
}
